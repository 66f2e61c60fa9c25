// src/handlers/exam.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use validator::Validate;

use crate::{
    engine::ExamEngine,
    error::AppError,
    models::{
        exam::{AdmissionCodeRequest, CreateExamRequest, TransitionRequest},
        question::CreateQuestionRequest,
        user::Actor,
    },
    utils::jwt::Claims,
};

/// Creates a DRAFT exam owned by the caller.
pub async fn create_exam(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let exam = engine.lifecycle.create_exam(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(exam)))
}

pub async fn get_exam(
    State(engine): State<Arc<ExamEngine>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = engine.lifecycle.get_exam(id).await?;
    Ok(Json(exam))
}

pub async fn add_question(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let question = engine.lifecycle.add_question(&actor, id, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Students get the paper without answer keys; staff get everything.
pub async fn list_questions(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let actor = Actor::try_from(&claims)?;
    if actor.is_student() {
        let paper = engine.lifecycle.public_questions(&actor, id).await?;
        Ok(Json(paper).into_response())
    } else {
        let questions = engine.lifecycle.list_questions(&actor, id).await?;
        Ok(Json(questions).into_response())
    }
}

/// The body of a status move is optional; a bare POST means "no expectation".
fn transition_payload(
    payload: Option<Json<TransitionRequest>>,
) -> Result<TransitionRequest, AppError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate()?;
    Ok(payload)
}

pub async fn publish_exam(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    payload: Option<Json<TransitionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let payload = transition_payload(payload)?;
    let exam = engine.lifecycle.publish(&actor, id, payload.expected_status).await?;
    Ok(Json(exam))
}

pub async fn request_publication(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    payload: Option<Json<TransitionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let payload = transition_payload(payload)?;
    let exam = engine
        .lifecycle
        .request_publication(&actor, id, payload.expected_status)
        .await?;
    Ok(Json(exam))
}

pub async fn complete_exam(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    payload: Option<Json<TransitionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let payload = transition_payload(payload)?;
    let exam = engine.lifecycle.force_complete(&actor, id, payload.expected_status).await?;
    Ok(Json(exam))
}

pub async fn check_admission_code(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AdmissionCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let valid = engine.lifecycle.verify_admission_code(&actor, id, &payload.code).await?;
    Ok(Json(json!({ "valid": valid })))
}

pub async fn list_submissions(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let submissions = engine.ledger.list_submissions(&actor, id).await?;
    Ok(Json(submissions))
}

pub async fn exam_stats(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let stats = engine.ledger.exam_stats(&actor, id).await?;
    Ok(Json(stats))
}

