// src/handlers/submission.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::ExamEngine,
    error::AppError,
    models::{
        submission::{DisqualifyRequest, ReviewRequest, SubmitExamRequest},
        user::Actor,
    },
    utils::jwt::Claims,
};

/// Submits a student's answers. Objective questions are scored on the spot.
pub async fn submit_exam(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let submission = engine.ledger.intake(&actor, id, payload.answers).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn disqualify_student(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<DisqualifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let actor = Actor::try_from(&claims)?;
    let submission = engine
        .ledger
        .disqualify(&actor, id, payload.student_id, &payload.reason)
        .await?;
    Ok(Json(submission))
}

pub async fn my_result(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let result = engine.ledger.my_result(&actor, id).await?;
    Ok(Json(result))
}

pub async fn review_submission(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let submission = engine
        .review
        .apply_review(&actor, id, payload.answers, payload.total_marks)
        .await?;
    Ok(Json(submission))
}

pub async fn suggest_marks(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let report = engine.review.suggest_marks(&actor, id).await?;
    Ok(Json(report))
}
