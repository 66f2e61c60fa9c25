// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::ExamEngine,
    error::AppError,
    models::{exam::TransitionRequest, submission::CancelRequest, user::Actor},
    utils::jwt::Claims,
};

/// Approves an exam's results. PENDING_APPROVAL -> COMPLETED.
/// Admin only.
pub async fn approve_exam(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<TransitionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let actor = Actor::try_from(&claims)?;
    let exam = engine
        .lifecycle
        .approve(&actor, id, payload.expected_status, payload.reason.as_deref())
        .await?;
    Ok(Json(exam))
}

/// Sends an exam back to its teacher. PENDING_APPROVAL -> SUBMITTED.
/// Admin only; `reason` is required.
pub async fn reject_exam(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<TransitionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let actor = Actor::try_from(&claims)?;
    let reason = payload.reason.as_deref().unwrap_or_default();
    let exam = engine
        .lifecycle
        .reject(&actor, id, payload.expected_status, reason)
        .await?;
    Ok(Json(exam))
}

/// Cancels a submission regardless of the exam's window.
/// Admin only.
pub async fn cancel_submission(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<CancelRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let actor = Actor::try_from(&claims)?;
    let submission = engine.ledger.admin_cancel(&actor, id, &payload.reason).await?;
    Ok(Json(submission))
}
