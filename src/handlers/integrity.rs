// src/handlers/integrity.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    engine::ExamEngine,
    error::AppError,
    models::{integrity::ReportViolationRequest, user::Actor},
    utils::jwt::Claims,
};

/// Client-side proctoring hook. Returns the escalation signal for the UI.
pub async fn report_violation(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ReportViolationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let escalation = engine
        .monitor
        .report_violation(&actor, id, payload.kind, payload.timestamp)
        .await?;
    Ok(Json(escalation))
}

pub async fn integrity_log(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path((id, student_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::try_from(&claims)?;
    let events = engine.monitor.integrity_log(&actor, id, student_id).await?;
    Ok(Json(events))
}
