// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, exam, integrity, submission},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Every route requires a bearer token.
/// * `/api/admin/*` additionally requires the admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let exam_routes = Router::new()
        .route("/api/exams", post(exam::create_exam))
        .route("/api/exams/{id}", get(exam::get_exam))
        .route(
            "/api/exams/{id}/questions",
            get(exam::list_questions).post(exam::add_question),
        )
        .route("/api/exams/{id}/publish", post(exam::publish_exam))
        .route("/api/exams/{id}/request-publication", post(exam::request_publication))
        .route("/api/exams/{id}/complete", post(exam::complete_exam))
        .route("/api/exams/{id}/admission", post(exam::check_admission_code))
        .route("/api/exams/{id}/submissions", get(exam::list_submissions))
        .route("/api/exams/{id}/stats", get(exam::exam_stats))
        .route("/api/exams/{id}/submit", post(submission::submit_exam))
        .route("/api/exams/{id}/disqualify", post(submission::disqualify_student))
        .route("/api/exams/{id}/result", get(submission::my_result))
        .route("/api/exams/{id}/violations", post(integrity::report_violation))
        .route(
            "/api/exams/{id}/violations/{student_id}",
            get(integrity::integrity_log),
        );

    let submission_routes = Router::new()
        .route("/api/submissions/{id}/review", post(submission::review_submission))
        .route("/api/submissions/{id}/suggestions", get(submission::suggest_marks));

    let admin_routes = Router::new()
        .route("/api/admin/exams/{id}/approve", post(admin::approve_exam))
        .route("/api/admin/exams/{id}/reject", post(admin::reject_exam))
        .route("/api/admin/submissions/{id}/cancel", post(admin::cancel_submission))
        .layer(middleware::from_fn(admin_middleware));

    Router::new()
        .merge(exam_routes)
        .merge(submission_routes)
        .merge(admin_routes)
        // Auth runs before the admin check (layers apply from outside in)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
