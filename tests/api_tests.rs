// tests/api_tests.rs

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use exam_gate::{
    config::Config,
    engine::{ExamEngine, MonitorPolicy},
    models::user::Role,
    routes,
    state::AppState,
    store::MemoryStore,
    utils::{clock::SystemClock, jwt::sign_jwt},
};
use serde_json::{Value, json};

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    client: reqwest::Client,
}

impl TestApp {
    fn token(&self, id: i64, role: Role) -> String {
        sign_jwt(id, role, None, SECRET, 600).expect("Failed to sign token")
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// Spawns the app on a random port, backed by the in-memory store.
async fn spawn_app() -> TestApp {
    let config = Config {
        database_url: None,
        jwt_secret: SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        violation_window_secs: 300,
        warn_threshold: 2,
        max_warnings: 3,
        sweep_interval_secs: 60,
    };

    let engine = ExamEngine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        MonitorPolicy::from(&config),
    );
    let state = AppState { engine: Arc::new(engine), config };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address: format!("http://127.0.0.1:{}", port), client: reqwest::Client::new() }
}

/// A published exam that is open right now, with one CHOICE question.
async fn open_exam(app: &TestApp, teacher: &str) -> (i64, i64) {
    let now = Utc::now();
    let exam: Value = app
        .post(
            "/api/exams",
            teacher,
            json!({
                "title": "Live quiz",
                "start_time": now - TimeDelta::hours(1),
                "end_time": now + TimeDelta::hours(1),
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    let exam_id = exam["id"].as_i64().unwrap();
    assert_eq!(exam["status"], "DRAFT");

    let question = app
        .post(
            &format!("/api/exams/{}/questions", exam_id),
            teacher,
            json!({
                "content": "Pick B",
                "type": "CHOICE",
                "options": [
                    { "text": "A", "is_correct": false },
                    { "text": "B", "is_correct": true }
                ],
                "marks": 10
            }),
        )
        .await;
    assert_eq!(question.status().as_u16(), 201);
    let question: Value = question.json().await.unwrap();

    let published = app.post(&format!("/api/exams/{}/publish", exam_id), teacher, json!({})).await;
    assert_eq!(published.status().as_u16(), 200);

    (exam_id, question["id"].as_i64().unwrap())
}

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;
    let token = app.token(1, Role::Teacher);

    let response = app.get("/random_path_that_does_not_exist", &token).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/api/exams/1", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_routes_need_admin_role() {
    let app = spawn_app().await;
    let teacher = app.token(10, Role::Teacher);

    let response = app.post("/api/admin/exams/1/approve", &teacher, json!({})).await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn student_submits_once_and_sees_hidden_marks() {
    let app = spawn_app().await;
    let teacher = app.token(10, Role::Teacher);
    let student = app.token(100, Role::Student);
    let (exam_id, question_id) = open_exam(&app, &teacher).await;

    // Students get the paper without answer keys.
    let paper: Value = app
        .get(&format!("/api/exams/{}/questions", exam_id), &student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(paper[0]["options"], json!(["A", "B"]));
    assert!(paper[0].get("is_correct").is_none());

    let body = json!({
        "answers": [{ "question_id": question_id, "answer": { "type": "CHOICE", "value": "B" } }]
    });
    let first = app.post(&format!("/api/exams/{}/submit", exam_id), &student, body.clone()).await;
    assert_eq!(first.status().as_u16(), 201);
    let submission: Value = first.json().await.unwrap();
    assert_eq!(submission["status"], "completed");
    assert_eq!(submission["total_marks"], 10);

    let second = app.post(&format!("/api/exams/{}/submit", exam_id), &student, body).await;
    assert_eq!(second.status().as_u16(), 409);
    let error: Value = second.json().await.unwrap();
    assert_eq!(error["code"], "already_submitted");

    let result: Value = app
        .get(&format!("/api/exams/{}/result", exam_id), &student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["status"], "completed");
    assert!(result["total_marks"].is_null());
}

#[tokio::test]
async fn violations_escalate_to_disqualification() {
    let app = spawn_app().await;
    let teacher = app.token(10, Role::Teacher);
    let student = app.token(100, Role::Student);
    let (exam_id, _) = open_exam(&app, &teacher).await;

    let path = format!("/api/exams/{}/violations", exam_id);
    // Client clocks report events that already happened.
    let base = Utc::now() - TimeDelta::minutes(30);
    let mut signals = Vec::new();
    for minutes in [0, 1, 10, 11, 20, 21] {
        let response = app
            .post(
                &path,
                &student,
                json!({ "kind": "tab_change", "timestamp": base + TimeDelta::minutes(minutes) }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let signal: Value = response.json().await.unwrap();
        signals.push(signal["signal"].as_str().unwrap().to_string());
    }
    assert_eq!(signals, vec!["none", "warn", "none", "warn", "none", "disqualified"]);

    let stats: Value = app
        .get(&format!("/api/exams/{}/stats", exam_id), &teacher)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["canceled"], 1);

    let log: Value = app.get(&format!("{}/100", path), &teacher).await.json().await.unwrap();
    assert_eq!(log.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn violations_from_the_future_are_rejected() {
    let app = spawn_app().await;
    let teacher = app.token(10, Role::Teacher);
    let student = app.token(100, Role::Student);
    let (exam_id, _) = open_exam(&app, &teacher).await;

    let response = app
        .post(
            &format!("/api/exams/{}/violations", exam_id),
            &student,
            json!({ "kind": "dev_tools", "timestamp": "3000-01-01T00:00:00Z" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn status_moves_accept_a_bare_post() {
    let app = spawn_app().await;
    let teacher = app.token(10, Role::Teacher);

    let now = Utc::now();
    let exam: Value = app
        .post(
            "/api/exams",
            &teacher,
            json!({ "title": "No body", "start_time": now, "end_time": now + TimeDelta::hours(1) }),
        )
        .await
        .json()
        .await
        .unwrap();
    let exam_id = exam["id"].as_i64().unwrap();
    app.post(
        &format!("/api/exams/{}/questions", exam_id),
        &teacher,
        json!({ "content": "2 + 2 = 4", "type": "BOOLEAN", "correct_answer": "true", "marks": 1 }),
    )
    .await;

    // An over-long reason fails validation.
    let too_long = app
        .post(
            &format!("/api/exams/{}/publish", exam_id),
            &teacher,
            json!({ "reason": "x".repeat(2001) }),
        )
        .await;
    assert_eq!(too_long.status().as_u16(), 400);

    let response = app
        .client
        .post(format!("{}/api/exams/{}/publish", app.address, exam_id))
        .bearer_auth(&teacher)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let published: Value = response.json().await.unwrap();
    assert_eq!(published["status"], "PUBLISHED");
}

#[tokio::test]
async fn approval_from_draft_is_an_invalid_transition() {
    let app = spawn_app().await;
    let teacher = app.token(10, Role::Teacher);
    let admin = app.token(1, Role::Admin);

    let now = Utc::now();
    let exam: Value = app
        .post(
            "/api/exams",
            &teacher,
            json!({
                "title": "Draft only",
                "start_time": now,
                "end_time": now + TimeDelta::hours(1),
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .post(&format!("/api/admin/exams/{}/approve", exam["id"]), &admin, json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["code"], "invalid_transition");
}

#[tokio::test]
async fn invalid_exam_payload_is_rejected() {
    let app = spawn_app().await;
    let teacher = app.token(10, Role::Teacher);

    let now = Utc::now();
    let response = app
        .post(
            "/api/exams",
            &teacher,
            json!({ "title": "", "start_time": now, "end_time": now + TimeDelta::hours(1) }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}
