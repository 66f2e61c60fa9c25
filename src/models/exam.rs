// src/models/exam.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lifecycle status of an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    Draft,
    Published,
    PendingApproval,
    Submitted,
    Completed,
}

impl ExamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::Draft => "DRAFT",
            ExamStatus::Published => "PUBLISHED",
            ExamStatus::PendingApproval => "PENDING_APPROVAL",
            ExamStatus::Submitted => "SUBMITTED",
            ExamStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DRAFT" => Some(ExamStatus::Draft),
            "PUBLISHED" => Some(ExamStatus::Published),
            "PENDING_APPROVAL" => Some(ExamStatus::PendingApproval),
            "SUBMITTED" => Some(ExamStatus::Submitted),
            "COMPLETED" => Some(ExamStatus::Completed),
            _ => None,
        }
    }
}

/// An exam and its validity window `[start_time, end_time)`.
#[derive(Debug, Clone, Serialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub status: ExamStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub teacher_id: i64,

    /// Cohort allowed to sit the exam. `None` admits any student.
    pub batch: Option<String>,

    /// Sum of the marks of all questions.
    pub total_marks: i64,

    /// Rejection or approval commentary left by the approver.
    pub review_notes: Option<String>,

    /// Argon2 hash of the admission code.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub admission_code_hash: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Exam {
    /// PUBLISHED and `start_time <= now < end_time`.
    pub fn is_admission_open(&self, now: DateTime<Utc>) -> bool {
        self.status == ExamStatus::Published && self.start_time <= now && now < self.end_time
    }

    pub fn window_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn is_owned_by(&self, teacher_id: i64) -> bool {
        self.teacher_id == teacher_id
    }
}

/// Fields the store needs to persist a new exam.
#[derive(Debug, Clone)]
pub struct NewExam {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub teacher_id: i64,
    pub batch: Option<String>,
    pub admission_code_hash: Option<String>,
}

/// DTO for creating a new exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(length(min = 1, max = 50))]
    pub batch: Option<String>,
    #[validate(length(min = 4, max = 64))]
    pub admission_code: Option<String>,
}

/// Body of every lifecycle move. `expected_status` is the status the caller
/// believes the exam is in; when omitted the currently observed status is used.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct TransitionRequest {
    pub expected_status: Option<ExamStatus>,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

/// DTO for checking an admission code.
#[derive(Debug, Deserialize)]
pub struct AdmissionCodeRequest {
    pub code: String,
}

/// Per-exam submission counts for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamStats {
    pub exam_id: i64,
    pub status: ExamStatus,
    pub total: usize,
    pub completed: usize,
    pub pending_review: usize,
    pub canceled: usize,
}
