// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::QuestionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Completed,
    PendingReview,
    /// Terminal. Overrides any earlier status.
    Canceled,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::PendingReview => "pending_review",
            SubmissionStatus::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "completed" => Some(SubmissionStatus::Completed),
            "pending_review" => Some(SubmissionStatus::PendingReview),
            "canceled" => Some(SubmissionStatus::Canceled),
            _ => None,
        }
    }
}

/// A submitted value, tagged by the type of question it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerValue {
    Choice(String),
    Boolean(bool),
    FreeText(String),
}

impl AnswerValue {
    pub fn question_type(&self) -> QuestionType {
        match self {
            AnswerValue::Choice(_) => QuestionType::Choice,
            AnswerValue::Boolean(_) => QuestionType::Boolean,
            AnswerValue::FreeText(_) => QuestionType::FreeText,
        }
    }
}

/// One graded answer inside a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    pub answer: AnswerValue,
    pub marks_obtained: i64,
}

/// Represents a student's single attempt at an exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub answers: Vec<AnswerRecord>,
    pub total_marks: i64,
    pub status: SubmissionStatus,
    pub cancel_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn is_canceled(&self) -> bool {
        self.status == SubmissionStatus::Canceled
    }
}

/// Fields the store needs to persist a new submission.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub exam_id: i64,
    pub student_id: i64,
    pub answers: Vec<AnswerRecord>,
    pub total_marks: i64,
    pub status: SubmissionStatus,
    pub cancel_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    pub answer: AnswerValue,
}

/// DTO for submitting an exam attempt.
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitExamRequest {
    pub answers: Vec<SubmittedAnswer>,
}

/// Reviewer-assigned marks for one question.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewedAnswer {
    pub question_id: i64,
    pub marks_obtained: i64,
}

/// DTO for a teacher's review of a submission.
#[derive(Debug, Deserialize, Serialize)]
pub struct ReviewRequest {
    pub answers: Vec<ReviewedAnswer>,
    pub total_marks: i64,
}

/// DTO carrying the reason for a disqualification or cancellation.
#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

/// DTO for a teacher or proctor disqualifying a student.
#[derive(Debug, Deserialize, Validate)]
pub struct DisqualifyRequest {
    pub student_id: i64,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

/// Auto-scoring suggestion for one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkSuggestion {
    pub question_id: i64,
    pub current_marks: i64,
    pub suggested_marks: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionReport {
    pub submission_id: i64,
    pub suggestions: Vec<MarkSuggestion>,
    pub suggested_total: i64,
}

/// What a student sees of their own attempt. Marks stay hidden until the
/// exam is COMPLETED.
#[derive(Debug, Clone, Serialize)]
pub struct StudentResult {
    pub submission_id: i64,
    pub status: SubmissionStatus,
    pub cancel_reason: Option<String>,
    pub total_marks: Option<i64>,
    pub answers: Option<Vec<AnswerRecord>>,
}
