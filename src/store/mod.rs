// src/store/mod.rs

//! Conditional-write storage for exams, questions, submissions and
//! integrity events.
//!
//! Every method that guards an invariant does its check and its write as one
//! atomic operation; callers never read-then-write to enforce a rule.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        exam::{Exam, ExamStatus, NewExam},
        integrity::IntegrityEvent,
        question::{NewQuestion, Question},
        submission::{AnswerRecord, NewSubmission, Submission},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_exam(&self, exam: NewExam, now: DateTime<Utc>) -> Result<Exam, AppError>;

    async fn get_exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError>;

    async fn list_exams_by_status(&self, status: ExamStatus) -> Result<Vec<Exam>, AppError>;

    /// Compare-and-swap on the exam status.
    /// Returns `Ok(None)` if the stored status is not `expected` (or the exam is gone).
    /// `review_notes`, when given, replaces the stored notes in the same write.
    async fn transition_exam(
        &self,
        exam_id: i64,
        expected: ExamStatus,
        next: ExamStatus,
        review_notes: Option<String>,
    ) -> Result<Option<Exam>, AppError>;

    /// Adds a question and grows the exam's `total_marks`, only while the exam is DRAFT.
    /// Returns `Ok(None)` if the exam is missing or no longer DRAFT.
    async fn insert_question(
        &self,
        exam_id: i64,
        question: NewQuestion,
    ) -> Result<Option<Question>, AppError>;

    /// Questions of an exam in creation order.
    async fn list_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError>;

    /// Inserts a submission unless it would be a second non-canceled submission
    /// for the same (exam, student); returns `Ok(None)` in that case.
    /// Canceled submissions are always inserted.
    async fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Option<Submission>, AppError>;

    /// Inserts a canceled submission only if the pair has no submission at all.
    /// Returns `Ok(None)` when the pair already has history.
    async fn insert_canceled_placeholder(
        &self,
        submission: NewSubmission,
    ) -> Result<Option<Submission>, AppError>;

    async fn get_submission(&self, submission_id: i64) -> Result<Option<Submission>, AppError>;

    /// All submissions of one student for one exam, oldest first.
    async fn list_student_submissions(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<Submission>, AppError>;

    async fn list_submissions(&self, exam_id: i64) -> Result<Vec<Submission>, AppError>;

    /// Cancels every non-canceled submission of the pair and returns those changed.
    async fn cancel_active_submissions(
        &self,
        exam_id: i64,
        student_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Submission>, AppError>;

    /// Cancels one submission. An already canceled submission is returned
    /// unchanged; `Ok(None)` means it does not exist.
    async fn cancel_submission(
        &self,
        submission_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Submission>, AppError>;

    /// Replaces answer marks and total and marks the submission completed,
    /// unless it is canceled. Returns `Ok(None)` if canceled or missing.
    async fn update_submission_marks(
        &self,
        submission_id: i64,
        answers: Vec<AnswerRecord>,
        total_marks: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Submission>, AppError>;

    /// Remembers that the pair is disqualified. The first reason wins.
    async fn record_disqualification(
        &self,
        exam_id: i64,
        student_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn disqualification_reason(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<String>, AppError>;

    async fn append_integrity_event(&self, event: IntegrityEvent) -> Result<(), AppError>;

    /// Events of the pair ordered by client timestamp.
    async fn list_integrity_events(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<IntegrityEvent>, AppError>;
}
