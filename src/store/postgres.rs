use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json};

use crate::{
    error::AppError,
    models::{
        exam::{Exam, ExamStatus, NewExam},
        integrity::{IntegrityEvent, ViolationKind},
        question::{AnswerKey, NewQuestion, Question},
        submission::{AnswerRecord, NewSubmission, Submission, SubmissionStatus},
    },
    store::Store,
};

const EXAM_COLUMNS: &str = "id, title, status, start_time, end_time, teacher_id, batch, \
     total_marks, review_notes, admission_code_hash, created_at";

const QUESTION_COLUMNS: &str = "id, exam_id, content, answer_key, marks";

const SUBMISSION_COLUMNS: &str = "id, exam_id, student_id, answers, total_marks, status, \
     cancel_reason, submitted_at, updated_at";

/// Helper struct for reading the 'exams' table.
#[derive(sqlx::FromRow)]
struct ExamRow {
    id: i64,
    title: String,
    status: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    teacher_id: i64,
    batch: Option<String>,
    total_marks: i64,
    review_notes: Option<String>,
    admission_code_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExamRow> for Exam {
    type Error = AppError;

    fn try_from(row: ExamRow) -> Result<Self, Self::Error> {
        let status = ExamStatus::parse(&row.status).ok_or_else(|| {
            AppError::InternalServerError(format!("Unknown exam status '{}'", row.status))
        })?;
        Ok(Exam {
            id: row.id,
            title: row.title,
            status,
            start_time: row.start_time,
            end_time: row.end_time,
            teacher_id: row.teacher_id,
            batch: row.batch,
            total_marks: row.total_marks,
            review_notes: row.review_notes,
            admission_code_hash: row.admission_code_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    exam_id: i64,
    content: String,
    answer_key: Json<AnswerKey>,
    marks: i64,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            exam_id: row.exam_id,
            content: row.content,
            key: row.answer_key.0,
            marks: row.marks,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    exam_id: i64,
    student_id: i64,
    answers: Json<Vec<AnswerRecord>>,
    total_marks: i64,
    status: String,
    cancel_reason: Option<String>,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = AppError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let status = SubmissionStatus::parse(&row.status).ok_or_else(|| {
            AppError::InternalServerError(format!("Unknown submission status '{}'", row.status))
        })?;
        Ok(Submission {
            id: row.id,
            exam_id: row.exam_id,
            student_id: row.student_id,
            answers: row.answers.0,
            total_marks: row.total_marks,
            status,
            cancel_reason: row.cancel_reason,
            submitted_at: row.submitted_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    exam_id: i64,
    student_id: i64,
    kind: String,
    occurred_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for IntegrityEvent {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind = ViolationKind::parse(&row.kind).ok_or_else(|| {
            AppError::InternalServerError(format!("Unknown violation kind '{}'", row.kind))
        })?;
        Ok(IntegrityEvent {
            exam_id: row.exam_id,
            student_id: row.student_id,
            kind,
            occurred_at: row.occurred_at,
            received_at: row.received_at,
        })
    }
}

fn into_submissions(rows: Vec<SubmissionRow>) -> Result<Vec<Submission>, AppError> {
    rows.into_iter().map(Submission::try_from).collect()
}

/// PostgreSQL-backed store.
///
/// The one-active-submission rule is a partial unique index
/// (`submissions_one_active`), and status moves are `UPDATE ... WHERE status = $expected`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_exam(&self, exam: NewExam, now: DateTime<Utc>) -> Result<Exam, AppError> {
        let row = sqlx::query_as::<_, ExamRow>(&format!(
            "INSERT INTO exams
                (title, status, start_time, end_time, teacher_id, batch, admission_code_hash,
                 created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            EXAM_COLUMNS
        ))
        .bind(exam.title)
        .bind(ExamStatus::Draft.as_str())
        .bind(exam.start_time)
        .bind(exam.end_time)
        .bind(exam.teacher_id)
        .bind(exam.batch)
        .bind(exam.admission_code_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create exam: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Exam::try_from(row)
    }

    async fn get_exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError> {
        let row = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM exams WHERE id = $1",
            EXAM_COLUMNS
        ))
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Exam::try_from).transpose()
    }

    async fn list_exams_by_status(&self, status: ExamStatus) -> Result<Vec<Exam>, AppError> {
        let rows = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM exams WHERE status = $1 ORDER BY id",
            EXAM_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Exam::try_from).collect()
    }

    async fn transition_exam(
        &self,
        exam_id: i64,
        expected: ExamStatus,
        next: ExamStatus,
        review_notes: Option<String>,
    ) -> Result<Option<Exam>, AppError> {
        let row = sqlx::query_as::<_, ExamRow>(&format!(
            "UPDATE exams SET status = $1, review_notes = COALESCE($2, review_notes)
             WHERE id = $3 AND status = $4
             RETURNING {}",
            EXAM_COLUMNS
        ))
        .bind(next.as_str())
        .bind(review_notes)
        .bind(exam_id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to transition exam {}: {:?}", exam_id, e);
            AppError::InternalServerError(e.to_string())
        })?;

        row.map(Exam::try_from).transpose()
    }

    async fn insert_question(
        &self,
        exam_id: i64,
        question: NewQuestion,
    ) -> Result<Option<Question>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the exam serializes this with a concurrent publish.
        let bumped = sqlx::query(
            "UPDATE exams SET total_marks = total_marks + $1 WHERE id = $2 AND status = $3",
        )
        .bind(question.marks)
        .bind(exam_id)
        .bind(ExamStatus::Draft.as_str())
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "INSERT INTO questions (exam_id, content, answer_key, marks)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(exam_id)
        .bind(question.content)
        .bind(Json(question.key))
        .bind(question.marks)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn list_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {} FROM questions WHERE exam_id = $1 ORDER BY id",
            QUESTION_COLUMNS
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Option<Submission>, AppError> {
        // Single statement: the partial unique index decides, never a prior SELECT.
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "INSERT INTO submissions
                (exam_id, student_id, answers, total_marks, status, cancel_reason,
                 submitted_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             ON CONFLICT (exam_id, student_id) WHERE status <> 'canceled' DO NOTHING
             RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(submission.exam_id)
        .bind(submission.student_id)
        .bind(Json(submission.answers))
        .bind(submission.total_marks)
        .bind(submission.status.as_str())
        .bind(submission.cancel_reason)
        .bind(submission.submitted_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        row.map(Submission::try_from).transpose()
    }

    async fn insert_canceled_placeholder(
        &self,
        submission: NewSubmission,
    ) -> Result<Option<Submission>, AppError> {
        let mut tx = self.pool.begin().await?;

        // The pair's disqualification row is written first; locking it
        // serializes placeholder inserts for the pair.
        sqlx::query(
            "SELECT 1 FROM disqualifications WHERE exam_id = $1 AND student_id = $2 FOR UPDATE",
        )
        .bind(submission.exam_id)
        .bind(submission.student_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "INSERT INTO submissions
                (exam_id, student_id, answers, total_marks, status, cancel_reason,
                 submitted_at, updated_at)
             SELECT $1, $2, $3, $4, $5, $6, $7, $7
             WHERE NOT EXISTS (SELECT 1 FROM submissions WHERE exam_id = $1 AND student_id = $2)
             RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(submission.exam_id)
        .bind(submission.student_id)
        .bind(Json(submission.answers))
        .bind(submission.total_marks)
        .bind(SubmissionStatus::Canceled.as_str())
        .bind(submission.cancel_reason)
        .bind(submission.submitted_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert canceled submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        tx.commit().await?;
        row.map(Submission::try_from).transpose()
    }

    async fn get_submission(&self, submission_id: i64) -> Result<Option<Submission>, AppError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {} FROM submissions WHERE id = $1",
            SUBMISSION_COLUMNS
        ))
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Submission::try_from).transpose()
    }

    async fn list_student_submissions(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<Submission>, AppError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {} FROM submissions WHERE exam_id = $1 AND student_id = $2 ORDER BY id",
            SUBMISSION_COLUMNS
        ))
        .bind(exam_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        into_submissions(rows)
    }

    async fn list_submissions(&self, exam_id: i64) -> Result<Vec<Submission>, AppError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {} FROM submissions WHERE exam_id = $1 ORDER BY id",
            SUBMISSION_COLUMNS
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        into_submissions(rows)
    }

    async fn cancel_active_submissions(
        &self,
        exam_id: i64,
        student_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Submission>, AppError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "UPDATE submissions SET status = 'canceled', cancel_reason = $1, updated_at = $2
             WHERE exam_id = $3 AND student_id = $4 AND status <> 'canceled'
             RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(reason)
        .bind(now)
        .bind(exam_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to cancel submissions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        into_submissions(rows)
    }

    async fn cancel_submission(
        &self,
        submission_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Submission>, AppError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "UPDATE submissions SET status = 'canceled', cancel_reason = $1, updated_at = $2
             WHERE id = $3 AND status <> 'canceled'
             RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(reason)
        .bind(now)
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Submission::try_from(row).map(Some),
            // Already canceled (or absent): report what is stored.
            None => self.get_submission(submission_id).await,
        }
    }

    async fn update_submission_marks(
        &self,
        submission_id: i64,
        answers: Vec<AnswerRecord>,
        total_marks: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Submission>, AppError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "UPDATE submissions
             SET answers = $1, total_marks = $2, status = 'completed', updated_at = $3
             WHERE id = $4 AND status <> 'canceled'
             RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(Json(answers))
        .bind(total_marks)
        .bind(now)
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update submission {}: {:?}", submission_id, e);
            AppError::InternalServerError(e.to_string())
        })?;

        row.map(Submission::try_from).transpose()
    }

    async fn record_disqualification(
        &self,
        exam_id: i64,
        student_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO disqualifications (exam_id, student_id, reason, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (exam_id, student_id) DO NOTHING",
        )
        .bind(exam_id)
        .bind(student_id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn disqualification_reason(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<String>, AppError> {
        let reason = sqlx::query_scalar::<_, String>(
            "SELECT reason FROM disqualifications WHERE exam_id = $1 AND student_id = $2",
        )
        .bind(exam_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reason)
    }

    async fn append_integrity_event(&self, event: IntegrityEvent) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO integrity_events (exam_id, student_id, kind, occurred_at, received_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.exam_id)
        .bind(event.student_id)
        .bind(event.kind.as_str())
        .bind(event.occurred_at)
        .bind(event.received_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to record integrity event: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(())
    }

    async fn list_integrity_events(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<IntegrityEvent>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT exam_id, student_id, kind, occurred_at, received_at
             FROM integrity_events
             WHERE exam_id = $1 AND student_id = $2
             ORDER BY occurred_at, id",
        )
        .bind(exam_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IntegrityEvent::try_from).collect()
    }
}
