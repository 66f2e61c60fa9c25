// src/engine/lifecycle.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam::{CreateExamRequest, Exam, ExamStatus, NewExam},
        question::{CreateQuestionRequest, PublicQuestion, Question},
        submission::SubmissionStatus,
        user::{Actor, Role},
    },
    store::Store,
    utils::{
        clock::Clock,
        hash::{hash_admission_code, verify_admission_code},
        html::clean_text,
    },
};

/// Every named move of the exam lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Publish,
    RequestPublication,
    ForceComplete,
    Approve,
    Reject,
    /// System move of the completion sweeper.
    Expire,
}

impl Transition {
    /// The closed edge table. `None` means the move is not allowed from `from`.
    pub fn target(self, from: ExamStatus) -> Option<ExamStatus> {
        use ExamStatus::*;

        match (from, self) {
            (Draft, Transition::Publish) => Some(Published),
            (Published, Transition::RequestPublication) => Some(PendingApproval),
            (Published, Transition::ForceComplete) => Some(Completed),
            (PendingApproval, Transition::Approve) => Some(Completed),
            (PendingApproval, Transition::Reject) => Some(Submitted),
            (Submitted, Transition::RequestPublication) => Some(PendingApproval),
            (Submitted, Transition::Expire) => Some(Completed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transition::Publish => "publish",
            Transition::RequestPublication => "request publication of",
            Transition::ForceComplete => "complete",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Expire => "expire",
        }
    }
}

pub(crate) async fn load_exam(store: &dyn Store, exam_id: i64) -> Result<Exam, AppError> {
    store
        .get_exam(exam_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", exam_id)))
}

/// Fails unless the exam is PUBLISHED and `now` lies in `[start_time, end_time)`.
pub fn require_admission_open(exam: &Exam, now: DateTime<Utc>) -> Result<(), AppError> {
    if exam.status != ExamStatus::Published {
        return Err(AppError::NotPublished(format!(
            "Exam {} is {} and not open for submissions",
            exam.id,
            exam.status.as_str()
        )));
    }
    if now < exam.start_time || now >= exam.end_time {
        return Err(AppError::OutsideWindow(format!(
            "Exam {} is open from {} to {}",
            exam.id, exam.start_time, exam.end_time
        )));
    }
    Ok(())
}

/// The owning teacher (or the admin who created the exam).
pub(crate) fn require_owner(actor: &Actor, exam: &Exam) -> Result<(), AppError> {
    if actor.is_student() || !exam.is_owned_by(actor.id) {
        return Err(AppError::Forbidden(format!("You do not own exam {}", exam.id)));
    }
    Ok(())
}

/// Owner or any admin.
pub(crate) fn require_staff(actor: &Actor, exam: &Exam) -> Result<(), AppError> {
    if actor.is_admin() {
        return Ok(());
    }
    require_owner(actor, exam)
}

pub(crate) fn require_eligible_student(actor: &Actor, exam: &Exam) -> Result<(), AppError> {
    if !actor.is_student() {
        return Err(AppError::Forbidden("Only students can sit exams".to_string()));
    }
    if let Some(batch) = &exam.batch {
        if actor.batch.as_deref() != Some(batch.as_str()) {
            return Err(AppError::Forbidden(format!(
                "Exam {} is restricted to batch {}",
                exam.id, batch
            )));
        }
    }
    Ok(())
}

fn require_approver(actor: &Actor) -> Result<(), AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("Only admins can approve publication".to_string()));
    }
    Ok(())
}

/// Owns exam status. All moves are conditional writes.
pub struct ExamLifecycle {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ExamLifecycle {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates an exam in DRAFT. Teachers and admins only.
    pub async fn create_exam(
        &self,
        actor: &Actor,
        req: CreateExamRequest,
    ) -> Result<Exam, AppError> {
        if actor.role == Role::Student {
            return Err(AppError::Forbidden("Students cannot create exams".to_string()));
        }
        req.validate()?;
        if req.start_time >= req.end_time {
            return Err(AppError::ValidationError(
                "start_time must be before end_time".to_string(),
            ));
        }

        let admission_code_hash = match req.admission_code.as_deref() {
            Some(code) => Some(hash_admission_code(code)?),
            None => None,
        };

        let exam = self
            .store
            .insert_exam(
                NewExam {
                    title: req.title,
                    start_time: req.start_time,
                    end_time: req.end_time,
                    teacher_id: actor.id,
                    batch: req.batch,
                    admission_code_hash,
                },
                self.clock.now(),
            )
            .await?;

        tracing::info!("Exam {} created by {}", exam.id, actor.id);
        Ok(exam)
    }

    pub async fn get_exam(&self, exam_id: i64) -> Result<Exam, AppError> {
        load_exam(self.store.as_ref(), exam_id).await
    }

    /// Adds a question while the exam is still DRAFT.
    pub async fn add_question(
        &self,
        actor: &Actor,
        exam_id: i64,
        req: CreateQuestionRequest,
    ) -> Result<Question, AppError> {
        req.validate()?;
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_owner(actor, &exam)?;

        let locked = || {
            AppError::Immutable(format!("Exam {} is published; questions are frozen", exam_id))
        };
        if exam.status != ExamStatus::Draft {
            return Err(locked());
        }

        // A concurrent publish makes the conditional insert return None.
        self.store.insert_question(exam_id, req.into()).await?.ok_or_else(locked)
    }

    /// Full question definitions, answer keys included.
    pub async fn list_questions(
        &self,
        actor: &Actor,
        exam_id: i64,
    ) -> Result<Vec<Question>, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_staff(actor, &exam)?;
        self.store.list_questions(exam_id).await
    }

    /// The paper as a student sees it, only while the exam is open.
    pub async fn public_questions(
        &self,
        actor: &Actor,
        exam_id: i64,
    ) -> Result<Vec<PublicQuestion>, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_eligible_student(actor, &exam)?;
        require_admission_open(&exam, self.clock.now())?;

        let questions = self.store.list_questions(exam_id).await?;
        Ok(questions.iter().map(PublicQuestion::from).collect())
    }

    /// Exams without a code admit everyone.
    pub async fn verify_admission_code(
        &self,
        actor: &Actor,
        exam_id: i64,
        code: &str,
    ) -> Result<bool, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_eligible_student(actor, &exam)?;

        match exam.admission_code_hash.as_deref() {
            Some(hash) => verify_admission_code(code, hash),
            None => Ok(true),
        }
    }

    pub async fn publish(
        &self,
        actor: &Actor,
        exam_id: i64,
        expected: Option<ExamStatus>,
    ) -> Result<Exam, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_owner(actor, &exam)?;
        let (from, to) = plan(&exam, Transition::Publish, expected)?;

        let questions = self.store.list_questions(exam_id).await?;
        if questions.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Exam {} has no questions",
                exam_id
            )));
        }

        self.commit(&exam, Transition::Publish, from, to, None).await
    }

    /// Sends results to an admin for approval.
    ///
    /// From PUBLISHED, submissions still awaiting review are only reported in the
    /// log; they do not block the request.
    pub async fn request_publication(
        &self,
        actor: &Actor,
        exam_id: i64,
        expected: Option<ExamStatus>,
    ) -> Result<Exam, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_owner(actor, &exam)?;
        let (from, to) = plan(&exam, Transition::RequestPublication, expected)?;

        if from == ExamStatus::Published {
            let pending = self
                .store
                .list_submissions(exam_id)
                .await?
                .iter()
                .filter(|s| s.status == SubmissionStatus::PendingReview)
                .count();
            if pending > 0 {
                tracing::warn!(
                    "Exam {} sent for approval with {} submissions still pending review",
                    exam_id,
                    pending
                );
            }
        }

        self.commit(&exam, Transition::RequestPublication, from, to, None).await
    }

    /// Teacher shortcut to COMPLETED that skips approval.
    // TODO: drop either this or the approval path once product decides which one stays.
    pub async fn force_complete(
        &self,
        actor: &Actor,
        exam_id: i64,
        expected: Option<ExamStatus>,
    ) -> Result<Exam, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_owner(actor, &exam)?;
        let (from, to) = plan(&exam, Transition::ForceComplete, expected)?;
        self.commit(&exam, Transition::ForceComplete, from, to, None).await
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        exam_id: i64,
        expected: Option<ExamStatus>,
        note: Option<&str>,
    ) -> Result<Exam, AppError> {
        require_approver(actor)?;
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        let (from, to) = plan(&exam, Transition::Approve, expected)?;
        let note = note.map(clean_text).filter(|n| !n.is_empty());
        self.commit(&exam, Transition::Approve, from, to, note).await
    }

    /// Sends the exam back to the teacher; `reason` becomes the review notes.
    pub async fn reject(
        &self,
        actor: &Actor,
        exam_id: i64,
        expected: Option<ExamStatus>,
        reason: &str,
    ) -> Result<Exam, AppError> {
        require_approver(actor)?;
        let reason = clean_text(reason);
        if reason.is_empty() {
            return Err(AppError::ValidationError("A rejection reason is required".to_string()));
        }
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        let (from, to) = plan(&exam, Transition::Reject, expected)?;
        self.commit(&exam, Transition::Reject, from, to, Some(reason)).await
    }

    /// SUBMITTED exams whose window has ended move to COMPLETED.
    /// Returns the ids moved; exams that changed concurrently are skipped.
    pub async fn expire_submitted(&self) -> Result<Vec<i64>, AppError> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        for exam in self.store.list_exams_by_status(ExamStatus::Submitted).await? {
            if !exam.window_closed(now) {
                continue;
            }
            let moved = self
                .commit(&exam, Transition::Expire, exam.status, ExamStatus::Completed, None)
                .await;
            match moved {
                Ok(_) => expired.push(exam.id),
                Err(AppError::TransitionConflict(msg)) => tracing::debug!("{}", msg),
                Err(e) => return Err(e),
            }
        }

        Ok(expired)
    }

    async fn commit(
        &self,
        exam: &Exam,
        transition: Transition,
        from: ExamStatus,
        to: ExamStatus,
        review_notes: Option<String>,
    ) -> Result<Exam, AppError> {
        match self.store.transition_exam(exam.id, from, to, review_notes).await? {
            Some(updated) => {
                tracing::info!(
                    "Exam {}: {} -> {} ({})",
                    exam.id,
                    from.as_str(),
                    to.as_str(),
                    transition.name()
                );
                Ok(updated)
            }
            None => Err(AppError::TransitionConflict(format!(
                "Exam {} changed status concurrently; could not {} it",
                exam.id,
                transition.name()
            ))),
        }
    }
}

/// Resolves the edge for `transition`, starting from the caller's expected
/// status (or the observed one).
fn plan(
    exam: &Exam,
    transition: Transition,
    expected: Option<ExamStatus>,
) -> Result<(ExamStatus, ExamStatus), AppError> {
    let from = expected.unwrap_or(exam.status);
    let to = transition.target(from).ok_or_else(|| {
        AppError::InvalidTransition(format!(
            "Cannot {} an exam in status {}",
            transition.name(),
            from.as_str()
        ))
    })?;
    if exam.status != from {
        return Err(AppError::TransitionConflict(format!(
            "Exam {} is {}, expected {}",
            exam.id,
            exam.status.as_str(),
            from.as_str()
        )));
    }
    Ok((from, to))
}
