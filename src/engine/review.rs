// src/engine/review.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    engine::{
        lifecycle::{load_exam, require_owner, require_staff},
        scoring,
    },
    error::AppError,
    models::{
        submission::{MarkSuggestion, ReviewedAnswer, Submission, SuggestionReport},
        user::Actor,
    },
    store::Store,
    utils::clock::Clock,
};

/// Manual marking of submissions after the exam window closes.
pub struct ReviewWorkflow {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ReviewWorkflow {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn load_submission(&self, submission_id: i64) -> Result<Submission, AppError> {
        self.store
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {} not found", submission_id)))
    }

    /// Overwrites per-answer marks and the total, completing the submission.
    ///
    /// Answers not named in `revised` keep their current marks. The merged
    /// per-answer marks must add up to `revised_total`.
    pub async fn apply_review(
        &self,
        actor: &Actor,
        submission_id: i64,
        revised: Vec<ReviewedAnswer>,
        revised_total: i64,
    ) -> Result<Submission, AppError> {
        let submission = self.load_submission(submission_id).await?;
        let exam = load_exam(self.store.as_ref(), submission.exam_id).await?;
        require_owner(actor, &exam)?;

        let now = self.clock.now();
        if !exam.window_closed(now) {
            return Err(AppError::OutsideWindow(format!(
                "Exam {} can be reviewed after {}",
                exam.id, exam.end_time
            )));
        }
        if submission.is_canceled() {
            return Err(immutable(submission_id));
        }

        let max_marks: HashMap<i64, i64> = self
            .store
            .list_questions(exam.id)
            .await?
            .into_iter()
            .map(|q| (q.id, q.marks))
            .collect();

        let mut answers = submission.answers;
        let mut seen = HashSet::new();
        for review in revised {
            if !seen.insert(review.question_id) {
                return Err(AppError::ValidationError(format!(
                    "Question {} reviewed more than once",
                    review.question_id
                )));
            }
            let record = answers
                .iter_mut()
                .find(|a| a.question_id == review.question_id)
                .ok_or_else(|| {
                    AppError::ValidationError(format!(
                        "Question {} is not part of submission {}",
                        review.question_id, submission_id
                    ))
                })?;
            let max = max_marks.get(&review.question_id).copied().unwrap_or(0);
            if review.marks_obtained < 0 || review.marks_obtained > max {
                return Err(AppError::ValidationError(format!(
                    "Marks for question {} must be between 0 and {}",
                    review.question_id, max
                )));
            }
            record.marks_obtained = review.marks_obtained;
        }

        let sum: i64 = answers.iter().map(|a| a.marks_obtained).sum();
        if sum != revised_total {
            return Err(AppError::ValidationError(format!(
                "Total {} does not match the sum of answer marks {}",
                revised_total, sum
            )));
        }

        // Conditional on not canceled: a disqualification racing this review wins.
        let reviewed = self
            .store
            .update_submission_marks(submission_id, answers, revised_total, now)
            .await?
            .ok_or_else(|| immutable(submission_id))?;

        tracing::info!(
            "Submission {} reviewed by {}: {} marks",
            submission_id,
            actor.id,
            reviewed.total_marks
        );
        Ok(reviewed)
    }

    /// Auto-scoring suggestions for every answer. Nothing is persisted.
    pub async fn suggest_marks(
        &self,
        actor: &Actor,
        submission_id: i64,
    ) -> Result<SuggestionReport, AppError> {
        let submission = self.load_submission(submission_id).await?;
        let exam = load_exam(self.store.as_ref(), submission.exam_id).await?;
        require_staff(actor, &exam)?;

        let questions: HashMap<i64, _> = self
            .store
            .list_questions(exam.id)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();

        let suggestions: Vec<MarkSuggestion> = submission
            .answers
            .iter()
            .map(|record| MarkSuggestion {
                question_id: record.question_id,
                current_marks: record.marks_obtained,
                suggested_marks: questions
                    .get(&record.question_id)
                    .map(|q| scoring::score(q, &record.answer))
                    .unwrap_or(0),
            })
            .collect();

        Ok(SuggestionReport {
            submission_id,
            suggested_total: suggestions.iter().map(|s| s.suggested_marks).sum(),
            suggestions,
        })
    }
}

fn immutable(submission_id: i64) -> AppError {
    AppError::Immutable(format!(
        "Submission {} is canceled and cannot be reviewed",
        submission_id
    ))
}
