// src/engine/ledger.rs

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    engine::{
        lifecycle::{load_exam, require_admission_open, require_eligible_student, require_staff},
        scoring,
    },
    error::AppError,
    models::{
        exam::{ExamStats, ExamStatus},
        question::{Question, QuestionType},
        submission::{
            AnswerRecord, NewSubmission, StudentResult, Submission, SubmissionStatus,
            SubmittedAnswer,
        },
        user::Actor,
    },
    store::Store,
    utils::{clock::Clock, html::clean_text},
};

const DEFAULT_REASON: &str = "Disqualified";

/// Owns submissions and the one-active-submission-per-student rule.
pub struct SubmissionLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SubmissionLedger {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Accepts a student's answers, scores them and stores the submission.
    ///
    /// * The exam must be admission-open and the student eligible.
    /// * Every question must be answered exactly once with a value of its type.
    /// * Exams with a FREE_TEXT question start in `pending_review`.
    ///
    /// A student who is already disqualified still gets a submission, but it is
    /// canceled straight away with the recorded reason.
    pub async fn intake(
        &self,
        actor: &Actor,
        exam_id: i64,
        answers: Vec<SubmittedAnswer>,
    ) -> Result<Submission, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        let now = self.clock.now();
        require_admission_open(&exam, now)?;
        require_eligible_student(actor, &exam)?;

        let questions = self.store.list_questions(exam_id).await?;
        let records = grade(&questions, answers)?;
        let total_marks = records.iter().map(|r| r.marks_obtained).sum();
        let status = if scoring::needs_review(&questions) {
            SubmissionStatus::PendingReview
        } else {
            SubmissionStatus::Completed
        };

        let submission = self
            .store
            .insert_submission(NewSubmission {
                exam_id,
                student_id: actor.id,
                answers: records,
                total_marks,
                status,
                cancel_reason: None,
                submitted_at: now,
            })
            .await?
            .ok_or_else(|| {
                AppError::AlreadySubmitted(format!(
                    "Student {} has already submitted exam {}",
                    actor.id, exam_id
                ))
            })?;

        tracing::info!(
            "Submission {} accepted: exam {}, student {}, {} marks, {}",
            submission.id,
            exam_id,
            actor.id,
            submission.total_marks,
            submission.status.as_str()
        );

        // Checked after the insert so a racing disqualify either sees our row
        // or we see its marker.
        if let Some(reason) = self.store.disqualification_reason(exam_id, actor.id).await? {
            tracing::warn!(
                "Student {} is disqualified from exam {}; canceling submission {}",
                actor.id,
                exam_id,
                submission.id
            );
            return self
                .store
                .cancel_submission(submission.id, &reason, self.clock.now())
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError(format!("Submission {} vanished", submission.id))
                });
        }

        Ok(submission)
    }

    /// Disqualifies a student while the exam is live.
    ///
    /// Allowed for the student themself, the owning teacher, or an admin.
    pub async fn disqualify(
        &self,
        actor: &Actor,
        exam_id: i64,
        student_id: i64,
        reason: &str,
    ) -> Result<Submission, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        let self_report = actor.is_student() && actor.id == student_id;
        if self_report {
            require_eligible_student(actor, &exam)?;
        } else {
            require_staff(actor, &exam)?;
        }
        require_admission_open(&exam, self.clock.now())?;

        self.disqualify_unchecked(exam_id, student_id, reason).await
    }

    /// Terminal cancellation of the pair's submission, creating a zero-score
    /// canceled one if the student never submitted. Idempotent.
    pub(crate) async fn disqualify_unchecked(
        &self,
        exam_id: i64,
        student_id: i64,
        reason: &str,
    ) -> Result<Submission, AppError> {
        let reason = sanitize_reason(reason);
        let now = self.clock.now();

        self.store.record_disqualification(exam_id, student_id, &reason, now).await?;

        let canceled = self
            .store
            .cancel_active_submissions(exam_id, student_id, &reason, now)
            .await?;
        if let Some(latest) = canceled.into_iter().max_by_key(|s| s.id) {
            tracing::warn!(
                "Student {} disqualified from exam {}: submission {} canceled ({})",
                student_id,
                exam_id,
                latest.id,
                reason
            );
            return Ok(latest);
        }

        let history = self.store.list_student_submissions(exam_id, student_id).await?;
        if let Some(latest) = history.into_iter().max_by_key(|s| s.id) {
            if latest.is_canceled() {
                return Ok(latest);
            }
            // An intake slipped in after the bulk cancel.
            return self
                .store
                .cancel_submission(latest.id, &reason, now)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError(format!("Submission {} vanished", latest.id))
                });
        }

        let placeholder = self
            .store
            .insert_canceled_placeholder(NewSubmission {
                exam_id,
                student_id,
                answers: Vec::new(),
                total_marks: 0,
                status: SubmissionStatus::Canceled,
                cancel_reason: Some(reason.clone()),
                submitted_at: now,
            })
            .await?;
        if let Some(placeholder) = placeholder {
            tracing::warn!(
                "Student {} disqualified from exam {} before submitting ({})",
                student_id,
                exam_id,
                reason
            );
            return Ok(placeholder);
        }

        // A concurrent call stored the pair's first row in the meantime.
        let history = self.store.list_student_submissions(exam_id, student_id).await?;
        let latest = history.into_iter().max_by_key(|s| s.id).ok_or_else(|| {
            AppError::InternalServerError(format!(
                "No submission stored for student {} in exam {}",
                student_id, exam_id
            ))
        })?;
        if latest.is_canceled() {
            return Ok(latest);
        }
        self.store.cancel_submission(latest.id, &reason, now).await?.ok_or_else(|| {
            AppError::InternalServerError(format!("Submission {} vanished", latest.id))
        })
    }

    /// Administrative cancellation, valid at any time. Terminal for the pair:
    /// later attempts by the same student are canceled on arrival.
    pub async fn admin_cancel(
        &self,
        actor: &Actor,
        submission_id: i64,
        reason: &str,
    ) -> Result<Submission, AppError> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden("Only admins can cancel submissions".to_string()));
        }
        let reason = sanitize_reason(reason);
        let now = self.clock.now();

        let submission = self
            .store
            .cancel_submission(submission_id, &reason, now)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {} not found", submission_id)))?;
        self.store
            .record_disqualification(submission.exam_id, submission.student_id, &reason, now)
            .await?;

        tracing::info!("Submission {} canceled by admin {}", submission_id, actor.id);
        Ok(submission)
    }

    pub async fn list_submissions(
        &self,
        actor: &Actor,
        exam_id: i64,
    ) -> Result<Vec<Submission>, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_staff(actor, &exam)?;
        self.store.list_submissions(exam_id).await
    }

    pub async fn exam_stats(&self, actor: &Actor, exam_id: i64) -> Result<ExamStats, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_staff(actor, &exam)?;

        let mut stats = ExamStats {
            exam_id,
            status: exam.status,
            total: 0,
            completed: 0,
            pending_review: 0,
            canceled: 0,
        };
        for submission in self.store.list_submissions(exam_id).await? {
            stats.total += 1;
            match submission.status {
                SubmissionStatus::Completed => stats.completed += 1,
                SubmissionStatus::PendingReview => stats.pending_review += 1,
                SubmissionStatus::Canceled => stats.canceled += 1,
            }
        }
        Ok(stats)
    }

    /// A student's own attempt. Marks are withheld until the exam is COMPLETED.
    pub async fn my_result(&self, actor: &Actor, exam_id: i64) -> Result<StudentResult, AppError> {
        if !actor.is_student() {
            return Err(AppError::Forbidden("Only students have results".to_string()));
        }
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        let history = self.store.list_student_submissions(exam_id, actor.id).await?;

        let current = history
            .iter()
            .rev()
            .find(|s| !s.is_canceled())
            .or_else(|| history.last())
            .ok_or_else(|| {
                AppError::NotFound(format!("No submission for exam {}", exam_id))
            })?;

        let visible = exam.status == ExamStatus::Completed;
        Ok(StudentResult {
            submission_id: current.id,
            status: current.status,
            cancel_reason: current.cancel_reason.clone(),
            total_marks: visible.then_some(current.total_marks),
            answers: visible.then(|| current.answers.clone()),
        })
    }
}

fn sanitize_reason(reason: &str) -> String {
    let cleaned = clean_text(reason);
    if cleaned.is_empty() { DEFAULT_REASON.to_string() } else { cleaned }
}

/// Checks the answer set against the exam's questions and scores it.
/// Records come back in question order.
fn grade(
    questions: &[Question],
    answers: Vec<SubmittedAnswer>,
) -> Result<Vec<AnswerRecord>, AppError> {
    if answers.len() != questions.len() {
        return Err(AppError::ValidationError(format!(
            "Expected {} answers, got {}",
            questions.len(),
            answers.len()
        )));
    }

    let mut by_question: HashMap<i64, SubmittedAnswer> = HashMap::with_capacity(answers.len());
    for answer in answers {
        let question_id = answer.question_id;
        if by_question.insert(question_id, answer).is_some() {
            return Err(AppError::ValidationError(format!(
                "Question {} answered more than once",
                question_id
            )));
        }
    }

    questions
        .iter()
        .map(|question| {
            let submitted = by_question.remove(&question.id).ok_or_else(|| {
                AppError::ValidationError(format!("Missing answer for question {}", question.id))
            })?;
            if submitted.answer.question_type() != question.question_type() {
                return Err(AppError::ValidationError(format!(
                    "Question {} expects a {:?} answer",
                    question.id,
                    question.question_type()
                )));
            }
            // FREE_TEXT stays at 0 until a reviewer marks it.
            let marks_obtained = match question.question_type() {
                QuestionType::FreeText => 0,
                _ => scoring::score(question, &submitted.answer),
            };
            Ok(AnswerRecord { question_id: question.id, marks_obtained, answer: submitted.answer })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        question::{AnswerKey, ChoiceOption},
        submission::AnswerValue,
    };

    fn questions() -> Vec<Question> {
        vec![
            Question {
                id: 1,
                exam_id: 1,
                content: "Pick B".to_string(),
                key: AnswerKey::Choice {
                    options: vec![
                        ChoiceOption { text: "A".to_string(), is_correct: false },
                        ChoiceOption { text: "B".to_string(), is_correct: true },
                    ],
                },
                marks: 10,
            },
            Question {
                id: 2,
                exam_id: 1,
                content: "Water is wet".to_string(),
                key: AnswerKey::Boolean { correct_answer: "true".to_string() },
                marks: 2,
            },
        ]
    }

    fn answer(question_id: i64, answer: AnswerValue) -> SubmittedAnswer {
        SubmittedAnswer { question_id, answer }
    }

    #[test]
    fn test_grade_scores_in_question_order() {
        let records = grade(
            &questions(),
            vec![
                answer(2, AnswerValue::Boolean(true)),
                answer(1, AnswerValue::Choice("A".to_string())),
            ],
        )
        .unwrap();

        assert_eq!(records[0].question_id, 1);
        assert_eq!(records[0].marks_obtained, 0);
        assert_eq!(records[1].question_id, 2);
        assert_eq!(records[1].marks_obtained, 2);
    }

    #[test]
    fn test_grade_rejects_wrong_count() {
        let result = grade(&questions(), vec![answer(1, AnswerValue::Choice("B".to_string()))]);
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_grade_rejects_duplicates_and_unknown_ids() {
        let duplicate = grade(
            &questions(),
            vec![
                answer(1, AnswerValue::Choice("B".to_string())),
                answer(1, AnswerValue::Choice("B".to_string())),
            ],
        );
        assert!(matches!(duplicate, Err(AppError::ValidationError(_))));

        let unknown = grade(
            &questions(),
            vec![
                answer(1, AnswerValue::Choice("B".to_string())),
                answer(99, AnswerValue::Boolean(true)),
            ],
        );
        assert!(matches!(unknown, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_grade_rejects_type_mismatch() {
        let result = grade(
            &questions(),
            vec![
                answer(1, AnswerValue::FreeText("B".to_string())),
                answer(2, AnswerValue::Boolean(true)),
            ],
        );
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_sanitize_reason_falls_back() {
        assert_eq!(sanitize_reason("<i></i>"), DEFAULT_REASON);
        assert_eq!(sanitize_reason("tab <b>switch</b>"), "tab switch");
    }
}
