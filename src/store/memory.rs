use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        exam::{Exam, ExamStatus, NewExam},
        integrity::IntegrityEvent,
        question::{NewQuestion, Question},
        submission::{AnswerRecord, NewSubmission, Submission, SubmissionStatus},
    },
    store::Store,
};

#[derive(Default)]
struct MemoryInner {
    exams: HashMap<i64, Exam>,
    questions: HashMap<i64, Question>,
    submissions: HashMap<i64, Submission>,
    disqualified: HashMap<(i64, i64), String>,
    events: Vec<IntegrityEvent>,
    next_exam_id: i64,
    next_question_id: i64,
    next_submission_id: i64,
}

impl MemoryInner {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn push_submission(&mut self, submission: NewSubmission) -> Submission {
        let id = Self::next_id(&mut self.next_submission_id);
        let submission = Submission {
            id,
            exam_id: submission.exam_id,
            student_id: submission.student_id,
            answers: submission.answers,
            total_marks: submission.total_marks,
            status: submission.status,
            cancel_reason: submission.cancel_reason,
            submitted_at: submission.submitted_at,
            updated_at: submission.submitted_at,
        };
        self.submissions.insert(id, submission.clone());
        submission
    }
}

/// Process-local store. One mutex covers every table, so each method is a
/// single atomic step.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, MemoryInner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".to_string()))
    }
}

fn sorted_by_id<T>(mut items: Vec<T>, id: impl Fn(&T) -> i64) -> Vec<T> {
    items.sort_by_key(|item| id(item));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_exam(&self, exam: NewExam, now: DateTime<Utc>) -> Result<Exam, AppError> {
        let mut inner = self.lock_inner()?;
        let id = MemoryInner::next_id(&mut inner.next_exam_id);
        let exam = Exam {
            id,
            title: exam.title,
            status: ExamStatus::Draft,
            start_time: exam.start_time,
            end_time: exam.end_time,
            teacher_id: exam.teacher_id,
            batch: exam.batch,
            total_marks: 0,
            review_notes: None,
            admission_code_hash: exam.admission_code_hash,
            created_at: now,
        };
        inner.exams.insert(id, exam.clone());
        Ok(exam)
    }

    async fn get_exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError> {
        Ok(self.lock_inner()?.exams.get(&exam_id).cloned())
    }

    async fn list_exams_by_status(&self, status: ExamStatus) -> Result<Vec<Exam>, AppError> {
        let inner = self.lock_inner()?;
        let exams = inner.exams.values().filter(|e| e.status == status).cloned().collect();
        Ok(sorted_by_id(exams, |e: &Exam| e.id))
    }

    async fn transition_exam(
        &self,
        exam_id: i64,
        expected: ExamStatus,
        next: ExamStatus,
        review_notes: Option<String>,
    ) -> Result<Option<Exam>, AppError> {
        let mut inner = self.lock_inner()?;
        let Some(exam) = inner.exams.get_mut(&exam_id) else {
            return Ok(None);
        };
        if exam.status != expected {
            return Ok(None);
        }
        exam.status = next;
        if review_notes.is_some() {
            exam.review_notes = review_notes;
        }
        Ok(Some(exam.clone()))
    }

    async fn insert_question(
        &self,
        exam_id: i64,
        question: NewQuestion,
    ) -> Result<Option<Question>, AppError> {
        let mut inner = self.lock_inner()?;
        match inner.exams.get_mut(&exam_id) {
            Some(exam) if exam.status == ExamStatus::Draft => exam.total_marks += question.marks,
            _ => return Ok(None),
        }
        let id = MemoryInner::next_id(&mut inner.next_question_id);
        let question = Question {
            id,
            exam_id,
            content: question.content,
            key: question.key,
            marks: question.marks,
        };
        inner.questions.insert(id, question.clone());
        Ok(Some(question))
    }

    async fn list_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError> {
        let inner = self.lock_inner()?;
        let questions =
            inner.questions.values().filter(|q| q.exam_id == exam_id).cloned().collect();
        Ok(sorted_by_id(questions, |q: &Question| q.id))
    }

    async fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Option<Submission>, AppError> {
        let mut inner = self.lock_inner()?;
        if submission.status != SubmissionStatus::Canceled {
            let taken = inner.submissions.values().any(|s| {
                s.exam_id == submission.exam_id
                    && s.student_id == submission.student_id
                    && !s.is_canceled()
            });
            if taken {
                return Ok(None);
            }
        }
        Ok(Some(inner.push_submission(submission)))
    }

    async fn insert_canceled_placeholder(
        &self,
        submission: NewSubmission,
    ) -> Result<Option<Submission>, AppError> {
        let mut inner = self.lock_inner()?;
        let has_history = inner
            .submissions
            .values()
            .any(|s| s.exam_id == submission.exam_id && s.student_id == submission.student_id);
        if has_history {
            return Ok(None);
        }
        let submission = NewSubmission { status: SubmissionStatus::Canceled, ..submission };
        Ok(Some(inner.push_submission(submission)))
    }

    async fn get_submission(&self, submission_id: i64) -> Result<Option<Submission>, AppError> {
        Ok(self.lock_inner()?.submissions.get(&submission_id).cloned())
    }

    async fn list_student_submissions(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<Submission>, AppError> {
        let inner = self.lock_inner()?;
        let submissions = inner
            .submissions
            .values()
            .filter(|s| s.exam_id == exam_id && s.student_id == student_id)
            .cloned()
            .collect();
        Ok(sorted_by_id(submissions, |s: &Submission| s.id))
    }

    async fn list_submissions(&self, exam_id: i64) -> Result<Vec<Submission>, AppError> {
        let inner = self.lock_inner()?;
        let submissions =
            inner.submissions.values().filter(|s| s.exam_id == exam_id).cloned().collect();
        Ok(sorted_by_id(submissions, |s: &Submission| s.id))
    }

    async fn cancel_active_submissions(
        &self,
        exam_id: i64,
        student_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Submission>, AppError> {
        let mut inner = self.lock_inner()?;
        let mut changed = Vec::new();
        for submission in inner.submissions.values_mut() {
            if submission.exam_id == exam_id
                && submission.student_id == student_id
                && !submission.is_canceled()
            {
                submission.status = SubmissionStatus::Canceled;
                submission.cancel_reason = Some(reason.to_string());
                submission.updated_at = now;
                changed.push(submission.clone());
            }
        }
        Ok(sorted_by_id(changed, |s: &Submission| s.id))
    }

    async fn cancel_submission(
        &self,
        submission_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Submission>, AppError> {
        let mut inner = self.lock_inner()?;
        let Some(submission) = inner.submissions.get_mut(&submission_id) else {
            return Ok(None);
        };
        if !submission.is_canceled() {
            submission.status = SubmissionStatus::Canceled;
            submission.cancel_reason = Some(reason.to_string());
            submission.updated_at = now;
        }
        Ok(Some(submission.clone()))
    }

    async fn update_submission_marks(
        &self,
        submission_id: i64,
        answers: Vec<AnswerRecord>,
        total_marks: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Submission>, AppError> {
        let mut inner = self.lock_inner()?;
        match inner.submissions.get_mut(&submission_id) {
            Some(submission) if !submission.is_canceled() => {
                submission.answers = answers;
                submission.total_marks = total_marks;
                submission.status = SubmissionStatus::Completed;
                submission.updated_at = now;
                Ok(Some(submission.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_disqualification(
        &self,
        exam_id: i64,
        student_id: i64,
        reason: &str,
        _now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock_inner()?;
        inner.disqualified.entry((exam_id, student_id)).or_insert_with(|| reason.to_string());
        Ok(())
    }

    async fn disqualification_reason(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<String>, AppError> {
        Ok(self.lock_inner()?.disqualified.get(&(exam_id, student_id)).cloned())
    }

    async fn append_integrity_event(&self, event: IntegrityEvent) -> Result<(), AppError> {
        self.lock_inner()?.events.push(event);
        Ok(())
    }

    async fn list_integrity_events(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<IntegrityEvent>, AppError> {
        let inner = self.lock_inner()?;
        let mut events: Vec<IntegrityEvent> = inner
            .events
            .iter()
            .filter(|e| e.exam_id == exam_id && e.student_id == student_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    use crate::models::question::AnswerKey;

    fn new_exam(now: DateTime<Utc>) -> NewExam {
        NewExam {
            title: "Midterm".to_string(),
            start_time: now,
            end_time: now + TimeDelta::hours(1),
            teacher_id: 1,
            batch: None,
            admission_code_hash: None,
        }
    }

    fn new_submission(status: SubmissionStatus, now: DateTime<Utc>) -> NewSubmission {
        NewSubmission {
            exam_id: 1,
            student_id: 9,
            answers: Vec::new(),
            total_marks: 0,
            status,
            cancel_reason: None,
            submitted_at: now,
        }
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let exam = store.insert_exam(new_exam(now), now).await.unwrap();

        let stale = store
            .transition_exam(exam.id, ExamStatus::Published, ExamStatus::Completed, None)
            .await
            .unwrap();
        assert!(stale.is_none());

        let moved = store
            .transition_exam(exam.id, ExamStatus::Draft, ExamStatus::Published, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.status, ExamStatus::Published);
    }

    #[tokio::test]
    async fn test_questions_locked_after_publish() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let exam = store.insert_exam(new_exam(now), now).await.unwrap();
        let question = NewQuestion {
            content: "Essay".to_string(),
            key: AnswerKey::FreeText { correct_answer: String::new() },
            marks: 4,
        };

        assert!(store.insert_question(exam.id, question.clone()).await.unwrap().is_some());
        store
            .transition_exam(exam.id, ExamStatus::Draft, ExamStatus::Published, None)
            .await
            .unwrap();
        assert!(store.insert_question(exam.id, question).await.unwrap().is_none());

        let exam = store.get_exam(exam.id).await.unwrap().unwrap();
        assert_eq!(exam.total_marks, 4);
    }

    #[tokio::test]
    async fn test_one_active_submission_per_pair() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let insert = |status| store.insert_submission(new_submission(status, now));

        assert!(insert(SubmissionStatus::Completed).await.unwrap().is_some());
        assert!(insert(SubmissionStatus::PendingReview).await.unwrap().is_none());
        // Canceled rows never collide.
        assert!(insert(SubmissionStatus::Canceled).await.unwrap().is_some());

        let canceled = store.cancel_active_submissions(1, 9, "cheating", now).await.unwrap();
        assert_eq!(canceled.len(), 1);
        assert!(insert(SubmissionStatus::Completed).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_placeholder_only_for_pair_without_history() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let placeholder = || new_submission(SubmissionStatus::Canceled, now);

        assert!(store.insert_canceled_placeholder(placeholder()).await.unwrap().is_some());
        assert!(store.insert_canceled_placeholder(placeholder()).await.unwrap().is_none());
        assert_eq!(store.list_submissions(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_marks_update_refuses_canceled() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let submission = store
            .insert_submission(new_submission(SubmissionStatus::PendingReview, now))
            .await
            .unwrap()
            .unwrap();
        store.cancel_submission(submission.id, "copy paste", now).await.unwrap();

        let updated =
            store.update_submission_marks(submission.id, Vec::new(), 5, now).await.unwrap();
        assert!(updated.is_none());
    }
}
