// src/engine/monitor.rs

//! Server-side proctoring: aggregates client-reported violations per
//! (exam, student) and escalates warnings into disqualification.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    config::{Config, DEFAULT_MAX_WARNINGS, DEFAULT_VIOLATION_WINDOW_SECS, DEFAULT_WARN_THRESHOLD},
    engine::{
        ledger::SubmissionLedger,
        lifecycle::{load_exam, require_admission_open, require_eligible_student, require_staff},
    },
    error::AppError,
    models::{
        integrity::{Escalation, IntegrityEvent, ViolationKind},
        user::Actor,
    },
    store::Store,
    utils::clock::Clock,
};

const SHARD_COUNT: usize = 16;

/// How far ahead of the server clock a client timestamp may be.
const MAX_CLOCK_SKEW_SECS: i64 = 30;

type PairKey = (i64, i64);

#[derive(Debug, Clone, Copy)]
pub struct MonitorPolicy {
    pub window: TimeDelta,
    pub warn_threshold: usize,
    pub max_warnings: u32,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            window: TimeDelta::seconds(DEFAULT_VIOLATION_WINDOW_SECS),
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            max_warnings: DEFAULT_MAX_WARNINGS,
        }
    }
}

impl From<&Config> for MonitorPolicy {
    fn from(config: &Config) -> Self {
        Self {
            window: TimeDelta::seconds(config.violation_window_secs.max(1)),
            warn_threshold: config.warn_threshold.max(1),
            max_warnings: config.max_warnings.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Quiet,
    Warn(u32),
    Disqualify(u32),
    AlreadyFinal,
}

#[derive(Debug, Default)]
struct ViolationState {
    /// Uncounted event times inside the window, sorted by event time.
    recent: Vec<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    warnings: u32,
    finalized: bool,
}

impl ViolationState {
    fn observe(&mut self, at: DateTime<Utc>, policy: &MonitorPolicy) -> Verdict {
        if self.finalized {
            return Verdict::AlreadyFinal;
        }

        let pos = self.recent.partition_point(|t| *t <= at);
        self.recent.insert(pos, at);

        let latest = self.latest.map_or(at, |l| l.max(at));
        self.latest = Some(latest);
        let horizon = latest - policy.window;
        self.recent.retain(|t| *t > horizon);

        let mut warned = false;
        if self.recent.len() >= policy.warn_threshold {
            self.warnings += 1;
            self.recent.clear();
            warned = true;
        }

        if self.warnings >= policy.max_warnings {
            self.finalized = true;
            Verdict::Disqualify(self.warnings)
        } else if warned {
            Verdict::Warn(self.warnings)
        } else {
            Verdict::Quiet
        }
    }
}

pub struct IntegrityMonitor {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ledger: Arc<SubmissionLedger>,
    policy: MonitorPolicy,
    shards: Vec<Mutex<HashMap<PairKey, ViolationState>>>,
}

impl IntegrityMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        ledger: Arc<SubmissionLedger>,
        policy: MonitorPolicy,
    ) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { store, clock, ledger, policy, shards }
    }

    fn shard_index(key: &PairKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }

    fn lock_shard(
        &self,
        index: usize,
    ) -> Result<MutexGuard<'_, HashMap<PairKey, ViolationState>>, AppError> {
        self.shards[index]
            .lock()
            .map_err(|_| AppError::InternalServerError("monitor shard lock poisoned".to_string()))
    }

    /// Records a violation reported by the student's own client.
    ///
    /// `occurred_at` must lie between the exam start and the server clock
    /// (plus a small skew); anything else is rejected before it is stored.
    pub async fn report_violation(
        &self,
        actor: &Actor,
        exam_id: i64,
        kind: ViolationKind,
        occurred_at: DateTime<Utc>,
    ) -> Result<Escalation, AppError> {
        if !actor.is_student() {
            return Err(AppError::Forbidden("Only students report violations".to_string()));
        }
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        let now = self.clock.now();
        require_admission_open(&exam, now)?;
        require_eligible_student(actor, &exam)?;
        let latest_allowed = now + TimeDelta::seconds(MAX_CLOCK_SKEW_SECS);
        if occurred_at < exam.start_time || occurred_at > latest_allowed {
            return Err(AppError::ValidationError(format!(
                "Violation time {} is outside exam {} (started {}, server time {})",
                occurred_at, exam.id, exam.start_time, now
            )));
        }

        self.store
            .append_integrity_event(IntegrityEvent {
                exam_id,
                student_id: actor.id,
                kind,
                occurred_at,
                received_at: now,
            })
            .await?;

        self.ingest(exam_id, actor.id, kind, occurred_at).await
    }

    async fn ingest(
        &self,
        exam_id: i64,
        student_id: i64,
        kind: ViolationKind,
        occurred_at: DateTime<Utc>,
    ) -> Result<Escalation, AppError> {
        let key = (exam_id, student_id);
        let index = Self::shard_index(&key);
        let verdict = {
            let mut shard = self.lock_shard(index)?;
            shard.entry(key).or_default().observe(occurred_at, &self.policy)
        };

        match verdict {
            Verdict::Quiet => Ok(Escalation::None),
            Verdict::Warn(warnings) => {
                tracing::warn!(
                    "Integrity warning {}/{} for student {} in exam {} ({})",
                    warnings,
                    self.policy.max_warnings,
                    student_id,
                    exam_id,
                    kind.as_str()
                );
                Ok(Escalation::Warn { warnings })
            }
            Verdict::AlreadyFinal => Ok(Escalation::Disqualified),
            Verdict::Disqualify(warnings) => {
                let reason = format!(
                    "Disqualified after {} integrity warnings (last violation: {})",
                    warnings,
                    kind.as_str()
                );
                match self.ledger.disqualify_unchecked(exam_id, student_id, &reason).await {
                    Ok(_) => Ok(Escalation::Disqualified),
                    Err(e) => {
                        // Let the next event retry the disqualification.
                        self.release(key, index);
                        Err(e)
                    }
                }
            }
        }
    }

    fn release(&self, key: PairKey, index: usize) {
        if let Ok(mut shard) = self.lock_shard(index) {
            if let Some(state) = shard.get_mut(&key) {
                state.finalized = false;
            }
        }
    }

    /// Current warning count of a pair, if it has reported anything.
    pub fn warnings(&self, exam_id: i64, student_id: i64) -> Option<u32> {
        let key = (exam_id, student_id);
        let shard = self.lock_shard(Self::shard_index(&key)).ok()?;
        shard.get(&key).map(|state| state.warnings)
    }

    /// Exams that currently hold monitor state.
    pub fn tracked_exams(&self) -> Vec<i64> {
        let mut exams = Vec::new();
        for shard in &self.shards {
            if let Ok(shard) = shard.lock() {
                exams.extend(shard.keys().map(|(exam_id, _)| *exam_id));
            }
        }
        exams.sort_unstable();
        exams.dedup();
        exams
    }

    /// Drops all state of an exam. Returns how many pairs were discarded.
    pub fn purge_exam(&self, exam_id: i64) -> usize {
        let mut purged = 0;
        for shard in &self.shards {
            if let Ok(mut shard) = shard.lock() {
                let before = shard.len();
                shard.retain(|(exam, _), _| *exam != exam_id);
                purged += before - shard.len();
            }
        }
        purged
    }

    /// Persisted events of a pair, for the exam's staff.
    pub async fn integrity_log(
        &self,
        actor: &Actor,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<IntegrityEvent>, AppError> {
        let exam = load_exam(self.store.as_ref(), exam_id).await?;
        require_staff(actor, &exam)?;
        self.store.list_integrity_events(exam_id, student_id).await
    }
}
