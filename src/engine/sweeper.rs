// src/engine/sweeper.rs

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{engine::ExamEngine, error::AppError};

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    /// Exams moved SUBMITTED -> COMPLETED.
    pub completed: Vec<i64>,
    /// Monitor pairs dropped for exams that are no longer open.
    pub purged: usize,
}

impl ExamEngine {
    /// One pass of periodic housekeeping.
    pub async fn sweep_once(&self) -> Result<SweepReport, AppError> {
        let completed = self.lifecycle.expire_submitted().await?;

        let now = self.clock.now();
        let mut purged = 0;
        for exam_id in self.monitor.tracked_exams() {
            let open = match self.store.get_exam(exam_id).await? {
                Some(exam) => exam.is_admission_open(now),
                None => false,
            };
            if !open {
                purged += self.monitor.purge_exam(exam_id);
            }
        }

        if !completed.is_empty() || purged > 0 {
            tracing::info!(
                "Sweep: completed exams {:?}, purged {} monitor entries",
                completed,
                purged
            );
        }
        Ok(SweepReport { completed, purged })
    }
}

pub fn spawn_sweeper(engine: Arc<ExamEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = engine.sweep_once().await {
                tracing::warn!("Sweep failed: {}", e);
            }
        }
    })
}
