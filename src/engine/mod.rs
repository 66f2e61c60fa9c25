// src/engine/mod.rs

//! The exam core. Each component owns one piece of state and shares the
//! same store and clock.

pub mod ledger;
pub mod lifecycle;
pub mod monitor;
pub mod review;
pub mod scoring;
pub mod sweeper;

use std::sync::Arc;

pub use ledger::SubmissionLedger;
pub use lifecycle::{ExamLifecycle, Transition};
pub use monitor::{IntegrityMonitor, MonitorPolicy};
pub use review::ReviewWorkflow;
pub use sweeper::{SweepReport, spawn_sweeper};

use crate::{store::Store, utils::clock::Clock};

pub struct ExamEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn Clock>,
    pub lifecycle: ExamLifecycle,
    pub ledger: Arc<SubmissionLedger>,
    pub review: ReviewWorkflow,
    pub monitor: IntegrityMonitor,
}

impl ExamEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: MonitorPolicy) -> Self {
        let ledger = Arc::new(SubmissionLedger::new(store.clone(), clock.clone()));
        Self {
            lifecycle: ExamLifecycle::new(store.clone(), clock.clone()),
            review: ReviewWorkflow::new(store.clone(), clock.clone()),
            monitor: IntegrityMonitor::new(store.clone(), clock.clone(), ledger.clone(), policy),
            ledger,
            store,
            clock,
        }
    }
}
