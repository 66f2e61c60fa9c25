// src/models/integrity.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-reported proctoring violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TabChange,
    LostFocus,
    DevTools,
    CopyPaste,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::TabChange => "tab_change",
            ViolationKind::LostFocus => "lost_focus",
            ViolationKind::DevTools => "dev_tools",
            ViolationKind::CopyPaste => "copy_paste",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "tab_change" => Some(ViolationKind::TabChange),
            "lost_focus" => Some(ViolationKind::LostFocus),
            "dev_tools" => Some(ViolationKind::DevTools),
            "copy_paste" => Some(ViolationKind::CopyPaste),
            _ => None,
        }
    }
}

/// Append-only audit record of one violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityEvent {
    pub exam_id: i64,
    pub student_id: i64,
    pub kind: ViolationKind,
    /// As reported by the client. Not assumed monotonic.
    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// DTO for reporting a violation.
#[derive(Debug, Deserialize, Serialize)]
pub struct ReportViolationRequest {
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of feeding one event to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Escalation {
    None,
    Warn { warnings: u32 },
    Disqualified,
}
