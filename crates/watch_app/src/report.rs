use chrono::{DateTime, Utc};
use serde::Serialize;
use watch_core::{CycleOutcome, SnapshotSummary};
use watch_engine::BatchSummary;

/// JSON document printed after a batch run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BatchSummary,
    pub outcomes: Vec<CycleOutcome>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcomes: Vec<CycleOutcome>,
    ) -> Self {
        Self {
            started_at,
            finished_at,
            summary: BatchSummary::of(&outcomes),
            outcomes,
        }
    }
}

/// Stored state of one target, printed by `show`.
#[derive(Debug, Serialize)]
pub struct TargetState {
    pub target_id: String,
    pub locator: String,
    pub current: Option<SnapshotSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub history: Vec<SnapshotSummary>,
}
