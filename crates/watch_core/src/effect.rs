use crate::types::{ChangeSegment, Snapshot};

/// IO requested by the cycle machine; the driver answers each with a [`crate::Msg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch {
        locator: String,
    },
    ReadSnapshot {
        target_id: String,
    },
    /// Never issued with an empty segment list.
    Draft {
        segments: Vec<ChangeSegment>,
    },
    Notify {
        text: String,
    },
    Commit {
        candidate: Snapshot,
        expected_prior_version: u64,
    },
}
