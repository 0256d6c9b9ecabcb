use chrono::{DateTime, Utc};

use crate::types::{
    DeliveryAck, DraftError, FetchError, FetchedPage, NotifyError, Snapshot, StoreError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Begin the cycle.
    Start,
    /// The fetch transport returned.
    FetchCompleted {
        result: Result<FetchedPage, FetchError>,
        fetched_at: DateTime<Utc>,
    },
    /// Current snapshot read from the store.
    SnapshotLoaded(Result<Option<Snapshot>, StoreError>),
    /// The drafter returned.
    DraftCompleted(Result<String, DraftError>),
    /// The notification channel returned.
    NotifyCompleted(Result<DeliveryAck, NotifyError>),
    /// Compare-and-swap commit returned.
    CommitCompleted(Result<Snapshot, StoreError>),
    /// Cooperative cancellation observed at a phase boundary.
    Cancelled,
}
