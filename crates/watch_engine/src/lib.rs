//! Page-watch engine: fetch transport, snapshot storage, drafting and notification
//! collaborators, and the drivers that run cycles against them.
mod config;
mod draft;
mod fetch;
mod filename;
mod notify;
mod orchestrator;
mod persist;
mod robots;
mod store;
mod workflow;

pub use config::{ConfigurationError, WatchConfig, WEBHOOK_URL_ENV};
pub use draft::{BulletDrafter, Drafter};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use filename::snapshot_filename;
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use orchestrator::{
    BatchSummary, LockScope, Orchestrator, OrchestratorOptions, RetryingFetcher,
};
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, DEFAULT_HISTORY_LIMIT};
pub use workflow::{Clock, Collaborators, Timeouts, WorkflowEngine};
