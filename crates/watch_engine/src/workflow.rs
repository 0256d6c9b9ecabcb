use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use watch_core::{
    update, CycleOutcome, CycleSettings, CycleState, CycleStatus, Effect, FetchError,
    FetchFailure, Msg, NotifyError, NotifyFailure, StoreError, Target,
};
use watch_logging::{cycle_debug, cycle_error, cycle_info, cycle_warn};

use crate::draft::Drafter;
use crate::fetch::Fetcher;
use crate::notify::Notifier;
use crate::store::SnapshotStore;

/// External collaborators a cycle talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub drafter: Arc<dyn Drafter>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn SnapshotStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub fetch: Duration,
    pub notify: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(20),
            notify: Duration::from_secs(10),
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Drives the pure cycle machine, answering each effect with IO.
pub struct WorkflowEngine {
    collaborators: Collaborators,
    settings: Arc<CycleSettings>,
    timeouts: Timeouts,
    clock: Clock,
}

impl WorkflowEngine {
    pub fn new(collaborators: Collaborators, settings: Arc<CycleSettings>, timeouts: Timeouts) -> Self {
        Self {
            collaborators,
            settings,
            timeouts,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the capture-time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run one full cycle for `target`. Never panics on collaborator failure; every
    /// failure becomes an ERROR outcome.
    pub async fn run_cycle(&self, target: &Target, cancel: &CancellationToken) -> CycleOutcome {
        let state = CycleState::new(target.clone(), self.settings.clone());
        let (mut state, mut effects) = update(state, Msg::Start);

        while !state.is_finished() {
            if cancel.is_cancelled() {
                (state, effects) = update(state, Msg::Cancelled);
                continue;
            }
            let Some(effect) = effects.pop() else {
                break;
            };
            cycle_debug!(target.id, "phase {:?}", state.phase());
            let msg = self.execute(target, effect, cancel).await;
            (state, effects) = update(state, msg);
        }

        let outcome = state.into_outcome();
        log_outcome(&outcome);
        outcome
    }

    async fn execute(&self, target: &Target, effect: Effect, cancel: &CancellationToken) -> Msg {
        match effect {
            Effect::Fetch { locator } => {
                let fetch = tokio::time::timeout(
                    self.timeouts.fetch,
                    self.collaborators.fetcher.fetch(&locator),
                );
                let result = tokio::select! {
                    _ = cancel.cancelled() => return Msg::Cancelled,
                    result = fetch => result.unwrap_or_else(|_| {
                        Err(FetchError::new(
                            FetchFailure::Timeout,
                            format!("no response within {:?}", self.timeouts.fetch),
                        ))
                    }),
                };
                if let Err(err) = &result {
                    cycle_warn!(target.id, "fetch of {} failed: {}", locator, err);
                }
                Msg::FetchCompleted {
                    result,
                    fetched_at: (self.clock)(),
                }
            }
            Effect::ReadSnapshot { target_id } => {
                Msg::SnapshotLoaded(self.collaborators.store.get_current(&target_id))
            }
            Effect::Draft { segments } => {
                let result = tokio::select! {
                    _ = cancel.cancelled() => return Msg::Cancelled,
                    result = self.collaborators.drafter.draft(&segments, target) => result,
                };
                if let Err(err) = &result {
                    cycle_warn!(target.id, "{}; using the bullet brief", err);
                }
                Msg::DraftCompleted(result)
            }
            Effect::Notify { text } => {
                let notify = tokio::time::timeout(
                    self.timeouts.notify,
                    self.collaborators.notifier.notify(&text, target),
                );
                let result = tokio::select! {
                    _ = cancel.cancelled() => return Msg::Cancelled,
                    result = notify => result.unwrap_or_else(|_| {
                        Err(NotifyError::new(
                            NotifyFailure::Timeout,
                            format!("no acknowledgement within {:?}", self.timeouts.notify),
                        ))
                    }),
                };
                match &result {
                    Ok(ack) => cycle_info!(target.id, "notification delivered ({:?})", ack.message_id),
                    Err(err) => cycle_error!(target.id, "{}", err),
                }
                Msg::NotifyCompleted(result)
            }
            Effect::Commit {
                candidate,
                expected_prior_version,
            } => {
                let target_id = candidate.target_id.clone();
                let result = self.collaborators.store.commit_if_newer(
                    &target_id,
                    candidate,
                    expected_prior_version,
                );
                if let Err(StoreError::Conflict(conflict)) = &result {
                    cycle_warn!(target.id, "{}", conflict);
                }
                Msg::CommitCompleted(result)
            }
        }
    }
}

pub(crate) fn log_outcome(outcome: &CycleOutcome) {
    match (&outcome.status, &outcome.error) {
        (CycleStatus::Error, Some(err)) => {
            cycle_error!(outcome.target_id, "cycle failed: {}", err)
        }
        (CycleStatus::Changed, _) => cycle_info!(
            outcome.target_id,
            "changed: {} segment(s), version {:?}",
            outcome.segments.len(),
            outcome.snapshot_version
        ),
        (status, _) => cycle_info!(
            outcome.target_id,
            "{:?}, version {:?}",
            status,
            outcome.snapshot_version
        ),
    }
}
