use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use watch_core::{
    CycleError, CycleOutcome, CycleSettings, CycleStatus, ErrorKind, FetchError, FetchFailure,
    FetchedPage, Target,
};
use watch_logging::{watch_info, watch_warn};

use crate::fetch::Fetcher;
use crate::workflow::{log_outcome, Collaborators, Timeouts, WorkflowEngine};

/// What two cycles must share to be serialized against each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    #[default]
    TargetId,
    Locator,
}

impl LockScope {
    fn key(self, target: &Target) -> String {
        match self {
            LockScope::TargetId => target.id.clone(),
            LockScope::Locator => target.locator.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub workers: usize,
    pub fetch_retries: u32,
    pub lock_scope: LockScope,
    /// Per-attempt fetch timeout and notification timeout.
    pub timeouts: Timeouts,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            fetch_retries: 2,
            lock_scope: LockScope::default(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Re-attempts transient fetch failures immediately, each attempt under its own timeout.
pub struct RetryingFetcher {
    inner: Arc<dyn Fetcher>,
    retries: u32,
    attempt_timeout: Duration,
}

impl RetryingFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            inner,
            retries,
            attempt_timeout,
        }
    }
}

#[async_trait]
impl Fetcher for RetryingFetcher {
    async fn fetch(&self, locator: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.attempt_timeout, self.inner.fetch(locator))
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::new(
                        FetchFailure::Timeout,
                        format!("no response within {:?}", self.attempt_timeout),
                    ))
                });
            match result {
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    watch_warn!(
                        "fetch of {} failed ({}); retry {}/{}",
                        locator,
                        err,
                        attempt,
                        self.retries
                    );
                }
                other => return other,
            }
        }
    }
}

/// Aggregate of one batch, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub no_change: usize,
    pub changed: usize,
    pub errors: usize,
}

impl BatchSummary {
    pub fn of(outcomes: &[CycleOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut acc, outcome| {
            match outcome.status {
                CycleStatus::NoChange => acc.no_change += 1,
                CycleStatus::Changed => acc.changed += 1,
                CycleStatus::Error => acc.errors += 1,
            }
            acc
        })
    }
}

type LockTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Runs cycles for many targets on a bounded pool of workers.
pub struct Orchestrator {
    engine: Arc<WorkflowEngine>,
    workers: usize,
    lock_scope: LockScope,
    locks: LockTable,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        settings: Arc<CycleSettings>,
        options: OrchestratorOptions,
    ) -> Self {
        let fetcher: Arc<dyn Fetcher> = Arc::new(RetryingFetcher::new(
            collaborators.fetcher.clone(),
            options.fetch_retries,
            options.timeouts.fetch,
        ));
        // The cycle-level bound covers every attempt.
        let attempts = options.fetch_retries.saturating_add(1);
        let timeouts = Timeouts {
            fetch: options.timeouts.fetch.saturating_mul(attempts),
            notify: options.timeouts.notify,
        };
        let engine = WorkflowEngine::new(
            Collaborators {
                fetcher,
                ..collaborators
            },
            settings,
            timeouts,
        );
        Self::from_engine(engine, options.workers, options.lock_scope)
    }

    pub fn from_engine(engine: WorkflowEngine, workers: usize, lock_scope: LockScope) -> Self {
        Self {
            engine: Arc::new(engine),
            workers: workers.max(1),
            lock_scope,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, target: &Target) -> Arc<tokio::sync::Mutex<()>> {
        let key = self.lock_scope.key(target);
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(key).or_default().clone()
    }

    /// One cycle for one target, serialized against other cycles of the same target.
    pub async fn run_target(&self, target: &Target, cancel: &CancellationToken) -> CycleOutcome {
        let lock = self.lock_for(target);
        let _token = lock.lock().await;
        self.engine.run_cycle(target, cancel).await
    }

    /// One cycle per target; outcomes come back in the order of `targets`.
    pub async fn run_batch(&self, targets: &[Target], cancel: &CancellationToken) -> Vec<CycleOutcome> {
        watch_info!(
            "starting batch of {} target(s) on {} worker(s)",
            targets.len(),
            self.workers
        );
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().enumerate() {
            let engine = self.engine.clone();
            let permits = permits.clone();
            let lock = self.lock_for(target);
            let target = target.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                // Wait for the target's token before taking a worker slot.
                let _token = lock.lock_owned().await;
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => AssertUnwindSafe(engine.run_cycle(&target, &cancel))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            let outcome = CycleOutcome::failed(
                                target.id.clone(),
                                CycleError::new(ErrorKind::Internal, "cycle task panicked"),
                            );
                            log_outcome(&outcome);
                            outcome
                        }),
                    Err(_) => CycleOutcome::failed(
                        target.id.clone(),
                        CycleError::new(ErrorKind::Internal, "worker pool closed"),
                    ),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<CycleOutcome>> = vec![None; targets.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => watch_warn!("cycle task ended abnormally: {}", err),
            }
        }

        let outcomes: Vec<CycleOutcome> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    let outcome = CycleOutcome::failed(
                        target.id.clone(),
                        CycleError::new(ErrorKind::Internal, "cycle task did not complete"),
                    );
                    log_outcome(&outcome);
                    outcome
                })
            })
            .collect();

        let summary = BatchSummary::of(&outcomes);
        watch_info!(
            "batch finished: {} changed, {} unchanged, {} failed",
            summary.changed,
            summary.no_change,
            summary.errors
        );
        outcomes
    }
}
