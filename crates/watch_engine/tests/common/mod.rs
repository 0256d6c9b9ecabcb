#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use watch_core::{
    ChangeSegment, CycleSettings, DeliveryAck, DraftError, FetchError, FetchFailure, FetchedPage,
    NotifyError, NotifyFailure, Target,
};
use watch_engine::{
    BulletDrafter, Clock, Collaborators, Drafter, Fetcher, MemorySnapshotStore, Notifier,
    SnapshotStore,
};

pub fn page(text: &str) -> FetchedPage {
    FetchedPage {
        body: text.as_bytes().to_vec(),
        content_type: Some("text/plain; charset=utf-8".to_string()),
        final_url: "https://example.test/".to_string(),
    }
}

pub fn timeout() -> FetchError {
    FetchError::new(FetchFailure::Timeout, "timed out")
}

pub fn fixed_clock() -> Clock {
    Arc::new(|| Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap())
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Answers fetches from a per-locator script; the last entry repeats.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<FetchedPage, FetchError>>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(
        self,
        locator: &str,
        responses: Vec<Result<FetchedPage, FetchError>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(locator.to_string(), responses.into());
        self
    }

    pub fn set(&self, locator: &str, response: Result<FetchedPage, FetchError>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(locator.to_string(), VecDeque::from(vec![response]));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, locator: &str) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(locator)
            .unwrap_or_else(|| panic!("no script for {locator}"));
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// Fetcher that panics, to exercise task isolation.
pub struct PanickingFetcher;

#[async_trait]
impl Fetcher for PanickingFetcher {
    async fn fetch(&self, locator: &str) -> Result<FetchedPage, FetchError> {
        panic!("fetcher exploded on {locator}");
    }
}

/// Routes by locator prefix to one of two fetchers.
pub struct SplitFetcher {
    pub prefix: String,
    pub matched: Arc<dyn Fetcher>,
    pub rest: Arc<dyn Fetcher>,
}

#[async_trait]
impl Fetcher for SplitFetcher {
    async fn fetch(&self, locator: &str) -> Result<FetchedPage, FetchError> {
        if locator.starts_with(&self.prefix) {
            self.matched.fetch(locator).await
        } else {
            self.rest.fetch(locator).await
        }
    }
}

#[derive(Default)]
pub struct RecordingDrafter {
    pub inputs: Mutex<Vec<Vec<ChangeSegment>>>,
    pub fail: bool,
    pub padding: usize,
}

#[async_trait]
impl Drafter for RecordingDrafter {
    async fn draft(
        &self,
        segments: &[ChangeSegment],
        target: &Target,
    ) -> Result<String, DraftError> {
        assert!(!segments.is_empty(), "drafter called with no segments");
        self.inputs.lock().unwrap().push(segments.to_vec());
        if self.fail {
            return Err(DraftError::new("model unavailable"));
        }
        let mut text = BulletDrafter::new(usize::MAX)
            .draft(segments, target)
            .await?;
        for i in 0..self.padding {
            text.push_str(&format!("\npadding line {i:04} with some filler words"));
        }
        Ok(text)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str, _target: &Target) -> Result<DeliveryAck, NotifyError> {
        self.sent.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(NotifyError::new(NotifyFailure::HttpStatus(503), "unavailable"));
        }
        Ok(DeliveryAck {
            message_id: Some(format!("msg-{}", self.sent.lock().unwrap().len())),
        })
    }
}

pub struct Harness {
    pub fetcher: Arc<ScriptedFetcher>,
    pub drafter: Arc<RecordingDrafter>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemorySnapshotStore>,
}

impl Harness {
    pub fn new(fetcher: ScriptedFetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            drafter: Arc::new(RecordingDrafter::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            store: Arc::new(MemorySnapshotStore::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            fetcher: self.fetcher.clone(),
            drafter: self.drafter.clone(),
            notifier: self.notifier.clone(),
            store: self.store.clone(),
        }
    }

    pub fn current_version(&self, target_id: &str) -> Option<u64> {
        self.store
            .get_current(target_id)
            .unwrap()
            .map(|snapshot| snapshot.version)
    }
}

pub fn settings() -> Arc<CycleSettings> {
    Arc::new(CycleSettings::default())
}
