use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::DiffEngine;
use crate::fingerprint::Fingerprint;
use crate::normalize::Normalizer;
use crate::types::{
    ChangeSegment, CycleError, CycleOutcome, CycleStatus, ErrorKind, NotifyError, Significance,
    Target,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Normalizing,
    Comparing,
    Diffing,
    Drafting,
    Notifying,
    Committing,
    NoChange,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::NoChange | Phase::Done | Phase::Error)
    }
}

/// What to do when a target has no snapshot yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstSightPolicy {
    /// Draft and notify like any other change.
    #[default]
    Notify,
    /// Commit the first snapshot without drafting or notifying.
    Seed,
}

/// Settings shared by every cycle of a batch.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub normalizer: Normalizer,
    pub diff: DiffEngine,
    /// Maximum combined excerpt length handed to the drafter.
    pub excerpt_cap: usize,
    pub first_sight: FirstSightPolicy,
    /// Treat every fetch as a change, diffing against nothing.
    pub force_change: bool,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            normalizer: Normalizer::default(),
            diff: DiffEngine::default(),
            excerpt_cap: crate::types::DRAFT_MAX_CHARS,
            first_sight: FirstSightPolicy::default(),
            force_change: false,
        }
    }
}

/// One cycle for one target.
#[derive(Debug)]
pub struct CycleState {
    pub(crate) target: Target,
    pub(crate) settings: Arc<CycleSettings>,
    pub(crate) diff: DiffEngine,
    pub(crate) phase: Phase,
    pub(crate) path: Vec<Phase>,
    pub(crate) captured_at: Option<DateTime<Utc>>,
    pub(crate) normalized: Option<String>,
    pub(crate) fingerprint: Option<Fingerprint>,
    pub(crate) expected_version: u64,
    pub(crate) segments: Vec<ChangeSegment>,
    pub(crate) draft: Option<String>,
    pub(crate) notify_error: Option<NotifyError>,
    pub(crate) commit_attempts: u8,
    pub(crate) outcome: Option<CycleOutcome>,
}

impl CycleState {
    pub fn new(target: Target, settings: Arc<CycleSettings>) -> Self {
        let diff = settings.diff.with_extra_keywords(&target.keywords);
        Self {
            target,
            settings,
            diff,
            phase: Phase::Idle,
            path: vec![Phase::Idle],
            captured_at: None,
            normalized: None,
            fingerprint: None,
            expected_version: 0,
            segments: Vec::new(),
            draft: None,
            notify_error: None,
            commit_attempts: 0,
            outcome: None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, starting with `Idle`.
    pub fn path(&self) -> &[Phase] {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&CycleOutcome> {
        self.outcome.as_ref()
    }

    /// Final outcome; a cycle that never finished is reported as an internal error.
    pub fn into_outcome(self) -> CycleOutcome {
        match self.outcome {
            Some(outcome) => outcome,
            None => CycleOutcome::failed(
                self.target.id,
                CycleError::new(
                    ErrorKind::Internal,
                    format!("cycle stalled in phase {:?}", self.phase),
                ),
            ),
        }
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.path.push(phase);
    }

    pub(crate) fn finish_no_change(&mut self, version: Option<u64>) {
        self.enter(Phase::NoChange);
        self.outcome = Some(CycleOutcome {
            target_id: self.target.id.clone(),
            status: CycleStatus::NoChange,
            snapshot_version: version,
            segments: Vec::new(),
            error: None,
            significance: None,
            draft: None,
        });
    }

    /// Change detected; a notification failure turns the status into ERROR.
    pub(crate) fn finish_changed(&mut self, version: Option<u64>) {
        let (status, error, segments) = match self.notify_error.take() {
            Some(err) => (
                CycleStatus::Error,
                Some(CycleError::new(ErrorKind::Notify, err.to_string())),
                Vec::new(),
            ),
            None => (CycleStatus::Changed, None, std::mem::take(&mut self.segments)),
        };
        let significance = (!segments.is_empty()).then(|| Significance::assess(&segments));
        self.enter(if error.is_some() { Phase::Error } else { Phase::Done });
        self.outcome = Some(CycleOutcome {
            target_id: self.target.id.clone(),
            status,
            snapshot_version: version,
            segments,
            error,
            significance,
            draft: self.draft.take(),
        });
    }

    pub(crate) fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let version = (self.expected_version > 0).then_some(self.expected_version);
        self.enter(Phase::Error);
        let mut outcome =
            CycleOutcome::failed(self.target.id.clone(), CycleError::new(kind, message));
        outcome.snapshot_version = version;
        self.outcome = Some(outcome);
    }
}
