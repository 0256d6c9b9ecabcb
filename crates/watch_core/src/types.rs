use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Highest relevance a segment can carry. First sight of a target scores this.
pub const MAX_RELEVANCE: u8 = 100;

/// Upper bound on the characters kept in one [`ChangeSegment::excerpt`].
pub const MAX_EXCERPT_CHARS: usize = 480;

/// Upper bound on the characters of a drafted message.
pub const DRAFT_MAX_CHARS: usize = 1200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Neutral,
    Challenger,
    Friendly,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::Neutral => write!(f, "neutral"),
            Tone::Challenger => write!(f, "challenger"),
            Tone::Friendly => write!(f, "friendly"),
        }
    }
}

/// A monitored page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub locator: String,
    /// CSS selector restricting the watched part of the page.
    #[serde(default)]
    pub extraction: Option<String>,
    /// Extra relevance keywords on top of the global list.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tone: Tone,
}

impl Target {
    pub fn new(id: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            extraction: None,
            keywords: Vec::new(),
            tone: Tone::default(),
        }
    }
}

/// Last committed state of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub target_id: String,
    pub normalized_text: String,
    pub fingerprint: Fingerprint,
    pub captured_at: DateTime<Utc>,
    pub version: u64,
}

/// Audit entry for a replaced snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub fingerprint: Fingerprint,
    pub captured_at: DateTime<Utc>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            version: snapshot.version,
            fingerprint: snapshot.fingerprint,
            captured_at: snapshot.captured_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Removed => write!(f, "removed"),
            ChangeKind::Modified => write!(f, "modified"),
        }
    }
}

/// One ranked unit of textual difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSegment {
    pub kind: ChangeKind,
    pub excerpt: String,
    /// 0..=[`MAX_RELEVANCE`]; only meaningful for ranking.
    pub relevance_score: u8,
    /// Block index in the document the segment was taken from.
    pub position: usize,
    /// Configured keywords found in the segment text.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Low,
    Medium,
    High,
}

impl Significance {
    /// High when any segment hit a keyword, medium for two or more segments.
    pub fn assess(segments: &[ChangeSegment]) -> Self {
        if segments.iter().any(|s| !s.keywords.is_empty()) {
            Significance::High
        } else if segments.len() >= 2 {
            Significance::Medium
        } else {
            Significance::Low
        }
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Significance::Low => write!(f, "low"),
            Significance::Medium => write!(f, "medium"),
            Significance::High => write!(f, "high"),
        }
    }
}

/// Raw page handed back by a fetch transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub final_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchFailure,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether an immediate re-attempt can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            FetchFailure::Timeout | FetchFailure::Network => true,
            FetchFailure::HttpStatus(code) => code == 429 || (500..=599).contains(&code),
            FetchFailure::InvalidUrl
            | FetchFailure::RedirectLimitExceeded
            | FetchFailure::TooLarge { .. }
            | FetchFailure::UnsupportedContentType { .. }
            | FetchFailure::Disallowed => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    /// robots.txt forbids this path for our user agent.
    Disallowed,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::InvalidUrl => write!(f, "invalid url"),
            FetchFailure::HttpStatus(code) => write!(f, "http status {code}"),
            FetchFailure::Timeout => write!(f, "timeout"),
            FetchFailure::Network => write!(f, "network error"),
            FetchFailure::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FetchFailure::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FetchFailure::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FetchFailure::Disallowed => write!(f, "disallowed by robots.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("draft failed: {message}")]
pub struct DraftError {
    pub message: String,
}

impl DraftError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification failed ({kind}): {message}")]
pub struct NotifyError {
    pub kind: NotifyFailure,
    pub message: String,
}

impl NotifyError {
    pub fn new(kind: NotifyFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyFailure {
    Timeout,
    HttpStatus(u16),
    Network,
}

impl fmt::Display for NotifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyFailure::Timeout => write!(f, "timeout"),
            NotifyFailure::HttpStatus(code) => write!(f, "http status {code}"),
            NotifyFailure::Network => write!(f, "network error"),
        }
    }
}

/// Acknowledgement returned by a notification channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryAck {
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("version conflict for {target_id}: expected {expected}, found {actual}")]
pub struct ConflictError {
    pub target_id: String,
    pub expected: u64,
    pub actual: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("invalid candidate for {target_id}: {reason}")]
    InvalidCandidate { target_id: String, reason: String },
    #[error("snapshot storage failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    NoChange,
    Changed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fetch,
    MalformedInput,
    Conflict,
    Notify,
    Store,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CycleError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result of one cycle for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub target_id: String,
    pub status: CycleStatus,
    pub snapshot_version: Option<u64>,
    pub segments: Vec<ChangeSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CycleError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significance: Option<Significance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
}

impl CycleOutcome {
    pub fn failed(target_id: impl Into<String>, error: CycleError) -> Self {
        Self {
            target_id: target_id.into(),
            status: CycleStatus::Error,
            snapshot_version: None,
            segments: Vec::new(),
            error: Some(error),
            significance: None,
            draft: None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
