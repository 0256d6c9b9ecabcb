use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use watch_core::{
    validate_selector, CycleSettings, DiffEngine, FirstSightPolicy, NoiseFilter, Normalizer,
    Target, DEFAULT_KEYWORDS, DRAFT_MAX_CHARS, MAX_EXCERPT_CHARS,
};

use crate::orchestrator::{LockScope, OrchestratorOptions};
use crate::store::DEFAULT_HISTORY_LIMIT;
use crate::workflow::Timeouts;

pub const WEBHOOK_URL_ENV: &str = "PAGE_WATCH_WEBHOOK_URL";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("no targets configured")]
    NoTargets,
    #[error("target #{index} has an empty id")]
    EmptyTargetId { index: usize },
    #[error("target id {0:?} is configured more than once")]
    DuplicateTarget(String),
    #[error("target {id}: invalid locator {locator:?}: {message}")]
    InvalidLocator {
        id: String,
        locator: String,
        message: String,
    },
    #[error("target {id}: invalid extraction selector: {message}")]
    InvalidSelector { id: String, message: String },
    #[error("invalid noise pattern {pattern:?}: {message}")]
    InvalidNoisePattern { pattern: String, message: String },
    #[error("invalid webhook url: {0}")]
    InvalidWebhook(String),
    #[error("workers must be at least 1")]
    ZeroWorkers,
    #[error("excerpt_cap {cap} is below the single-excerpt bound {min}")]
    ExcerptCapTooSmall { cap: usize, min: usize },
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("unknown target {0:?}")]
    UnknownTarget(String),
}

/// Everything a batch run needs, loaded from a RON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub targets: Vec<Target>,
    /// Extra noise regexes, appended to the defaults unless `replace_default_noise`.
    pub noise_patterns: Vec<String>,
    pub replace_default_noise: bool,
    pub keywords: Vec<String>,
    pub excerpt_cap: usize,
    pub strip_boilerplate: bool,
    pub first_sight: FirstSightPolicy,
    pub lock_scope: LockScope,
    pub workers: usize,
    pub fetch_retries: u32,
    pub fetch_timeout_ms: u64,
    pub notify_timeout_ms: u64,
    pub state_dir: PathBuf,
    pub history_limit: usize,
    pub webhook_url: Option<String>,
    /// Skip pages the site's robots.txt forbids.
    pub respect_robots: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            noise_patterns: Vec::new(),
            replace_default_noise: false,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            excerpt_cap: DRAFT_MAX_CHARS,
            strip_boilerplate: true,
            first_sight: FirstSightPolicy::default(),
            lock_scope: LockScope::default(),
            workers: 4,
            fetch_retries: 2,
            fetch_timeout_ms: 20_000,
            notify_timeout_ms: 10_000,
            state_dir: PathBuf::from("page-watch-state"),
            history_limit: DEFAULT_HISTORY_LIMIT,
            webhook_url: None,
            respect_robots: true,
        }
    }
}

impl WatchConfig {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content).map_err(|message| ConfigurationError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn parse(content: &str) -> Result<Self, String> {
        ron::from_str(content).map_err(|err| err.to_string())
    }

    /// Apply environment overrides through `lookup`; an empty value is ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(WEBHOOK_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.webhook_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.targets.is_empty() {
            return Err(ConfigurationError::NoTargets);
        }
        if self.workers == 0 {
            return Err(ConfigurationError::ZeroWorkers);
        }
        if self.excerpt_cap < MAX_EXCERPT_CHARS {
            return Err(ConfigurationError::ExcerptCapTooSmall {
                cap: self.excerpt_cap,
                min: MAX_EXCERPT_CHARS,
            });
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigurationError::ZeroTimeout("fetch_timeout_ms"));
        }
        if self.notify_timeout_ms == 0 {
            return Err(ConfigurationError::ZeroTimeout("notify_timeout_ms"));
        }

        let mut seen = HashSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            if target.id.trim().is_empty() {
                return Err(ConfigurationError::EmptyTargetId { index });
            }
            if !seen.insert(target.id.as_str()) {
                return Err(ConfigurationError::DuplicateTarget(target.id.clone()));
            }
            check_http_url(&target.locator).map_err(|message| {
                ConfigurationError::InvalidLocator {
                    id: target.id.clone(),
                    locator: target.locator.clone(),
                    message,
                }
            })?;
            if let Some(selector) = &target.extraction {
                validate_selector(selector).map_err(|err| ConfigurationError::InvalidSelector {
                    id: target.id.clone(),
                    message: err.to_string(),
                })?;
            }
        }

        for pattern in &self.noise_patterns {
            Regex::new(pattern).map_err(|err| ConfigurationError::InvalidNoisePattern {
                pattern: pattern.clone(),
                message: err.to_string(),
            })?;
        }

        if let Some(url) = &self.webhook_url {
            check_http_url(url).map_err(ConfigurationError::InvalidWebhook)?;
        }
        Ok(())
    }

    /// Targets selected by `only`, in configuration order; every target when `only` is empty.
    pub fn selected_targets(&self, only: &[String]) -> Result<Vec<Target>, ConfigurationError> {
        if let Some(unknown) = only
            .iter()
            .find(|id| !self.targets.iter().any(|t| &t.id == *id))
        {
            return Err(ConfigurationError::UnknownTarget(unknown.clone()));
        }
        Ok(self
            .targets
            .iter()
            .filter(|t| only.is_empty() || only.contains(&t.id))
            .cloned()
            .collect())
    }

    pub fn cycle_settings(&self, force_change: bool) -> Result<CycleSettings, ConfigurationError> {
        let noise = if self.replace_default_noise {
            NoiseFilter::new(&self.noise_patterns)
        } else {
            NoiseFilter::with_extra(&self.noise_patterns)
        }
        .map_err(|err| ConfigurationError::InvalidNoisePattern {
            pattern: self.noise_patterns.join(", "),
            message: err.to_string(),
        })?;

        Ok(CycleSettings {
            normalizer: Normalizer::new(noise, self.strip_boilerplate),
            diff: DiffEngine::new(self.keywords.iter().map(String::as_str)),
            excerpt_cap: self.excerpt_cap,
            first_sight: self.first_sight,
            force_change,
        })
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            fetch: Duration::from_millis(self.fetch_timeout_ms),
            notify: Duration::from_millis(self.notify_timeout_ms),
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            workers: self.workers,
            fetch_retries: self.fetch_retries,
            lock_scope: self.lock_scope,
            timeouts: self.timeouts(),
        }
    }
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|err| err.to_string())?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(()),
        "http" | "https" => Err("missing host".to_string()),
        other => Err(format!("unsupported scheme {other}")),
    }
}
