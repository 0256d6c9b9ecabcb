use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use watch_core::{media_type, FetchError, FetchFailure, FetchedPage};
use watch_logging::watch_warn;

use crate::robots::{product_token, RobotsRules};

/// robots.txt bytes read per origin; the rest is ignored.
const ROBOTS_MAX_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
    /// Consult the origin's robots.txt before fetching a page.
    pub respect_robots: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(20),
            redirect_limit: 5,
            max_bytes: 1_500_000,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
                "text/plain".to_string(),
            ],
            user_agent: concat!("page-watch/", env!("CARGO_PKG_VERSION")).to_string(),
            respect_robots: true,
        }
    }
}

/// Fetch transport: returns the raw body and content type of a locator.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<FetchedPage, FetchError>;
}

type RobotsCache = Mutex<HashMap<String, Arc<RobotsRules>>>;

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    client: reqwest::Client,
    redirect_counter: Arc<AtomicUsize>,
    robots: Arc<RobotsCache>,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = build_client(&settings, redirect_counter.clone())?;
        Ok(Self {
            settings,
            client,
            redirect_counter,
            robots: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Redirects followed by the most recent request.
    pub fn last_redirect_count(&self) -> usize {
        self.redirect_counter.load(Ordering::Relaxed)
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = media_type(content_type);
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ct))
    }

    /// robots.txt rules for the origin of `url`, read once per origin.
    async fn robots_for(&self, url: &Url) -> Arc<RobotsRules> {
        let origin = url.origin().ascii_serialization();
        if let Some(rules) = self.cached_robots(&origin) {
            return rules;
        }
        let rules = Arc::new(self.load_robots(&origin).await);
        if let Ok(mut cache) = self.robots.lock() {
            cache.insert(origin, rules.clone());
        }
        rules
    }

    fn cached_robots(&self, origin: &str) -> Option<Arc<RobotsRules>> {
        self.robots.lock().ok()?.get(origin).cloned()
    }

    /// Missing, failing or unreadable robots.txt places no restriction.
    async fn load_robots(&self, origin: &str) -> RobotsRules {
        let location = format!("{origin}/robots.txt");
        let response = match self
            .client
            .get(&location)
            .header(USER_AGENT, self.settings.user_agent.as_str())
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(_) => return RobotsRules::allow_all(),
            Err(err) => {
                watch_warn!("cannot read {}: {}; fetching without it", location, err);
                return RobotsRules::allow_all();
            }
        };

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => body.extend_from_slice(&chunk),
                Err(err) => {
                    watch_warn!("cannot read {}: {}; fetching without it", location, err);
                    return RobotsRules::allow_all();
                }
            }
            if body.len() >= ROBOTS_MAX_BYTES {
                body.truncate(ROBOTS_MAX_BYTES);
                break;
            }
        }
        RobotsRules::parse(
            &String::from_utf8_lossy(&body),
            product_token(&self.settings.user_agent),
        )
    }

    fn too_large(&self, actual: u64) -> FetchError {
        FetchError::new(
            FetchFailure::TooLarge {
                max_bytes: self.settings.max_bytes,
                actual: Some(actual),
            },
            "response too large",
        )
    }
}

fn build_client(
    settings: &FetchSettings,
    redirect_counter: Arc<AtomicUsize>,
) -> Result<reqwest::Client, FetchError> {
    let redirect_limit = settings.redirect_limit;
    let policy = reqwest::redirect::Policy::custom(move |attempt| {
        let count = attempt.previous().len();
        redirect_counter.store(count, Ordering::Relaxed);
        if count > redirect_limit {
            attempt.error("redirect limit exceeded")
        } else {
            attempt.follow()
        }
    });

    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .redirect(policy)
        .build()
        .map_err(|err| FetchError::new(FetchFailure::Network, err.to_string()))
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, locator: &str) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(locator)
            .map_err(|err| FetchError::new(FetchFailure::InvalidUrl, err.to_string()))?;

        if self.settings.respect_robots {
            let mut path = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                path.push('?');
                path.push_str(query);
            }
            if !self.robots_for(&parsed).await.is_allowed(&path) {
                return Err(FetchError::new(
                    FetchFailure::Disallowed,
                    format!("robots.txt forbids {path}"),
                ));
            }
        }
        self.redirect_counter.store(0, Ordering::Relaxed);

        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, self.settings.user_agent.as_str())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FetchFailure::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(self.too_large(content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FetchFailure::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(self.too_large(next_len));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            body,
            content_type,
            final_url,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchFailure::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FetchFailure::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FetchFailure::Network, err.to_string())
}
