//! Blocking HTTP client shared by the remote media.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use tracing::{debug, warn};

use crate::ilcd::epd::config::HttpSettings;
use crate::ilcd::epd::error::{IlcdError, Result};

/// Longest spacing the throttle puts between two requests.
pub const MAX_THROTTLE_INTERVAL: Duration = Duration::from_secs(3600);

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff_factor: settings.backoff_factor,
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        }
    }

    /// Sleep before retry number `attempt` (starting at 1):
    /// `backoff_factor * 2^(attempt - 1)` seconds, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let seconds = self.backoff_factor * 2f64.powi(exponent);
        Duration::try_from_secs_f64(seconds.max(0.0))
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Spaces requests evenly so that at most `rate` start per second.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .unwrap_or(MAX_THROTTLE_INTERVAL)
                .min(MAX_THROTTLE_INTERVAL)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Books the next free slot and returns how long to wait for it.
    fn reserve(&self, now: Instant) -> Duration {
        let mut next_slot = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = match *next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next_slot = Some(slot + self.interval);
        slot.saturating_duration_since(now)
    }

    pub fn acquire(&self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

/// Base client: resolves paths against a base URL, throttles, retries.
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
    throttle: Throttle,
}

impl ApiClient {
    pub fn new(base_url: &str, settings: &HttpSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&settings.user_agent)
            .map_err(|err| IlcdError::Config(format!("invalid user agent: {err}")))?;
        headers.insert(USER_AGENT, agent);

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry: RetryPolicy::from_settings(settings),
            throttle: Throttle::new(settings.requests_per_second),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs are kept, anything else is appended to the base URL.
    pub fn url_for(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else if path_or_url.starts_with('/') {
            format!("{}{path_or_url}", self.base_url)
        } else {
            format!("{}/{path_or_url}", self.base_url)
        }
    }

    /// GETs a resource and returns its body.
    pub fn get(&self, path_or_url: &str, query: &[(&str, &str)]) -> Result<Vec<u8>> {
        let url = self.url_for(path_or_url);
        let response = self.execute(Method::GET, &url, query)?;
        Ok(response.bytes()?.to_vec())
    }

    /// HEADs a resource; `false` when the server answers with a final
    /// non-success status such as 404.
    pub fn head_ok(&self, path_or_url: &str) -> Result<bool> {
        let url = self.url_for(path_or_url);
        match self.execute(Method::HEAD, &url, &[]) {
            Ok(_) => Ok(true),
            Err(IlcdError::HttpStatus { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn execute(&self, method: Method, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            self.throttle.acquire();
            debug!(%method, url, attempt, "sending request");
            let (error, retry_after) =
                match self.client.request(method.clone(), url).query(query).send() {
                    Ok(response) if response.status().is_success() => return Ok(response),
                    Ok(response) => {
                        let retry_after = retry_after(response.headers());
                        let error = IlcdError::HttpStatus {
                            status: response.status().as_u16(),
                            url: url.to_string(),
                        };
                        (error, retry_after)
                    }
                    Err(err) => (IlcdError::Http(err), None),
                };

            if !error.is_retryable() || attempt >= self.retry.max_retries {
                return Err(error);
            }
            attempt += 1;
            let wait = retry_after
                .unwrap_or_else(|| self.retry.backoff(attempt))
                .min(self.retry.max_backoff);
            warn!(url, attempt, wait_ms = wait.as_millis() as u64, %error, "retrying request");
            std::thread::sleep(wait);
        }
    }
}

/// Parses `Retry-After` as delta seconds or an HTTP date.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Percent-encodes one path segment.
pub fn encode_segment(segment: &str) -> String {
    let Ok(mut url) = url::Url::parse("http://localhost/") else {
        return segment.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}
