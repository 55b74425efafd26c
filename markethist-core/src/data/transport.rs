//! HTTP transport with bounded retries and exponential backoff.
//!
//! [`RetryingTransport`] wraps an [`HttpClient`] (real `reqwest` client in
//! production, scripted clients in tests), injects the marketplace headers and
//! session cookies, and classifies each response as success / retryable / fatal.
//! Every outbound request, including retries and failures, first takes a
//! permit from the shared [`RateLimiter`].

use super::rate_limiter::RateLimiter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const USER_AGENT: &str = "Mozilla/5.0 SteamMarketData/2.1";
pub const ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Statuses the marketplace uses for throttling and transient outages.
pub const RETRYABLE_STATUSES: [u16; 5] = [400, 403, 429, 502, 503];

/// How a single HTTP status is treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Fatal,
}

pub fn classify_status(status: u16) -> StatusClass {
    if (200..300).contains(&status) {
        StatusClass::Success
    } else if RETRYABLE_STATUSES.contains(&status) {
        StatusClass::Retryable
    } else {
        StatusClass::Fatal
    }
}

/// A fully prepared GET request.
#[derive(Clone)]
pub struct MarketRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub cookies: Vec<(&'static str, String)>,
}

impl MarketRequest {
    /// `Cookie` header value, or `None` when unauthenticated.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Some(pairs.join("; "))
    }
}

impl fmt::Debug for MarketRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cookie_names: Vec<&str> = self.cookies.iter().map(|(name, _)| *name).collect();
        f.debug_struct("MarketRequest")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("cookies", &cookie_names)
            .finish()
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Connection-level failure: DNS, connect, timeout, or body read.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConnectionError(pub String);

/// Seam over the network so the pipeline can be driven by scripted responses.
pub trait HttpClient: Send + Sync {
    fn get(&self, request: &MarketRequest) -> Result<HttpResponse, ConnectionError>;
}

/// Blocking `reqwest` client with a fixed per-request timeout.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, request: &MarketRequest) -> Result<HttpResponse, ConnectionError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }

        let resp = builder
            .send()
            .map_err(|e| ConnectionError(e.without_url().to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| ConnectionError(format!("reading body: {}", e.without_url())))?;
        Ok(HttpResponse { status, body })
    }
}

/// Optional marketplace session cookies.
///
/// Values are opaque and never printed; `Debug` only reveals which are set.
#[derive(Clone, Default)]
pub struct SessionCredentials {
    login_secure: Option<String>,
    session_id: Option<String>,
}

impl SessionCredentials {
    /// Blank or whitespace-only values count as absent.
    pub fn new(login_secure: Option<String>, session_id: Option<String>) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        Self {
            login_secure: clean(login_secure),
            session_id: clean(session_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.login_secure.is_some() || self.session_id.is_some()
    }

    fn cookies(&self) -> Vec<(&'static str, String)> {
        let mut cookies = Vec::new();
        if let Some(v) = &self.login_secure {
            cookies.push(("steamLoginSecure", v.clone()));
        }
        if let Some(v) = &self.session_id {
            cookies.push(("sessionid", v.clone()));
        }
        cookies
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<redacted>" } else { "<unset>" };
        f.debug_struct("SessionCredentials")
            .field("login_secure", &mask(&self.login_secure))
            .field("session_id", &mask(&self.session_id))
            .finish()
    }
}

/// Attempt budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total tries per URL, including the first.
    pub max_attempts: u32,
    /// Wait after the n-th failure is `backoff_base^n` units, capped at
    /// [`RetryPolicy::MAX_BACKOFF`].
    pub backoff_base: f64,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    /// Longest single wait between attempts.
    pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.backoff_unit.as_secs_f64() * self.backoff_base.powi(exponent);
        match Duration::try_from_secs_f64(secs) {
            Ok(delay) => delay.min(Self::MAX_BACKOFF),
            // Overflow, NaN or a negative base: fall back to the cap.
            Err(_) => Self::MAX_BACKOFF,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

/// Why one attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Status(u16),
    Connection(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Status(code) => write!(f, "HTTP {code}"),
            FailureCause::Connection(msg) => write!(f, "connection error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("{url}: gave up after {attempts} attempt(s), last failure: {last_cause}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_cause: FailureCause,
    },

    #[error("{url}: HTTP {status} (not retryable)")]
    Fatal {
        url: String,
        status: u16,
        attempts: u32,
    },
}

impl TransportError {
    /// Attempts consumed before the error was returned.
    pub fn attempts(&self) -> u32 {
        match self {
            TransportError::Exhausted { attempts, .. } | TransportError::Fatal { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// A 2xx response plus the number of attempts it took.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub status: u16,
    pub body: String,
    pub attempts: u32,
}

/// Retrying, rate-limited GET transport shared by all workers.
pub struct RetryingTransport {
    client: Box<dyn HttpClient>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    credentials: SessionCredentials,
}

impl RetryingTransport {
    pub fn new(
        client: Box<dyn HttpClient>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        credentials: SessionCredentials,
    ) -> Self {
        let policy = RetryPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        Self {
            client,
            limiter,
            policy,
            credentials,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    fn build_request(&self, url: &str, referer: &str) -> MarketRequest {
        MarketRequest {
            url: url.to_string(),
            headers: vec![
                ("User-Agent", USER_AGENT.to_string()),
                ("Accept", ACCEPT.to_string()),
                ("Referer", referer.to_string()),
                ("X-Requested-With", "XMLHttpRequest".to_string()),
            ],
            cookies: self.credentials.cookies(),
        }
    }

    /// GET `url`, retrying transient failures.
    ///
    /// Each attempt acquires one rate-limiter permit before it goes out;
    /// backoff after a retryable failure is waited on top of that spacing.
    pub fn send(&self, url: &str, referer: &str) -> Result<Delivery, TransportError> {
        let request = self.build_request(url, referer);
        let max = self.policy.max_attempts;
        let mut last_cause = FailureCause::Connection("no attempt made".into());

        for attempt in 1..=max {
            self.limiter.acquire();
            let cause = match self.client.get(&request) {
                Ok(resp) => match classify_status(resp.status) {
                    StatusClass::Success => {
                        return Ok(Delivery {
                            status: resp.status,
                            body: resp.body,
                            attempts: attempt,
                        });
                    }
                    StatusClass::Fatal => {
                        return Err(TransportError::Fatal {
                            url: url.to_string(),
                            status: resp.status,
                            attempts: attempt,
                        });
                    }
                    StatusClass::Retryable => FailureCause::Status(resp.status),
                },
                Err(e) => FailureCause::Connection(e.0),
            };

            warn!(url, attempt, max_attempts = max, cause = %cause, "request failed");
            if attempt < max {
                let delay = self.policy.backoff(attempt);
                debug!(?delay, "backing off");
                std::thread::sleep(delay);
            }
            last_cause = cause;
        }

        Err(TransportError::Exhausted {
            url: url.to_string(),
            attempts: max,
            last_cause,
        })
    }
}
