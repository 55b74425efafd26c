//! Per-item fetch: walk the candidate URLs until one yields usable samples.
//!
//! A candidate is accepted only when the payload reports `success: true` and
//! at least one sample survives normalization. Transport errors, soft failures
//! and empty payloads all move on to the next candidate; none of them re-tries
//! the same URL beyond what the transport already did.

use super::candidates::{build_candidates, listing_url, CandidateKind, CandidateUrl};
use super::catalog::ItemIdentity;
use super::observation::{NormalizedObservation, PriceHistoryResponse};
use super::transport::{FailureCause, RetryingTransport, TransportError};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Result of trying one candidate URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Payload decoded but `success` was missing or false.
    SoftFailure,
    /// No samples, or none survived normalization.
    Empty,
    /// Body was not a price-history payload.
    Undecodable(String),
    /// Retryable failures used up the attempt budget.
    RetriesExhausted(FailureCause),
    /// Non-retryable HTTP status.
    Fatal(u16),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::SoftFailure => f.write_str("marketplace reported success=false"),
            AttemptOutcome::Empty => f.write_str("no usable observations"),
            AttemptOutcome::Undecodable(e) => write!(f, "undecodable payload: {e}"),
            AttemptOutcome::RetriesExhausted(cause) => write!(f, "retries exhausted ({cause})"),
            AttemptOutcome::Fatal(status) => write!(f, "HTTP {status}"),
        }
    }
}

/// One (item, candidate) try. Logged and reported, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub candidate: CandidateKind,
    pub url: String,
    pub outcome: AttemptOutcome,
    /// HTTP requests issued for this candidate, including retries.
    pub requests: u32,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("no candidate URL yielded price history for '{item}': {}", summarize(.attempts))]
    ItemFetchFailed {
        item: String,
        attempts: Vec<FetchAttempt>,
    },
}

fn summarize(attempts: &[FetchAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidates".into();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.candidate, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Samples from the first candidate that produced any.
#[derive(Debug, Clone)]
pub struct FetchedHistory {
    pub observations: Vec<NormalizedObservation>,
    pub dropped: usize,
    pub candidate: CandidateKind,
    pub attempts: Vec<FetchAttempt>,
}

/// Anything that can produce normalized samples for an item.
///
/// The orchestrator only talks to this trait, so batches can be driven by
/// canned data in tests.
pub trait PriceHistorySource: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate URLs for the item, most specific first.
    fn candidates(&self, identity: &ItemIdentity) -> Vec<CandidateUrl>;

    /// Try `candidates` in order and return the first usable history.
    fn fetch(
        &self,
        identity: &ItemIdentity,
        candidates: &[CandidateUrl],
    ) -> Result<FetchedHistory, FetchError>;
}

/// Currency and country sent with the most specific candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSettings {
    pub currency: u32,
    pub country: String,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            currency: 3,
            country: "DE".into(),
        }
    }
}

/// Price-history source backed by the marketplace endpoint.
pub struct MarketFetcher {
    transport: RetryingTransport,
    settings: MarketSettings,
}

impl MarketFetcher {
    pub fn new(transport: RetryingTransport, settings: MarketSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &MarketSettings {
        &self.settings
    }
}

/// Decide whether a 2xx body is usable.
fn evaluate(body: &str) -> Result<super::observation::Normalized, AttemptOutcome> {
    let payload = PriceHistoryResponse::from_body(body)
        .map_err(|e| AttemptOutcome::Undecodable(e.to_string()))?;
    if !payload.is_success() {
        return Err(AttemptOutcome::SoftFailure);
    }
    let normalized = payload.normalize();
    if normalized.observations.is_empty() {
        return Err(AttemptOutcome::Empty);
    }
    Ok(normalized)
}

impl PriceHistorySource for MarketFetcher {
    fn name(&self) -> &str {
        "steam_community_market"
    }

    fn candidates(&self, identity: &ItemIdentity) -> Vec<CandidateUrl> {
        build_candidates(
            identity.app_id,
            self.settings.currency,
            &self.settings.country,
            &identity.name,
        )
    }

    fn fetch(
        &self,
        identity: &ItemIdentity,
        candidates: &[CandidateUrl],
    ) -> Result<FetchedHistory, FetchError> {
        let referer = listing_url(identity.app_id, &identity.name);
        let mut attempts = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let (outcome, requests) = match self.transport.send(&candidate.url, &referer) {
                Ok(delivery) => match evaluate(&delivery.body) {
                    Ok(normalized) => {
                        debug!(
                            candidate = %candidate.kind,
                            kept = normalized.observations.len(),
                            dropped = normalized.dropped,
                            "candidate accepted"
                        );
                        attempts.push(FetchAttempt {
                            candidate: candidate.kind,
                            url: candidate.url.clone(),
                            outcome: AttemptOutcome::Success,
                            requests: delivery.attempts,
                        });
                        return Ok(FetchedHistory {
                            observations: normalized.observations,
                            dropped: normalized.dropped,
                            candidate: candidate.kind,
                            attempts,
                        });
                    }
                    Err(outcome) => (outcome, delivery.attempts),
                },
                Err(e) => {
                    let requests = e.attempts();
                    let outcome = match e {
                        TransportError::Exhausted { last_cause, .. } => {
                            AttemptOutcome::RetriesExhausted(last_cause)
                        }
                        TransportError::Fatal { status, .. } => AttemptOutcome::Fatal(status),
                    };
                    (outcome, requests)
                }
            };

            warn!(
                item = %identity.name,
                candidate = %candidate.kind,
                url = %candidate.url,
                %outcome,
                "candidate failed, trying next"
            );
            attempts.push(FetchAttempt {
                candidate: candidate.kind,
                url: candidate.url.clone(),
                outcome,
                requests,
            });
        }

        Err(FetchError::ItemFetchFailed {
            item: identity.name.clone(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::aggregate::aggregate;
    use crate::data::rate_limiter::RateLimiter;
    use crate::data::transport::{
        ConnectionError, HttpClient, HttpResponse, MarketRequest, RetryPolicy, SessionCredentials,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const GOOD_BODY: &str = r#"{"success":true,"prices":[
        ["Jan 05 2021 01: +0", 10.0, "1"],
        ["Jan 05 2021 02: +0", 20.0, "2"],
        ["Jan 06 2021 02: +0", "3.5", "4"],
        ["garbage", 1.0, "1"]
    ]}"#;

    /// Answers by URL and counts requests per URL.
    #[derive(Default)]
    struct ByUrl {
        routes: HashMap<String, HttpResponse>,
        hits: Mutex<HashMap<String, u32>>,
    }

    impl ByUrl {
        fn route(mut self, url: &str, status: u16, body: &str) -> Self {
            self.routes.insert(
                url.to_string(),
                HttpResponse {
                    status,
                    body: body.to_string(),
                },
            );
            self
        }
    }

    impl HttpClient for Arc<ByUrl> {
        fn get(&self, request: &MarketRequest) -> Result<HttpResponse, ConnectionError> {
            *self.hits.lock().unwrap().entry(request.url.clone()).or_default() += 1;
            self.routes
                .get(&request.url)
                .cloned()
                .ok_or_else(|| ConnectionError("connection refused".into()))
        }
    }

    fn fetcher(client: Arc<ByUrl>) -> MarketFetcher {
        let transport = RetryingTransport::new(
            Box::new(client),
            Arc::new(RateLimiter::with_interval(Duration::from_millis(50))),
            RetryPolicy {
                max_attempts: 2,
                backoff_base: 2.0,
                backoff_unit: Duration::from_millis(1),
            },
            SessionCredentials::default(),
        );
        MarketFetcher::new(transport, MarketSettings::default())
    }

    fn item() -> ItemIdentity {
        ItemIdentity::new(730, "AK-47 | Redline (Field-Tested)", "")
    }

    #[test]
    fn first_usable_candidate_wins() {
        let lookup = fetcher(Arc::new(ByUrl::default()));
        let urls = lookup.candidates(&item());

        let client = Arc::new(ByUrl::default().route(&urls[0].url, 200, GOOD_BODY));
        let f = fetcher(Arc::clone(&client));
        let fetched = f.fetch(&item(), &urls).unwrap();

        assert_eq!(fetched.candidate, CandidateKind::CountryAndCurrency);
        assert_eq!(fetched.observations.len(), 3);
        assert_eq!(fetched.dropped, 1);
        assert_eq!(fetched.attempts.len(), 1);
        assert_eq!(client.hits.lock().unwrap().len(), 1);
    }

    #[test]
    fn malformed_rows_are_reported_as_dropped() {
        let lookup = fetcher(Arc::new(ByUrl::default()));
        let urls = lookup.candidates(&item());
        let body = r#"{"success":true,"prices":[
            ["Jan 05 2021 01: +0", 10.0, "1"],
            ["Jan 05 2021 02: +0", 20.0],
            [1609808400, 5.0, "1"]
        ]}"#;

        let client = Arc::new(ByUrl::default().route(&urls[0].url, 200, body));
        let fetched = fetcher(client).fetch(&item(), &urls).unwrap();
        assert_eq!(fetched.observations.len(), 1);
        assert_eq!(fetched.dropped, 2);
    }

    #[test]
    fn falls_back_to_third_candidate_with_same_result() {
        let lookup = fetcher(Arc::new(ByUrl::default()));
        let urls = lookup.candidates(&item());

        let client = Arc::new(
            ByUrl::default()
                .route(&urls[0].url, 500, "oops")
                .route(&urls[1].url, 200, r#"{"success":false}"#)
                .route(&urls[2].url, 200, GOOD_BODY),
        );
        let f = fetcher(Arc::clone(&client));
        let via_fallback = f.fetch(&item(), &urls).unwrap();

        assert_eq!(via_fallback.candidate, CandidateKind::Bare);
        let outcomes: Vec<_> = via_fallback.attempts.iter().map(|a| a.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::Fatal(500),
                AttemptOutcome::SoftFailure,
                AttemptOutcome::Success
            ]
        );

        // Soft failure is not retried on the same candidate.
        assert_eq!(client.hits.lock().unwrap()[&urls[1].url], 1);

        let direct = fetcher(Arc::new(ByUrl::default().route(&urls[2].url, 200, GOOD_BODY)))
            .fetch(&item(), &urls[2..])
            .unwrap();
        assert_eq!(aggregate(&via_fallback.observations), aggregate(&direct.observations));
    }

    #[test]
    fn connection_failures_use_retry_budget_then_advance() {
        let lookup = fetcher(Arc::new(ByUrl::default()));
        let urls = lookup.candidates(&item());

        let client = Arc::new(ByUrl::default().route(&urls[1].url, 200, GOOD_BODY));
        let f = fetcher(Arc::clone(&client));
        let fetched = f.fetch(&item(), &urls).unwrap();

        assert_eq!(fetched.candidate, CandidateKind::CurrencyOnly);
        assert_eq!(client.hits.lock().unwrap()[&urls[0].url], 2);
        assert!(matches!(
            fetched.attempts[0].outcome,
            AttemptOutcome::RetriesExhausted(FailureCause::Connection(_))
        ));
        assert_eq!(fetched.attempts[0].requests, 2);
    }

    #[test]
    fn all_soft_failures_fail_the_item() {
        let lookup = fetcher(Arc::new(ByUrl::default()));
        let urls = lookup.candidates(&item());

        let mut client = ByUrl::default();
        for c in &urls {
            client = client.route(&c.url, 200, r#"{"success":false}"#);
        }
        let err = fetcher(Arc::new(client)).fetch(&item(), &urls).unwrap_err();

        let FetchError::ItemFetchFailed { item: name, attempts } = err.clone();
        assert_eq!(name, item().name);
        assert_eq!(attempts.len(), 3);
        assert!(attempts.iter().all(|a| a.outcome == AttemptOutcome::SoftFailure));
        assert!(err.to_string().contains("AK-47 | Redline"));
    }

    #[test]
    fn empty_and_unparseable_payloads_advance() {
        let lookup = fetcher(Arc::new(ByUrl::default()));
        let urls = lookup.candidates(&item());

        let client = ByUrl::default()
            .route(&urls[0].url, 200, r#"{"success":true,"prices":[]}"#)
            .route(&urls[1].url, 200, r#"{"success":true,"prices":[["nope",1,"1"]]}"#)
            .route(&urls[2].url, 200, "<html>rate limited</html>");
        let err = fetcher(Arc::new(client)).fetch(&item(), &urls).unwrap_err();

        let FetchError::ItemFetchFailed { attempts, .. } = err;
        assert_eq!(attempts[0].outcome, AttemptOutcome::Empty);
        assert_eq!(attempts[1].outcome, AttemptOutcome::Empty);
        assert!(matches!(attempts[2].outcome, AttemptOutcome::Undecodable(_)));
    }
}
