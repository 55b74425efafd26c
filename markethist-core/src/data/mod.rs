//! Market price-history ingestion: transport, parsing, aggregation and output.

pub mod aggregate;
pub mod candidates;
pub mod catalog;
pub mod fetch;
pub mod observation;
pub mod rate_limiter;
pub mod timestamp;
pub mod transport;
pub mod writer;

pub use aggregate::{aggregate, DailyAggregate, ItemSeries};
pub use candidates::{build_candidates, CandidateKind, CandidateUrl};
pub use catalog::{Catalog, GameCatalog, ItemIdentity};
pub use fetch::{
    AttemptOutcome, FetchAttempt, FetchError, FetchedHistory, MarketFetcher, MarketSettings,
    PriceHistorySource,
};
pub use observation::{NormalizedObservation, RawObservation};
pub use rate_limiter::RateLimiter;
pub use timestamp::parse_history_timestamp;
pub use transport::{
    HttpClient, ReqwestClient, RetryPolicy, RetryingTransport, SessionCredentials, TransportError,
};
pub use writer::{SeriesMeta, SeriesProvenance, SeriesWriter, WriteError, WrittenSeries};
