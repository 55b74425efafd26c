//! Markethist Core — price-history fetching, normalization and daily series output.
//!
//! - Rate limiting and retrying transport over a pluggable HTTP client
//! - Candidate URL fallback per item
//! - Timestamp and quantity normalization
//! - Daily mean/median/volume aggregation
//! - Atomic CSV output with a metadata sidecar

pub mod data;
