//! Markethist Runner — batch orchestration on top of `markethist-core`.
//!
//! - TOML run configuration with validation
//! - Per-item state machine (resolve, fetch, normalize, aggregate, write)
//! - Bounded worker pool sharing one transport and rate limiter
//! - Cooperative cancellation and per-item failure isolation

pub mod config;
pub mod orchestrator;

pub use config::{BatchConfig, ConfigError, MarketConfig, RunConfig, TransportConfig};
pub use orchestrator::{
    BatchError, BatchSummary, FetchOrchestrator, FetchProgress, ItemError, ItemOutcome,
    ItemResult, ItemState, PlannedItem, TracingProgress,
};
