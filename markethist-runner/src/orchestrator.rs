//! Batch orchestrator: drives every catalog item through fetch, aggregate and write.
//!
//! Items run on a private rayon pool of `workers` threads, all sharing one
//! price-history source (and through it one transport and one rate limiter).
//! A failing item is logged and recorded; it never stops the batch. Items not
//! yet started when the cancel flag is raised are recorded as skipped.

use crate::config::RunConfig;
use markethist_core::data::aggregate::aggregate;
use markethist_core::data::candidates::{CandidateKind, CandidateUrl};
use markethist_core::data::catalog::ItemIdentity;
use markethist_core::data::fetch::{FetchAttempt, FetchError, MarketFetcher, PriceHistorySource};
use markethist_core::data::transport::{HttpClient, RetryingTransport, SessionCredentials};
use markethist_core::data::writer::{SeriesProvenance, SeriesWriter, WriteError, WrittenSeries};
use rayon::prelude::*;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, trace, warn};

/// Lifecycle of one item within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    Pending,
    Resolving,
    Fetching,
    Normalizing,
    Aggregating,
    Writing,
    Done,
    Failed,
    Skipped,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Done | ItemState::Failed | ItemState::Skipped)
    }

    /// Whether `self -> to` is a legal step.
    pub fn can_advance_to(self, to: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, to),
            (Pending, Resolving)
                | (Pending, Skipped)
                | (Resolving, Fetching)
                | (Fetching, Normalizing)
                | (Fetching, Failed)
                | (Normalizing, Aggregating)
                | (Aggregating, Writing)
                | (Writing, Done)
                | (Writing, Failed)
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemState::Pending => "pending",
            ItemState::Resolving => "resolving",
            ItemState::Fetching => "fetching",
            ItemState::Normalizing => "normalizing",
            ItemState::Aggregating => "aggregating",
            ItemState::Writing => "writing",
            ItemState::Done => "done",
            ItemState::Failed => "failed",
            ItemState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Tracks the current state of one item and logs each step.
struct StateTrack {
    state: ItemState,
}

impl StateTrack {
    fn new() -> Self {
        Self {
            state: ItemState::Pending,
        }
    }

    fn advance(&mut self, to: ItemState) {
        debug_assert!(
            self.state.can_advance_to(to),
            "illegal item transition {} -> {}",
            self.state,
            to
        );
        trace!(from = %self.state, to = %to, "item state");
        self.state = to;
    }
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Terminal result for one item.
#[derive(Debug)]
pub enum ItemResult {
    Done {
        written: WrittenSeries,
        candidate: CandidateKind,
        attempts: Vec<FetchAttempt>,
    },
    Failed {
        /// State the item was in when it failed.
        stage: ItemState,
        error: ItemError,
    },
    Skipped,
}

#[derive(Debug)]
pub struct ItemOutcome {
    pub item: ItemIdentity,
    pub result: ItemResult,
}

impl ItemOutcome {
    pub fn state(&self) -> ItemState {
        match self.result {
            ItemResult::Done { .. } => ItemState::Done,
            ItemResult::Failed { .. } => ItemState::Failed,
            ItemResult::Skipped => ItemState::Skipped,
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match &self.result {
            ItemResult::Done { written, .. } => Some(&written.path),
            _ => None,
        }
    }
}

/// Summary of a batch run.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// One entry per item, in catalog order.
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchSummary {
    fn from_outcomes(outcomes: Vec<ItemOutcome>) -> Self {
        let count = |s: ItemState| outcomes.iter().filter(|o| o.state() == s).count();
        Self {
            total: outcomes.len(),
            succeeded: count(ItemState::Done),
            failed: count(ItemState::Failed),
            skipped: count(ItemState::Skipped),
            outcomes,
        }
    }

    /// True only when every item was written.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state() == ItemState::Failed)
    }
}

/// Progress callbacks for a batch.
///
/// Called from worker threads; implementations must be thread-safe.
pub trait FetchProgress: Send + Sync {
    fn on_start(&self, item: &ItemIdentity, index: usize, total: usize);

    fn on_complete(&self, outcome: &ItemOutcome, index: usize, total: usize);

    fn on_batch_complete(&self, summary: &BatchSummary);
}

/// Reports progress as `tracing` events.
pub struct TracingProgress;

impl FetchProgress for TracingProgress {
    fn on_start(&self, item: &ItemIdentity, index: usize, total: usize) {
        info!(item = %item.name, app_id = item.app_id, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(&self, outcome: &ItemOutcome, index: usize, total: usize) {
        let pos = format!("[{}/{}]", index + 1, total);
        match &outcome.result {
            ItemResult::Done {
                written, candidate, ..
            } => info!(
                item = %outcome.item.name,
                rows = written.rows,
                %candidate,
                path = %written.path.display(),
                "{pos} written"
            ),
            ItemResult::Failed { stage, error } => {
                warn!(item = %outcome.item.name, %stage, "{pos} failed: {error}")
            }
            ItemResult::Skipped => info!(item = %outcome.item.name, "{pos} skipped"),
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "batch complete"
        );
    }
}

/// Errors that stop a batch before any item runs.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    OutputDir(#[from] WriteError),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// One catalog item as it would be fetched, without doing any I/O.
#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub item: ItemIdentity,
    pub path: PathBuf,
    pub candidates: Vec<CandidateUrl>,
}

pub struct FetchOrchestrator {
    source: Arc<dyn PriceHistorySource>,
    writer: SeriesWriter,
    workers: usize,
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn PriceHistorySource>, writer: SeriesWriter, workers: usize) -> Self {
        Self {
            source,
            writer,
            workers: workers.max(1),
        }
    }

    /// Wire a marketplace-backed orchestrator from a run config.
    pub fn from_config(
        config: &RunConfig,
        client: Box<dyn HttpClient>,
        credentials: SessionCredentials,
    ) -> Self {
        let transport = RetryingTransport::new(
            client,
            Arc::new(config.transport.rate_limiter()),
            config.transport.retry_policy(),
            credentials,
        );
        let fetcher = MarketFetcher::new(transport, config.market.settings());
        Self::new(
            Arc::new(fetcher),
            SeriesWriter::new(&config.run.output_dir),
            config.run.workers,
        )
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn writer(&self) -> &SeriesWriter {
        &self.writer
    }

    /// Target files and candidate URLs for each item.
    pub fn plan(&self, items: &[ItemIdentity]) -> Vec<PlannedItem> {
        items
            .iter()
            .map(|item| PlannedItem {
                item: item.clone(),
                path: self.writer.path_for(item),
                candidates: self.source.candidates(item),
            })
            .collect()
    }

    /// Process every item once.
    ///
    /// Returns `Err` only when the batch cannot start at all.
    pub fn run(
        &self,
        items: &[ItemIdentity],
        cancel: &AtomicBool,
        progress: &dyn FetchProgress,
    ) -> Result<BatchSummary, BatchError> {
        self.writer.ensure_output_dir()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("markethist-worker-{i}"))
            .build()?;

        info!(
            source = self.source.name(),
            items = items.len(),
            workers = self.workers,
            output_dir = %self.writer.output_dir().display(),
            "starting batch"
        );

        let total = items.len();
        let outcomes: Vec<ItemOutcome> = pool.install(|| {
            items
                .par_iter()
                .with_max_len(1)
                .enumerate()
                .map(|(index, item)| {
                    if cancel.load(Ordering::Relaxed) {
                        let outcome = ItemOutcome {
                            item: item.clone(),
                            result: ItemResult::Skipped,
                        };
                        progress.on_complete(&outcome, index, total);
                        return outcome;
                    }
                    progress.on_start(item, index, total);
                    let outcome = ItemOutcome {
                        item: item.clone(),
                        result: self.process_item(item),
                    };
                    progress.on_complete(&outcome, index, total);
                    outcome
                })
                .collect()
        });

        let summary = BatchSummary::from_outcomes(outcomes);
        progress.on_batch_complete(&summary);
        Ok(summary)
    }

    fn process_item(&self, item: &ItemIdentity) -> ItemResult {
        let span = info_span!("item", item = %item.name, app_id = item.app_id);
        let _guard = span.enter();
        let mut track = StateTrack::new();

        track.advance(ItemState::Resolving);
        let candidates = self.source.candidates(item);

        track.advance(ItemState::Fetching);
        let fetched = match self.source.fetch(item, &candidates) {
            Ok(fetched) => fetched,
            Err(e) => {
                // Each failed candidate was already logged by the source.
                track.advance(ItemState::Failed);
                return ItemResult::Failed {
                    stage: ItemState::Fetching,
                    error: e.into(),
                };
            }
        };

        track.advance(ItemState::Normalizing);
        debug!(
            kept = fetched.observations.len(),
            dropped = fetched.dropped,
            candidate = %fetched.candidate,
            "observations normalized"
        );

        track.advance(ItemState::Aggregating);
        let series = aggregate(&fetched.observations);

        track.advance(ItemState::Writing);
        let written = match self.writer.write(item, &series) {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, "failed to write series");
                track.advance(ItemState::Failed);
                return ItemResult::Failed {
                    stage: ItemState::Writing,
                    error: e.into(),
                };
            }
        };

        let provenance = SeriesProvenance {
            candidate: Some(fetched.candidate),
            observations_kept: fetched.observations.len(),
            observations_dropped: fetched.dropped,
        };
        if let Err(e) = self.writer.write_meta(item, &series, &written, &provenance) {
            warn!(error = %e, "series written but metadata sidecar failed");
        }

        track.advance(ItemState::Done);
        ItemResult::Done {
            written,
            candidate: fetched.candidate,
            attempts: fetched.attempts,
        }
    }
}
