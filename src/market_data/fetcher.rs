//! Concurrent snapshot fetching for one symbol across every venue.
//!
//! Each venue runs in its own task. All tasks share one deadline; whatever has not
//! settled when it passes is aborted and reported as `FetchError::Timeout`. The call
//! itself never fails: an all-failed map is a normal result.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, histogram};
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::{FetchConfig, VenueConfig};
use crate::engine::types::{SymbolId, VenueId};
use crate::market_data::adapters::{RawPayload, SnapshotSource, TransportError};

/// A configured venue plus the transport used to reach it.
#[derive(Clone)]
pub struct VenueHandle {
    pub config: Arc<VenueConfig>,
    pub source: Arc<dyn SnapshotSource>,
}

impl VenueHandle {
    pub fn new(config: VenueConfig, source: Arc<dyn SnapshotSource>) -> Self {
        Self { config: Arc::new(config), source }
    }

    pub fn id(&self) -> &VenueId {
        &self.config.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(cfg: &FetchConfig) -> Self {
        Self { retries: cfg.retries, initial_backoff: cfg.initial_backoff(), jitter: cfg.jitter }
    }

    pub fn none() -> Self {
        Self { retries: 0, initial_backoff: Duration::ZERO, jitter: false }
    }

    /// `initial_backoff * 2^attempt`, plus up to half of that again when jittered.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.saturating_mul(1u32 << attempt.min(16));
        if !self.jitter || base.is_zero() {
            return base;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        base + Duration::from_millis(extra_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum FetchError {
    #[error("no response before the cycle deadline")]
    Timeout,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FetchError {
    fn label(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Transport(_) => "transport",
        }
    }
}

pub type FetchResults = BTreeMap<VenueId, Result<RawPayload, FetchError>>;

/// Request `symbol` from every venue at once and wait at most `timeout`.
///
/// The returned map has exactly one entry per venue in `venues`.
#[instrument(skip_all, fields(symbol = %symbol, venues = venues.len(), timeout_ms = timeout.as_millis() as u64))]
pub async fn fetch_all(venues: &[VenueHandle], symbol: &SymbolId, timeout: Duration, retry: RetryPolicy) -> FetchResults {
    fetch_all_until(venues, symbol, Instant::now() + timeout, retry).await
}

/// As `fetch_all`, against an absolute deadline shared with other symbols.
pub async fn fetch_all_until(
    venues: &[VenueHandle],
    symbol: &SymbolId,
    deadline: Instant,
    retry: RetryPolicy,
) -> FetchResults {
    let started = Instant::now();
    let mut tasks = JoinSet::new();

    for handle in venues {
        let handle = handle.clone();
        let symbol = symbol.clone();
        tasks.spawn(async move {
            let outcome = AssertUnwindSafe(fetch_with_retry(&handle, &symbol, retry))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(TransportError::TaskFailed(panic_message(panic.as_ref())).into()));
            (handle.config.id.clone(), outcome)
        });
    }

    let mut results = FetchResults::new();
    let mut timed_out = false;
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((venue, outcome)))) => {
                results.insert(venue, outcome);
            }
            Ok(Some(Err(e))) => warn!(error = %e, "Fetch task did not complete"),
            Ok(None) => break,
            Err(_) => {
                timed_out = true;
                tasks.abort_all();
                break;
            }
        }
    }

    for handle in venues {
        results.entry(handle.id().clone()).or_insert_with(|| {
            if timed_out {
                Err(FetchError::Timeout)
            } else {
                Err(TransportError::TaskFailed("task was cancelled".into()).into())
            }
        });
    }

    for (venue, outcome) in &results {
        let outcome_label = match outcome {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        counter!("combobook_fetch_total", "venue" => venue.to_string(), "outcome" => outcome_label).increment(1);
        if let Err(e) = outcome {
            debug!(venue = %venue, error = %e, "Venue fetch failed");
        }
    }
    histogram!("combobook_fetch_all_seconds").record(started.elapsed().as_secs_f64());
    results
}

async fn fetch_with_retry(handle: &VenueHandle, symbol: &SymbolId, retry: RetryPolicy) -> Result<RawPayload, FetchError> {
    let mut attempt = 0;
    loop {
        let request = handle.source.request_snapshot(&handle.config, symbol);
        let err = match tokio::time::timeout(handle.config.request_timeout(), request).await {
            Ok(Ok(raw)) => return Ok(raw),
            Ok(Err(e)) if !e.is_transient() => return Err(e.into()),
            Ok(Err(e)) => FetchError::Transport(e),
            Err(_) => FetchError::Timeout,
        };
        if attempt >= retry.retries {
            return Err(err);
        }
        let wait = retry.backoff(attempt);
        debug!(venue = %handle.id(), attempt, wait_ms = wait.as_millis() as u64, error = %err, "Retrying snapshot request");
        counter!("combobook_fetch_retries_total", "venue" => handle.id().to_string()).increment(1);
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "fetch task panicked".to_string()
    }
}
