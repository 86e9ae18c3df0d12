// Router drives the fetch -> normalise -> combine cycle and feeds the sinks
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::engine::book::OrderBook;
use crate::engine::types::{SymbolId, Timestamp, VenueId};
use crate::market_data::adapters::{normaliser_for, SnapshotSource};
use crate::market_data::combined_book::{CombinedBook, DegradeReason};
use crate::market_data::combiner::Combiner;
use crate::market_data::fetcher::{fetch_all_until, FetchResults, RetryPolicy, VenueHandle};
use crate::market_data::latest::LatestBooks;
use crate::market_data::normaliser::Normaliser;
use crate::persist::BookSink;

/// Everything one cycle produced, in configured symbol order.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: Timestamp,
    pub elapsed: Duration,
    pub books: Vec<Arc<CombinedBook>>,
}

impl CycleReport {
    pub fn book(&self, symbol: &SymbolId) -> Option<&Arc<CombinedBook>> {
        self.books.iter().find(|b| b.symbol() == symbol)
    }
}

pub struct BookRouter {
    symbols: Vec<SymbolId>,
    venues: Vec<VenueHandle>,
    normalisers: HashMap<VenueId, Box<dyn Normaliser>>,
    combiner: Combiner,
    cycle_timeout: Duration,
    interval: Duration,
    retry: RetryPolicy,
    latest: LatestBooks,
    sinks: Vec<Box<dyn BookSink>>,
    cycle: u64,
}

impl BookRouter {
    /// Every venue reached through the same transport.
    pub fn from_config(cfg: &AppConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let venues = cfg
            .venues
            .iter()
            .map(|v| VenueHandle::new(v.clone(), source.clone()))
            .collect();
        Self::new(cfg, venues)
    }

    /// `venues` carry their own transports; their configs decide the normaliser.
    pub fn new(cfg: &AppConfig, venues: Vec<VenueHandle>) -> Self {
        let normalisers = venues
            .iter()
            .map(|h| (h.id().clone(), normaliser_for(&h.config)))
            .collect();
        Self {
            symbols: cfg.symbols.clone(),
            venues,
            normalisers,
            combiner: Combiner::from_config(cfg),
            cycle_timeout: cfg.fetch.cycle_timeout(),
            interval: cfg.fetch.interval(),
            retry: RetryPolicy::from_config(&cfg.fetch),
            latest: LatestBooks::new(),
            sinks: Vec::new(),
            cycle: 0,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn BookSink>) {
        self.sinks.push(sink);
    }

    /// Handle on the latest-book cell; stays valid after the router is dropped.
    pub fn latest(&self) -> LatestBooks {
        self.latest.clone()
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycle
    }

    /// Fetch every symbol on every venue under one deadline, then merge and publish.
    #[instrument(skip(self), fields(cycle = self.cycle + 1))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started + self.cycle_timeout;

        let fetched = join_all(
            self.symbols
                .iter()
                .map(|symbol| fetch_all_until(&self.venues, symbol, deadline, self.retry)),
        )
        .await;

        let mut books = Vec::with_capacity(self.symbols.len());
        for (symbol, results) in self.symbols.iter().zip(fetched) {
            let outcomes = self.normalise_all(symbol, results);
            let book = Arc::new(self.combiner.combine(symbol, outcomes));
            gauge!("combobook_surviving_venues", "symbol" => symbol.to_string())
                .set(book.source_timestamps().len() as f64);
            self.latest.publish(book.clone());
            books.push(book);
        }

        let report = CycleReport { cycle: self.cycle, started_at, elapsed: started.elapsed(), books };
        counter!("combobook_cycles_total").increment(1);
        histogram!("combobook_cycle_seconds").record(report.elapsed.as_secs_f64());
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            books = report.books.len(),
            degraded = report.books.iter().map(|b| b.degraded().len()).sum::<usize>(),
            "Cycle complete"
        );

        for sink in &mut self.sinks {
            if let Err(e) = sink.publish(&report).await {
                error!(sink = sink.name(), error = %e, "Sink failed to publish");
            }
        }
        report
    }

    fn normalise_all(
        &self,
        symbol: &SymbolId,
        results: FetchResults,
    ) -> Vec<(VenueId, Result<OrderBook, DegradeReason>)> {
        results
            .into_iter()
            .map(|(venue, fetched)| {
                let outcome = match (fetched, self.normalisers.get(&venue)) {
                    (Err(e), _) => Err(DegradeReason::Fetch(e)),
                    (Ok(_), None) => Err(DegradeReason::Missing),
                    (Ok(raw), Some(n)) => n
                        .normalise(&raw, &venue, symbol, raw.received_at)
                        .map_err(DegradeReason::Normalisation),
                };
                (venue, outcome)
            })
            .collect()
    }

    /// Run cycles until `shutdown` turns true (or its sender is dropped), or until
    /// `max_cycles` have completed. Sinks are flushed and the latest-book cell is
    /// cleared on the way out. Returns the number of cycles run.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>, max_cycles: Option<u64>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ran = 0u64;

        loop {
            if max_cycles.is_some_and(|max| ran >= max) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.run_cycle().await;
            ran += 1;
        }

        info!(cycles = ran, "Stopping");
        self.flush_sinks().await;
        self.latest.clear();
        ran
    }

    pub async fn flush_sinks(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush().await {
                warn!(sink = sink.name(), error = %e, "Sink failed to flush");
            }
        }
    }
}
