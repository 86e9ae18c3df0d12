// End-to-end cycles against in-memory venues on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::watch;

use combobook_rs::config::{AppConfig, VenueConfig};
use combobook_rs::engine::types::{SymbolId, VenueId};
use combobook_rs::market_data::adapters::{RawPayload, SnapshotSource, TransportError};
use combobook_rs::market_data::combined_book::DegradeReason;
use combobook_rs::market_data::fetcher::{FetchError, VenueHandle};
use combobook_rs::market_data::normaliser::NormalisationCause;
use combobook_rs::market_data::router::{BookRouter, CycleReport};
use combobook_rs::persist::{BookSink, PersistResult};

struct Scripted {
    delay: Duration,
    reply: Result<Value, TransportError>,
}

#[async_trait]
impl SnapshotSource for Scripted {
    async fn request_snapshot(&self, _venue: &VenueConfig, _symbol: &SymbolId) -> Result<RawPayload, TransportError> {
        tokio::time::sleep(self.delay).await;
        self.reply.clone().map(|body| RawPayload::new(body, Utc::now()))
    }
}

fn okx(bids: &[(&str, &str)], asks: &[(&str, &str)]) -> Value {
    let side = |lv: &[(&str, &str)]| lv.iter().map(|(p, q)| json!([p, q, "0", "1"])).collect::<Vec<_>>();
    json!({"code": "0", "msg": "", "data": [{"bids": side(bids), "asks": side(asks), "ts": "1700000000000"}]})
}

fn config(venues: &[(&str, u32)]) -> AppConfig {
    let mut toml = String::from(
        r#"
        symbols = ["ETH-USDC"]

        [fetch]
        cycle_timeout_ms = 1000
        interval_ms = 200
        retries = 0
        "#,
    );
    for (id, priority) in venues {
        toml.push_str(&format!(
            r#"
            [[venues]]
            id = "{id}"
            kind = "okx"
            endpoint = "http://{id}.invalid/books?instId={{symbol}}"
            priority = {priority}
            symbols = [{{ canonical = "ETH-USDC", native = "ETH-USDC" }}]
            "#
        ));
    }
    AppConfig::from_toml_str(&toml).unwrap()
}

fn router(cfg: &AppConfig, scripts: Vec<Scripted>) -> BookRouter {
    let handles = cfg
        .venues
        .iter()
        .cloned()
        .zip(scripts)
        .map(|(v, s)| VenueHandle::new(v, Arc::new(s)))
        .collect();
    BookRouter::new(cfg, handles)
}

fn answer(delay_ms: u64, body: Value) -> Scripted {
    Scripted { delay: Duration::from_millis(delay_ms), reply: Ok(body) }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn eth() -> SymbolId {
    SymbolId::from("ETH-USDC")
}

#[tokio::test(start_paused = true)]
async fn slow_venue_is_excluded_within_deadline() {
    let cfg = config(&[("A", 1), ("B", 2), ("C", 3)]);
    let mut router = router(
        &cfg,
        vec![
            answer(50, okx(&[("100.00", "1")], &[("100.10", "1")])),
            answer(60_000, okx(&[("100.05", "9")], &[("100.06", "9")])),
            answer(300, okx(&[("99.90", "2")], &[("100.20", "2")])),
        ],
    );

    let report = router.run_cycle().await;
    assert!(report.elapsed <= Duration::from_millis(1010));

    let book = report.book(&eth()).unwrap();
    let venues: Vec<_> = book.venues().map(|v| v.as_str()).collect();
    assert_eq!(venues, vec!["A", "C"]);
    assert!(book.bids().iter().chain(book.asks()).all(|l| l.venue.as_str() != "B"));
    assert_eq!(book.degraded().len(), 1);
    assert_eq!(book.degraded()[0].venue, VenueId::from("B"));
    assert_eq!(book.degraded()[0].reason, DegradeReason::Fetch(FetchError::Timeout));
}

#[tokio::test(start_paused = true)]
async fn all_venues_timing_out_gives_empty_book() {
    let cfg = config(&[("A", 1), ("B", 2)]);
    let mut router = router(
        &cfg,
        vec![answer(5_000, okx(&[], &[])), answer(5_000, okx(&[], &[]))],
    );
    let report = router.run_cycle().await;
    assert!(report.elapsed <= Duration::from_millis(1010));

    let book = report.book(&eth()).unwrap();
    assert!(book.has_no_sources());
    assert!(book.bids().is_empty() && book.asks().is_empty());
    assert_eq!(book.degraded().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn two_venues_interleave_by_price() {
    let cfg = config(&[("X", 1), ("Y", 2)]);
    let mut router = router(
        &cfg,
        vec![
            answer(10, okx(&[("100.00", "1")], &[("100.05", "1")])),
            answer(20, okx(&[("100.01", "2")], &[("100.04", "2")])),
        ],
    );
    let report = router.run_cycle().await;
    let book = report.book(&eth()).unwrap();
    let bids: Vec<_> = book.bids().iter().map(|l| (l.price, l.venue.as_str())).collect();
    let asks: Vec<_> = book.asks().iter().map(|l| (l.price, l.venue.as_str())).collect();
    assert_eq!(bids, vec![(dec("100.01"), "Y"), (dec("100.00"), "X")]);
    assert_eq!(asks, vec![(dec("100.04"), "Y"), (dec("100.05"), "X")]);
    assert!(!book.is_crossed());
}

#[tokio::test(start_paused = true)]
async fn crossed_payload_is_rejected_by_normaliser() {
    let cfg = config(&[("X", 1), ("Z", 2)]);
    let mut router = router(
        &cfg,
        vec![
            answer(10, okx(&[("100.00", "1")], &[("100.05", "1")])),
            answer(10, okx(&[("50.10", "1")], &[("50.05", "1")])),
        ],
    );
    let report = router.run_cycle().await;
    let book = report.book(&eth()).unwrap();
    assert_eq!(book.venues().count(), 1);
    match &book.degraded()[0].reason {
        DegradeReason::Normalisation(e) => {
            assert_eq!(e.venue, VenueId::from("Z"));
            assert_eq!(e.cause, NormalisationCause::Crossed { bid: dec("50.10"), ask: dec("50.05") });
        }
        other => panic!("unexpected reason {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn tie_break_ignores_completion_order() {
    let cfg = config(&[("late", 2), ("early", 1), ("other", 2)]);
    let same = || okx(&[("100", "1"), ("99", "1")], &[("101", "1")]);
    let mut baseline: Option<Arc<combobook_rs::market_data::combined_book::CombinedBook>> = None;

    for _ in 0..16 {
        let scripts = {
            let mut rng = rand::thread_rng();
            (0..3).map(|_| answer(rng.gen_range(0..200), same())).collect()
        };
        let mut router = router(&cfg, scripts);
        let report = router.run_cycle().await;
        let book = report.book(&eth()).unwrap().clone();

        let top: Vec<_> = book.bids().iter().take(3).map(|l| l.venue.as_str()).collect();
        assert_eq!(top, vec!["early", "late", "other"]);
        let first = baseline.get_or_insert_with(|| book.clone());
        assert_eq!(**first, *book);
    }
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_isolated() {
    let cfg = config(&[("A", 1), ("B", 2)]);
    let mut router = router(
        &cfg,
        vec![
            answer(10, okx(&[("100", "1")], &[("101", "1")])),
            Scripted { delay: Duration::from_millis(10), reply: Err(TransportError::Status { status: 404 }) },
        ],
    );
    let report = router.run_cycle().await;
    let book = report.book(&eth()).unwrap();
    assert_eq!(book.venues().count(), 1);
    assert_eq!(
        book.degraded()[0].reason,
        DegradeReason::Fetch(FetchError::Transport(TransportError::Status { status: 404 }))
    );
}

#[derive(Clone, Default)]
struct Recording {
    cycles: Arc<Mutex<Vec<u64>>>,
    flushed: Arc<Mutex<bool>>,
}

#[async_trait]
impl BookSink for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&mut self, report: &CycleReport) -> PersistResult<()> {
        self.cycles.lock().push(report.cycle);
        Ok(())
    }

    async fn flush(&mut self) -> PersistResult<()> {
        *self.flushed.lock() = true;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn run_loop_stops_after_max_cycles() {
    let cfg = config(&[("A", 1)]);
    let mut router = router(&cfg, vec![answer(10, okx(&[("100", "1")], &[("101", "1")]))]);
    let sink = Recording::default();
    router.add_sink(Box::new(sink.clone()));
    let latest = router.latest();

    let (_tx, rx) = watch::channel(false);
    let ran = router.run(rx, Some(3)).await;

    assert_eq!(ran, 3);
    assert_eq!(*sink.cycles.lock(), vec![1, 2, 3]);
    assert!(*sink.flushed.lock());
    assert!(latest.is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_max_cycles_runs_nothing() {
    let cfg = config(&[("A", 1)]);
    let mut router = router(&cfg, vec![answer(10, okx(&[("100", "1")], &[("101", "1")]))]);
    let sink = Recording::default();
    router.add_sink(Box::new(sink.clone()));

    let (_tx, rx) = watch::channel(false);
    assert_eq!(router.run(rx, Some(0)).await, 0);
    assert_eq!(router.cycles_run(), 0);
    assert!(sink.cycles.lock().is_empty());
    assert!(*sink.flushed.lock());
}

#[tokio::test(start_paused = true)]
async fn latest_books_follow_each_cycle() {
    let cfg = config(&[("A", 1)]);
    let mut router = router(&cfg, vec![answer(10, okx(&[("100", "1")], &[("101", "1")]))]);
    let latest = router.latest();
    assert!(latest.get(&eth()).is_none());

    let report = router.run_cycle().await;
    let cached = latest.get(&eth()).unwrap();
    assert!(Arc::ptr_eq(&cached, &report.books[0]));
}

#[tokio::test(start_paused = true)]
async fn shutdown_signal_stops_run_loop() {
    let cfg = config(&[("A", 1)]);
    let mut router = router(&cfg, vec![answer(10, okx(&[("100", "1")], &[("101", "1")]))]);
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(async move { router.run(rx, None).await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    tx.send(true).unwrap();
    let ran = handle.await.unwrap();
    assert!(ran >= 1);
}
