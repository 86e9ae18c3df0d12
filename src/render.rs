//! Plain-text ladder for the console.
//!
//! Asks are printed above bids, worst first, so the spread sits in the middle.

use std::fmt::Write as _;

use async_trait::async_trait;
use itertools::Itertools;

use crate::config::{NettingPolicy, OutputConfig};
use crate::engine::ladder::NettedLevel;
use crate::engine::types::PriceLevel;
use crate::market_data::combined_book::CombinedBook;
use crate::market_data::router::CycleReport;
use crate::persist::{BookSink, PersistResult};

struct Row {
    price: String,
    quantity: String,
    venues: String,
}

fn rows(book: &CombinedBook, depth: usize, netting: NettingPolicy) -> (Vec<Row>, Vec<Row>) {
    match netting {
        NettingPolicy::PerVenue => {
            let d = book.depth_at(depth);
            let to_rows = |levels: &[PriceLevel]| {
                levels
                    .iter()
                    .map(|l| Row { price: l.price.to_string(), quantity: l.quantity.to_string(), venues: l.venue.to_string() })
                    .collect::<Vec<_>>()
            };
            (to_rows(d.bids), to_rows(d.asks))
        }
        NettingPolicy::NetAcrossVenues => {
            let d = book.netted_depth(depth);
            let to_rows = |levels: Vec<NettedLevel>| {
                levels
                    .into_iter()
                    .map(|l| Row { price: l.price.to_string(), quantity: l.quantity.to_string(), venues: l.venues.iter().join(",") })
                    .collect::<Vec<_>>()
            };
            (to_rows(d.bids), to_rows(d.asks))
        }
    }
}

/// Render the top `depth` rows of each side.
pub fn render(book: &CombinedBook, depth: usize, netting: NettingPolicy) -> String {
    let mut out = String::new();
    let spread = book.spread().map(|s| s.to_string()).unwrap_or_else(|| "-".into());
    let mid = book.mid().map(|m| m.to_string()).unwrap_or_else(|| "-".into());
    let _ = writeln!(
        out,
        "{}  venues={} degraded={} spread={} mid={}",
        book.symbol(),
        book.source_timestamps().len(),
        book.degraded().len(),
        spread,
        mid
    );

    let (bids, asks) = rows(book, depth, netting);
    let pw = bids.iter().chain(&asks).map(|r| r.price.len()).max().unwrap_or(0).max(5);
    let qw = bids.iter().chain(&asks).map(|r| r.quantity.len()).max().unwrap_or(0).max(3);
    for r in asks.iter().rev() {
        let _ = writeln!(out, "  ASK {:>pw$} {:>qw$}  {}", r.price, r.quantity, r.venues);
    }
    let _ = writeln!(out, "  {}", "-".repeat(pw + qw + 6));
    for r in &bids {
        let _ = writeln!(out, "  BID {:>pw$} {:>qw$}  {}", r.price, r.quantity, r.venues);
    }

    if let Some(q) = book.crossed() {
        let _ = writeln!(out, "  ! crossed: bid {} ({}) >= ask {} ({})", q.bid.price, q.bid.venue, q.ask.price, q.ask.venue);
    }
    if book.has_no_sources() {
        let _ = writeln!(out, "  ! no surviving venues");
    }
    for d in book.degraded() {
        let _ = writeln!(out, "  ! {}: {}", d.venue, d.reason);
    }
    out
}

/// Prints every book of every cycle to stdout.
pub struct ConsoleSink {
    depth: usize,
    netting: NettingPolicy,
}

impl ConsoleSink {
    pub fn new(depth: usize, netting: NettingPolicy) -> Self {
        Self { depth, netting }
    }

    pub fn from_config(output: &OutputConfig, netting: NettingPolicy) -> Self {
        Self::new(output.render_depth, netting)
    }
}

#[async_trait]
impl BookSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn publish(&mut self, report: &CycleReport) -> PersistResult<()> {
        println!("=== cycle {} ({} ms) ===", report.cycle, report.elapsed.as_millis());
        for book in &report.books {
            println!("{}", render(book, self.depth, self.netting));
        }
        Ok(())
    }

    async fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}
