//! Merge per-venue books for one symbol into a `CombinedBook`.
//!
//! Bad inputs (missing, crossed, wrong symbol) are set aside as degraded sources and
//! never abort the merge. Equal prices from different venues keep separate entries,
//! ordered by configured priority rank, then declaration order, then the order in
//! which unknown venues were first seen.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use metrics::counter;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::config::{AppConfig, CombineConfig, VenueConfig};
use crate::engine::book::OrderBook;
use crate::engine::types::{PriceLevel, Side, SymbolId, VenueId};
use crate::market_data::combined_book::{CombinedBook, DegradeReason, DegradedSource};

/// Sort key for ties at one price. Lower is first.
type TieKey = (u32, usize, usize);

#[derive(Debug, Clone)]
struct RosterEntry {
    priority: u32,
    index: usize,
    taker_fee: Decimal,
}

/// The configured venues in declaration order, with what the merge needs of each.
#[derive(Debug, Clone, Default)]
pub struct VenueRoster {
    order: Vec<VenueId>,
    entries: HashMap<VenueId, RosterEntry>,
}

impl VenueRoster {
    pub fn from_venues<'a>(venues: impl IntoIterator<Item = &'a VenueConfig>) -> Self {
        let mut roster = Self::default();
        for (index, v) in venues.into_iter().enumerate() {
            roster.order.push(v.id.clone());
            roster.entries.insert(v.id.clone(), RosterEntry { priority: v.priority, index, taker_fee: v.taker_fee });
        }
        roster
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn taker_fee(&self, venue: &VenueId) -> Decimal {
        self.entries.get(venue).map(|e| e.taker_fee).unwrap_or_default()
    }

    // Unknown venues rank after every configured one.
    fn tie_key(&self, venue: &VenueId, first_seen: usize) -> TieKey {
        match self.entries.get(venue) {
            Some(e) => (e.priority, e.index, 0),
            None => (u32::MAX, usize::MAX, first_seen),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Combiner {
    roster: VenueRoster,
    apply_taker_fees: bool,
}

impl Combiner {
    pub fn new(roster: VenueRoster, options: &CombineConfig) -> Self {
        Self { roster, apply_taker_fees: options.apply_taker_fees }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(VenueRoster::from_venues(&cfg.venues), &cfg.combine)
    }

    pub fn roster(&self) -> &VenueRoster {
        &self.roster
    }

    /// Merge one cycle's per-venue outcomes for `symbol`.
    ///
    /// Configured venues absent from `sources` are reported as `Missing`.
    #[instrument(skip_all, fields(symbol = %symbol))]
    pub fn combine(
        &self,
        symbol: &SymbolId,
        sources: impl IntoIterator<Item = (VenueId, Result<OrderBook, DegradeReason>)>,
    ) -> CombinedBook {
        let mut degraded = Vec::new();
        let mut survivors: Vec<(TieKey, OrderBook)> = Vec::new();
        let mut seen: Vec<VenueId> = Vec::new();

        for (first_seen, (venue, outcome)) in sources.into_iter().enumerate() {
            seen.push(venue.clone());
            let book = match outcome.and_then(|book| self.admit(symbol, &venue, book)) {
                Ok(book) => book,
                Err(reason) => {
                    warn!(venue = %venue, reason = %reason, "Venue excluded from combined book");
                    counter!("combobook_degraded_total", "venue" => venue.to_string()).increment(1);
                    degraded.push(DegradedSource { venue, reason });
                    continue;
                }
            };
            survivors.push((self.roster.tie_key(&venue, first_seen), book));
        }

        for venue in &self.roster.order {
            if !seen.contains(venue) {
                degraded.push(DegradedSource { venue: venue.clone(), reason: DegradeReason::Missing });
            }
        }
        degraded.sort_by_key(|d| self.roster.tie_key(&d.venue, seen.iter().position(|v| v == &d.venue).unwrap_or(0)));

        if survivors.is_empty() {
            warn!(degraded = degraded.len(), "No surviving venues");
            return CombinedBook::empty(symbol.clone(), degraded);
        }

        let source_timestamps: BTreeMap<_, _> = survivors
            .iter()
            .map(|(_, book)| (book.venue().clone(), book.observed_at()))
            .collect();
        let bids = merge_side(&survivors, Side::Bid);
        let asks = merge_side(&survivors, Side::Ask);

        let combined = CombinedBook::from_parts(symbol.clone(), bids, asks, source_timestamps, degraded);
        if let Some(q) = combined.crossed() {
            warn!(bid = %q.bid.price, bid_venue = %q.bid.venue, ask = %q.ask.price, ask_venue = %q.ask.venue, "Combined book is crossed");
            counter!("combobook_crossed_books_total", "symbol" => symbol.to_string()).increment(1);
        }
        debug!(
            venues = combined.source_timestamps().len(),
            bid_levels = combined.bids().len(),
            ask_levels = combined.asks().len(),
            "Combined book built"
        );
        combined
    }

    fn admit(&self, symbol: &SymbolId, venue: &VenueId, book: OrderBook) -> Result<OrderBook, DegradeReason> {
        if book.symbol() != symbol {
            return Err(DegradeReason::SymbolMismatch { expected: symbol.clone(), found: book.symbol().clone() });
        }
        // Normalisers already refuse these; books built by hand can still be crossed.
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            if bid.price >= ask.price {
                return Err(DegradeReason::Crossed { bid: bid.price, ask: ask.price });
            }
        }
        if self.apply_taker_fees {
            return book.with_taker_fee(self.roster.taker_fee(venue)).ok_or(DegradeReason::FeeOverflow);
        }
        Ok(book)
    }
}

fn merge_side(survivors: &[(TieKey, OrderBook)], side: Side) -> Vec<PriceLevel> {
    survivors
        .iter()
        .map(|(key, book)| book.side(side).iter().map(move |lvl| (key, lvl)))
        .kmerge_by(|a, b| level_order(side, a, b) == Ordering::Less)
        .map(|(_, lvl)| lvl.clone())
        .collect()
}

// Total order: better price first, then the venue's tie key.
fn level_order(side: Side, a: &(&TieKey, &PriceLevel), b: &(&TieKey, &PriceLevel)) -> Ordering {
    let by_price = match side {
        Side::Bid => b.1.price.cmp(&a.1.price),
        Side::Ask => a.1.price.cmp(&b.1.price),
    };
    by_price.then_with(|| a.0.cmp(b.0))
}
