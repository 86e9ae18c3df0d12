use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::book::Depth;
use crate::engine::ladder::{self, NettedLevel};
use crate::engine::types::{Fill, PriceLevel, Side, SymbolId, Timestamp, VenueId};
use crate::market_data::fetcher::FetchError;
use crate::market_data::normaliser::NormalisationError;

/// Why a venue contributed nothing to a combined book this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradeReason {
    #[error("fetch failed: {0}")]
    Fetch(FetchError),
    #[error("{0}")]
    Normalisation(NormalisationError),
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Decimal, ask: Decimal },
    #[error("taker fee pushes a price out of range")]
    FeeOverflow,
    #[error("book is for {found}, expected {expected}")]
    SymbolMismatch { expected: SymbolId, found: SymbolId },
    #[error("no result for this cycle")]
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedSource {
    pub venue: VenueId,
    pub reason: DegradeReason,
}

/// Best bid at or above best ask across venues. Reported, never repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossedQuote {
    pub bid: PriceLevel,
    pub ask: PriceLevel,
}

/// Conditions a reader should know about before trusting the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BookCondition {
    CombinedBookCrossed(CrossedQuote),
    NoSurvivingVenues,
}

/// Netted display view; see `CombinedBook::netted_depth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NettedDepth {
    pub bids: Vec<NettedLevel>,
    pub asks: Vec<NettedLevel>,
}

/// Every surviving venue's liquidity for one symbol, merged by price.
///
/// Same-price levels from different venues stay separate adjacent entries. The
/// value is rebuilt from scratch each cycle and shared behind an `Arc`; it holds
/// no wall-clock state of its own, so equal inputs give equal books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedBook {
    symbol: SymbolId,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
    source_timestamps: BTreeMap<VenueId, Timestamp>,
    degraded: Vec<DegradedSource>,
    crossed: Option<CrossedQuote>,
    no_sources: bool,
}

impl CombinedBook {
    pub(crate) fn from_parts(
        symbol: SymbolId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        source_timestamps: BTreeMap<VenueId, Timestamp>,
        degraded: Vec<DegradedSource>,
    ) -> Self {
        let crossed = match (bids.first(), asks.first()) {
            (Some(bid), Some(ask)) if bid.price >= ask.price => {
                Some(CrossedQuote { bid: bid.clone(), ask: ask.clone() })
            }
            _ => None,
        };
        let no_sources = source_timestamps.is_empty();
        Self { symbol, bids, asks, source_timestamps, degraded, crossed, no_sources }
    }

    /// Book with no surviving venues.
    pub fn empty(symbol: SymbolId, degraded: Vec<DegradedSource>) -> Self {
        Self::from_parts(symbol, Vec::new(), Vec::new(), BTreeMap::new(), degraded)
    }

    pub fn symbol(&self) -> &SymbolId {
        &self.symbol
    }

    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    pub fn side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// When each contributing venue produced its snapshot.
    pub fn source_timestamps(&self) -> &BTreeMap<VenueId, Timestamp> {
        &self.source_timestamps
    }

    pub fn venues(&self) -> impl Iterator<Item = &VenueId> {
        self.source_timestamps.keys()
    }

    pub fn degraded(&self) -> &[DegradedSource] {
        &self.degraded
    }

    pub fn crossed(&self) -> Option<&CrossedQuote> {
        self.crossed.as_ref()
    }

    pub fn is_crossed(&self) -> bool {
        self.crossed.is_some()
    }

    pub fn has_no_sources(&self) -> bool {
        self.no_sources
    }

    pub fn conditions(&self) -> Vec<BookCondition> {
        let mut out = Vec::new();
        if let Some(q) = &self.crossed {
            out.push(BookCondition::CombinedBookCrossed(q.clone()));
        }
        if self.no_sources {
            out.push(BookCondition::NoSurvivingVenues);
        }
        out
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price.checked_add(self.best_bid()?.price)? / Decimal::TWO)
    }

    /// First `n` venue-tagged entries per side.
    pub fn depth_at(&self, n: usize) -> Depth<'_> {
        Depth {
            bids: &self.bids[..n.min(self.bids.len())],
            asks: &self.asks[..n.min(self.asks.len())],
        }
    }

    /// First `n` distinct prices per side with same-price quantity summed across
    /// venues. The stored book is left untouched.
    pub fn netted_depth(&self, n: usize) -> NettedDepth {
        NettedDepth { bids: ladder::netted(&self.bids, n), asks: ladder::netted(&self.asks, n) }
    }

    pub fn total_quantity(&self, side: Side) -> Decimal {
        ladder::total_quantity(self.side(side))
    }

    /// Sweep the merged ladder for `base_qty`, crossing venues as needed.
    pub fn fill_base(&self, side: Side, base_qty: Decimal) -> Option<Fill> {
        ladder::fill_base(self.side(side), base_qty)
    }

    pub fn fill_quote(&self, side: Side, notional: Decimal) -> Option<Fill> {
        ladder::fill_quote(self.side(side), notional)
    }
}
