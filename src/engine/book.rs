use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::engine::ladder;
use crate::engine::types::{Fill, MalformedLevelError, PriceLevel, RawLevel, Side, SymbolId, Timestamp, VenueId};

/// Both sides of a book, truncated to a requested depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Depth<'a> {
    pub bids: &'a [PriceLevel],
    pub asks: &'a [PriceLevel],
}

/// One venue's ladder for one symbol at one instant.
///
/// Built once from a normalised snapshot and never mutated afterwards; the next
/// snapshot for the same venue produces a new book. A crossed book can be
/// represented so that it can be detected, but normalisers refuse to emit one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBook {
    venue: VenueId,
    symbol: SymbolId,
    bids: Vec<PriceLevel>, // highest price = best bid
    asks: Vec<PriceLevel>, // lowest price  = best ask
    observed_at: Timestamp,
}

impl OrderBook {
    #[instrument(level = "debug", skip_all, fields(venue = %venue, symbol = %symbol))]
    pub fn new(
        venue: VenueId,
        symbol: SymbolId,
        bids: impl IntoIterator<Item = RawLevel>,
        asks: impl IntoIterator<Item = RawLevel>,
        observed_at: Timestamp,
    ) -> Result<Self, MalformedLevelError> {
        let bids = ladder::build(bids, Side::Bid, &venue)?;
        let asks = ladder::build(asks, Side::Ask, &venue)?;
        debug!(bid_levels = bids.len(), ask_levels = asks.len(), "Built order book");
        Ok(Self { venue, symbol, bids, asks, observed_at })
    }

    /// Keep at most `depth` levels per side.
    pub fn truncated(mut self, depth: usize) -> Self {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
        self
    }

    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    pub fn symbol(&self) -> &SymbolId {
        &self.symbol
    }

    pub fn observed_at(&self) -> Timestamp {
        self.observed_at
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

    #[instrument(level = "trace", skip(self))]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        let best = self.bids.first();
        trace!(price = ?best.map(|l| l.price), "Best bid");
        best
    }

    #[instrument(level = "trace", skip(self))]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        let best = self.asks.first();
        trace!(price = ?best.map(|l| l.price), "Best ask");
        best
    }

    pub fn depth_at(&self, n: usize) -> Depth<'_> {
        Depth {
            bids: &self.bids[..n.min(self.bids.len())],
            asks: &self.asks[..n.min(self.asks.len())],
        }
    }

    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(ask.price - bid.price)
    }

    pub fn mid(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(ask.price.checked_add(bid.price)? / Decimal::TWO)
    }

    pub fn total_quantity(&self, side: Side) -> Decimal {
        ladder::total_quantity(self.side(side))
    }

    /// Prices as a taker sees them after paying `fee` (a fraction, e.g. 0.001).
    /// Selling into bids yields less, buying from asks costs more. `None` if an
    /// adjusted price does not fit in a `Decimal`.
    pub fn with_taker_fee(&self, fee: Decimal) -> Option<Self> {
        if fee.is_zero() {
            return Some(self.clone());
        }
        let adjust = |levels: &[PriceLevel], factor: Decimal| -> Option<Vec<PriceLevel>> {
            levels
                .iter()
                .map(|lvl| Some(PriceLevel { price: lvl.price.checked_mul(factor)?.normalize(), ..lvl.clone() }))
                .collect()
        };
        Some(Self {
            venue: self.venue.clone(),
            symbol: self.symbol.clone(),
            bids: adjust(&self.bids, Decimal::ONE.checked_sub(fee)?)?,
            asks: adjust(&self.asks, Decimal::ONE.checked_add(fee)?)?,
            observed_at: self.observed_at,
        })
    }

    /// Average price for taking `base_qty` from `side`.
    pub fn fill_base(&self, side: Side, base_qty: Decimal) -> Option<Fill> {
        ladder::fill_base(self.side(side), base_qty)
    }

    /// Average price for spending `notional` of the quote asset against `side`.
    pub fn fill_quote(&self, side: Side, notional: Decimal) -> Option<Fill> {
        ladder::fill_quote(self.side(side), notional)
    }
}
