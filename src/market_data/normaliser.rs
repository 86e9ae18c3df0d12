// Convert venue payloads into canonical order books.
// One implementation per venue kind lives under `adapters`; everything shared
// (decimal parsing, precision, the crossed-book gate) is here.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::VenueConfig;
use crate::engine::book::OrderBook;
use crate::engine::types::{MalformedLevelError, RawLevel, Side, SymbolId, Timestamp, VenueId};
use crate::market_data::adapters::RawPayload;

/// Pure, synchronous payload -> book conversion for one venue's wire shape.
pub trait Normaliser: Send + Sync {
    fn normalise(
        &self,
        raw: &RawPayload,
        venue: &VenueId,
        symbol: &SymbolId,
        observed_at: Timestamp,
    ) -> Result<OrderBook, NormalisationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("normalisation failed for {venue}: {cause}")]
pub struct NormalisationError {
    pub venue: VenueId,
    pub cause: NormalisationCause,
}

impl NormalisationError {
    pub fn new(venue: &VenueId, cause: NormalisationCause) -> Self {
        Self { venue: venue.clone(), cause }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum NormalisationCause {
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{field}` is not numeric: {value}")]
    NonNumeric { field: String, value: String },
    #[error("field `{field}` is out of range: {value}")]
    OutOfRange { field: String, value: Decimal },
    #[error("unexpected payload shape: {0}")]
    Shape(String),
    #[error(transparent)]
    Malformed(#[from] MalformedLevelError),
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Decimal, ask: Decimal },
    #[error("venue rejected the request: {0}")]
    Rejected(String),
}

/// Largest price or size accepted from a venue. Keeps price * size and the
/// fee and mid arithmetic well inside `Decimal` range.
pub fn max_wire_value() -> Decimal {
    Decimal::from(10_000_000_000_000u64)
}

/// Price/size precision of one venue. `None` keeps the wire value as is;
/// otherwise extra digits are truncated, never rounded up.
///
/// Sizes are truncated as they are parsed. Prices are parsed exactly and moved
/// onto the price grid in `to_grid`, once the whole side is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Precision {
    pub price_decimals: Option<u32>,
    pub size_decimals: Option<u32>,
}

impl Precision {
    pub fn from_config(venue: &VenueConfig) -> Self {
        Self { price_decimals: venue.price_decimals, size_decimals: venue.size_decimals }
    }

    pub fn price(&self, field: &str, value: &serde_json::Value) -> Result<Decimal, NormalisationCause> {
        parse_number(field, value).and_then(|d| bounded(field, d))
    }

    pub fn size(&self, field: &str, value: &serde_json::Value) -> Result<Decimal, NormalisationCause> {
        parse_number(field, value)
            .and_then(|d| bounded(field, d))
            .map(|d| truncate(d, self.size_decimals))
    }

    /// `[price, size, ...]` arrays as used by most REST depth endpoints.
    pub fn array_levels(&self, field: &str, levels: &[Vec<serde_json::Value>]) -> Result<Vec<RawLevel>, NormalisationCause> {
        levels
            .iter()
            .map(|lvl| match lvl.as_slice() {
                [px, sz, ..] => Ok(RawLevel::new(self.price(field, px)?, self.size(field, sz)?)),
                _ => Err(NormalisationCause::Shape(format!("{field} level has {} elements", lvl.len()))),
            })
            .collect()
    }

    /// Truncate prices to `price_decimals`.
    ///
    /// A wire price repeated with a different size is still ambiguous and
    /// rejected. Distinct wire prices that land on the same truncated price
    /// are summed into one level.
    pub fn to_grid(&self, side: Side, levels: Vec<RawLevel>) -> Result<Vec<RawLevel>, MalformedLevelError> {
        let Some(dp) = self.price_decimals else {
            return Ok(levels);
        };

        let mut wire: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        for lvl in levels {
            match wire.entry(lvl.price) {
                Entry::Vacant(slot) => {
                    slot.insert(lvl.quantity);
                }
                Entry::Occupied(slot) => {
                    if *slot.get() != lvl.quantity {
                        return Err(MalformedLevelError::ConflictingQuantity {
                            side,
                            price: *slot.key(),
                            first: *slot.get(),
                            second: lvl.quantity,
                        });
                    }
                }
            }
        }

        let mut grid: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        for (price, quantity) in wire {
            // empty levels must not add to a neighbour
            if quantity <= Decimal::ZERO {
                continue;
            }
            *grid.entry(truncate(price, Some(dp))).or_default() += quantity;
        }
        Ok(grid.into_iter().map(|(price, quantity)| RawLevel::new(price, quantity)).collect())
    }
}

fn truncate(d: Decimal, dp: Option<u32>) -> Decimal {
    match dp {
        Some(dp) => d.round_dp_with_strategy(dp, RoundingStrategy::ToZero),
        None => d,
    }
}

fn bounded(field: &str, d: Decimal) -> Result<Decimal, NormalisationCause> {
    if d.abs() > max_wire_value() {
        return Err(NormalisationCause::OutOfRange { field: field.to_string(), value: d });
    }
    Ok(d)
}

/// Accepts `"1234.56"`, `1234.56` and scientific strings such as `"1e-8"`.
pub fn parse_number(field: &str, value: &serde_json::Value) -> Result<Decimal, NormalisationCause> {
    let non_numeric = || NormalisationCause::NonNumeric { field: field.to_string(), value: value.to_string() };
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return Err(non_numeric()),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| non_numeric())
}

/// Deserialize a venue body, keeping "missing field" apart from other shape errors.
pub fn decode<T: DeserializeOwned>(body: &serde_json::Value) -> Result<T, NormalisationCause> {
    T::deserialize(body).map_err(|e| {
        let msg = e.to_string();
        match msg.strip_prefix("missing field `").and_then(|rest| rest.split('`').next()) {
            Some(field) => NormalisationCause::MissingField(field.to_string()),
            None => NormalisationCause::Shape(msg),
        }
    })
}

/// Put prices on the venue's grid, build the book, cut it to `depth` and refuse
/// a crossed result.
pub fn finish(
    venue: &VenueId,
    symbol: &SymbolId,
    bids: Vec<RawLevel>,
    asks: Vec<RawLevel>,
    observed_at: Timestamp,
    precision: &Precision,
    depth: usize,
) -> Result<OrderBook, NormalisationError> {
    let malformed = |e: MalformedLevelError| NormalisationError::new(venue, e.into());
    let bids = precision.to_grid(Side::Bid, bids).map_err(malformed)?;
    let asks = precision.to_grid(Side::Ask, asks).map_err(malformed)?;
    let book = OrderBook::new(venue.clone(), symbol.clone(), bids, asks, observed_at)
        .map_err(|e| NormalisationError::new(venue, e.into()))?
        .truncated(depth);

    if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
        if bid.price >= ask.price {
            return Err(NormalisationError::new(
                venue,
                NormalisationCause::Crossed { bid: bid.price, ask: ask.price },
            ));
        }
    }
    debug!(venue = %venue, symbol = %symbol, bids = book.bids().len(), asks = book.asks().len(), "Normalised snapshot");
    Ok(book)
}
