// Hyperliquid l2Book snapshot. Unlike the other venues the request is a POST
// to a single /info endpoint, with the coin in the JSON body.

use chrono::{DateTime, Utc};

use super::hyperliquid_types::{L2Book, L2Level};
use crate::config::VenueConfig;
use crate::engine::book::OrderBook;
use crate::engine::types::{RawLevel, SymbolId, Timestamp, VenueId};
use crate::market_data::adapters::RawPayload;
use crate::market_data::normaliser::{self, decode, NormalisationCause, NormalisationError, Normaliser, Precision};

pub struct HyperliquidNormaliser {
    precision: Precision,
    depth: usize,
    native: Vec<(SymbolId, String)>,
}

impl HyperliquidNormaliser {
    pub fn from_config(venue: &VenueConfig) -> Self {
        Self {
            precision: Precision::from_config(venue),
            depth: venue.depth,
            native: venue.symbols.iter().map(|m| (m.canonical.clone(), m.native.clone())).collect(),
        }
    }

    // Convert l2Book levels into raw (price, size) pairs
    fn norm_side(&self, field: &str, side: &[L2Level]) -> Result<Vec<RawLevel>, NormalisationCause> {
        side.iter()
            .map(|lvl| Ok(RawLevel::new(self.precision.price(field, &lvl.px)?, self.precision.size(field, &lvl.sz)?)))
            .collect()
    }
}

impl Normaliser for HyperliquidNormaliser {
    fn normalise(
        &self,
        raw: &RawPayload,
        venue: &VenueId,
        symbol: &SymbolId,
        _observed_at: Timestamp,
    ) -> Result<OrderBook, NormalisationError> {
        let fail = |cause| NormalisationError::new(venue, cause);
        // An unknown coin yields a bare `null`
        if raw.body.is_null() {
            return Err(fail(NormalisationCause::Rejected(format!("no l2Book for {symbol}"))));
        }
        let book: L2Book = decode(&raw.body).map_err(fail)?;

        if let Some((_, coin)) = self.native.iter().find(|(canonical, _)| canonical == symbol) {
            if coin != &book.coin {
                return Err(fail(NormalisationCause::Shape(format!("book is for {} not {coin}", book.coin))));
            }
        }

        let observed_at = DateTime::<Utc>::from_timestamp_millis(book.time)
            .ok_or_else(|| fail(NormalisationCause::NonNumeric { field: "time".into(), value: book.time.to_string() }))?;
        let bids = self.norm_side("bids", &book.levels.0).map_err(fail)?;
        let asks = self.norm_side("asks", &book.levels.1).map_err(fail)?;
        normaliser::finish(venue, symbol, bids, asks, observed_at, &self.precision, self.depth)
    }
}
