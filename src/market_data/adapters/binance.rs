// Binance spot REST depth: GET /api/v3/depth?symbol=ETHUSDC&limit=50
// {"lastUpdateId": 1027024, "bids": [["4.00000000", "431.00000000"]], "asks": [...]}
// The payload carries no timestamp, so the receive time stands in.

use serde::Deserialize;

use crate::config::VenueConfig;
use crate::engine::book::OrderBook;
use crate::engine::types::{SymbolId, Timestamp, VenueId};
use crate::market_data::adapters::RawPayload;
use crate::market_data::normaliser::{self, decode, NormalisationError, Normaliser, Precision};

#[derive(Debug, Deserialize)]
struct DepthSnapshot {
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
}

pub struct BinanceNormaliser {
    precision: Precision,
    depth: usize,
}

impl BinanceNormaliser {
    pub fn from_config(venue: &VenueConfig) -> Self {
        Self { precision: Precision::from_config(venue), depth: venue.depth }
    }
}

impl Normaliser for BinanceNormaliser {
    fn normalise(
        &self,
        raw: &RawPayload,
        venue: &VenueId,
        symbol: &SymbolId,
        observed_at: Timestamp,
    ) -> Result<OrderBook, NormalisationError> {
        let fail = |cause| NormalisationError::new(venue, cause);
        let snap: DepthSnapshot = decode(&raw.body).map_err(fail)?;
        let bids = self.precision.array_levels("bids", &snap.bids).map_err(fail)?;
        let asks = self.precision.array_levels("asks", &snap.asks).map_err(fail)?;
        normaliser::finish(venue, symbol, bids, asks, observed_at, &self.precision, self.depth)
    }
}
