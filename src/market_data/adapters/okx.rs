// OKX REST books: GET /api/v5/market/books?instId=ETH-USDC&sz=50
// {"code": "0", "msg": "", "data": [{"asks": [["41006.8", "0.6", "0", "1"]], "bids": [...], "ts": "1629966436396"}]}

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::VenueConfig;
use crate::engine::book::OrderBook;
use crate::engine::types::{SymbolId, Timestamp, VenueId};
use crate::market_data::adapters::RawPayload;
use crate::market_data::normaliser::{self, decode, NormalisationCause, NormalisationError, Normaliser, Precision};

#[derive(Debug, Deserialize)]
struct BooksResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<BookData>,
}

#[derive(Debug, Deserialize)]
struct BookData {
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
    ts: String,
}

pub struct OkxNormaliser {
    precision: Precision,
    depth: usize,
}

impl OkxNormaliser {
    pub fn from_config(venue: &VenueConfig) -> Self {
        Self { precision: Precision::from_config(venue), depth: venue.depth }
    }
}

fn parse_ts_ms(ts: &str) -> Result<Timestamp, NormalisationCause> {
    ts.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| NormalisationCause::NonNumeric { field: "ts".into(), value: ts.to_string() })
}

impl Normaliser for OkxNormaliser {
    fn normalise(
        &self,
        raw: &RawPayload,
        venue: &VenueId,
        symbol: &SymbolId,
        _observed_at: Timestamp,
    ) -> Result<OrderBook, NormalisationError> {
        let fail = |cause| NormalisationError::new(venue, cause);
        let resp: BooksResponse = decode(&raw.body).map_err(fail)?;
        if resp.code != "0" {
            return Err(fail(NormalisationCause::Rejected(format!("code {}: {}", resp.code, resp.msg))));
        }
        let book = resp
            .data
            .first()
            .ok_or_else(|| fail(NormalisationCause::MissingField("data".into())))?;

        let observed_at = parse_ts_ms(&book.ts).map_err(fail)?;
        let bids = self.precision.array_levels("bids", &book.bids).map_err(fail)?;
        let asks = self.precision.array_levels("asks", &book.asks).map_err(fail)?;
        normaliser::finish(venue, symbol, bids, asks, observed_at, &self.precision, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normaliser() -> OkxNormaliser {
        OkxNormaliser { precision: Precision::default(), depth: 50 }
    }

    #[test]
    fn test_normalise_uses_venue_timestamp() {
        let raw = RawPayload::new(
            json!({
                "code": "0",
                "msg": "",
                "data": [{
                    "asks": [["41006.8", "0.60038921", "0", "1"]],
                    "bids": [["41006.3", "0.30178218", "0", "2"]],
                    "ts": "1629966436396"
                }]
            }),
            Utc::now(),
        );
        let book = normaliser()
            .normalise(&raw, &VenueId::from("okx"), &SymbolId::from("BTC-USDT"), Utc::now())
            .unwrap();
        assert_eq!(book.observed_at().timestamp_millis(), 1_629_966_436_396);
        assert_eq!(book.bids().len(), 1);
        assert_eq!(book.asks().len(), 1);
    }

    #[test]
    fn test_error_code_is_rejected() {
        let raw = RawPayload::new(json!({"code": "51001", "msg": "Instrument ID does not exist", "data": []}), Utc::now());
        let err = normaliser()
            .normalise(&raw, &VenueId::from("okx"), &SymbolId::from("BTC-USDT"), Utc::now())
            .unwrap_err();
        assert!(matches!(err.cause, NormalisationCause::Rejected(_)));
    }

    #[test]
    fn test_empty_data() {
        let raw = RawPayload::new(json!({"code": "0", "msg": "", "data": []}), Utc::now());
        let err = normaliser()
            .normalise(&raw, &VenueId::from("okx"), &SymbolId::from("BTC-USDT"), Utc::now())
            .unwrap_err();
        assert_eq!(err.cause, NormalisationCause::MissingField("data".into()));
    }
}
