// Coinbase Exchange level 2 book: GET /products/ETH-USDC/book?level=2
// {"bids": [["2456.12", "0.5", 3]], "asks": [...], "sequence": 1, "auction_mode": false, "time": "2024-05-01T12:00:00.123Z"}
// Errors come back as {"message": "NotFound"} with a 4xx status, but some proxies
// strip the status so the body is checked too.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::VenueConfig;
use crate::engine::book::OrderBook;
use crate::engine::types::{SymbolId, Timestamp, VenueId};
use crate::market_data::adapters::RawPayload;
use crate::market_data::normaliser::{self, decode, NormalisationCause, NormalisationError, Normaliser, Precision};

#[derive(Debug, Deserialize)]
struct ProductBook {
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    auction_mode: Option<bool>,
    #[serde(default)]
    time: Option<String>,
}

pub struct CoinbaseNormaliser {
    precision: Precision,
    depth: usize,
}

impl CoinbaseNormaliser {
    pub fn from_config(venue: &VenueConfig) -> Self {
        Self { precision: Precision::from_config(venue), depth: venue.depth }
    }
}

impl Normaliser for CoinbaseNormaliser {
    fn normalise(
        &self,
        raw: &RawPayload,
        venue: &VenueId,
        symbol: &SymbolId,
        observed_at: Timestamp,
    ) -> Result<OrderBook, NormalisationError> {
        let fail = |cause| NormalisationError::new(venue, cause);

        if let Some(msg) = raw.body.get("message").and_then(|m| m.as_str()) {
            return Err(fail(NormalisationCause::Rejected(msg.to_string())));
        }
        let book: ProductBook = decode(&raw.body).map_err(fail)?;
        // Auction books are indicative only and routinely crossed.
        if book.auction_mode == Some(true) {
            return Err(fail(NormalisationCause::Rejected("product is in auction mode".into())));
        }

        let observed_at = match book.time.as_deref() {
            Some(t) => DateTime::parse_from_rfc3339(t)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| fail(NormalisationCause::NonNumeric { field: "time".into(), value: t.to_string() }))?,
            None => observed_at,
        };
        let bids = self.precision.array_levels("bids", &book.bids).map_err(fail)?;
        let asks = self.precision.array_levels("asks", &book.asks).map_err(fail)?;
        normaliser::finish(venue, symbol, bids, asks, observed_at, &self.precision, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn normaliser(depth: usize) -> CoinbaseNormaliser {
        CoinbaseNormaliser { precision: Precision::default(), depth }
    }

    fn normalise(n: &CoinbaseNormaliser, body: serde_json::Value) -> Result<OrderBook, NormalisationError> {
        n.normalise(
            &RawPayload::new(body, Utc::now()),
            &VenueId::from("coinbase"),
            &SymbolId::from("ETH-USDC"),
            Utc::now(),
        )
    }

    #[test]
    fn test_normalise_level2_book() {
        let book = normalise(
            &normaliser(1),
            json!({
                "bids": [["2456.12", "0.5", 3], ["2456.10", "1.25", 1]],
                "asks": [["2456.20", "2", 4]],
                "sequence": 13051505638u64,
                "auction_mode": false,
                "auction": null,
                "time": "2024-05-01T12:00:00.123Z"
            }),
        )
        .unwrap();
        assert_eq!(book.bids().len(), 1);
        assert_eq!(book.best_bid().unwrap().price, Decimal::from_str("2456.12").unwrap());
        assert_eq!(book.observed_at().timestamp_millis(), 1_714_564_800_123);
    }

    #[test]
    fn test_error_message_is_rejected() {
        let err = normalise(&normaliser(50), json!({"message": "NotFound"})).unwrap_err();
        assert_eq!(err.cause, NormalisationCause::Rejected("NotFound".into()));
    }

    #[test]
    fn test_auction_mode_is_rejected() {
        let err = normalise(
            &normaliser(50),
            json!({"bids": [["10", "1", 1]], "asks": [["9", "1", 1]], "auction_mode": true}),
        )
        .unwrap_err();
        assert!(matches!(err.cause, NormalisationCause::Rejected(_)));
    }

    #[test]
    fn test_missing_time_keeps_observed_at() {
        let now = Utc::now();
        let book = normaliser(50)
            .normalise(
                &RawPayload::new(json!({"bids": [], "asks": [["10", "1", 1]]}), now),
                &VenueId::from("coinbase"),
                &SymbolId::from("ETH-USDC"),
                now,
            )
            .unwrap();
        assert_eq!(book.observed_at(), now);
    }
}
