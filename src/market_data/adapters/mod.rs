// Shared transport trait + raw payload for venue adapters

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{VenueConfig, VenueKind};
use crate::engine::types::{SymbolId, Timestamp};
use crate::market_data::normaliser::Normaliser;

// Untouched venue response, as received
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub body: serde_json::Value,
    pub received_at: Timestamp,
}

impl RawPayload {
    pub fn new(body: serde_json::Value, received_at: Timestamp) -> Self {
        Self { body, received_at }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP status {status}")]
    Status { status: u16 },
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("could not decode response body: {0}")]
    Decode(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("no native symbol for {0}")]
    UnknownSymbol(SymbolId),
    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

impl TransportError {
    /// Worth another attempt within the same cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status { status } => *status == 429 || *status >= 500,
            TransportError::Connect(_) => true,
            _ => false,
        }
    }
}

/// Where raw snapshots come from. Implementations must be cancel-safe: the
/// fetcher drops the returned future when the cycle deadline passes.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn request_snapshot(&self, venue: &VenueConfig, symbol: &SymbolId) -> Result<RawPayload, TransportError>;
}

/// Pick the payload parser for a venue.
pub fn normaliser_for(venue: &VenueConfig) -> Box<dyn Normaliser> {
    match venue.kind {
        VenueKind::Binance => Box::new(binance::BinanceNormaliser::from_config(venue)),
        VenueKind::Okx => Box::new(okx::OkxNormaliser::from_config(venue)),
        VenueKind::Coinbase => Box::new(coinbase::CoinbaseNormaliser::from_config(venue)),
        VenueKind::Hyperliquid => Box::new(hyperliquid::HyperliquidNormaliser::from_config(venue)),
    }
}

pub mod binance;
pub mod coinbase;
pub mod http;
pub mod hyperliquid;
pub mod hyperliquid_types;
pub mod okx;
