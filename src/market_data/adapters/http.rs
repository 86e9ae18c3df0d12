// reqwest-backed SnapshotSource used by the binary

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use super::hyperliquid_types::L2BookRequest;
use super::{RawPayload, SnapshotSource, TransportError};
use crate::config::{VenueConfig, VenueKind};
use crate::engine::types::SymbolId;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(map_reqwest)?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if let Some(status) = e.status() {
        TransportError::Status { status: status.as_u16() }
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    #[instrument(level = "debug", skip_all, fields(venue = %venue.id, symbol = %symbol))]
    async fn request_snapshot(&self, venue: &VenueConfig, symbol: &SymbolId) -> Result<RawPayload, TransportError> {
        let native = venue
            .native_symbol(symbol)
            .ok_or_else(|| TransportError::UnknownSymbol(symbol.clone()))?;

        let request = match venue.kind {
            VenueKind::Hyperliquid => self.client.post(&venue.endpoint).json(&L2BookRequest::new(native)),
            VenueKind::Binance | VenueKind::Okx | VenueKind::Coinbase => self.client.get(venue.url_for(native)),
        };

        let resp = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(map_reqwest)?;
        let body: serde_json::Value = resp.json().await.map_err(map_reqwest)?;
        debug!("Received snapshot");
        Ok(RawPayload::new(body, Utc::now()))
    }
}
