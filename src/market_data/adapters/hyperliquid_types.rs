// Source: https://api.hyperliquid.xyz/info (POST {"type": "l2Book", "coin": "ETH"})
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct L2BookRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub coin: &'a str,
}

impl<'a> L2BookRequest<'a> {
    pub fn new(coin: &'a str) -> Self {
        Self { kind: "l2Book", coin }
    }
}

#[derive(Debug, Deserialize)]
pub struct L2Book {
    pub coin: String,
    pub levels: (Vec<L2Level>, Vec<L2Level>), // (bids, asks)
    pub time: i64,                             // ms since epoch
}

#[derive(Debug, Deserialize)]
pub struct L2Level {
    pub px: serde_json::Value, // price string, e.g. "1234.5"
    pub sz: serde_json::Value, // size string, e.g. "0.01"
    pub n: u32,                // number of orders at this level
}
