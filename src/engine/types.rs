use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

// Venue identifier as configured (e.g. "binance")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

// Canonical instrument identifier (e.g. "ETH-USDC")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(String);

macro_rules! string_id {
    ($t:ident) => {
        impl $t {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $t {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $t {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(VenueId);
string_id!(SymbolId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// True when `a` ranks ahead of `b` on this side of the book.
    pub fn is_better(self, a: Decimal, b: Decimal) -> bool {
        match self {
            Side::Bid => a > b,
            Side::Ask => a < b,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => f.write_str("bids"),
            Side::Ask => f.write_str("asks"),
        }
    }
}

// Unsorted (price, quantity) pair as read off the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl RawLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

// One venue's liquidity at one price; quantity is always > 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
    pub venue: VenueId,
}

impl PriceLevel {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// A raw snapshot side could not be turned into a ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum MalformedLevelError {
    #[error("{side} price {price} repeats with conflicting quantities {first} and {second}")]
    ConflictingQuantity {
        side: Side,
        price: Decimal,
        first: Decimal,
        second: Decimal,
    },
    #[error("{side} level has non-positive price {price}")]
    NonPositivePrice { side: Side, price: Decimal },
}

/// Result of walking a ladder to fill a target amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fill {
    pub average_price: Decimal,
    pub base_filled: Decimal,
    pub quote_filled: Decimal,
    /// The ladder ran out before the target was reached.
    pub exhausted: bool,
}
