//! Process configuration.
//!
//! Loaded once at startup from a TOML file plus `COMBOBOOK_*` environment
//! overrides (nested keys separated by `__`, e.g. `COMBOBOOK_FETCH__CYCLE_TIMEOUT_MS`).
//! Anything structurally wrong is reported here, before the first cycle runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::types::{SymbolId, VenueId};

pub const ENV_PREFIX: &str = "COMBOBOOK";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("no venues configured")]
    NoVenues,
    #[error("no symbols configured")]
    NoSymbols,
    #[error("venue {0} is configured more than once")]
    DuplicateVenue(VenueId),
    #[error("venue {venue} has no mapping for symbol {symbol}")]
    MissingSymbolMapping { venue: VenueId, symbol: SymbolId },
    #[error("venue {venue}: {reason}")]
    InvalidVenue { venue: VenueId, reason: String },
    #[error("invalid fetch settings: {0}")]
    InvalidFetch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    Binance,
    Okx,
    Coinbase,
    Hyperliquid,
}

/// Canonical symbol -> the venue's own instrument name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMapping {
    pub canonical: SymbolId,
    pub native: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub id: VenueId,
    pub kind: VenueKind,
    /// URL template; `{symbol}` and `{depth}` are substituted per request.
    pub endpoint: String,
    /// Lower rank wins ties between venues quoting the same price.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub symbols: Vec<SymbolMapping>,
    #[serde(default)]
    pub taker_fee: Decimal,
    #[serde(default)]
    pub price_decimals: Option<u32>,
    #[serde(default)]
    pub size_decimals: Option<u32>,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl VenueConfig {
    /// A venue with default priority, depth and timeout and no symbols mapped yet.
    pub fn new(id: impl Into<VenueId>, kind: VenueKind, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            endpoint: endpoint.into(),
            priority: default_priority(),
            symbols: Vec::new(),
            taker_fee: Decimal::ZERO,
            price_decimals: None,
            size_decimals: None,
            depth: default_depth(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    pub fn with_symbol(mut self, canonical: impl Into<SymbolId>, native: impl Into<String>) -> Self {
        self.symbols.push(SymbolMapping { canonical: canonical.into(), native: native.into() });
        self
    }

    pub fn native_symbol(&self, symbol: &SymbolId) -> Option<&str> {
        self.symbols
            .iter()
            .find(|m| &m.canonical == symbol)
            .map(|m| m.native.as_str())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Endpoint with `{symbol}` and `{depth}` filled in.
    pub fn url_for(&self, native_symbol: &str) -> String {
        self.endpoint
            .replace("{symbol}", native_symbol)
            .replace("{depth}", &self.depth.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Shared per-cycle deadline for every venue request.
    #[serde(default = "default_cycle_timeout_ms")]
    pub cycle_timeout_ms: u64,
    /// Pause between the start of two cycles.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl FetchConfig {
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cycle_timeout_ms: default_cycle_timeout_ms(),
            interval_ms: default_interval_ms(),
            retries: default_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            jitter: true,
        }
    }
}

/// Whether same-price liquidity from different venues is shown as one level.
/// The combined book itself always keeps venues apart; this only affects views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NettingPolicy {
    #[default]
    PerVenue,
    NetAcrossVenues,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombineConfig {
    /// Merge prices as a taker sees them, after each venue's taker fee.
    #[serde(default)]
    pub apply_taker_fees: bool,
    #[serde(default)]
    pub netting: NettingPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub render: bool,
    #[serde(default = "default_render_depth")]
    pub render_depth: usize,
    /// Append combined books to this JSON file when set.
    #[serde(default)]
    pub json_path: Option<PathBuf>,
    /// Number of books buffered before each write.
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            render: true,
            render_depth: default_render_depth(),
            json_path: None,
            save_every: default_save_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub symbols: Vec<SymbolId>,
    pub venues: Vec<VenueConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub combine: CombineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load from `path` (any format the `config` crate recognises by extension)
    /// with environment overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"))
            .build()?;
        let cfg: AppConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        let cfg: AppConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.venues.is_empty() {
            return Err(ConfigError::NoVenues);
        }
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if self.fetch.cycle_timeout_ms == 0 {
            return Err(ConfigError::InvalidFetch("cycle_timeout_ms must be positive".into()));
        }

        let mut seen = HashSet::new();
        for venue in &self.venues {
            if !seen.insert(&venue.id) {
                return Err(ConfigError::DuplicateVenue(venue.id.clone()));
            }
            if !venue.endpoint.contains("{symbol}") && venue.kind != VenueKind::Hyperliquid {
                return Err(ConfigError::InvalidVenue {
                    venue: venue.id.clone(),
                    reason: "endpoint has no {symbol} placeholder".into(),
                });
            }
            if venue.taker_fee < Decimal::ZERO || venue.taker_fee >= Decimal::ONE {
                return Err(ConfigError::InvalidVenue {
                    venue: venue.id.clone(),
                    reason: format!("taker fee {} outside [0, 1)", venue.taker_fee),
                });
            }
            if venue.depth == 0 {
                return Err(ConfigError::InvalidVenue {
                    venue: venue.id.clone(),
                    reason: "depth must be positive".into(),
                });
            }
            for symbol in &self.symbols {
                if venue.native_symbol(symbol).is_none() {
                    return Err(ConfigError::MissingSymbolMapping {
                        venue: venue.id.clone(),
                        symbol: symbol.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn venue(&self, id: &VenueId) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| &v.id == id)
    }
}

fn default_priority() -> u32 {
    100
}
fn default_depth() -> usize {
    50
}
fn default_request_timeout_ms() -> u64 {
    2_000
}
fn default_cycle_timeout_ms() -> u64 {
    3_000
}
fn default_interval_ms() -> u64 {
    5_000
}
fn default_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_render_depth() -> usize {
    10
}
fn default_save_every() -> usize {
    20
}
fn default_true() -> bool {
    true
}
