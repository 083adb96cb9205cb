use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Asset class a ticker feed covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Spot,
    Futures,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Spot => "spot",
            AssetType::Futures => "futures",
        }
    }
}

/// Capability an exchange advertises or is inferred to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeCapability {
    SpotTrading,
    FuturesTrading,
    OptionsTrading,
    OrderBook,
    PriceData,
    TradingHistory,
    WebsocketStreams,
}

/// Static or discovered description of one exchange: where to fetch tickers,
/// how to parse them, and how hard we may hit the API.
///
/// At least one of `spot_url` / `futures_url` must be populated for the
/// exchange to participate in discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeDescriptor {
    pub id: String,
    pub name: String,
    pub spot_url: Option<String>,
    pub futures_url: Option<String>,
    /// Key into the ticker parser registry.
    pub parser: String,
    pub rate_limit_per_minute: u32,
    /// Lower number wins best-quote tie-breaks.
    pub priority: u8,
    #[serde(default)]
    pub capabilities: BTreeSet<ExchangeCapability>,
    /// Registry-reported 24h volume; populated for discovered venues only.
    #[serde(default)]
    pub volume_24h_btc: Option<f64>,
}

impl ExchangeDescriptor {
    pub fn url_for(&self, asset_type: AssetType) -> Option<&str> {
        match asset_type {
            AssetType::Spot => self.spot_url.as_deref(),
            AssetType::Futures => self.futures_url.as_deref(),
        }
    }

    pub fn has_feed(&self) -> bool {
        self.spot_url.is_some() || self.futures_url.is_some()
    }

    pub fn supports(&self, capability: ExchangeCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Filter for `ExchangeRegistry::list_exchanges`.
#[derive(Debug, Clone, Default)]
pub struct ExchangeFilter {
    pub required_capabilities: Vec<ExchangeCapability>,
    pub min_volume_24h_btc: Option<f64>,
}

/// Exchange account row read from the platform database. This core only ever
/// reads these; account lifecycle is owned elsewhere.
#[derive(Debug, Clone)]
pub struct ExchangeAccount {
    pub user_id: String,
    pub exchange_name: String,
    pub status: String,
    pub trading_enabled: bool,
    pub allowed_symbols: Vec<String>,
}

impl ExchangeAccount {
    pub fn is_usable(&self) -> bool {
        self.status.eq_ignore_ascii_case("active") && self.trading_enabled
    }
}
