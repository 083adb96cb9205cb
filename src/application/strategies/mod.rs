//! Strategy execution router.
//!
//! One entry point, `execute_strategy`, dispatches to every recognized
//! strategy function and always returns the uniform envelope. Backends do
//! deterministic signal math over shared price snapshots; they never place
//! orders here and never invent a price that upstream did not report.

mod algorithmic;
mod derivatives;
mod management;
mod spot;

use crate::application::prices::PriceService;
use crate::domain::envelope::{JsonMap, PriceSnapshot, StrategyEnvelope, StrategyRequest};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Complete list of recognized router functions.
pub const AVAILABLE_FUNCTIONS: [&str; 25] = [
    "futures_trade",
    "options_trade",
    "perpetual_trade",
    "complex_strategy",
    "spot_momentum_strategy",
    "spot_mean_reversion",
    "spot_breakout_strategy",
    "algorithmic_trading",
    "pairs_trading",
    "statistical_arbitrage",
    "market_making",
    "scalping_strategy",
    "swing_trading",
    "position_management",
    "risk_management",
    "portfolio_optimization",
    "strategy_performance",
    "funding_arbitrage",
    "calculate_greeks",
    "leverage_position",
    "margin_status",
    "options_chain",
    "basis_trade",
    "liquidation_price",
    "hedge_position",
];

pub struct StrategyRouter {
    prices: Arc<PriceService>,
}

impl StrategyRouter {
    pub fn new(prices: Arc<PriceService>) -> Self {
        StrategyRouter { prices }
    }

    pub fn prices(&self) -> &Arc<PriceService> {
        &self.prices
    }

    /// Main strategy execution router - handles all recognized functions.
    pub async fn execute_strategy(&self, request: &StrategyRequest) -> StrategyEnvelope {
        debug!(
            function = %request.function,
            symbol = request.symbol.as_deref().unwrap_or("-"),
            simulation = request.simulation_mode,
            "Executing strategy"
        );

        match request.function.as_str() {
            "spot_momentum_strategy" => spot::momentum(self, request).await,
            "spot_mean_reversion" => spot::mean_reversion(self, request).await,
            "spot_breakout_strategy" => spot::breakout(self, request).await,

            "algorithmic_trading" => algorithmic::algorithmic_trading(self, request).await,
            "pairs_trading" => algorithmic::pairs_trading(self, request).await,
            "statistical_arbitrage" => algorithmic::statistical_arbitrage(self, request).await,
            "market_making" => algorithmic::market_making(self, request).await,
            "scalping_strategy" => algorithmic::scalping(self, request).await,
            "swing_trading" => algorithmic::swing_trading(self, request).await,

            "futures_trade" => derivatives::futures_trade(self, request).await,
            "perpetual_trade" => derivatives::perpetual_trade(self, request).await,
            "options_trade" => derivatives::options_trade(self, request).await,
            "complex_strategy" => derivatives::complex_strategy(self, request).await,
            "calculate_greeks" => derivatives::calculate_greeks(self, request).await,
            "options_chain" => derivatives::options_chain(self, request).await,
            "basis_trade" => derivatives::basis_trade(self, request).await,
            "liquidation_price" => derivatives::liquidation_price(self, request).await,
            "leverage_position" => derivatives::leverage_position(self, request).await,
            "margin_status" => derivatives::margin_status(self, request).await,
            "funding_arbitrage" => derivatives::funding_arbitrage(self, request).await,
            "hedge_position" => derivatives::hedge_position(self, request).await,

            "position_management" => management::position_management(self, request).await,
            "risk_management" => management::risk_management(self, request).await,
            "portfolio_optimization" => management::portfolio_optimization(self, request).await,
            "strategy_performance" => management::strategy_performance(self, request).await,

            unknown => StrategyEnvelope::unknown_function(unknown, &AVAILABLE_FUNCTIONS),
        }
    }

    /// Per-backend availability report.
    pub async fn health_check(&self) -> JsonMap {
        let mut report = JsonMap::new();
        report.insert("status".into(), json!("healthy"));
        report.insert(
            "available_functions".into(),
            json!(AVAILABLE_FUNCTIONS.to_vec()),
        );
        report.insert("function_count".into(), json!(AVAILABLE_FUNCTIONS.len()));
        report
    }

    /// Canonical price snapshot for the request's `(exchange, symbol)`.
    /// Missing upstream data yields a failure envelope, never a made-up
    /// price.
    pub(crate) async fn snapshot(
        &self,
        request: &StrategyRequest,
    ) -> Result<PriceSnapshot, Box<StrategyEnvelope>> {
        let exchange = request.exchange.as_deref().unwrap_or("binance");
        let Some(symbol) = request.base_symbol() else {
            return Err(Box::new(StrategyEnvelope::failure(
                &request.function,
                "Symbol required",
            )));
        };

        match self.prices.get(exchange, symbol).await {
            Some(snapshot) if snapshot.current > 0.0 => Ok(snapshot),
            _ => Err(Box::new(StrategyEnvelope::failure(
                &request.function,
                format!("Price unavailable for {}", symbol),
            ))),
        }
    }
}

/// Where the last price sits inside the 24h range, [0, 1]. 0.5 when the
/// range is degenerate.
pub(crate) fn range_position(snapshot: &PriceSnapshot) -> f64 {
    match (snapshot.low_24h, snapshot.high_24h) {
        (Some(low), Some(high)) if high > low => {
            ((snapshot.current - low) / (high - low)).clamp(0.0, 1.0)
        }
        _ => 0.5,
    }
}

/// 24h range as a fraction of the current price; the backends' volatility
/// proxy.
pub(crate) fn range_fraction(snapshot: &PriceSnapshot) -> f64 {
    match (snapshot.low_24h, snapshot.high_24h) {
        (Some(low), Some(high)) if high > low && snapshot.current > 0.0 => {
            ((high - low) / snapshot.current).max(0.0)
        }
        _ => 0.0,
    }
}

pub(crate) fn change_pct(snapshot: &PriceSnapshot) -> f64 {
    snapshot.change_24h_pct.unwrap_or(0.0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::asset::{Asset, Tier};
    use crate::domain::ports::CacheStore;
    use crate::infrastructure::cache::MemoryCache;
    use crate::infrastructure::core::http_client_factory::HttpClientFactory;
    use crate::infrastructure::exchanges::{ExchangeRegistry, TickerFetcher};
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    pub fn asset_with(
        symbol: &str,
        price: f64,
        volume: f64,
        high: f64,
        low: f64,
        change_pct: f64,
    ) -> Asset {
        let mut metadata = serde_json::Map::new();
        metadata.insert("high_24h".into(), json!(high));
        metadata.insert("low_24h".into(), json!(low));
        metadata.insert("price_change_pct".into(), json!(change_pct));
        Asset {
            symbol: symbol.into(),
            exchange: "binance".into(),
            quote_currency: "USDT".into(),
            volume_24h_usd: volume,
            price_usd: price,
            market_cap_usd: None,
            tier: Tier::classify(volume),
            last_updated: Utc::now(),
            metadata,
        }
    }

    /// Router over an unreachable exchange endpoint: every price the test
    /// did not preload is deterministically absent.
    pub async fn router_with_assets(assets: &[Asset]) -> StrategyRouter {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let fetcher = Arc::new(TickerFetcher::new(
            HttpClientFactory::create_client(Duration::from_millis(50)),
            cache.clone(),
            Duration::from_millis(50),
            Duration::from_secs(60),
            Duration::from_secs(300),
        ));
        let registry = ExchangeRegistry::from_descriptors(vec![
            crate::domain::exchange::ExchangeDescriptor {
                id: "binance".into(),
                name: "Binance".into(),
                spot_url: Some("https://unreachable.invalid/ticker".into()),
                futures_url: None,
                parser: "binance".into(),
                rate_limit_per_minute: 1200,
                priority: 1,
                capabilities: Default::default(),
                volume_24h_btc: None,
            },
        ]);
        let prices = Arc::new(PriceService::new(
            cache,
            Arc::new(registry),
            fetcher,
            Duration::from_secs(300),
            50,
            50,
        ));
        prices.preload(assets).await;
        StrategyRouter::new(prices)
    }
}
