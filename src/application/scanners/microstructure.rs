//! High-frequency scanners: scalping and market making. Both demand the
//! deepest books in the universe and gate on spread or momentum.

use super::common::{normalize_confidence, opportunity_skeleton, quality_metadata};
use super::{OpportunityScanner, ScanContext, bounded_scan};
use crate::domain::envelope::StrategyRequest;
use crate::domain::opportunity::{Opportunity, QualityTier, RiskLevel};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Scalping scanner: the eight deepest symbols, momentum gate at 3.0.
pub struct ScalpingScanner;

#[async_trait]
impl OpportunityScanner for ScalpingScanner {
    fn strategy_id(&self) -> &'static str {
        "scalping_strategy"
    }

    fn display_name(&self) -> &'static str {
        "Scalping"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own scalping strategy, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(8);
        bounded_scan(symbols, 4, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_strategy_type("momentum_scalp")
                .with_symbol(&format!("{}/USDT", symbol))
                .with_parameter("timeframe", json!("1m"))
                .with_parameter("profit_target", json!(0.005))
                .with_parameter("stop_loss", json!(0.002))
                .with_parameter("min_volume_surge", json!(2.0));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let momentum = signal
                .extras
                .get("momentum_score")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(signal.strength);
            if momentum <= 3.0 {
                return Vec::new();
            }

            let direction = signal
                .extras
                .get("direction")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("long")
                .to_string();

            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!("{} ({})", self.display_name(), direction),
                "scalping",
                &symbol,
                "binance",
            );
            opportunity.confidence_score = normalize_confidence(Some(momentum * 10.0), None) * 100.0;
            opportunity.risk_level = RiskLevel::Medium;
            opportunity.required_capital_usd = signal
                .extras
                .get("required_capital")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(1_000.0);
            opportunity.profit_potential_usd = signal
                .extras
                .get("profit_potential")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(25.0)
                .max(0.0);
            opportunity.estimated_timeframe = "5m".into();
            opportunity.entry_price = envelope.entry_price();
            opportunity.exit_price = signal
                .extras
                .get("target_price")
                .and_then(serde_json::Value::as_f64);
            opportunity.take_profit = opportunity.exit_price;
            opportunity.stop_loss = signal
                .extras
                .get("stop_price")
                .and_then(serde_json::Value::as_f64);

            quality_metadata(
                &mut opportunity,
                momentum,
                QualityTier::classify(momentum, 6.0, 4.5),
                momentum > 6.0,
            );
            opportunity
                .metadata
                .insert("direction".into(), json!(direction));
            opportunity.metadata.insert(
                "volume_surge".into(),
                signal
                    .extras
                    .get("volume_surge")
                    .cloned()
                    .unwrap_or(json!(1.0)),
            );
            opportunity
                .metadata
                .insert("profit_target_pct".into(), json!(0.5));
            opportunity
                .metadata
                .insert("stop_loss_pct".into(), json!(0.2));

            vec![opportunity]
        })
        .await
    }
}

/// Market-making scanner: the ten deepest symbols, spread gate at 10 bps.
pub struct MarketMakingScanner;

#[async_trait]
impl OpportunityScanner for MarketMakingScanner {
    fn strategy_id(&self) -> &'static str {
        "market_making"
    }

    fn display_name(&self) -> &'static str {
        "Market Making"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own market making, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(10);
        bounded_scan(symbols, 4, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_strategy_type("dual_side")
                .with_symbol(&format!("{}/USDT", symbol))
                .with_parameter("spread_target", json!(0.002))
                .with_parameter("order_amount", json!(1_000.0))
                .with_parameter("max_position", json!(10_000.0));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let spread = signal
                .extras
                .get("current_spread")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0);
            if spread <= 0.001 {
                return Vec::new();
            }

            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!("{} ({})", self.display_name(), symbol),
                "market_making",
                &symbol,
                "binance",
            );
            opportunity.confidence_score = (spread * 10_000.0).min(100.0);
            opportunity.risk_level = RiskLevel::Low;
            opportunity.required_capital_usd = signal
                .extras
                .get("required_capital")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(5_000.0);
            opportunity.profit_potential_usd = signal
                .extras
                .get("daily_profit_est")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(50.0)
                .max(0.0);
            opportunity.estimated_timeframe = "24h".into();
            opportunity.entry_price = signal
                .extras
                .get("bid_price")
                .and_then(serde_json::Value::as_f64);
            opportunity.exit_price = signal
                .extras
                .get("ask_price")
                .and_then(serde_json::Value::as_f64);

            let strength = signal.strength;
            quality_metadata(
                &mut opportunity,
                strength,
                QualityTier::classify(strength, 6.0, 3.0),
                strength > 6.0,
            );
            opportunity
                .metadata
                .insert("current_spread".into(), json!(spread));
            opportunity
                .metadata
                .insert("target_spread".into(), json!(0.002));
            opportunity.metadata.insert(
                "liquidity_score".into(),
                signal
                    .extras
                    .get("liquidity_score")
                    .cloned()
                    .unwrap_or(json!(0.0)),
            );

            vec![opportunity]
        })
        .await
    }
}
