//! Derivatives scanners: leveraged futures and options with greeks-based
//! risk classification.

use super::common::{normalize_confidence, opportunity_skeleton, quality_metadata};
use super::{OpportunityScanner, ScanContext, bounded_scan};
use crate::domain::envelope::{JsonMap, StrategyRequest};
use crate::domain::opportunity::{Opportunity, QualityTier, RiskLevel};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Leverage/volatility risk ladder for futures setups.
fn futures_risk(leverage: f64, volatility: f64) -> RiskLevel {
    let total = leverage / 100.0 + volatility * 10.0;
    if total < 0.3 {
        RiskLevel::Low
    } else if total < 0.6 {
        RiskLevel::Medium
    } else if total < 1.0 {
        RiskLevel::High
    } else {
        RiskLevel::VeryHigh
    }
}

/// Greeks-exposure risk ladder for options setups.
fn options_risk(greeks: &JsonMap) -> RiskLevel {
    let get = |key: &str| greeks.get(key).and_then(serde_json::Value::as_f64).unwrap_or(0.0);
    let total = get("delta").abs() + get("gamma").abs() * 10.0 + get("vega").abs() * 5.0;
    if total < 0.3 {
        RiskLevel::Low
    } else if total < 0.6 {
        RiskLevel::Medium
    } else if total < 0.9 {
        RiskLevel::High
    } else {
        RiskLevel::VeryHigh
    }
}

/// Futures scanner: trend-following setups over the top 20 symbols with
/// leverage-aware risk.
pub struct FuturesScanner;

#[async_trait]
impl OpportunityScanner for FuturesScanner {
    fn strategy_id(&self) -> &'static str {
        "futures_trade"
    }

    fn display_name(&self) -> &'static str {
        "Futures Trading"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own futures trading, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(20);
        bounded_scan(symbols, 6, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_strategy_type("trend_following")
                .with_symbol(&format!("{}/USDT", symbol))
                .with_parameter("timeframe", json!("1h"))
                .with_parameter("leverage", json!(10.0))
                .with_parameter("stop_loss_pct", json!(2.0))
                .with_parameter("take_profit_pct", json!(6.0));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let strength = signal.strength;
            if strength <= 3.0 {
                return Vec::new();
            }

            let leverage = signal
                .extras
                .get("leverage")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(10.0);
            let volatility = signal
                .extras
                .get("volatility")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.1);
            let direction = signal
                .extras
                .get("direction")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("long")
                .to_string();

            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!("{} ({} {}x)", self.display_name(), direction, leverage),
                "futures",
                &symbol,
                "binance",
            );
            opportunity.confidence_score =
                normalize_confidence(signal.confidence, Some(strength)) * 100.0;
            opportunity.risk_level = futures_risk(leverage, volatility);
            opportunity.required_capital_usd = signal
                .extras
                .get("required_margin")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(1_000.0);
            opportunity.profit_potential_usd = signal
                .extras
                .get("profit_potential")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
                .max(0.0);
            opportunity.estimated_timeframe = "6h".into();
            opportunity.entry_price = envelope.entry_price();

            if let Some(controls) = envelope.risk_controls() {
                opportunity.stop_loss = controls.stop_loss_price;
                opportunity.take_profit = controls.take_profit_price;
                opportunity.exit_price = controls.take_profit_price;
            }

            quality_metadata(
                &mut opportunity,
                strength,
                QualityTier::classify(strength, 6.0, 4.5),
                strength > 6.0,
            );
            opportunity
                .metadata
                .insert("direction".into(), json!(direction));
            opportunity
                .metadata
                .insert("leverage".into(), json!(leverage));
            opportunity
                .metadata
                .insert("volatility".into(), json!(volatility));
            if let Some(liquidation) = signal.extras.get("liquidation_price") {
                opportunity
                    .metadata
                    .insert("liquidation_price".into(), liquidation.clone());
            }

            vec![opportunity]
        })
        .await
    }
}

/// Options scanner: greeks-backed setups over the top 15 symbols.
pub struct OptionsScanner;

#[async_trait]
impl OpportunityScanner for OptionsScanner {
    fn strategy_id(&self) -> &'static str {
        "options_trade"
    }

    fn display_name(&self) -> &'static str {
        "Options Trading"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own options trading, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(15);
        bounded_scan(symbols, 5, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_strategy_type("iron_condor")
                .with_symbol(&format!("{}/USDT", symbol))
                .with_parameter("timeframe", json!("1d"))
                .with_parameter("calculate_greeks", json!(true))
                .with_parameter("expiry_days", json!(30.0));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let strength = signal.strength;
            if strength <= 3.0 {
                return Vec::new();
            }

            let strategy_type = signal
                .extras
                .get("strategy_type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("iron_condor")
                .to_string();
            let empty_greeks = JsonMap::new();
            let greeks = signal
                .extras
                .get("greeks")
                .and_then(serde_json::Value::as_object)
                .unwrap_or(&empty_greeks);

            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!("{} ({})", self.display_name(), strategy_type),
                "options",
                &symbol,
                "binance",
            );
            opportunity.confidence_score =
                normalize_confidence(signal.confidence, Some(strength)) * 100.0;
            opportunity.risk_level = options_risk(greeks);
            opportunity.required_capital_usd = signal
                .extras
                .get("required_capital")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(5_000.0);
            opportunity.profit_potential_usd = signal
                .extras
                .get("max_profit")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(500.0)
                .max(0.0);
            let expiry_days = signal
                .extras
                .get("days_to_expiry")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(30.0);
            opportunity.estimated_timeframe = format!("{}d", expiry_days as i64);
            opportunity.entry_price = envelope.entry_price();

            quality_metadata(
                &mut opportunity,
                strength,
                QualityTier::classify(strength, 6.0, 4.5),
                strength > 6.0,
            );
            opportunity
                .metadata
                .insert("strategy_type".into(), json!(strategy_type));
            opportunity
                .metadata
                .insert("greeks".into(), json!(greeks));
            if let Some(pop) = signal.extras.get("probability_of_profit") {
                opportunity
                    .metadata
                    .insert("probability_of_profit".into(), pop.clone());
            }

            vec![opportunity]
        })
        .await
    }
}
