//! Spot strategy scanners: momentum, mean reversion, breakout.

use super::common::{
    apply_trade_plan, build_trade_plan, normalize_confidence, opportunity_skeleton,
    quality_metadata,
};
use super::{OpportunityScanner, ScanContext, bounded_scan};
use crate::domain::envelope::{StrategyEnvelope, StrategyRequest};
use crate::domain::opportunity::{Opportunity, QualityTier, RiskLevel};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

fn pair(symbol: &str) -> String {
    format!("{}/USDT", symbol)
}

fn signal_opportunity(
    envelope: &StrategyEnvelope,
    strategy_id: &'static str,
    display_name: &str,
    opportunity_type: &str,
    symbol: &str,
    minimum: f64,
    consider: f64,
    strong: f64,
    required_capital: f64,
    timeframe: &str,
) -> Option<Opportunity> {
    if !envelope.success {
        return None;
    }
    let signal = envelope.signal()?;
    let strength = signal.strength;
    if strength < minimum {
        return None;
    }

    let quality = QualityTier::classify(strength, strong, consider);
    let confidence = normalize_confidence(signal.confidence, Some(strength)) * 100.0;

    let mut opportunity = opportunity_skeleton(
        strategy_id,
        format!(
            "{} ({} confidence)",
            display_name,
            quality.as_str().to_uppercase()
        ),
        opportunity_type,
        symbol,
        "binance",
    );
    opportunity.confidence_score = confidence;
    opportunity.risk_level = RiskLevel::from_signal_strength(strength);
    opportunity.required_capital_usd = required_capital;
    opportunity.estimated_timeframe = timeframe.to_string();

    if let (Some(entry), Some(side)) = (envelope.entry_price(), signal.action.side())
        && let Some(plan) = build_trade_plan(
            entry,
            side,
            envelope.risk_controls(),
            required_capital,
            2.0,
        )
    {
        apply_trade_plan(&mut opportunity, &plan);
        opportunity.profit_potential_usd = plan.potential_profit;
    }

    quality_metadata(&mut opportunity, strength, quality, strength > strong);
    opportunity
        .metadata
        .insert("signal_action".into(), json!(signal.action));
    for (key, value) in &signal.extras {
        opportunity
            .metadata
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    Some(opportunity)
}

/// Momentum over the top-volume symbols. Inclusion at strength 2.5, strong
/// above 6.0.
pub struct MomentumScanner;

#[async_trait]
impl OpportunityScanner for MomentumScanner {
    fn strategy_id(&self) -> &'static str {
        "spot_momentum_strategy"
    }

    fn display_name(&self) -> &'static str {
        "Spot Momentum"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own momentum strategy, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(30);
        bounded_scan(symbols, 5, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_symbol(&pair(&symbol))
                .with_parameter("timeframe", json!("4h"));
            let envelope = ctx.router.execute_strategy(&request).await;

            signal_opportunity(
                &envelope,
                self.strategy_id(),
                self.display_name(),
                "spot_momentum",
                &symbol,
                2.5,
                4.5,
                6.0,
                1_000.0,
                "4-24h",
            )
            .into_iter()
            .collect()
        })
        .await
    }
}

/// Mean reversion over the top-volume symbols. Inclusion at |z| > 1.0,
/// strong above 2.0.
pub struct MeanReversionScanner;

#[async_trait]
impl OpportunityScanner for MeanReversionScanner {
    fn strategy_id(&self) -> &'static str {
        "spot_mean_reversion"
    }

    fn display_name(&self) -> &'static str {
        "Mean Reversion"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own mean reversion strategy, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(25);
        bounded_scan(symbols, 5, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_symbol(&pair(&symbol))
                .with_parameter("timeframe", json!("1h"));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let deviation = signal
                .extras
                .get("z_score")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
                .abs();
            if deviation <= 1.0 {
                return Vec::new();
            }

            let quality = QualityTier::classify(deviation, 2.0, 1.5);
            let strength = (deviation * 2.0).min(10.0);
            let confidence = normalize_confidence(signal.confidence, Some(strength)) * 100.0;

            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!(
                    "{} ({} confidence)",
                    self.display_name(),
                    quality.as_str().to_uppercase()
                ),
                "mean_reversion",
                &symbol,
                "binance",
            );
            opportunity.confidence_score = confidence;
            opportunity.risk_level = RiskLevel::from_signal_strength(strength);
            opportunity.required_capital_usd = 2_000.0;
            opportunity.estimated_timeframe = "6-24h".into();

            if let (Some(entry), Some(side)) = (envelope.entry_price(), signal.action.side())
                && let Some(plan) =
                    build_trade_plan(entry, side, envelope.risk_controls(), 2_000.0, 2.0)
            {
                apply_trade_plan(&mut opportunity, &plan);
                opportunity.profit_potential_usd = plan.potential_profit;
            }

            quality_metadata(&mut opportunity, strength, quality, deviation > 2.0);
            opportunity
                .metadata
                .insert("deviation_score".into(), json!(deviation));
            if let Some(mean_price) = signal.extras.get("mean_price") {
                opportunity
                    .metadata
                    .insert("mean_price".into(), mean_price.clone());
            }

            vec![opportunity]
        })
        .await
    }
}

/// Breakout over the top-volume symbols. Inclusion at probability > 0.5,
/// strong above 0.75.
pub struct BreakoutScanner;

#[async_trait]
impl OpportunityScanner for BreakoutScanner {
    fn strategy_id(&self) -> &'static str {
        "spot_breakout_strategy"
    }

    fn display_name(&self) -> &'static str {
        "Breakout Trading"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own breakout strategy, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(20);
        bounded_scan(symbols, 5, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_symbol(&pair(&symbol))
                .with_parameter("timeframe", json!("1h"));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let probability = signal
                .extras
                .get("breakout_probability")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0);
            if probability <= 0.5 {
                return Vec::new();
            }

            let quality = QualityTier::classify(probability, 0.75, 0.65);
            let strength = probability * 10.0;

            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!(
                    "{} ({} confidence)",
                    self.display_name(),
                    quality.as_str().to_uppercase()
                ),
                "breakout",
                &symbol,
                "binance",
            );
            opportunity.confidence_score = (probability * 100.0).clamp(0.0, 100.0);
            opportunity.risk_level = RiskLevel::from_signal_strength(strength);
            opportunity.required_capital_usd = 3_000.0;
            opportunity.estimated_timeframe = "2-8h".into();

            if let (Some(entry), Some(side)) = (envelope.entry_price(), signal.action.side())
                && let Some(plan) =
                    build_trade_plan(entry, side, envelope.risk_controls(), 3_000.0, 2.0)
            {
                apply_trade_plan(&mut opportunity, &plan);
                opportunity.profit_potential_usd = plan.potential_profit;
            }

            quality_metadata(&mut opportunity, strength, quality, probability > 0.75);
            opportunity
                .metadata
                .insert("breakout_probability".into(), json!(probability));

            vec![opportunity]
        })
        .await
    }
}
