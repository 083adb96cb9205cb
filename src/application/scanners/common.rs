//! Shared scanner plumbing: confidence normalization, trade-plan
//! enrichment, and opportunity assembly.

use crate::domain::envelope::{RiskControls, TradeSide};
use crate::domain::opportunity::{Opportunity, QualityTier, RiskLevel};
use chrono::Utc;
use serde_json::json;

/// Normalize a confidence reading to [0, 1].
///
/// Accepts decimals in [0, 1], percents in (1, 100], and basis points in
/// (100, 10000]. A missing value falls back to signal strength on the 0-10
/// scale.
pub fn normalize_confidence(value: Option<f64>, fallback_strength: Option<f64>) -> f64 {
    let raw = match value {
        Some(v) => v,
        None => fallback_strength.map(|s| s * 10.0).unwrap_or(0.0),
    };
    let scaled = if raw <= 1.0 {
        raw
    } else if raw <= 100.0 {
        raw / 100.0
    } else {
        raw / 10_000.0
    };
    scaled.clamp(0.0, 1.0)
}

/// Fully resolved trade-plan levels for one opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub position_size: f64,
    pub position_notional: f64,
    pub risk_amount: f64,
    pub potential_profit: f64,
    pub risk_reward_ratio: f64,
    pub max_risk_percent: f64,
    pub potential_gain_percent: f64,
}

/// Build a complete trade plan from an entry price and side, preferring any
/// levels the strategy backend produced and deriving the rest: stop at 2%
/// against the position, take-profit at 4% in its favor.
pub fn build_trade_plan(
    entry_price: f64,
    side: TradeSide,
    controls: Option<&RiskControls>,
    default_notional: f64,
    fallback_risk_percent: f64,
) -> Option<TradePlan> {
    if !(entry_price.is_finite() && entry_price > 0.0) {
        return None;
    }

    let supplied = |get: fn(&RiskControls) -> Option<f64>| controls.and_then(get);

    let stop_loss = supplied(|c| c.stop_loss_price).unwrap_or(match side {
        TradeSide::Long => entry_price * 0.98,
        TradeSide::Short => entry_price * 1.02,
    });
    let take_profit = supplied(|c| c.take_profit_price).unwrap_or(match side {
        TradeSide::Long => entry_price * 1.04,
        TradeSide::Short => entry_price * 0.96,
    });

    let position_notional = supplied(|c| c.position_notional).unwrap_or(default_notional);
    let position_size =
        supplied(|c| c.position_size).unwrap_or(position_notional / entry_price);

    let risk_amount = supplied(|c| c.risk_amount)
        .unwrap_or(position_size * (entry_price - stop_loss).abs());
    let potential_profit = supplied(|c| c.potential_profit)
        .unwrap_or(position_size * (take_profit - entry_price).abs());
    let risk_reward_ratio = supplied(|c| c.risk_reward_ratio).unwrap_or(if risk_amount > 0.0 {
        potential_profit / risk_amount
    } else {
        0.0
    });
    let max_risk_percent = supplied(|c| c.max_risk_percent).unwrap_or(fallback_risk_percent);
    let potential_gain_percent = (take_profit - entry_price).abs() / entry_price * 100.0;

    Some(TradePlan {
        entry_price,
        stop_loss,
        take_profit,
        position_size,
        position_notional,
        risk_amount,
        potential_profit,
        risk_reward_ratio,
        max_risk_percent,
        potential_gain_percent,
    })
}

/// Attach a trade plan to an opportunity: first-class levels plus the
/// risk-metrics metadata block.
pub fn apply_trade_plan(opportunity: &mut Opportunity, plan: &TradePlan) {
    opportunity.entry_price = Some(plan.entry_price);
    opportunity.stop_loss = Some(plan.stop_loss);
    opportunity.take_profit = Some(plan.take_profit);
    if opportunity.exit_price.is_none() {
        opportunity.exit_price = Some(plan.take_profit);
    }

    opportunity
        .metadata
        .insert("max_risk_percent".into(), json!(plan.max_risk_percent));
    opportunity.metadata.insert(
        "potential_gain_percent".into(),
        json!(plan.potential_gain_percent),
    );
    opportunity.metadata.insert(
        "risk_metrics".into(),
        json!({
            "position_size": plan.position_size,
            "position_notional": plan.position_notional,
            "max_risk_usd": plan.risk_amount,
            "potential_gain_usd": plan.potential_profit,
            "risk_reward_ratio": plan.risk_reward_ratio,
        }),
    );
}

/// Standard quality annotations every scanner writes.
pub fn quality_metadata(
    opportunity: &mut Opportunity,
    signal_strength: f64,
    quality: QualityTier,
    meets_original_threshold: bool,
) {
    opportunity
        .metadata
        .insert("signal_strength".into(), json!(signal_strength));
    opportunity
        .metadata
        .insert("quality_tier".into(), json!(quality.as_str()));
    opportunity.metadata.insert(
        "meets_original_threshold".into(),
        json!(meets_original_threshold),
    );
    opportunity
        .metadata
        .insert("recommendation".into(), json!(quality.recommendation()));
}

/// Blank opportunity skeleton the scanners fill in.
pub fn opportunity_skeleton(
    strategy_id: &str,
    strategy_name: String,
    opportunity_type: &str,
    symbol: &str,
    exchange: &str,
) -> Opportunity {
    Opportunity {
        strategy_id: strategy_id.to_string(),
        strategy_name,
        opportunity_type: opportunity_type.to_string(),
        symbol: symbol.to_string(),
        exchange: exchange.to_string(),
        profit_potential_usd: 0.0,
        confidence_score: 0.0,
        risk_level: RiskLevel::Medium,
        required_capital_usd: 0.0,
        estimated_timeframe: String::new(),
        entry_price: None,
        exit_price: None,
        stop_loss: None,
        take_profit: None,
        metadata: serde_json::Map::new(),
        discovered_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_confidence_handles_wide_ranges() {
        assert!((normalize_confidence(Some(0.82), None) - 0.82).abs() < 1e-9);
        assert!((normalize_confidence(Some(85.0), None) - 0.85).abs() < 1e-9);
        assert!((normalize_confidence(Some(7500.0), None) - 0.75).abs() < 1e-9);
        assert!((normalize_confidence(None, Some(7.5)) - 0.75).abs() < 1e-9);
        assert_eq!(normalize_confidence(None, None), 0.0);
        assert_eq!(normalize_confidence(Some(-3.0), None), 0.0);
        assert_eq!(normalize_confidence(Some(2_000_000.0), None), 1.0);
    }

    #[test]
    fn test_trade_plan_fills_missing_levels() {
        let plan = build_trade_plan(100.0, TradeSide::Long, None, 1_000.0, 2.0).unwrap();

        assert!((plan.stop_loss - 98.0).abs() < 1e-9);
        assert!((plan.take_profit - 104.0).abs() < 1e-9);
        assert!((plan.position_size - 10.0).abs() < 1e-9);
        assert!((plan.position_notional - 1_000.0).abs() < 1e-9);
        assert!((plan.risk_amount - 20.0).abs() < 1e-9);
        assert!((plan.potential_profit - 40.0).abs() < 1e-9);
        assert!((plan.risk_reward_ratio - 2.0).abs() < 1e-9);
        assert!((plan.max_risk_percent - 2.0).abs() < 1e-9);
        assert!((plan.potential_gain_percent - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_trade_plan_short_side_flips_levels() {
        let plan = build_trade_plan(100.0, TradeSide::Short, None, 1_000.0, 2.0).unwrap();
        assert!(plan.stop_loss > 100.0);
        assert!(plan.take_profit < 100.0);
    }

    #[test]
    fn test_trade_plan_prefers_backend_levels() {
        let controls = RiskControls {
            stop_loss_price: Some(95.0),
            take_profit_price: Some(112.0),
            position_size: None,
            position_notional: Some(2_000.0),
            risk_amount: None,
            potential_profit: None,
            risk_reward_ratio: None,
            max_risk_percent: Some(5.0),
        };
        let plan = build_trade_plan(100.0, TradeSide::Long, Some(&controls), 1_000.0, 2.0).unwrap();

        assert_eq!(plan.stop_loss, 95.0);
        assert_eq!(plan.take_profit, 112.0);
        assert_eq!(plan.position_notional, 2_000.0);
        assert!((plan.position_size - 20.0).abs() < 1e-9);
        assert!((plan.risk_amount - 100.0).abs() < 1e-9);
        assert!((plan.potential_profit - 240.0).abs() < 1e-9);
        assert!((plan.risk_reward_ratio - 2.4).abs() < 1e-9);
        assert_eq!(plan.max_risk_percent, 5.0);
    }

    #[test]
    fn test_trade_plan_rejects_bad_entry() {
        assert!(build_trade_plan(0.0, TradeSide::Long, None, 1_000.0, 2.0).is_none());
        assert!(build_trade_plan(f64::NAN, TradeSide::Long, None, 1_000.0, 2.0).is_none());
    }

    #[test]
    fn test_apply_trade_plan_writes_levels_and_metrics() {
        let mut opportunity = opportunity_skeleton(
            "spot_momentum_strategy",
            "Spot Momentum".into(),
            "spot_momentum",
            "BTC",
            "binance",
        );
        let plan = build_trade_plan(100.0, TradeSide::Long, None, 1_000.0, 2.0).unwrap();
        apply_trade_plan(&mut opportunity, &plan);

        assert_eq!(opportunity.entry_price, Some(100.0));
        assert_eq!(opportunity.stop_loss, Some(98.0));
        assert_eq!(opportunity.take_profit, Some(104.0));
        let metrics = opportunity.metadata["risk_metrics"].as_object().unwrap();
        assert!((metrics["risk_reward_ratio"].as_f64().unwrap() - 2.0).abs() < 1e-9);
    }
}
