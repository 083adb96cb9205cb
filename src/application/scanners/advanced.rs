//! Hedge and multi-leg composite scanners.

use super::common::{
    apply_trade_plan, build_trade_plan, normalize_confidence, opportunity_skeleton,
    quality_metadata,
};
use super::{OpportunityScanner, ScanContext, bounded_scan};
use crate::domain::envelope::{StrategyPayload, StrategyRequest};
use crate::domain::opportunity::{Opportunity, QualityTier, RiskLevel};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Hedge scanner: market-stress driven hedge recommendations anchored on the
/// highest-volume asset.
pub struct HedgePositionScanner;

#[async_trait]
impl OpportunityScanner for HedgePositionScanner {
    fn strategy_id(&self) -> &'static str {
        "hedge_position"
    }

    fn display_name(&self) -> &'static str {
        "Hedge Positions"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own hedge strategy, skipping");
            return Vec::new();
        }

        let Some(anchor) = ctx.universe.top_symbols_by_volume(1).into_iter().next() else {
            return Vec::new();
        };

        let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
            .with_symbol(&format!("{}/USDT", anchor))
            .with_parameter("hedge_ratio", json!(0.5));
        let envelope = ctx.router.execute_strategy(&request).await;

        if !envelope.success {
            return Vec::new();
        }
        let StrategyPayload::RiskReview {
            hedge_recommendations,
            ..
        } = &envelope.payload
        else {
            return Vec::new();
        };

        hedge_recommendations
            .iter()
            .filter(|hedge| hedge.urgency_score > 0.3)
            .map(|hedge| {
                let mut opportunity = opportunity_skeleton(
                    self.strategy_id(),
                    format!("{} ({})", self.display_name(), hedge.hedge_type),
                    "hedge",
                    &hedge.hedge_instrument,
                    "binance",
                );
                opportunity.profit_potential_usd = 0.0;
                opportunity.confidence_score = (hedge.effectiveness * 100.0).clamp(0.0, 100.0);
                opportunity.risk_level = RiskLevel::Low;
                opportunity.required_capital_usd = hedge.hedge_cost_usd.max(0.0);
                opportunity.estimated_timeframe = "ongoing".into();
                opportunity
                    .metadata
                    .insert("hedge_type".into(), json!(hedge.hedge_type));
                opportunity
                    .metadata
                    .insert("risk_reduction".into(), json!(hedge.risk_reduction_pct));
                opportunity
                    .metadata
                    .insert("urgency".into(), json!(hedge.urgency_score));
                opportunity
                    .metadata
                    .insert("portfolio_protection".into(), json!(true));
                opportunity.metadata.insert(
                    "signal_strength".into(),
                    json!(hedge.urgency_score * 10.0),
                );
                opportunity
            })
            .collect()
    }
}

/// Composite multi-leg scanner over the deepest symbols.
pub struct ComplexStrategyScanner;

#[async_trait]
impl OpportunityScanner for ComplexStrategyScanner {
    fn strategy_id(&self) -> &'static str {
        "complex_strategy"
    }

    fn display_name(&self) -> &'static str {
        "Complex Strategies"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own complex strategies, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(10);
        bounded_scan(symbols, 3, |symbol| async move {
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_symbol(&format!("{}/USDT", symbol));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let strength = signal.strength;
            if strength < 4.0 {
                return Vec::new();
            }

            let quality = QualityTier::classify(strength, 7.0, 5.5);
            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!(
                    "{} ({} confidence)",
                    self.display_name(),
                    quality.as_str().to_uppercase()
                ),
                "complex_strategy",
                &symbol,
                "binance",
            );
            opportunity.confidence_score =
                normalize_confidence(signal.confidence, Some(strength)) * 100.0;
            opportunity.risk_level = RiskLevel::from_signal_strength(strength);
            opportunity.required_capital_usd = 10_000.0;
            opportunity.estimated_timeframe = "1-7d".into();

            if let (Some(entry), Some(side)) = (envelope.entry_price(), signal.action.side())
                && let Some(plan) =
                    build_trade_plan(entry, side, envelope.risk_controls(), 10_000.0, 2.0)
            {
                apply_trade_plan(&mut opportunity, &plan);
                opportunity.profit_potential_usd = plan.potential_profit;
            }

            quality_metadata(&mut opportunity, strength, quality, strength > 7.0);
            if let Some(components) = signal.extras.get("components") {
                opportunity
                    .metadata
                    .insert("components".into(), components.clone());
            }

            vec![opportunity]
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context_with;
    use super::*;
    use crate::application::strategies::test_support::asset_with;

    #[tokio::test]
    async fn test_hedge_scanner_surfaces_stress_hedges() {
        let ctx = context_with(
            &[asset_with("BTC", 45_000.0, 200_000_000.0, 50_000.0, 44_500.0, -8.0)],
            &["hedge_position"],
        )
        .await;

        let opportunities = HedgePositionScanner.scan(&ctx).await;
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].symbol, "BTC-PERP");
        assert_eq!(opportunities[0].opportunity_type, "hedge");
    }

    #[tokio::test]
    async fn test_complex_scanner_needs_composite_conviction() {
        let quiet = context_with(
            &[asset_with("ETH", 3_000.0, 90_000_000.0, 3_010.0, 2_990.0, 0.1)],
            &["complex_strategy"],
        )
        .await;
        assert!(ComplexStrategyScanner.scan(&quiet).await.is_empty());

        let trending = context_with(
            &[asset_with("BTC", 52_400.0, 200_000_000.0, 52_500.0, 48_000.0, 8.0)],
            &["complex_strategy"],
        )
        .await;
        let opportunities = ComplexStrategyScanner.scan(&trending).await;
        assert_eq!(opportunities.len(), 1);
        assert!(opportunities[0].metadata.contains_key("components"));
    }
}
