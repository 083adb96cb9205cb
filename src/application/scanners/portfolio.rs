//! Portfolio-level scanners. Unlike the market scanners these run exactly
//! once per scan and key their opportunities by recommended action, not by
//! market symbol.

use super::common::opportunity_skeleton;
use super::{OpportunityScanner, ScanContext};
use crate::domain::envelope::{StrategyPayload, StrategyRequest};
use crate::domain::opportunity::{Opportunity, RiskLevel};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Risk-management scanner: mitigation and hedge actions above the urgency
/// floor become portfolio-protection opportunities.
pub struct RiskManagementScanner;

#[async_trait]
impl OpportunityScanner for RiskManagementScanner {
    fn strategy_id(&self) -> &'static str {
        "risk_management"
    }

    fn display_name(&self) -> &'static str {
        "Risk Management"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own risk management, skipping");
            return Vec::new();
        }

        let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id);
        let envelope = ctx.router.execute_strategy(&request).await;
        if !envelope.success {
            return Vec::new();
        }
        let StrategyPayload::RiskReview {
            mitigation_strategies,
            hedge_recommendations,
            ..
        } = &envelope.payload
        else {
            return Vec::new();
        };

        let mut opportunities = Vec::new();

        for mitigation in mitigation_strategies {
            if mitigation.urgency <= 0.3 {
                continue;
            }
            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!("{} - Mitigation", self.display_name()),
                "risk_mitigation",
                &mitigation.recommendation,
                "multiple",
            );
            // Protection, not profit
            opportunity.profit_potential_usd = 0.0;
            opportunity.confidence_score = (mitigation.urgency * 100.0).clamp(0.0, 100.0);
            opportunity.risk_level = RiskLevel::Low;
            opportunity.required_capital_usd = mitigation.cost_estimate_usd.max(0.0);
            opportunity.estimated_timeframe = "immediate".into();
            opportunity
                .metadata
                .insert("risk_type".into(), json!(mitigation.risk_type));
            opportunity
                .metadata
                .insert("strategy".into(), json!(mitigation.strategy));
            opportunity
                .metadata
                .insert("rationale".into(), json!(mitigation.rationale));
            opportunity
                .metadata
                .insert("portfolio_protection".into(), json!(true));
            opportunity
                .metadata
                .insert("signal_strength".into(), json!(mitigation.urgency * 10.0));
            opportunities.push(opportunity);
        }

        for hedge in hedge_recommendations {
            if hedge.urgency_score <= 0.3 {
                continue;
            }
            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!("{} - Hedge", self.display_name()),
                "risk_hedge",
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
            opportunity
                .metadata
                .insert("signal_strength".into(), json!(hedge.urgency_score * 10.0));
            opportunities.push(opportunity);
        }

        opportunities
    }
}

/// Portfolio-optimization scanner: rebalancing recommendations become
/// opportunities keyed by target asset.
pub struct PortfolioOptimizationScanner;

#[async_trait]
impl OpportunityScanner for PortfolioOptimizationScanner {
    fn strategy_id(&self) -> &'static str {
        "portfolio_optimization"
    }

    fn display_name(&self) -> &'static str {
        "Portfolio Optimization"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own portfolio optimization, skipping");
            return Vec::new();
        }

        let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id);
        let envelope = ctx.router.execute_strategy(&request).await;
        if !envelope.success {
            return Vec::new();
        }
        let StrategyPayload::Rebalance {
            recommendations,
            strategy_analysis,
        } = &envelope.payload
        else {
            return Vec::new();
        };

        // Reference notional used to express fractional improvements in USD
        const REFERENCE_PORTFOLIO_USD: f64 = 10_000.0;

        let mut opportunities = Vec::new();

        for rebalance in recommendations {
            let improvement = rebalance.improvement_potential.clamp(0.0, 1.0);
            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!("{} - {}", self.display_name(), rebalance.strategy),
                "portfolio_rebalance",
                &rebalance.symbol,
                "multiple",
            );
            opportunity.profit_potential_usd = improvement * REFERENCE_PORTFOLIO_USD;
            opportunity.confidence_score = 80.0;
            opportunity.risk_level = RiskLevel::Low;
            opportunity.required_capital_usd =
                rebalance.amount_fraction.clamp(0.0, 1.0) * REFERENCE_PORTFOLIO_USD;
            opportunity.estimated_timeframe = "1-3 months".into();
            opportunity
                .metadata
                .insert("rebalance_action".into(), json!(rebalance.action));
            opportunity
                .metadata
                .insert("strategy_used".into(), json!(rebalance.strategy));
            opportunity
                .metadata
                .insert("improvement_potential".into(), json!(improvement));
            opportunity
                .metadata
                .insert("risk_reduction".into(), json!(rebalance.risk_reduction));
            opportunity
                .metadata
                .insert("urgency".into(), json!(rebalance.urgency));
            opportunity
                .metadata
                .insert("signal_strength".into(), json!(improvement * 100.0));
            opportunities.push(opportunity);
        }

        // Without concrete trades, surface the strategy comparison itself
        if opportunities.is_empty() {
            for (strategy, results) in strategy_analysis {
                let Some(results) = results.as_object() else {
                    continue;
                };
                let expected_return = results
                    .get("expected_return")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                if expected_return <= 0.0 && strategy != "equal_weight" {
                    continue;
                }

                let mut opportunity = opportunity_skeleton(
                    self.strategy_id(),
                    format!("Portfolio {}", strategy.replace('_', " ")),
                    "optimization_analysis",
                    "PORTFOLIO",
                    "all",
                );
                opportunity.profit_potential_usd =
                    expected_return.max(0.0) * REFERENCE_PORTFOLIO_USD;
                opportunity.confidence_score = 75.0;
                opportunity.risk_level = RiskLevel::Medium;
                opportunity.required_capital_usd = REFERENCE_PORTFOLIO_USD;
                opportunity.estimated_timeframe = "1 year".into();
                opportunity
                    .metadata
                    .insert("strategy".into(), json!(strategy));
                opportunity
                    .metadata
                    .insert("expected_annual_return".into(), json!(expected_return));
                opportunity
                    .metadata
                    .insert("analysis_type".into(), json!("strategy_comparison"));
                opportunity
                    .metadata
                    .insert("signal_strength".into(), json!(expected_return * 10.0));
                opportunities.push(opportunity);
            }
        }

        opportunities
    }
}
