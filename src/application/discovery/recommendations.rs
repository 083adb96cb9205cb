//! Strategy purchase recommendations appended to thin result sets.

use crate::domain::profile::{UserOpportunityProfile, UserTier};
use crate::domain::strategy::PortfolioSnapshot;
use serde_json::{Value, json};

/// Strategies that historically widen a user's opportunity surface the most.
const HIGH_IMPACT_STRATEGIES: [(&str, &str, &str); 4] = [
    (
        "statistical_arbitrage",
        "Statistical Arbitrage",
        "+150% more opportunities",
    ),
    (
        "funding_arbitrage",
        "Funding Arbitrage",
        "+80% more opportunities",
    ),
    ("pairs_trading", "Pairs Trading", "+120% more opportunities"),
    (
        "spot_breakout_strategy",
        "Breakout Trading",
        "+60% more opportunities",
    ),
];

const MAX_STRATEGY_RECOMMENDATIONS: usize = 3;
const THIN_RESULT_THRESHOLD: usize = 10;

/// Recommend unowned high-impact strategies when results are thin, plus a
/// tier upgrade for basic users.
pub fn generate_recommendations(
    profile: &UserOpportunityProfile,
    portfolio: &PortfolioSnapshot,
    current_opportunities: usize,
) -> Vec<Value> {
    let mut recommendations = Vec::new();

    if current_opportunities < THIN_RESULT_THRESHOLD {
        for (strategy_id, name, benefit) in HIGH_IMPACT_STRATEGIES {
            if portfolio.owns(strategy_id) {
                continue;
            }
            recommendations.push(json!({
                "strategy_id": strategy_id,
                "name": name,
                "benefit": benefit,
                "reason": format!(
                    "Users with {} see {} on average",
                    name,
                    benefit.trim_start_matches('+')
                ),
                "type": "opportunity_increase",
            }));
            if recommendations.len() >= MAX_STRATEGY_RECOMMENDATIONS {
                break;
            }
        }
    }

    if profile.user_tier == UserTier::Basic {
        recommendations.push(json!({
            "strategy_id": "tier_upgrade",
            "name": "Upgrade to Pro Tier",
            "benefit": "Access to Professional-grade assets ($10M+ volume)",
            "reason": "Unlock institutional opportunities with higher profit potential",
            "type": "tier_upgrade",
        }));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::{ActiveStrategy, StrategyTier};

    fn portfolio_with(ids: &[&str]) -> PortfolioSnapshot {
        PortfolioSnapshot {
            success: true,
            active_strategies: ids
                .iter()
                .map(|id| ActiveStrategy {
                    strategy_id: id.to_string(),
                    name: id.to_string(),
                    monthly_credit_cost: 0,
                    tier: StrategyTier::Free,
                })
                .collect(),
            total_monthly_cost: 0,
        }
    }

    fn profile_for(portfolio: &PortfolioSnapshot) -> UserOpportunityProfile {
        UserOpportunityProfile::from_portfolio(
            "u1",
            &portfolio.active_strategies,
            portfolio.total_monthly_cost,
            None,
        )
    }

    #[test]
    fn test_thin_results_suggest_up_to_three_unowned() {
        let portfolio = portfolio_with(&["statistical_arbitrage"]);
        let profile = profile_for(&portfolio);

        let recommendations = generate_recommendations(&profile, &portfolio, 2);
        let increases: Vec<&Value> = recommendations
            .iter()
            .filter(|r| r["type"] == json!("opportunity_increase"))
            .collect();

        assert_eq!(increases.len(), 3);
        assert!(
            increases
                .iter()
                .all(|r| r["strategy_id"] != json!("statistical_arbitrage"))
        );
    }

    #[test]
    fn test_rich_results_skip_strategy_suggestions() {
        let portfolio = portfolio_with(&[]);
        let profile = profile_for(&portfolio);

        let recommendations = generate_recommendations(&profile, &portfolio, 25);
        assert!(
            recommendations
                .iter()
                .all(|r| r["type"] == json!("tier_upgrade"))
        );
    }

    #[test]
    fn test_basic_tier_gets_upgrade_hint() {
        let portfolio = portfolio_with(&[]);
        let profile = profile_for(&portfolio);

        let recommendations = generate_recommendations(&profile, &portfolio, 25);
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0]["type"], json!("tier_upgrade"));
    }
}
