use serde::{Deserialize, Serialize};
use std::fmt;

/// Pricing tier of a catalog strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTier {
    Free,
    Pro,
    Enterprise,
}

impl fmt::Display for StrategyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyTier::Free => "free",
            StrategyTier::Pro => "pro",
            StrategyTier::Enterprise => "enterprise",
        };
        f.write_str(s)
    }
}

/// Catalog metadata for one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMeta {
    pub strategy_id: String,
    pub name: String,
    pub monthly_credit_cost: u32,
    pub tier: StrategyTier,
    /// Capability flags, e.g. "derivatives", "requires_positions".
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl StrategyMeta {
    pub fn is_free(&self) -> bool {
        self.monthly_credit_cost == 0 && self.tier == StrategyTier::Free
    }
}

/// One strategy the user has activated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveStrategy {
    pub strategy_id: String,
    pub name: String,
    #[serde(default)]
    pub monthly_credit_cost: u32,
    #[serde(default = "default_strategy_tier")]
    pub tier: StrategyTier,
}

fn default_strategy_tier() -> StrategyTier {
    StrategyTier::Free
}

/// Portfolio read-model returned by the marketplace collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub success: bool,
    #[serde(default)]
    pub active_strategies: Vec<ActiveStrategy>,
    #[serde(default)]
    pub total_monthly_cost: u32,
}

impl PortfolioSnapshot {
    pub fn empty_shell() -> Self {
        PortfolioSnapshot {
            success: true,
            active_strategies: Vec::new(),
            total_monthly_cost: 0,
        }
    }

    pub fn owns(&self, strategy_id: &str) -> bool {
        self.active_strategies
            .iter()
            .any(|s| s.strategy_id == strategy_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_strategy_requires_zero_cost_and_free_tier() {
        let free = StrategyMeta {
            strategy_id: "risk_management".into(),
            name: "Risk Management".into(),
            monthly_credit_cost: 0,
            tier: StrategyTier::Free,
            capabilities: vec![],
        };
        assert!(free.is_free());

        let paid = StrategyMeta {
            monthly_credit_cost: 25,
            tier: StrategyTier::Pro,
            ..free.clone()
        };
        assert!(!paid.is_free());
    }

    #[test]
    fn test_portfolio_ownership_lookup() {
        let snapshot = PortfolioSnapshot {
            success: true,
            active_strategies: vec![ActiveStrategy {
                strategy_id: "pairs_trading".into(),
                name: "Pairs Trading".into(),
                monthly_credit_cost: 35,
                tier: StrategyTier::Pro,
            }],
            total_monthly_cost: 35,
        };
        assert!(snapshot.owns("pairs_trading"));
        assert!(!snapshot.owns("market_making"));
    }
}
