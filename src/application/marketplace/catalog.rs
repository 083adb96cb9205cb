//! Strategy catalog and a self-contained marketplace implementation.
//!
//! The catalog is the authoritative map of scanner-backed strategies with
//! their pricing tier. `InMemoryMarketplace` implements the portfolio-reader
//! and onboarding ports for local runs and tests; production deployments
//! inject a remote-backed reader instead.

use crate::domain::ports::{OnboardingHook, PortfolioReader};
use crate::domain::strategy::{ActiveStrategy, PortfolioSnapshot, StrategyMeta, StrategyTier};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Strategies every new user is provisioned with, free of charge.
pub const FREE_DEFAULT_STRATEGIES: [&str; 3] = [
    "risk_management",
    "portfolio_optimization",
    "spot_momentum_strategy",
];

fn meta(
    id: &str,
    name: &str,
    cost: u32,
    tier: StrategyTier,
    capabilities: &[&str],
) -> (String, StrategyMeta) {
    (
        id.to_string(),
        StrategyMeta {
            strategy_id: id.to_string(),
            name: name.to_string(),
            monthly_credit_cost: cost,
            tier,
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
        },
    )
}

/// Catalog of every scanner-backed strategy.
#[derive(Debug, Clone)]
pub struct StrategyCatalog {
    entries: HashMap<String, StrategyMeta>,
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        use StrategyTier::*;

        let entries = HashMap::from([
            meta("risk_management", "Risk Management", 0, Free, &["portfolio"]),
            meta(
                "portfolio_optimization",
                "Portfolio Optimization",
                0,
                Free,
                &["portfolio"],
            ),
            meta(
                "spot_momentum_strategy",
                "Spot Momentum",
                0,
                Free,
                &["spot"],
            ),
            meta("spot_mean_reversion", "Spot Mean Reversion", 25, Pro, &["spot"]),
            meta("spot_breakout_strategy", "Breakout Trading", 25, Pro, &["spot"]),
            meta("scalping_strategy", "Scalping", 35, Pro, &["spot", "high_frequency"]),
            meta("pairs_trading", "Pairs Trading", 35, Pro, &["spot", "pairs"]),
            meta(
                "statistical_arbitrage",
                "Statistical Arbitrage",
                50,
                Enterprise,
                &["spot", "cross_sectional"],
            ),
            meta(
                "market_making",
                "Market Making",
                50,
                Enterprise,
                &["spot", "order_book"],
            ),
            meta("futures_trade", "Futures Trading", 40, Pro, &["derivatives"]),
            meta(
                "options_trade",
                "Options Trading",
                60,
                Enterprise,
                &["derivatives", "options"],
            ),
            meta("funding_arbitrage", "Funding Arbitrage", 45, Pro, &["derivatives"]),
            meta(
                "hedge_position",
                "Hedge Positions",
                40,
                Enterprise,
                &["derivatives", "portfolio"],
            ),
            meta(
                "complex_strategy",
                "Complex Strategies",
                75,
                Enterprise,
                &["derivatives", "multi_leg"],
            ),
        ]);

        StrategyCatalog { entries }
    }
}

impl StrategyCatalog {
    pub fn get_catalog(&self) -> &HashMap<String, StrategyMeta> {
        &self.entries
    }

    pub fn get(&self, strategy_id: &str) -> Option<&StrategyMeta> {
        self.entries.get(strategy_id)
    }

    pub fn monthly_cost_of(&self, strategy_id: &str) -> u32 {
        self.get(strategy_id)
            .map(|m| m.monthly_credit_cost)
            .unwrap_or(0)
    }
}

/// Free defaults as activatable strategies.
pub fn free_default_strategies(catalog: &StrategyCatalog) -> Vec<ActiveStrategy> {
    FREE_DEFAULT_STRATEGIES
        .iter()
        .filter_map(|id| catalog.get(id))
        .map(|m| ActiveStrategy {
            strategy_id: m.strategy_id.clone(),
            name: m.name.clone(),
            monthly_credit_cost: m.monthly_credit_cost,
            tier: m.tier,
        })
        .collect()
}

/// Marketplace backed by process memory. Activation never debits credits for
/// free strategies; this core never debits anything at all.
pub struct InMemoryMarketplace {
    catalog: StrategyCatalog,
    activations: RwLock<HashMap<String, Vec<ActiveStrategy>>>,
}

impl InMemoryMarketplace {
    pub fn new(catalog: StrategyCatalog) -> Self {
        InMemoryMarketplace {
            catalog,
            activations: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// Activate a catalog strategy for a user. Unknown ids are ignored.
    pub async fn activate(&self, user_id: &str, strategy_id: &str) {
        let Some(meta) = self.catalog.get(strategy_id) else {
            return;
        };
        let mut activations = self.activations.write().await;
        let strategies = activations.entry(user_id.to_string()).or_default();
        if strategies.iter().any(|s| s.strategy_id == strategy_id) {
            return;
        }
        strategies.push(ActiveStrategy {
            strategy_id: meta.strategy_id.clone(),
            name: meta.name.clone(),
            monthly_credit_cost: meta.monthly_credit_cost,
            tier: meta.tier,
        });
    }

    pub async fn deactivate(&self, user_id: &str, strategy_id: &str) {
        let mut activations = self.activations.write().await;
        if let Some(strategies) = activations.get_mut(user_id) {
            strategies.retain(|s| s.strategy_id != strategy_id);
        }
    }
}

#[async_trait]
impl PortfolioReader for InMemoryMarketplace {
    async fn get_user_portfolio(&self, user_id: &str) -> Result<PortfolioSnapshot> {
        let activations = self.activations.read().await;
        let active_strategies = activations.get(user_id).cloned().unwrap_or_default();
        let total_monthly_cost = active_strategies
            .iter()
            .map(|s| s.monthly_credit_cost)
            .sum();
        Ok(PortfolioSnapshot {
            success: true,
            active_strategies,
            total_monthly_cost,
        })
    }
}

#[async_trait]
impl OnboardingHook for InMemoryMarketplace {
    async fn provision_free_strategies(&self, user_id: &str) -> Result<bool> {
        for strategy_id in FREE_DEFAULT_STRATEGIES {
            self.activate(user_id, strategy_id).await;
        }
        info!(user_id, "Provisioned free default strategies");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_free_strategies_cost_nothing() {
        let catalog = StrategyCatalog::default();
        for id in FREE_DEFAULT_STRATEGIES {
            let meta = catalog.get(id).unwrap();
            assert!(meta.is_free(), "{} must be free", id);
        }
    }

    #[test]
    fn test_catalog_covers_all_fourteen_scanner_strategies() {
        let catalog = StrategyCatalog::default();
        assert_eq!(catalog.get_catalog().len(), 14);
    }

    #[tokio::test]
    async fn test_onboarding_provisions_the_three_defaults() {
        let marketplace = InMemoryMarketplace::new(StrategyCatalog::default());
        assert!(
            marketplace
                .provision_free_strategies("u1")
                .await
                .unwrap()
        );

        let portfolio = marketplace.get_user_portfolio("u1").await.unwrap();
        assert_eq!(portfolio.active_strategies.len(), 3);
        assert_eq!(portfolio.total_monthly_cost, 0);
        assert!(portfolio.owns("risk_management"));
        assert!(portfolio.owns("portfolio_optimization"));
        assert!(portfolio.owns("spot_momentum_strategy"));
    }

    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let marketplace = InMemoryMarketplace::new(StrategyCatalog::default());
        marketplace.activate("u1", "pairs_trading").await;
        marketplace.activate("u1", "pairs_trading").await;

        let portfolio = marketplace.get_user_portfolio("u1").await.unwrap();
        assert_eq!(portfolio.active_strategies.len(), 1);
        assert_eq!(portfolio.total_monthly_cost, 35);
    }
}
