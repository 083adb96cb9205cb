//! Strategy scanners: one adapter per user-visible strategy.
//!
//! Each scanner resolves its symbol set from the discovered universe,
//! fans out `execute_strategy` calls under its own semaphore, converts
//! envelope signals into `Opportunity` records and enriches them with a
//! trade plan. The registry replaces name-based dynamic dispatch: unknown
//! strategy ids are a lookup miss, not a runtime error.

pub mod advanced;
pub mod arbitrage;
pub mod common;
pub mod derivatives;
pub mod microstructure;
pub mod portfolio;
pub mod spot;

use crate::application::strategies::StrategyRouter;
use crate::domain::asset::TieredUniverse;
use crate::domain::opportunity::Opportunity;
use crate::domain::profile::UserOpportunityProfile;
use crate::domain::strategy::PortfolioSnapshot;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Everything a scanner needs for one scan pass. Snapshot data is read-only
/// and shared across all scanners of the pass.
pub struct ScanContext {
    pub scan_id: String,
    pub profile: UserOpportunityProfile,
    pub portfolio: PortfolioSnapshot,
    pub universe: Arc<TieredUniverse>,
    pub router: Arc<StrategyRouter>,
}

impl ScanContext {
    pub fn owns(&self, strategy_id: &str) -> bool {
        self.portfolio.owns(strategy_id)
    }
}

/// One strategy's opportunity scanner.
#[async_trait]
pub trait OpportunityScanner: Send + Sync {
    fn strategy_id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;

    /// Scan the universe. Implementations must return an empty list when the
    /// user does not own the strategy and must never error: a failed scan is
    /// an empty contribution.
    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity>;
}

/// Fan work out over `items` with at most `permits` concurrent calls,
/// collecting the successful opportunity batches.
pub(crate) async fn bounded_scan<T, F, Fut>(
    items: Vec<T>,
    permits: usize,
    work: F,
) -> Vec<Opportunity>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Vec<Opportunity>> + Send,
{
    let semaphore = Arc::new(Semaphore::new(permits.max(1)));
    let mut tasks = FuturesUnordered::new();

    for item in items {
        let semaphore = semaphore.clone();
        let future = work(item);
        tasks.push(async move {
            let _permit = semaphore.acquire().await.ok()?;
            Some(future.await)
        });
    }

    let mut opportunities = Vec::new();
    while let Some(batch) = tasks.next().await {
        if let Some(batch) = batch {
            opportunities.extend(batch);
        }
    }
    opportunities
}

/// Scanner registry keyed by strategy id, populated once at startup.
pub struct ScannerRegistry {
    scanners: HashMap<&'static str, Arc<dyn OpportunityScanner>>,
}

impl ScannerRegistry {
    pub fn from_scanners(scanners: Vec<Arc<dyn OpportunityScanner>>) -> Self {
        ScannerRegistry {
            scanners: scanners.into_iter().map(|s| (s.strategy_id(), s)).collect(),
        }
    }

    pub fn with_default_scanners() -> Self {
        let scanners: Vec<Arc<dyn OpportunityScanner>> = vec![
            Arc::new(spot::MomentumScanner),
            Arc::new(spot::MeanReversionScanner),
            Arc::new(spot::BreakoutScanner),
            Arc::new(arbitrage::FundingArbitrageScanner),
            Arc::new(arbitrage::StatisticalArbitrageScanner),
            Arc::new(arbitrage::PairsTradingScanner),
            Arc::new(microstructure::ScalpingScanner),
            Arc::new(microstructure::MarketMakingScanner),
            Arc::new(derivatives::FuturesScanner),
            Arc::new(derivatives::OptionsScanner),
            Arc::new(portfolio::RiskManagementScanner),
            Arc::new(portfolio::PortfolioOptimizationScanner),
            Arc::new(advanced::HedgePositionScanner),
            Arc::new(advanced::ComplexStrategyScanner),
        ];

        Self::from_scanners(scanners)
    }

    pub fn get(&self, strategy_id: &str) -> Option<Arc<dyn OpportunityScanner>> {
        self.scanners.get(strategy_id).cloned()
    }

    pub fn strategy_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.scanners.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::application::strategies::test_support::router_with_assets;
    use crate::domain::asset::Asset;
    use crate::domain::profile::UserOpportunityProfile;
    use crate::domain::strategy::{ActiveStrategy, PortfolioSnapshot, StrategyTier};

    pub fn active(strategy_id: &str) -> ActiveStrategy {
        ActiveStrategy {
            strategy_id: strategy_id.to_string(),
            name: strategy_id.to_string(),
            monthly_credit_cost: 0,
            tier: StrategyTier::Free,
        }
    }

    pub async fn context_with(assets: &[Asset], owned: &[&str]) -> ScanContext {
        use crate::application::universe::classifier::classify_assets;
        use std::collections::HashMap;

        let router = Arc::new(router_with_assets(assets).await);

        let per_exchange = vec![
            assets
                .iter()
                .map(|a| (a.symbol.clone(), a.clone()))
                .collect::<HashMap<String, Asset>>(),
        ];
        let universe = classify_assets(per_exchange, &HashMap::from([("binance".to_string(), 1u8)]));

        let strategies: Vec<ActiveStrategy> = owned.iter().map(|id| active(id)).collect();
        let portfolio = PortfolioSnapshot {
            success: true,
            active_strategies: strategies.clone(),
            total_monthly_cost: 0,
        };

        ScanContext {
            scan_id: "scan-test".into(),
            profile: UserOpportunityProfile::from_portfolio("u1", &strategies, 0, None),
            portfolio,
            universe: Arc::new(universe),
            router,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_holds_all_fourteen_scanners() {
        let registry = ScannerRegistry::with_default_scanners();
        assert_eq!(registry.len(), 14);

        for id in [
            "spot_momentum_strategy",
            "spot_mean_reversion",
            "spot_breakout_strategy",
            "funding_arbitrage",
            "statistical_arbitrage",
            "pairs_trading",
            "scalping_strategy",
            "market_making",
            "futures_trade",
            "options_trade",
            "risk_management",
            "portfolio_optimization",
            "hedge_position",
            "complex_strategy",
        ] {
            assert!(registry.get(id).is_some(), "missing scanner {}", id);
        }
    }

    #[test]
    fn test_unknown_strategy_is_a_registry_miss() {
        let registry = ScannerRegistry::with_default_scanners();
        assert!(registry.get("time_travel").is_none());
    }

    #[tokio::test]
    async fn test_bounded_scan_collects_all_batches() {
        let opportunities = bounded_scan(vec![1u32, 2, 3], 2, |n| async move {
            vec![
                crate::application::scanners::common::opportunity_skeleton(
                    "spot_momentum_strategy",
                    format!("opp {}", n),
                    "test",
                    "BTC",
                    "binance",
                ),
            ]
        })
        .await;
        assert_eq!(opportunities.len(), 3);
    }
}
