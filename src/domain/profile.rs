use crate::domain::asset::Tier;
use crate::domain::strategy::ActiveStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Subscription tier derived from the user's active strategy portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    Basic,
    Pro,
    Enterprise,
}

impl UserTier {
    /// basic unless (>=5 strategies and >=100/mo) -> pro;
    /// (>=10 and >=300/mo) -> enterprise.
    pub fn derive(strategy_count: usize, total_monthly_cost: u32) -> UserTier {
        if strategy_count >= 10 && total_monthly_cost >= 300 {
            UserTier::Enterprise
        } else if strategy_count >= 5 && total_monthly_cost >= 100 {
            UserTier::Pro
        } else {
            UserTier::Basic
        }
    }

    /// Deepest asset tier this user tier may scan.
    pub fn max_asset_tier(&self) -> Tier {
        match self {
            UserTier::Basic => Tier::Retail,
            UserTier::Pro => Tier::Professional,
            UserTier::Enterprise => Tier::Institutional,
        }
    }

    pub fn scan_limit(&self) -> usize {
        match self {
            UserTier::Basic => 50,
            UserTier::Pro => 200,
            UserTier::Enterprise => 1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Basic => "basic",
            UserTier::Pro => "pro",
            UserTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic fingerprint of an active strategy set.
///
/// Order-insensitive: the sorted, deduplicated, non-empty strategy ids are
/// joined and hashed. An empty set fingerprints to `"none"` so cache probes
/// stay cheap for users without strategies.
pub fn strategy_fingerprint(strategies: &[ActiveStrategy]) -> String {
    let mut ids: Vec<&str> = strategies
        .iter()
        .map(|s| s.strategy_id.trim())
        .filter(|id| !id.is_empty())
        .collect();

    if ids.is_empty() {
        return "none".to_string();
    }

    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Sha256::new();
    hasher.update(ids.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// Per-user discovery profile computed from the strategy portfolio at scan
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOpportunityProfile {
    pub user_id: String,
    pub active_strategy_count: usize,
    pub total_monthly_strategy_cost: u32,
    pub user_tier: UserTier,
    pub max_asset_tier: Tier,
    pub opportunity_scan_limit: usize,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub strategy_fingerprint: String,
}

impl UserOpportunityProfile {
    /// Safe default for users with no resolvable portfolio: basic tier with
    /// a deliberately small scan limit.
    pub fn default_for(user_id: &str) -> Self {
        UserOpportunityProfile {
            user_id: user_id.to_string(),
            active_strategy_count: 0,
            total_monthly_strategy_cost: 0,
            user_tier: UserTier::Basic,
            max_asset_tier: Tier::Retail,
            opportunity_scan_limit: 10,
            last_scan_time: None,
            strategy_fingerprint: "none".to_string(),
        }
    }

    pub fn from_portfolio(
        user_id: &str,
        strategies: &[ActiveStrategy],
        total_monthly_cost: u32,
        last_scan_time: Option<DateTime<Utc>>,
    ) -> Self {
        let user_tier = UserTier::derive(strategies.len(), total_monthly_cost);
        UserOpportunityProfile {
            user_id: user_id.to_string(),
            active_strategy_count: strategies.len(),
            total_monthly_strategy_cost: total_monthly_cost,
            user_tier,
            max_asset_tier: user_tier.max_asset_tier(),
            opportunity_scan_limit: user_tier.scan_limit(),
            last_scan_time,
            strategy_fingerprint: strategy_fingerprint(strategies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::StrategyTier;

    fn strategy(id: &str) -> ActiveStrategy {
        ActiveStrategy {
            strategy_id: id.to_string(),
            name: id.to_string(),
            monthly_credit_cost: 0,
            tier: StrategyTier::Free,
        }
    }

    #[test]
    fn test_user_tier_derivation() {
        assert_eq!(UserTier::derive(0, 0), UserTier::Basic);
        assert_eq!(UserTier::derive(5, 99), UserTier::Basic);
        assert_eq!(UserTier::derive(4, 500), UserTier::Basic);
        assert_eq!(UserTier::derive(5, 100), UserTier::Pro);
        assert_eq!(UserTier::derive(10, 299), UserTier::Pro);
        assert_eq!(UserTier::derive(10, 300), UserTier::Enterprise);
    }

    #[test]
    fn test_fingerprint_is_order_insensitive() {
        let a = [strategy("pairs_trading"), strategy("market_making")];
        let b = [strategy("market_making"), strategy("pairs_trading")];
        assert_eq!(strategy_fingerprint(&a), strategy_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_changes_with_set() {
        let a = [strategy("pairs_trading")];
        let b = [strategy("pairs_trading"), strategy("market_making")];
        assert_ne!(strategy_fingerprint(&a), strategy_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_ignores_blank_ids_and_duplicates() {
        let a = [strategy("pairs_trading"), strategy(" "), strategy("pairs_trading")];
        let b = [strategy("pairs_trading")];
        assert_eq!(strategy_fingerprint(&a), strategy_fingerprint(&b));
    }

    #[test]
    fn test_empty_set_fingerprints_to_none() {
        assert_eq!(strategy_fingerprint(&[]), "none");
    }

    #[test]
    fn test_profile_scan_limits_follow_tier() {
        let strategies: Vec<ActiveStrategy> =
            (0..10).map(|i| strategy(&format!("s{}", i))).collect();
        let profile = UserOpportunityProfile::from_portfolio("u1", &strategies, 350, None);
        assert_eq!(profile.user_tier, UserTier::Enterprise);
        assert_eq!(profile.max_asset_tier, Tier::Institutional);
        assert_eq!(profile.opportunity_scan_limit, 1000);
    }
}
