//! Per-user exchange and symbol universe resolution.
//!
//! Centralizes how the platform decides which exchanges and symbols to query
//! for a given user: explicit request, then database exchange accounts, then
//! defaults, with a volume-ranked symbol fallback from the discovered
//! universe. Both resolutions sit behind an in-process cache mirrored to the
//! shared cache.

use crate::application::universe::service::AssetUniverseService;
use crate::config::DiscoveryConfig;
use crate::domain::asset::Tier;
use crate::domain::ports::{CacheStore, ExchangeAccountRepository, PortfolioReader};
use crate::domain::profile::UserTier;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

const PLATFORM_DEFAULT_EXCHANGES: [&str; 3] = ["binance", "kraken", "kucoin"];

struct LocalEntry {
    values: Vec<String>,
    expires_at: Instant,
}

impl LocalEntry {
    fn fresh(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

pub struct ExchangeUniverseResolver {
    accounts: Arc<dyn ExchangeAccountRepository>,
    universe: Arc<AssetUniverseService>,
    portfolio_reader: Arc<dyn PortfolioReader>,
    cache: Arc<dyn CacheStore>,
    exchange_cache: RwLock<HashMap<String, LocalEntry>>,
    symbol_cache: RwLock<HashMap<String, LocalEntry>>,
    config: DiscoveryConfig,
}

impl ExchangeUniverseResolver {
    pub fn new(
        accounts: Arc<dyn ExchangeAccountRepository>,
        universe: Arc<AssetUniverseService>,
        portfolio_reader: Arc<dyn PortfolioReader>,
        cache: Arc<dyn CacheStore>,
        config: DiscoveryConfig,
    ) -> Self {
        ExchangeUniverseResolver {
            accounts,
            universe,
            portfolio_reader,
            cache,
            exchange_cache: RwLock::new(HashMap::new()),
            symbol_cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Exchanges to query for this user: explicit request first, then the
    /// user's active exchange accounts, then caller defaults, then platform
    /// defaults.
    pub async fn get_user_exchanges(
        &self,
        user_id: Option<&str>,
        requested: Option<&[String]>,
        defaults: Option<&[String]>,
    ) -> Vec<String> {
        let normalized = normalize_list(requested);
        if !normalized.is_empty() {
            return normalized;
        }

        let cache_key = format!("exchanges:{}", user_id.unwrap_or("global"));
        if let Some(values) = self
            .read_local(&self.exchange_cache, &cache_key)
            .await
            .or(self.read_shared(&cache_key).await)
        {
            return values;
        }

        let mut exchanges: Vec<String> = Vec::new();
        if let Some(user_id) = user_id {
            match self.accounts.active_accounts(user_id).await {
                Ok(accounts) => {
                    let mut names: Vec<String> = accounts
                        .iter()
                        .filter(|a| a.is_usable())
                        .map(|a| a.exchange_name.to_lowercase())
                        .collect::<HashSet<_>>()
                        .into_iter()
                        .collect();
                    names.sort();
                    exchanges = names;
                }
                Err(e) => {
                    warn!(user_id, error = %e, "Exchange account lookup failed");
                }
            }
        }

        if exchanges.is_empty() {
            exchanges = defaults
                .map(|d| d.to_vec())
                .filter(|d| !d.is_empty())
                .unwrap_or_default();
        }
        if exchanges.is_empty() {
            exchanges = PLATFORM_DEFAULT_EXCHANGES
                .iter()
                .map(|s| s.to_string())
                .collect();
        }

        self.store(
            &self.exchange_cache,
            &cache_key,
            &exchanges,
            self.config.cache_ttl_exchanges,
        )
        .await;
        exchanges
    }

    /// Symbol universe for this user on the given exchanges. Explicit request
    /// wins; otherwise account-allowed symbols are volume-ranked inside the
    /// user's tier ceiling; the final fallbacks are the discovered top-N and
    /// an empty list callers must cope with.
    pub async fn get_symbol_universe(
        &self,
        user_id: Option<&str>,
        requested: Option<&[String]>,
        exchanges: &[String],
        asset_types: &[String],
        limit: Option<usize>,
    ) -> Vec<String> {
        let normalized = normalize_list(requested);
        if !normalized.is_empty() {
            return match limit {
                Some(limit) => normalized.into_iter().take(limit).collect(),
                None => normalized,
            };
        }

        let (max_tier, tier_limit) = self.user_asset_preferences(user_id).await;
        let effective_limit = limit.unwrap_or(tier_limit);

        let mut sorted_exchanges = exchanges.to_vec();
        sorted_exchanges.sort();
        let mut sorted_types = asset_types.to_vec();
        sorted_types.sort();
        let cache_key = format!(
            "symbols:{}:{}:{}:{}",
            user_id.unwrap_or("global"),
            sorted_exchanges.join(","),
            max_tier,
            sorted_types.join(",")
        );

        if let Some(values) = self
            .read_local(&self.symbol_cache, &cache_key)
            .await
            .or(self.read_shared(&cache_key).await)
        {
            return values.into_iter().take(effective_limit).collect();
        }

        let mut symbols = self
            .rank_account_symbols(user_id, exchanges, max_tier, effective_limit)
            .await;

        if symbols.is_empty() {
            symbols = self
                .universe
                .get_top_assets(effective_limit, max_tier)
                .await
                .into_iter()
                .map(|a| a.symbol)
                .collect();
        }

        self.store(
            &self.symbol_cache,
            &cache_key,
            &symbols,
            self.config.cache_ttl_symbols,
        )
        .await;
        symbols
    }

    /// Purge cached universes for one user, in-process and shared.
    pub async fn invalidate_user(&self, user_id: &str) {
        let exchange_prefix = format!("exchanges:{}", user_id);
        let symbol_prefix = format!("symbols:{}", user_id);

        {
            let mut cache = self.exchange_cache.write().await;
            cache.retain(|key, _| !key.starts_with(&exchange_prefix));
        }
        {
            let mut cache = self.symbol_cache.write().await;
            cache.retain(|key, _| !key.starts_with(&symbol_prefix));
        }

        for pattern in [format!("{}*", exchange_prefix), format!("{}*", symbol_prefix)] {
            if let Ok(keys) = self.cache.scan_keys(&pattern).await {
                for key in keys {
                    let _ = self.cache.delete(&key).await;
                }
            }
        }
    }

    /// Tier ceiling and symbol budget from the user's portfolio tier:
    /// basic -> retail/50, pro -> professional/200, enterprise ->
    /// institutional/1000.
    async fn user_asset_preferences(&self, user_id: Option<&str>) -> (Tier, usize) {
        let Some(user_id) = user_id else {
            return (Tier::Retail, 50);
        };

        let tier = match self.portfolio_reader.get_user_portfolio(user_id).await {
            Ok(portfolio) if portfolio.success => UserTier::derive(
                portfolio.active_strategies.len(),
                portfolio.total_monthly_cost,
            ),
            Ok(_) => UserTier::Basic,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to determine user asset tier");
                UserTier::Basic
            }
        };

        (tier.max_asset_tier(), tier.scan_limit().min(1000))
    }

    async fn rank_account_symbols(
        &self,
        user_id: Option<&str>,
        exchanges: &[String],
        max_tier: Tier,
        limit: usize,
    ) -> Vec<String> {
        let Some(user_id) = user_id else {
            return Vec::new();
        };

        let accounts = match self.accounts.active_accounts(user_id).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(user_id, error = %e, "Account symbol lookup failed");
                return Vec::new();
            }
        };

        let exchange_set: HashSet<String> = exchanges.iter().map(|e| e.to_lowercase()).collect();
        let mut allowed: HashSet<String> = HashSet::new();
        for account in accounts {
            if !exchange_set.contains(&account.exchange_name.to_lowercase()) {
                continue;
            }
            for symbol in account.allowed_symbols {
                if !symbol.is_empty() {
                    allowed.insert(symbol.to_uppercase());
                }
            }
        }
        if allowed.is_empty() {
            return Vec::new();
        }

        // Universe is already filtered to the tier ceiling; ordering by
        // volume comes from the tiered snapshot
        let ranked = self
            .universe
            .discover(max_tier, Some(exchanges.to_vec()), None, false)
            .await;

        ranked
            .top_assets_by_volume(usize::MAX)
            .into_iter()
            .map(|a| a.symbol)
            .filter(|s| allowed.contains(s))
            .take(limit)
            .collect()
    }

    async fn read_local(
        &self,
        cache: &RwLock<HashMap<String, LocalEntry>>,
        key: &str,
    ) -> Option<Vec<String>> {
        let cache = cache.read().await;
        cache
            .get(key)
            .filter(|entry| entry.fresh())
            .map(|entry| entry.values.clone())
    }

    async fn read_shared(&self, key: &str) -> Option<Vec<String>> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => serde_json::from_str::<Vec<String>>(&raw).ok(),
            _ => None,
        }
    }

    async fn store(
        &self,
        local: &RwLock<HashMap<String, LocalEntry>>,
        key: &str,
        values: &[String],
        ttl: Duration,
    ) {
        {
            let mut cache = local.write().await;
            cache.insert(
                key.to_string(),
                LocalEntry {
                    values: values.to_vec(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }
        if let Ok(serialized) = serde_json::to_string(values)
            && let Err(e) = self.cache.set(key, &serialized, ttl).await
        {
            warn!(key, error = %e, "Failed to mirror universe cache entry");
        }
    }
}

/// Trim, dedupe (case-insensitive) and preserve order.
fn normalize_list(values: Option<&[String]>) -> Vec<String> {
    let Some(values) = values else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            unique.push(trimmed.to_string());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exchange::ExchangeAccount;
    use crate::domain::strategy::PortfolioSnapshot;
    use crate::infrastructure::cache::MemoryCache;
    use crate::infrastructure::core::http_client_factory::HttpClientFactory;
    use crate::infrastructure::exchanges::{ExchangeRegistry, TickerFetcher};
    use crate::infrastructure::observability::Metrics;
    use anyhow::Result;
    use async_trait::async_trait;

    struct StubAccounts {
        accounts: Vec<ExchangeAccount>,
    }

    #[async_trait]
    impl ExchangeAccountRepository for StubAccounts {
        async fn active_accounts(&self, user_id: &str) -> Result<Vec<ExchangeAccount>> {
            Ok(self
                .accounts
                .iter()
                .filter(|a| a.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    struct StubPortfolio;

    #[async_trait]
    impl PortfolioReader for StubPortfolio {
        async fn get_user_portfolio(&self, _user_id: &str) -> Result<PortfolioSnapshot> {
            Ok(PortfolioSnapshot::empty_shell())
        }
    }

    fn resolver_with_accounts(accounts: Vec<ExchangeAccount>) -> ExchangeUniverseResolver {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let config = DiscoveryConfig::default();
        let fetcher = Arc::new(TickerFetcher::new(
            HttpClientFactory::create_client(Duration::from_millis(50)),
            cache.clone(),
            Duration::from_millis(50),
            config.rate_limit_window,
            config.rate_limit_cooldown,
        ));
        let universe = Arc::new(AssetUniverseService::new(
            Arc::new(ExchangeRegistry::with_static_table()),
            fetcher,
            cache.clone(),
            Metrics::new().unwrap(),
            config.clone(),
        ));
        ExchangeUniverseResolver::new(
            Arc::new(StubAccounts { accounts }),
            universe,
            Arc::new(StubPortfolio),
            cache,
            config,
        )
    }

    fn account(user: &str, exchange: &str, symbols: &[&str]) -> ExchangeAccount {
        ExchangeAccount {
            user_id: user.into(),
            exchange_name: exchange.into(),
            status: "ACTIVE".into(),
            trading_enabled: true,
            allowed_symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_requested_exchanges_win_and_are_deduped() {
        let resolver = resolver_with_accounts(vec![]);
        let requested = vec![
            "binance".to_string(),
            "Binance".to_string(),
            "okx".to_string(),
        ];
        let exchanges = resolver
            .get_user_exchanges(Some("u1"), Some(&requested), None)
            .await;
        assert_eq!(exchanges, vec!["binance", "okx"]);
    }

    #[tokio::test]
    async fn test_account_exchanges_are_used_when_no_request() {
        let resolver = resolver_with_accounts(vec![
            account("u1", "OKX", &[]),
            account("u1", "Bybit", &[]),
        ]);
        let exchanges = resolver.get_user_exchanges(Some("u1"), None, None).await;
        assert_eq!(exchanges, vec!["bybit", "okx"]);
    }

    #[tokio::test]
    async fn test_platform_defaults_are_the_last_resort() {
        let resolver = resolver_with_accounts(vec![]);
        let exchanges = resolver.get_user_exchanges(Some("u1"), None, None).await;
        assert_eq!(exchanges, vec!["binance", "kraken", "kucoin"]);
    }

    #[tokio::test]
    async fn test_caller_defaults_precede_platform_defaults() {
        let resolver = resolver_with_accounts(vec![]);
        let defaults = vec!["gate".to_string()];
        let exchanges = resolver
            .get_user_exchanges(Some("u2"), None, Some(&defaults))
            .await;
        assert_eq!(exchanges, vec!["gate"]);
    }

    #[tokio::test]
    async fn test_requested_symbols_truncate_to_limit() {
        let resolver = resolver_with_accounts(vec![]);
        let requested = vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()];
        let symbols = resolver
            .get_symbol_universe(
                Some("u1"),
                Some(&requested),
                &["binance".to_string()],
                &["spot".to_string()],
                Some(2),
            )
            .await;
        assert_eq!(symbols, vec!["BTC", "ETH"]);
    }

    #[test]
    fn test_normalize_preserves_first_spelling() {
        let input = vec![
            " BTC ".to_string(),
            "btc".to_string(),
            "".to_string(),
            "ETH".to_string(),
        ];
        assert_eq!(normalize_list(Some(&input)), vec!["BTC", "ETH"]);
    }
}
