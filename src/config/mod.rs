//! Configuration for the discovery engine.
//!
//! Every knob has a production default matching the platform contract and an
//! environment override (`DISCOVERY_*`). Loading lives here and in the
//! binary; components receive the resolved struct.

use std::env;
use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Resolved engine configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    // Cache TTLs
    pub cache_ttl_universe_read: Duration,
    pub cache_ttl_universe_write: Duration,
    pub cache_ttl_opportunities_nonempty: Duration,
    pub cache_ttl_opportunities_empty: Duration,
    pub cache_ttl_exchanges: Duration,
    pub cache_ttl_symbols: Duration,
    pub cache_ttl_prices: Duration,

    // Timeouts and budgets
    pub http_timeout: Duration,
    pub portfolio_fetch_timeout: Duration,
    /// Total per-request budget used to derive scanner stage timeouts.
    pub total_scan_budget: Duration,
    /// Deployment worker budget (outer process timeout).
    pub worker_budget: Duration,

    // Circuit breaker
    pub circuit_breaker_threshold: usize,
    pub circuit_breaker_open_duration: Duration,

    // Concurrency
    pub scanner_semaphore: usize,
    pub discovery_probe_semaphore: usize,
    pub price_preload_concurrency: usize,
    pub price_preload_batch_size: usize,

    // Rate limiting
    pub rate_limit_window: Duration,
    pub rate_limit_cooldown: Duration,

    // Platform defaults
    pub default_exchanges: Vec<String>,

    // Collaborator endpoints
    pub redis_url: Option<String>,
    pub database_url: String,
    pub exchange_registry_source: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            cache_ttl_universe_read: Duration::from_secs(300),
            cache_ttl_universe_write: Duration::from_secs(600),
            cache_ttl_opportunities_nonempty: Duration::from_secs(900),
            cache_ttl_opportunities_empty: Duration::from_secs(120),
            cache_ttl_exchanges: Duration::from_secs(300),
            cache_ttl_symbols: Duration::from_secs(900),
            cache_ttl_prices: Duration::from_secs(60),

            http_timeout: Duration::from_secs(15),
            portfolio_fetch_timeout: Duration::from_secs(45),
            total_scan_budget: Duration::from_secs(120),
            worker_budget: Duration::from_secs(180),

            circuit_breaker_threshold: 3,
            circuit_breaker_open_duration: Duration::from_secs(60),

            scanner_semaphore: 3,
            discovery_probe_semaphore: 10,
            price_preload_concurrency: 50,
            price_preload_batch_size: 50,

            rate_limit_window: Duration::from_secs(60),
            rate_limit_cooldown: Duration::from_secs(300),

            default_exchanges: vec!["binance".into(), "kraken".into(), "kucoin".into()],

            redis_url: None,
            database_url: "sqlite://data/coinscout.db".into(),
            exchange_registry_source: None,
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from the environment on top of the defaults.
    pub fn from_env() -> Self {
        let defaults = DiscoveryConfig::default();

        let default_exchanges = env::var("DISCOVERY_DEFAULT_EXCHANGES")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.default_exchanges);

        DiscoveryConfig {
            cache_ttl_universe_read: Duration::from_secs(env_u64(
                "DISCOVERY_UNIVERSE_READ_TTL_SECS",
                defaults.cache_ttl_universe_read.as_secs(),
            )),
            cache_ttl_universe_write: Duration::from_secs(env_u64(
                "DISCOVERY_UNIVERSE_WRITE_TTL_SECS",
                defaults.cache_ttl_universe_write.as_secs(),
            )),
            cache_ttl_opportunities_nonempty: Duration::from_secs(env_u64(
                "DISCOVERY_OPPORTUNITY_TTL_SECS",
                defaults.cache_ttl_opportunities_nonempty.as_secs(),
            )),
            cache_ttl_opportunities_empty: Duration::from_secs(env_u64(
                "DISCOVERY_OPPORTUNITY_EMPTY_TTL_SECS",
                defaults.cache_ttl_opportunities_empty.as_secs(),
            )),
            cache_ttl_exchanges: Duration::from_secs(env_u64(
                "DISCOVERY_EXCHANGE_TTL_SECS",
                defaults.cache_ttl_exchanges.as_secs(),
            )),
            cache_ttl_symbols: Duration::from_secs(env_u64(
                "DISCOVERY_SYMBOL_TTL_SECS",
                defaults.cache_ttl_symbols.as_secs(),
            )),
            cache_ttl_prices: Duration::from_secs(env_u64(
                "DISCOVERY_PRICE_TTL_SECS",
                defaults.cache_ttl_prices.as_secs(),
            )),

            http_timeout: Duration::from_secs(env_u64(
                "DISCOVERY_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )),
            portfolio_fetch_timeout: Duration::from_secs(env_u64(
                "DISCOVERY_PORTFOLIO_TIMEOUT_SECS",
                defaults.portfolio_fetch_timeout.as_secs(),
            )),
            total_scan_budget: Duration::from_secs(env_u64(
                "DISCOVERY_SCAN_BUDGET_SECS",
                defaults.total_scan_budget.as_secs(),
            )),
            worker_budget: Duration::from_secs(env_u64(
                "DISCOVERY_WORKER_BUDGET_SECS",
                defaults.worker_budget.as_secs(),
            )),

            circuit_breaker_threshold: env_usize(
                "DISCOVERY_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            ),
            circuit_breaker_open_duration: Duration::from_secs(env_u64(
                "DISCOVERY_BREAKER_OPEN_SECS",
                defaults.circuit_breaker_open_duration.as_secs(),
            )),

            scanner_semaphore: env_usize("DISCOVERY_SCANNER_SEMAPHORE", defaults.scanner_semaphore),
            discovery_probe_semaphore: env_usize(
                "DISCOVERY_PROBE_SEMAPHORE",
                defaults.discovery_probe_semaphore,
            ),
            price_preload_concurrency: env_usize(
                "DISCOVERY_PRELOAD_CONCURRENCY",
                defaults.price_preload_concurrency,
            ),
            price_preload_batch_size: env_usize(
                "DISCOVERY_PRELOAD_BATCH_SIZE",
                defaults.price_preload_batch_size,
            ),

            rate_limit_window: Duration::from_secs(env_u64(
                "DISCOVERY_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window.as_secs(),
            )),
            rate_limit_cooldown: Duration::from_secs(env_u64(
                "DISCOVERY_RATE_LIMIT_COOLDOWN_SECS",
                defaults.rate_limit_cooldown.as_secs(),
            )),

            default_exchanges,

            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            exchange_registry_source: env::var("DISCOVERY_EXCHANGE_REGISTRY_URL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    /// Stage timeout for one scanner task:
    /// `min(max(total_budget - 5s, 60s), worker_budget - 5s)`.
    pub fn scanner_stage_timeout(&self) -> Duration {
        let total = self.total_scan_budget.as_secs_f64();
        let worker = self.worker_budget.as_secs_f64();
        let floor = (total - 5.0).max(60.0);
        let cap = (worker - 5.0).max(1.0);
        Duration::from_secs_f64(floor.min(cap))
    }
}
