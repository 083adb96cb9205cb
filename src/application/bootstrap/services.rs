//! Composition root: constructs every service once and wires the dependency
//! graph explicitly. Nothing else in the crate owns a singleton.

use anyhow::Result;
use std::sync::Arc;

use crate::application::discovery::OpportunityDiscoveryService;
use crate::application::marketplace::{InMemoryMarketplace, StrategyCatalog};
use crate::application::prices::PriceService;
use crate::application::scanners::ScannerRegistry;
use crate::application::strategies::StrategyRouter;
use crate::application::universe::{AssetUniverseService, ExchangeUniverseResolver};
use crate::config::DiscoveryConfig;
use crate::domain::ports::CacheStore;
use crate::infrastructure::cache::TieredCache;
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use crate::infrastructure::exchanges::discovery::DynamicExchangeDiscovery;
use crate::infrastructure::exchanges::{ExchangeRegistry, TickerFetcher};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::{Database, SqliteExchangeAccountRepository};

pub struct ServicesHandle {
    pub cache: Arc<dyn CacheStore>,
    pub marketplace: Arc<InMemoryMarketplace>,
    pub registry: Arc<ExchangeRegistry>,
    pub universe: Arc<AssetUniverseService>,
    pub resolver: Arc<ExchangeUniverseResolver>,
    pub prices: Arc<PriceService>,
    pub router: Arc<StrategyRouter>,
    pub discovery: Arc<OpportunityDiscoveryService>,
    pub metrics: Metrics,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub async fn init(config: DiscoveryConfig) -> Result<ServicesHandle> {
        let metrics = Metrics::new()?;

        // 1. Shared cache: Redis when configured, in-process fallback always
        let cache: Arc<dyn CacheStore> =
            Arc::new(TieredCache::connect(config.redis_url.as_deref()).await);

        // 2. Exchange layer
        let client = HttpClientFactory::create_client(config.http_timeout);
        let registry = Arc::new(ExchangeRegistry::with_static_table());
        if config.exchange_registry_source.is_some() {
            let discovery = DynamicExchangeDiscovery::new(
                client.clone(),
                config.exchange_registry_source.clone(),
                config.discovery_probe_semaphore,
            );
            registry.merge_discovered(discovery.discover().await).await;
        }

        let fetcher = Arc::new(TickerFetcher::new(
            client,
            cache.clone(),
            config.http_timeout,
            config.rate_limit_window,
            config.rate_limit_cooldown,
        ));

        // 3. Universe discovery and per-user resolution
        let universe = Arc::new(AssetUniverseService::new(
            registry.clone(),
            fetcher.clone(),
            cache.clone(),
            metrics.clone(),
            config.clone(),
        ));

        let database = Database::new(&config.database_url).await?;
        let accounts = Arc::new(SqliteExchangeAccountRepository::new(database.pool.clone()));

        let marketplace = Arc::new(InMemoryMarketplace::new(StrategyCatalog::default()));

        let resolver = Arc::new(ExchangeUniverseResolver::new(
            accounts,
            universe.clone(),
            marketplace.clone(),
            cache.clone(),
            config.clone(),
        ));

        // 4. Strategy execution
        let prices = Arc::new(PriceService::new(
            cache.clone(),
            registry.clone(),
            fetcher,
            config.cache_ttl_prices,
            config.price_preload_batch_size,
            config.price_preload_concurrency,
        ));
        let router = Arc::new(StrategyRouter::new(prices.clone()));

        // 5. Orchestrator
        let discovery = Arc::new(OpportunityDiscoveryService::new(
            cache.clone(),
            marketplace.clone(),
            marketplace.clone(),
            universe.clone(),
            ScannerRegistry::with_default_scanners(),
            router.clone(),
            metrics.clone(),
            config,
        ));

        Ok(ServicesHandle {
            cache,
            marketplace,
            registry,
            universe,
            resolver,
            prices,
            router,
            discovery,
            metrics,
        })
    }
}
