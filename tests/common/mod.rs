//! Shared test plumbing: a canned-response ticker server and a discovery
//! harness wired over it.

#![allow(dead_code)]

use coinscout::application::discovery::OpportunityDiscoveryService;
use coinscout::application::prices::PriceService;
use coinscout::application::scanners::ScannerRegistry;
use coinscout::application::strategies::StrategyRouter;
use coinscout::application::universe::AssetUniverseService;
use coinscout::config::DiscoveryConfig;
use coinscout::domain::exchange::ExchangeDescriptor;
use coinscout::domain::ports::{CacheStore, OnboardingHook, PortfolioReader};
use coinscout::infrastructure::cache::MemoryCache;
use coinscout::infrastructure::core::http_client_factory::HttpClientFactory;
use coinscout::infrastructure::exchanges::{ExchangeRegistry, TickerFetcher};
use coinscout::infrastructure::observability::Metrics;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one fixed JSON body (with the given status) for every request.
/// Returns the base URL.
pub async fn spawn_ticker_server(status: u16, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reason = match status {
        200 => "OK",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    };

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let body = body.clone();
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                reason,
                body.len()
            );
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Binance-format 24h ticker row.
pub fn ticker_row(symbol: &str, price: f64, quote_volume: f64, change_pct: f64) -> serde_json::Value {
    serde_json::json!({
        "symbol": symbol,
        "lastPrice": price.to_string(),
        "quoteVolume": quote_volume.to_string(),
        "priceChangePercent": change_pct.to_string(),
        "highPrice": (price * 1.04).to_string(),
        "lowPrice": (price * 0.94).to_string(),
    })
}

pub fn descriptor(id: &str, spot_url: &str, rate_limit: u32, priority: u8) -> ExchangeDescriptor {
    ExchangeDescriptor {
        id: id.into(),
        name: id.into(),
        spot_url: Some(spot_url.into()),
        futures_url: None,
        parser: "binance".into(),
        rate_limit_per_minute: rate_limit,
        priority,
        capabilities: Default::default(),
        volume_24h_btc: None,
    }
}

pub struct Harness {
    pub cache: Arc<dyn CacheStore>,
    pub universe: Arc<AssetUniverseService>,
    pub router: Arc<StrategyRouter>,
    pub metrics: Metrics,
    pub config: DiscoveryConfig,
    registry: Arc<ExchangeRegistry>,
    fetcher: Arc<TickerFetcher>,
}

impl Harness {
    /// Build the exchange/universe stack over the given descriptors.
    pub fn over(descriptors: Vec<ExchangeDescriptor>) -> Self {
        // Production defaults; the 15s HTTP budget leaves room for the
        // retry middleware to finish against local canned feeds
        let config = DiscoveryConfig::default();
        let metrics = Metrics::new().unwrap();
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let client = HttpClientFactory::create_client(config.http_timeout);
        let registry = Arc::new(ExchangeRegistry::from_descriptors(descriptors));
        let fetcher = Arc::new(TickerFetcher::new(
            client,
            cache.clone(),
            config.http_timeout,
            config.rate_limit_window,
            config.rate_limit_cooldown,
        ));
        let universe = Arc::new(AssetUniverseService::new(
            registry.clone(),
            fetcher.clone(),
            cache.clone(),
            metrics.clone(),
            config.clone(),
        ));
        let prices = Arc::new(PriceService::new(
            cache.clone(),
            registry.clone(),
            fetcher.clone(),
            config.cache_ttl_prices,
            config.price_preload_batch_size,
            config.price_preload_concurrency,
        ));
        let router = Arc::new(StrategyRouter::new(prices));

        Harness {
            cache,
            universe,
            router,
            metrics,
            config,
            registry,
            fetcher,
        }
    }

    /// Orchestrator over this harness with the given collaborator stubs.
    pub fn discovery(
        &self,
        portfolio_reader: Arc<dyn PortfolioReader>,
        onboarding: Arc<dyn OnboardingHook>,
        scanners: ScannerRegistry,
    ) -> OpportunityDiscoveryService {
        OpportunityDiscoveryService::new(
            self.cache.clone(),
            portfolio_reader,
            onboarding,
            self.universe.clone(),
            scanners,
            self.router.clone(),
            self.metrics.clone(),
            self.config.clone(),
        )
    }
}

/// Onboarding stub that never provisions anything.
pub struct NoOnboarding;

#[async_trait::async_trait]
impl OnboardingHook for NoOnboarding {
    async fn provision_free_strategies(&self, _user_id: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}
