use crate::application::universe::classifier::{classify_assets, filter_by_min_tier};
use crate::config::DiscoveryConfig;
use crate::domain::asset::{Asset, Tier, TieredUniverse};
use crate::domain::exchange::AssetType;
use crate::domain::ports::CacheStore;
use crate::infrastructure::exchanges::{ExchangeRegistry, TickerFetcher};
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Serialize, Deserialize)]
struct CachedUniverse {
    assets: TieredUniverse,
    timestamp: DateTime<Utc>,
}

/// Multi-exchange asset discovery with read-through caching.
///
/// Fetches every `(exchange, asset_type)` ticker feed concurrently, collapses
/// to best-quote per symbol, tiers by 24h USD volume, and caches the result
/// keyed on `(min_tier, exchange set)`.
pub struct AssetUniverseService {
    registry: Arc<ExchangeRegistry>,
    fetcher: Arc<TickerFetcher>,
    cache: Arc<dyn CacheStore>,
    metrics: Metrics,
    config: DiscoveryConfig,
}

impl AssetUniverseService {
    pub fn new(
        registry: Arc<ExchangeRegistry>,
        fetcher: Arc<TickerFetcher>,
        cache: Arc<dyn CacheStore>,
        metrics: Metrics,
        config: DiscoveryConfig,
    ) -> Self {
        AssetUniverseService {
            registry,
            fetcher,
            cache,
            metrics,
            config,
        }
    }

    fn cache_key(min_tier: Tier, exchanges: &[String]) -> String {
        let mut sorted = exchanges.to_vec();
        sorted.sort();
        format!("enterprise_assets:{}:{}", min_tier, sorted.join("_"))
    }

    /// Discover the tier-classified universe. Cache-fresh results are served
    /// within the read window; everything else runs a full fetch pass.
    pub async fn discover(
        &self,
        min_tier: Tier,
        exchanges: Option<Vec<String>>,
        asset_types: Option<Vec<AssetType>>,
        force_refresh: bool,
    ) -> TieredUniverse {
        let started = Instant::now();
        let scan_id = format!("asset_scan_{}", Uuid::new_v4().simple());

        let target_exchanges = match exchanges {
            Some(list) if !list.is_empty() => list,
            _ => self.registry.ids().await,
        };
        let asset_types = asset_types.unwrap_or_else(|| vec![AssetType::Spot, AssetType::Futures]);

        let cache_key = Self::cache_key(min_tier, &target_exchanges);
        if !force_refresh
            && let Some(cached) = self.read_cache(&cache_key).await
        {
            self.metrics
                .cache_lookups_total
                .with_label_values(&["universe", "hit"])
                .inc();
            info!(
                scan_id,
                total_assets = cached.total_assets(),
                "Serving cached asset universe"
            );
            return cached;
        }
        self.metrics
            .cache_lookups_total
            .with_label_values(&["universe", "miss"])
            .inc();

        info!(
            scan_id,
            min_tier = %min_tier,
            exchanges = target_exchanges.len(),
            "Asset discovery starting"
        );

        let mut fetches = Vec::new();
        let mut priorities: HashMap<String, u8> = HashMap::new();

        for exchange_id in &target_exchanges {
            let Some(descriptor) = self.registry.get(exchange_id).await else {
                warn!(scan_id, exchange = %exchange_id, "Unknown exchange requested");
                continue;
            };
            priorities.insert(descriptor.id.clone(), descriptor.priority);

            for asset_type in &asset_types {
                if descriptor.url_for(*asset_type).is_none() {
                    continue;
                }
                let fetcher = self.fetcher.clone();
                let descriptor = descriptor.clone();
                let asset_type = *asset_type;
                let scan_id = scan_id.clone();
                let metrics = self.metrics.clone();
                fetches.push(async move {
                    let fetch_started = Instant::now();
                    let assets = fetcher.fetch(&descriptor, asset_type, &scan_id).await;
                    metrics
                        .exchange_fetch_seconds
                        .with_label_values(&[&descriptor.id])
                        .observe(fetch_started.elapsed().as_secs_f64());
                    assets
                });
            }
        }

        let per_exchange = futures::future::join_all(fetches).await;

        let universe = classify_assets(per_exchange, &priorities);
        let filtered = filter_by_min_tier(universe, min_tier);

        self.metrics
            .universe_assets
            .set(filtered.total_assets() as f64);
        self.write_cache(&cache_key, &filtered).await;

        info!(
            scan_id,
            execution_time_ms = started.elapsed().as_millis() as u64,
            total_assets = filtered.total_assets(),
            exchanges_scanned = target_exchanges.len(),
            "Asset discovery completed"
        );

        filtered
    }

    /// Volume-ranked flattening across tiers; the symbol fallback path.
    pub async fn get_top_assets(&self, count: usize, min_tier: Tier) -> Vec<Asset> {
        let universe = self.discover(min_tier, None, None, false).await;
        universe.top_assets_by_volume(count)
    }

    async fn read_cache(&self, key: &str) -> Option<TieredUniverse> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Universe cache read failed, falling back to cold path");
                self.metrics
                    .component_errors_total
                    .with_label_values(&["universe_cache"])
                    .inc();
                return None;
            }
        };

        let cached: CachedUniverse = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Universe cache entry undecodable, discarding");
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(cached.timestamp);
        if age.num_seconds() < 0
            || age.num_seconds() as u64 >= self.config.cache_ttl_universe_read.as_secs()
        {
            return None;
        }
        Some(cached.assets)
    }

    async fn write_cache(&self, key: &str, universe: &TieredUniverse) {
        let entry = CachedUniverse {
            assets: universe.clone(),
            timestamp: Utc::now(),
        };
        match serde_json::to_string(&entry) {
            Ok(serialized) => {
                if let Err(e) = self
                    .cache
                    .set(key, &serialized, self.config.cache_ttl_universe_write)
                    .await
                {
                    warn!(error = %e, "Universe cache write failed");
                    self.metrics
                        .component_errors_total
                        .with_label_values(&["universe_cache"])
                        .inc();
                }
            }
            Err(e) => warn!(error = %e, "Universe snapshot not serializable"),
        }
    }
}
