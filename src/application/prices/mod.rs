//! Shared price service.
//!
//! Two cache tiers (process memory + shared cache) over the rate-limited
//! ticker fetcher. Concurrent lookups that would hit the same exchange feed
//! are deduplicated through a single in-flight fetch. Prices are never
//! fabricated: a symbol without upstream data stays absent.

use crate::domain::asset::Asset;
use crate::domain::envelope::PriceSnapshot;
use crate::domain::exchange::AssetType;
use crate::domain::ports::CacheStore;
use crate::infrastructure::exchanges::{ExchangeRegistry, TickerFetcher};
use futures::stream::StreamExt;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, warn};

fn price_key(exchange: &str, symbol: &str) -> String {
    format!("price:{}:{}", exchange, symbol)
}

/// Snapshot of one asset converted from a discovery ticker row.
pub fn snapshot_from_asset(asset: &Asset) -> PriceSnapshot {
    let meta_f64 = |key: &str| asset.metadata.get(key).and_then(serde_json::Value::as_f64);
    PriceSnapshot {
        symbol: asset.symbol.clone(),
        exchange: asset.exchange.clone(),
        current: asset.price_usd,
        high_24h: meta_f64("high_24h"),
        low_24h: meta_f64("low_24h"),
        change_24h_pct: meta_f64("price_change_pct").or_else(|| {
            meta_f64("change_rate").map(|r| r * 100.0)
        }),
        volume_24h_usd: Some(asset.volume_24h_usd),
        as_of: asset.last_updated,
    }
}

struct MemoryEntry {
    snapshot: PriceSnapshot,
    stored_at: Instant,
}

type InflightFetch = Arc<OnceCell<HashMap<String, PriceSnapshot>>>;

pub struct PriceService {
    cache: Arc<dyn CacheStore>,
    registry: Arc<ExchangeRegistry>,
    fetcher: Arc<TickerFetcher>,
    memory: RwLock<HashMap<String, MemoryEntry>>,
    inflight: Mutex<HashMap<String, InflightFetch>>,
    ttl: Duration,
    preload_batch_size: usize,
    preload_concurrency: usize,
}

impl PriceService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        registry: Arc<ExchangeRegistry>,
        fetcher: Arc<TickerFetcher>,
        ttl: Duration,
        preload_batch_size: usize,
        preload_concurrency: usize,
    ) -> Self {
        PriceService {
            cache,
            registry,
            fetcher,
            memory: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            ttl,
            preload_batch_size: preload_batch_size.max(1),
            preload_concurrency: preload_concurrency.max(1),
        }
    }

    /// Warm both cache tiers from already-discovered assets. Writes run in
    /// bounded batches so a large universe cannot stampede the shared cache.
    pub async fn preload(&self, assets: &[Asset]) -> usize {
        let mut stored = 0usize;

        for chunk in assets.chunks(self.preload_batch_size) {
            {
                let mut memory = self.memory.write().await;
                for asset in chunk {
                    let snapshot = snapshot_from_asset(asset);
                    memory.insert(
                        price_key(&asset.exchange, &asset.symbol),
                        MemoryEntry {
                            snapshot,
                            stored_at: Instant::now(),
                        },
                    );
                }
            }

            let mut writes = futures::stream::iter(chunk.iter().map(|asset| {
                let key = price_key(&asset.exchange, &asset.symbol);
                let snapshot = snapshot_from_asset(asset);
                let cache = self.cache.clone();
                let ttl = self.ttl;
                async move {
                    match serde_json::to_string(&snapshot) {
                        Ok(serialized) => cache.set(&key, &serialized, ttl).await.is_ok(),
                        Err(_) => false,
                    }
                }
            }))
            .buffer_unordered(self.preload_concurrency);

            while let Some(ok) = writes.next().await {
                if ok {
                    stored += 1;
                }
            }
        }

        debug!(preloaded = stored, "Price cache warmed");
        stored
    }

    /// Snapshot for `(exchange, symbol)`: memory, shared cache, then one
    /// deduplicated exchange fetch. `None` means upstream has no price.
    pub async fn get(&self, exchange: &str, symbol: &str) -> Option<PriceSnapshot> {
        let key = price_key(exchange, symbol);

        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(&key)
                && entry.stored_at.elapsed() < self.ttl
            {
                return Some(entry.snapshot.clone());
            }
        }

        if let Ok(Some(raw)) = self.cache.get(&key).await
            && let Ok(snapshot) = serde_json::from_str::<PriceSnapshot>(&raw)
        {
            self.remember(&key, snapshot.clone()).await;
            return Some(snapshot);
        }

        let fetched = self.fetch_exchange(exchange).await;
        fetched.get(symbol).cloned()
    }

    /// Exact decimal price for strategy math that wants lossless arithmetic.
    pub async fn get_price_decimal(&self, exchange: &str, symbol: &str) -> Option<Decimal> {
        let snapshot = self.get(exchange, symbol).await?;
        Decimal::from_f64(snapshot.current)
    }

    async fn remember(&self, key: &str, snapshot: PriceSnapshot) {
        let mut memory = self.memory.write().await;
        memory.insert(
            key.to_string(),
            MemoryEntry {
                snapshot,
                stored_at: Instant::now(),
            },
        );
    }

    /// One full-feed fetch per exchange at a time; concurrent callers share
    /// the same in-flight result.
    async fn fetch_exchange(&self, exchange: &str) -> HashMap<String, PriceSnapshot> {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(exchange.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_init(|| async {
                let Some(descriptor) = self.registry.get(exchange).await else {
                    warn!(exchange, "Price lookup for unknown exchange");
                    return HashMap::new();
                };

                let assets = self
                    .fetcher
                    .fetch(&descriptor, AssetType::Spot, "price_service")
                    .await;

                let mut snapshots = HashMap::with_capacity(assets.len());
                {
                    let mut memory = self.memory.write().await;
                    for asset in assets.values() {
                        let snapshot = snapshot_from_asset(asset);
                        memory.insert(
                            price_key(exchange, &asset.symbol),
                            MemoryEntry {
                                snapshot: snapshot.clone(),
                                stored_at: Instant::now(),
                            },
                        );
                        snapshots.insert(asset.symbol.clone(), snapshot);
                    }
                }
                snapshots
            })
            .await
            .clone();

        {
            let mut inflight = self.inflight.lock().await;
            inflight.remove(exchange);
        }

        result
    }
}
