use crate::domain::exchange::{ExchangeCapability, ExchangeDescriptor, ExchangeFilter};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::info;

fn caps(list: &[ExchangeCapability]) -> BTreeSet<ExchangeCapability> {
    list.iter().copied().collect()
}

/// Built-in exchange descriptors. Rate limits and priorities reflect each
/// venue's published API budgets; priority breaks best-quote ties.
pub fn static_descriptors() -> Vec<ExchangeDescriptor> {
    use ExchangeCapability::*;

    vec![
        ExchangeDescriptor {
            id: "binance".into(),
            name: "Binance".into(),
            spot_url: Some("https://api.binance.com/api/v3/ticker/24hr".into()),
            futures_url: Some("https://fapi.binance.com/fapi/v1/ticker/24hr".into()),
            parser: "binance".into(),
            rate_limit_per_minute: 1200,
            priority: 1,
            capabilities: caps(&[
                SpotTrading,
                FuturesTrading,
                PriceData,
                OrderBook,
                TradingHistory,
                WebsocketStreams,
            ]),
            volume_24h_btc: None,
        },
        ExchangeDescriptor {
            id: "kraken".into(),
            name: "Kraken".into(),
            spot_url: Some("https://api.kraken.com/0/public/Ticker".into()),
            futures_url: None,
            parser: "kraken".into(),
            rate_limit_per_minute: 60,
            priority: 2,
            capabilities: caps(&[SpotTrading, PriceData, OrderBook, TradingHistory]),
            volume_24h_btc: None,
        },
        ExchangeDescriptor {
            id: "kucoin".into(),
            name: "KuCoin".into(),
            spot_url: Some("https://api.kucoin.com/api/v1/market/allTickers".into()),
            futures_url: None,
            parser: "kucoin".into(),
            rate_limit_per_minute: 300,
            priority: 3,
            capabilities: caps(&[SpotTrading, PriceData, OrderBook, WebsocketStreams]),
            volume_24h_btc: None,
        },
        ExchangeDescriptor {
            id: "bybit".into(),
            name: "Bybit".into(),
            spot_url: Some("https://api.bybit.com/v5/market/tickers?category=spot".into()),
            futures_url: Some("https://api.bybit.com/v5/market/tickers?category=linear".into()),
            parser: "bybit".into(),
            rate_limit_per_minute: 120,
            priority: 5,
            capabilities: caps(&[
                SpotTrading,
                FuturesTrading,
                PriceData,
                OrderBook,
                WebsocketStreams,
            ]),
            volume_24h_btc: None,
        },
        ExchangeDescriptor {
            id: "okx".into(),
            name: "OKX".into(),
            spot_url: Some("https://www.okx.com/api/v5/market/tickers?instType=SPOT".into()),
            futures_url: Some("https://www.okx.com/api/v5/market/tickers?instType=SWAP".into()),
            parser: "okx".into(),
            rate_limit_per_minute: 600,
            priority: 6,
            capabilities: caps(&[
                SpotTrading,
                FuturesTrading,
                OptionsTrading,
                PriceData,
                OrderBook,
                WebsocketStreams,
            ]),
            volume_24h_btc: None,
        },
        ExchangeDescriptor {
            id: "bitfinex".into(),
            name: "Bitfinex".into(),
            spot_url: Some("https://api-pub.bitfinex.com/v2/tickers?symbols=ALL".into()),
            futures_url: None,
            parser: "bitfinex".into(),
            rate_limit_per_minute: 90,
            priority: 7,
            capabilities: caps(&[SpotTrading, PriceData, OrderBook]),
            volume_24h_btc: None,
        },
        ExchangeDescriptor {
            id: "gate".into(),
            name: "Gate.io".into(),
            spot_url: Some("https://api.gateio.ws/api/v4/spot/tickers".into()),
            futures_url: None,
            parser: "gate".into(),
            rate_limit_per_minute: 300,
            priority: 9,
            capabilities: caps(&[SpotTrading, PriceData, OrderBook]),
            volume_24h_btc: None,
        },
    ]
}

/// Runtime view of all known exchanges: the static table, optionally
/// augmented by dynamically discovered venues.
pub struct ExchangeRegistry {
    exchanges: RwLock<HashMap<String, ExchangeDescriptor>>,
}

impl ExchangeRegistry {
    pub fn with_static_table() -> Self {
        Self::from_descriptors(static_descriptors())
    }

    pub fn from_descriptors(descriptors: Vec<ExchangeDescriptor>) -> Self {
        let exchanges = descriptors
            .into_iter()
            .filter(ExchangeDescriptor::has_feed)
            .map(|d| (d.id.clone(), d))
            .collect();
        ExchangeRegistry {
            exchanges: RwLock::new(exchanges),
        }
    }

    pub async fn get(&self, id: &str) -> Option<ExchangeDescriptor> {
        self.exchanges.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.exchanges.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Descriptors matching the filter, ordered by priority.
    pub async fn list_exchanges(&self, filter: &ExchangeFilter) -> Vec<ExchangeDescriptor> {
        let exchanges = self.exchanges.read().await;
        let mut matching: Vec<ExchangeDescriptor> = exchanges
            .values()
            .filter(|d| {
                filter
                    .required_capabilities
                    .iter()
                    .all(|cap| d.supports(*cap))
            })
            .filter(|d| match filter.min_volume_24h_btc {
                // Static venues carry no registry volume and always pass
                Some(min) => d.volume_24h_btc.is_none_or(|v| v >= min),
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by_key(|d| d.priority);
        matching
    }

    /// Merge dynamically discovered descriptors. Static entries win on id
    /// collision; discovered venues without a ticker feed are dropped.
    pub async fn merge_discovered(&self, discovered: Vec<ExchangeDescriptor>) {
        let mut exchanges = self.exchanges.write().await;
        let mut added = 0usize;
        for descriptor in discovered {
            if !descriptor.has_feed() {
                continue;
            }
            if !exchanges.contains_key(&descriptor.id) {
                exchanges.insert(descriptor.id.clone(), descriptor);
                added += 1;
            }
        }
        if added > 0 {
            info!(added, total = exchanges.len(), "Merged discovered exchanges");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_table_has_platform_defaults() {
        let ids: Vec<String> = static_descriptors().into_iter().map(|d| d.id).collect();
        for wanted in ["binance", "kraken", "kucoin"] {
            assert!(ids.contains(&wanted.to_string()));
        }
    }

    #[test]
    fn test_every_static_descriptor_has_a_feed() {
        for descriptor in static_descriptors() {
            assert!(descriptor.has_feed(), "{} has no feed url", descriptor.id);
        }
    }

    #[tokio::test]
    async fn test_capability_filter_narrows_listing() {
        let registry = ExchangeRegistry::with_static_table();

        let all = registry.list_exchanges(&ExchangeFilter::default()).await;
        let futures_only = registry
            .list_exchanges(&ExchangeFilter {
                required_capabilities: vec![ExchangeCapability::FuturesTrading],
                min_volume_24h_btc: None,
            })
            .await;

        assert!(futures_only.len() < all.len());
        assert!(futures_only.iter().all(|d| d.futures_url.is_some()));
        // Priority ordering: binance first
        assert_eq!(futures_only[0].id, "binance");
    }

    #[tokio::test]
    async fn test_merge_keeps_static_entries_on_collision() {
        let registry = ExchangeRegistry::with_static_table();
        let before = registry.get("binance").await.unwrap();

        registry
            .merge_discovered(vec![ExchangeDescriptor {
                id: "binance".into(),
                name: "Imposter".into(),
                spot_url: Some("https://imposter.test/ticker".into()),
                futures_url: None,
                parser: "binance".into(),
                rate_limit_per_minute: 10,
                priority: 99,
                capabilities: Default::default(),
                volume_24h_btc: None,
            }])
            .await;

        let after = registry.get("binance").await.unwrap();
        assert_eq!(after.name, before.name);
    }
}
