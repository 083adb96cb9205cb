//! Dynamic exchange discovery.
//!
//! Ingests third-party registry metadata (id, name, api_url, trust score,
//! 24h BTC volume), infers capabilities and rate budgets, probes each
//! candidate for API compatibility, and hands compatible descriptors to the
//! registry. When the source yields nothing the static table stands alone.

use crate::domain::exchange::{ExchangeCapability, ExchangeDescriptor};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Registry-format metadata row for one candidate exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub name: String,
    pub api_url: String,
    #[serde(default)]
    pub trust_score: f64,
    #[serde(default)]
    pub volume_24h_btc: f64,
    #[serde(default)]
    pub centralized: Option<bool>,
}

/// Infer capabilities from registry trust score and BTC volume.
pub fn infer_capabilities(trust_score: f64, volume_24h_btc: f64) -> BTreeSet<ExchangeCapability> {
    use ExchangeCapability::*;

    let mut capabilities: BTreeSet<ExchangeCapability> =
        [SpotTrading, PriceData, OrderBook].into_iter().collect();

    if trust_score >= 7.0 || volume_24h_btc >= 1_000.0 {
        capabilities.insert(TradingHistory);
        capabilities.insert(WebsocketStreams);
    }
    if trust_score >= 8.0 || volume_24h_btc >= 5_000.0 {
        capabilities.insert(FuturesTrading);
    }
    if trust_score >= 9.0 || volume_24h_btc >= 10_000.0 {
        capabilities.insert(OptionsTrading);
    }
    capabilities
}

/// Infer a per-minute request budget from registry trust and volume.
pub fn infer_rate_limit(trust_score: f64, volume_24h_btc: f64) -> u32 {
    if trust_score >= 9.0 && volume_24h_btc >= 10_000.0 {
        1200
    } else if trust_score >= 7.0 && volume_24h_btc >= 5_000.0 {
        600
    } else if trust_score >= 5.0 && volume_24h_btc >= 1_000.0 {
        300
    } else {
        60
    }
}

struct ProbeEndpoint {
    path: &'static str,
    expected_keys: &'static [&'static str],
}

const PROBE_ENDPOINTS: [ProbeEndpoint; 5] = [
    ProbeEndpoint {
        path: "/ticker",
        expected_keys: &["price", "symbol", "volume"],
    },
    ProbeEndpoint {
        path: "/ticker/BTCUSDT",
        expected_keys: &["price", "symbol"],
    },
    ProbeEndpoint {
        path: "/markets",
        expected_keys: &[],
    },
    ProbeEndpoint {
        path: "/time",
        expected_keys: &["serverTime", "timestamp"],
    },
    ProbeEndpoint {
        path: "/tickers",
        expected_keys: &[],
    },
];

/// Shape check on a probe response.
fn validate_response_structure(data: &Value, expected_keys: &[&str]) -> bool {
    if data.is_null() {
        return false;
    }

    if expected_keys.iter().any(|k| matches!(*k, "price" | "symbol" | "volume")) {
        return match data {
            Value::Object(map) => expected_keys.iter().any(|k| map.contains_key(*k)),
            Value::Array(items) => items.first().is_some_and(|first| {
                first
                    .as_object()
                    .is_some_and(|map| expected_keys.iter().any(|k| map.contains_key(*k)))
            }),
            _ => false,
        };
    }

    if expected_keys.contains(&"serverTime") || expected_keys.contains(&"timestamp") {
        if let Value::Object(map) = data {
            let time_val = map
                .get("serverTime")
                .or_else(|| map.get("timestamp"))
                .or_else(|| map.get("time"));
            return time_val
                .and_then(|v| {
                    v.as_i64()
                        .or_else(|| v.as_str().and_then(|s| s.parse::<i64>().ok()))
                })
                .is_some_and(|t| t > 1_000_000_000);
        }
        return false;
    }

    match data {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

pub struct DynamicExchangeDiscovery {
    client: ClientWithMiddleware,
    /// Optional metadata source; discovery is a no-op without one.
    source_url: Option<String>,
    probe_semaphore: Arc<Semaphore>,
    probe_budget: Duration,
}

impl DynamicExchangeDiscovery {
    pub fn new(
        client: ClientWithMiddleware,
        source_url: Option<String>,
        max_concurrent_probes: usize,
    ) -> Self {
        DynamicExchangeDiscovery {
            client,
            source_url,
            probe_semaphore: Arc::new(Semaphore::new(max_concurrent_probes.max(1))),
            probe_budget: Duration::from_secs(15),
        }
    }

    /// Discover, probe, and convert candidates into descriptors. Any failure
    /// along the way degrades to an empty result.
    pub async fn discover(&self) -> Vec<ExchangeDescriptor> {
        let Some(source_url) = &self.source_url else {
            return Vec::new();
        };

        let entries = match self.fetch_registry(source_url).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Exchange registry source unavailable");
                return Vec::new();
            }
        };
        if entries.is_empty() {
            info!("Exchange registry source returned no candidates");
            return Vec::new();
        }

        let mut probes = FuturesUnordered::new();
        for entry in entries {
            if entry.centralized == Some(false) || entry.api_url.is_empty() {
                continue;
            }
            let semaphore = self.probe_semaphore.clone();
            let client = self.client.clone();
            let budget = self.probe_budget;
            probes.push(async move {
                let _permit = semaphore.acquire().await.ok()?;
                let compatible = timeout(budget, probe_exchange(&client, &entry.api_url))
                    .await
                    .unwrap_or(false);
                compatible.then_some(entry)
            });
        }

        let mut descriptors = Vec::new();
        while let Some(result) = probes.next().await {
            if let Some(entry) = result {
                descriptors.push(descriptor_from_entry(entry));
            }
        }

        info!(compatible = descriptors.len(), "Dynamic exchange discovery finished");
        descriptors
    }

    async fn fetch_registry(&self, url: &str) -> anyhow::Result<Vec<RegistryEntry>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("registry source returned HTTP {}", response.status());
        }
        let entries: Vec<RegistryEntry> = response.json().await?;
        Ok(entries)
    }
}

/// Probe one candidate endpoint set; any single shape-valid 200 passes.
async fn probe_exchange(client: &ClientWithMiddleware, api_url: &str) -> bool {
    let base = api_url.trim_end_matches('/');

    let mut probes = FuturesUnordered::new();
    for endpoint in &PROBE_ENDPOINTS {
        let url = format!("{}{}", base, endpoint.path);
        let client = client.clone();
        probes.push(async move {
            let response = match timeout(Duration::from_secs(10), client.get(&url).send()).await {
                Ok(Ok(response)) => response,
                _ => return false,
            };
            if !response.status().is_success() {
                return false;
            }
            match response.json::<Value>().await {
                Ok(data) => validate_response_structure(&data, endpoint.expected_keys),
                Err(e) => {
                    debug!(url, error = %e, "Probe payload not JSON");
                    false
                }
            }
        });
    }

    while let Some(passed) = probes.next().await {
        if passed {
            return true;
        }
    }
    false
}

fn descriptor_from_entry(entry: RegistryEntry) -> ExchangeDescriptor {
    let base = entry.api_url.trim_end_matches('/').to_string();
    ExchangeDescriptor {
        id: entry.id.to_lowercase(),
        name: entry.name,
        // Binance-compatible 24hr ticker shape is the de-facto default for
        // venues that pass the probe
        spot_url: Some(format!("{}/ticker/24hr", base)),
        futures_url: None,
        parser: "binance".into(),
        rate_limit_per_minute: infer_rate_limit(entry.trust_score, entry.volume_24h_btc),
        // Discovered venues rank behind the static table
        priority: 50,
        capabilities: infer_capabilities(entry.trust_score, entry.volume_24h_btc),
        volume_24h_btc: Some(entry.volume_24h_btc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capability_inference_ladder() {
        use ExchangeCapability::*;

        let low = infer_capabilities(3.0, 100.0);
        assert!(!low.contains(&TradingHistory));
        assert!(!low.contains(&FuturesTrading));

        let mid = infer_capabilities(7.0, 0.0);
        assert!(mid.contains(&TradingHistory));
        assert!(mid.contains(&WebsocketStreams));
        assert!(!mid.contains(&FuturesTrading));

        let by_volume = infer_capabilities(0.0, 5_000.0);
        assert!(by_volume.contains(&FuturesTrading));

        let top = infer_capabilities(9.0, 10_000.0);
        assert!(top.contains(&OptionsTrading));
    }

    #[test]
    fn test_rate_limit_inference_ladder() {
        assert_eq!(infer_rate_limit(9.5, 20_000.0), 1200);
        assert_eq!(infer_rate_limit(7.0, 5_000.0), 600);
        assert_eq!(infer_rate_limit(5.0, 1_000.0), 300);
        assert_eq!(infer_rate_limit(9.5, 100.0), 60);
    }

    #[test]
    fn test_ticker_shape_validation() {
        assert!(validate_response_structure(
            &json!({"symbol": "BTCUSDT", "price": "50000"}),
            &["price", "symbol"]
        ));
        assert!(validate_response_structure(
            &json!([{"symbol": "BTCUSDT", "price": "50000"}]),
            &["price", "symbol"]
        ));
        assert!(!validate_response_structure(
            &json!({"pong": true}),
            &["price", "symbol"]
        ));
    }

    #[test]
    fn test_server_time_validation_requires_plausible_timestamp() {
        assert!(validate_response_structure(
            &json!({"serverTime": 1_700_000_000_000i64}),
            &["serverTime", "timestamp"]
        ));
        assert!(!validate_response_structure(
            &json!({"serverTime": 12345}),
            &["serverTime", "timestamp"]
        ));
    }

    #[test]
    fn test_generic_validation_accepts_nonempty_collections() {
        assert!(validate_response_structure(&json!(["BTC-USD"]), &[]));
        assert!(!validate_response_structure(&json!([]), &[]));
    }

    #[test]
    fn test_descriptor_from_entry_ranks_behind_static_table() {
        let descriptor = descriptor_from_entry(RegistryEntry {
            id: "NewVenue".into(),
            name: "New Venue".into(),
            api_url: "https://api.newvenue.test/".into(),
            trust_score: 8.0,
            volume_24h_btc: 6_000.0,
            centralized: Some(true),
        });
        assert_eq!(descriptor.id, "newvenue");
        assert_eq!(descriptor.rate_limit_per_minute, 600);
        assert!(descriptor.priority > 10);
        assert!(descriptor.capabilities.contains(&ExchangeCapability::FuturesTrading));
    }
}
