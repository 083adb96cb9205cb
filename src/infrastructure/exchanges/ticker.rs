use crate::domain::asset::Asset;
use crate::domain::errors::ExchangeFeedError;
use crate::domain::exchange::{AssetType, ExchangeDescriptor};
use crate::domain::ports::CacheStore;
use crate::infrastructure::exchanges::parsers::{TickerParser, parser_registry};
use reqwest_middleware::ClientWithMiddleware;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Rate-limited, timeout-bounded fetch of one exchange ticker feed.
///
/// Absence of data is a valid outcome: every failure mode (rate limit, HTTP
/// error, timeout, parse error) logs and returns an empty map. Nothing here
/// ever propagates an error into the discovery pipeline.
pub struct TickerFetcher {
    client: ClientWithMiddleware,
    cache: Arc<dyn CacheStore>,
    parsers: HashMap<String, Arc<dyn TickerParser>>,
    request_timeout: Duration,
    rate_limit_window: Duration,
    rate_limit_cooldown: Duration,
}

impl TickerFetcher {
    pub fn new(
        client: ClientWithMiddleware,
        cache: Arc<dyn CacheStore>,
        request_timeout: Duration,
        rate_limit_window: Duration,
        rate_limit_cooldown: Duration,
    ) -> Self {
        TickerFetcher {
            client,
            cache,
            parsers: parser_registry(),
            request_timeout,
            rate_limit_window,
            rate_limit_cooldown,
        }
    }

    fn rate_limit_key(exchange_id: &str) -> String {
        format!("exchange_rate_limit:{}", exchange_id)
    }

    /// Local counter check before spending a request. The counter is
    /// advisory: a racing overshoot is acceptable, a 429 cooldown is not
    /// bypassed.
    async fn is_rate_limited(&self, descriptor: &ExchangeDescriptor) -> bool {
        let key = Self::rate_limit_key(&descriptor.id);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => {
                if raw == "limited" {
                    return true;
                }
                let used = raw.parse::<u32>().unwrap_or(0);
                used >= descriptor.rate_limit_per_minute
            }
            Ok(None) => false,
            Err(e) => {
                // Cache outage never blocks discovery
                debug!(exchange = %descriptor.id, error = %e, "Rate limit check skipped");
                false
            }
        }
    }

    async fn record_request(&self, exchange_id: &str) {
        let key = Self::rate_limit_key(exchange_id);
        if let Ok(count) = self.cache.incr(&key).await
            && count <= 1
        {
            let _ = self.cache.expire(&key, self.rate_limit_window).await;
        }
    }

    async fn mark_cooled_down(&self, exchange_id: &str) {
        let key = Self::rate_limit_key(exchange_id);
        let _ = self
            .cache
            .set(&key, "limited", self.rate_limit_cooldown)
            .await;
    }

    /// Fetch and parse one `(exchange, asset_type)` ticker feed.
    pub async fn fetch(
        &self,
        descriptor: &ExchangeDescriptor,
        asset_type: AssetType,
        scan_id: &str,
    ) -> HashMap<String, Asset> {
        let Some(url) = descriptor.url_for(asset_type) else {
            return HashMap::new();
        };

        let Some(parser) = self.parsers.get(&descriptor.parser) else {
            warn!(exchange = %descriptor.id, parser = %descriptor.parser, scan_id, "No parser registered");
            return HashMap::new();
        };

        if self.is_rate_limited(descriptor).await {
            let reason = ExchangeFeedError::RateLimited {
                exchange: descriptor.id.clone(),
                retry_after_secs: self.rate_limit_cooldown.as_secs(),
            };
            warn!(scan_id, "{}", reason);
            return HashMap::new();
        }

        let response = match timeout(self.request_timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(exchange = %descriptor.id, scan_id, error = %e, "Ticker fetch failed");
                return HashMap::new();
            }
            Err(_) => {
                let reason = ExchangeFeedError::Timeout {
                    exchange: descriptor.id.clone(),
                    timeout_secs: self.request_timeout.as_secs(),
                };
                warn!(scan_id, "{}", reason);
                return HashMap::new();
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            self.mark_cooled_down(&descriptor.id).await;
            warn!(exchange = %descriptor.id, scan_id, "Rate limited upstream, cooling down");
            return HashMap::new();
        }
        if !status.is_success() {
            let reason = ExchangeFeedError::HttpStatus {
                exchange: descriptor.id.clone(),
                status: status.as_u16(),
            };
            warn!(scan_id, "{}", reason);
            return HashMap::new();
        }

        self.record_request(&descriptor.id).await;

        let payload: serde_json::Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                let reason = ExchangeFeedError::Parse {
                    exchange: descriptor.id.clone(),
                    reason: e.to_string(),
                };
                warn!(scan_id, "{}", reason);
                return HashMap::new();
            }
        };

        let assets = parser.parse(&payload, &descriptor.id, asset_type);
        debug!(
            exchange = %descriptor.id,
            asset_type = asset_type.as_str(),
            scan_id,
            assets = assets.len(),
            "Ticker feed parsed"
        );
        assets
    }
}
