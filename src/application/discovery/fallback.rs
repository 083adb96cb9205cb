//! Degradation layer: when the pipeline fails, serve something structurally
//! valid from cache remnants or a minimal protection hint, and record the
//! failure for monitoring.

use crate::domain::ports::CacheStore;
use crate::infrastructure::observability::Metrics;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const FALLBACK_OPPORTUNITY_LIMIT: usize = 5;

pub struct FallbackProvider {
    cache: Arc<dyn CacheStore>,
    metrics: Metrics,
}

impl FallbackProvider {
    pub fn new(cache: Arc<dyn CacheStore>, metrics: Metrics) -> Self {
        FallbackProvider { cache, metrics }
    }

    /// Best-effort opportunities after a pipeline failure: a truncated slice
    /// of any recent cache entry, else a static portfolio-protection hint.
    pub async fn provide(&self, user_id: &str, scan_id: &str) -> Value {
        let pattern = format!("user_opportunities:{}:*", user_id);
        if let Ok(keys) = self.cache.scan_keys(&pattern).await {
            for key in keys {
                let Ok(Some(raw)) = self.cache.get(&key).await else {
                    continue;
                };
                let Ok(entry) = serde_json::from_str::<Value>(&raw) else {
                    continue;
                };

                // Entries wrap the payload for metadata; accept the legacy
                // flat shape too
                let payload = entry.get("payload").unwrap_or(&entry);
                let Some(opportunities) = payload.get("opportunities").and_then(Value::as_array)
                else {
                    continue;
                };
                if opportunities.is_empty() {
                    continue;
                }

                let limited: Vec<Value> = opportunities
                    .iter()
                    .take(FALLBACK_OPPORTUNITY_LIMIT)
                    .cloned()
                    .collect();

                info!(
                    scan_id,
                    user_id,
                    count = limited.len(),
                    "Fallback opportunities provided from cache"
                );
                return json!({
                    "success": true,
                    "opportunities": limited,
                    "source": "cached_fallback",
                    "warning": "Limited opportunities from cache due to system error",
                });
            }
        }

        json!({
            "success": true,
            "opportunities": [basic_protection_hint()],
            "source": "basic_fallback",
            "warning": "Basic opportunities provided due to system error",
        })
    }

    /// Error accounting: daily global counter, per-user counter, and a
    /// detailed log entry keyed by scan id.
    pub async fn track_error(
        &self,
        user_id: &str,
        scan_id: &str,
        error: &str,
        execution_time_ms: f64,
    ) {
        self.metrics
            .component_errors_total
            .with_label_values(&["orchestrator"])
            .inc();

        let daily_key = format!(
            "opportunity_discovery_errors:{}",
            Utc::now().format("%Y-%m-%d")
        );
        if self.cache.incr(&daily_key).await.is_ok() {
            let _ = self
                .cache
                .expire(&daily_key, Duration::from_secs(86_400 * 7))
                .await;
        }

        let user_key = format!("user_opportunity_errors:{}", user_id);
        if self.cache.incr(&user_key).await.is_ok() {
            let _ = self
                .cache
                .expire(&user_key, Duration::from_secs(86_400))
                .await;
        }

        let details = json!({
            "scan_id": scan_id,
            "user_id": user_id,
            "error": error,
            "execution_time_ms": execution_time_ms,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let log_key = format!("opportunity_error_log:{}", scan_id);
        if let Err(e) = self
            .cache
            .set(&log_key, &details.to_string(), Duration::from_secs(86_400 * 3))
            .await
        {
            debug!(error = %e, "Error tracking write failed");
        }
    }
}

fn basic_protection_hint() -> Value {
    json!({
        "strategy_id": "risk_management",
        "strategy_name": "Risk Management",
        "opportunity_type": "risk_assessment",
        "symbol": "PORTFOLIO",
        "exchange": "multiple",
        "profit_potential_usd": 0.0,
        "confidence_score": 80.0,
        "risk_level": "low",
        "required_capital_usd": 0.0,
        "estimated_timeframe": "ongoing",
        "entry_price": null,
        "exit_price": null,
        "metadata": {
            "fallback": true,
            "description": "Review your portfolio risk profile and get protection recommendations",
        },
        "discovered_at": Utc::now().to_rfc3339(),
    })
}
