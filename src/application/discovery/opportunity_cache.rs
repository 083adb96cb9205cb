use crate::config::DiscoveryConfig;
use crate::domain::ports::CacheStore;
use crate::domain::profile::UserOpportunityProfile;
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Non-empty results may be served for this long after caching.
const NONEMPTY_MAX_AGE_SECS: i64 = 600;

#[derive(Debug, Serialize, Deserialize)]
struct CacheMetadata {
    cached_at: DateTime<Utc>,
    cache_key: String,
    strategy_fingerprint: String,
    zero_ttl_seconds: u64,
    total_opportunities: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    payload: Value,
    cache_metadata: CacheMetadata,
}

/// Per-user opportunity result cache with fingerprint invalidation.
///
/// A cached envelope is only ever served to a caller whose current strategy
/// fingerprint matches the one the scan ran against; anything else is a miss
/// and is deleted.
pub struct OpportunityCache {
    cache: Arc<dyn CacheStore>,
    metrics: Metrics,
    config: DiscoveryConfig,
}

impl OpportunityCache {
    pub fn new(cache: Arc<dyn CacheStore>, metrics: Metrics, config: DiscoveryConfig) -> Self {
        OpportunityCache {
            cache,
            metrics,
            config,
        }
    }

    fn cache_key(profile: &UserOpportunityProfile) -> String {
        format!(
            "user_opportunities:{}:{}:{}",
            profile.user_id, profile.user_tier, profile.active_strategy_count
        )
    }

    fn last_scan_key(user_id: &str) -> String {
        format!("user_opportunity_last_scan:{}", user_id)
    }

    /// Cached envelope for this profile, when fresh and fingerprint-sound.
    pub async fn get(&self, profile: &UserOpportunityProfile) -> Option<Value> {
        let key = Self::cache_key(profile);
        let raw = match self.cache.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.record_lookup("miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Opportunity cache read failed");
                self.record_lookup("error");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Opportunity cache entry undecodable, dropping");
                let _ = self.cache.delete(&key).await;
                self.record_lookup("miss");
                return None;
            }
        };

        if entry.cache_metadata.strategy_fingerprint != profile.strategy_fingerprint {
            info!(
                user_id = %profile.user_id,
                cached_fingerprint = %entry.cache_metadata.strategy_fingerprint,
                current_fingerprint = %profile.strategy_fingerprint,
                "Cached opportunities invalidated by strategy change"
            );
            let _ = self.cache.delete(&key).await;
            self.record_lookup("invalidated");
            return None;
        }

        let age = Utc::now()
            .signed_duration_since(entry.cache_metadata.cached_at)
            .num_seconds();
        let max_age = if entry.cache_metadata.total_opportunities > 0 {
            NONEMPTY_MAX_AGE_SECS
        } else {
            entry.cache_metadata.zero_ttl_seconds as i64
        };
        if age < 0 || age >= max_age {
            self.record_lookup("expired");
            return None;
        }

        let mut payload = entry.payload;
        ensure_profile_strategy_counts(&mut payload);
        self.record_lookup("hit");
        Some(payload)
    }

    /// Persist a scan result. Empty result sets and partial scans get the
    /// short TTL so they are re-scanned quickly.
    pub async fn store(&self, profile: &UserOpportunityProfile, payload: &Value, partial: bool) {
        let key = Self::cache_key(profile);
        let total_opportunities = payload
            .get("total_opportunities")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        let mut payload = payload.clone();
        ensure_profile_strategy_counts(&mut payload);

        let entry = CacheEntry {
            payload,
            cache_metadata: CacheMetadata {
                cached_at: Utc::now(),
                cache_key: key.clone(),
                strategy_fingerprint: profile.strategy_fingerprint.clone(),
                zero_ttl_seconds: self.config.cache_ttl_opportunities_empty.as_secs(),
                total_opportunities,
            },
        };

        let ttl = if total_opportunities > 0 && !partial {
            self.config.cache_ttl_opportunities_nonempty
        } else {
            self.config.cache_ttl_opportunities_empty
        };

        match serde_json::to_string(&entry) {
            Ok(serialized) => {
                if let Err(e) = self.cache.set(&key, &serialized, ttl).await {
                    warn!(error = %e, "Opportunity cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "Opportunity envelope not serializable"),
        }

        let _ = self
            .cache
            .set(
                &Self::last_scan_key(&profile.user_id),
                &Utc::now().to_rfc3339(),
                Duration::from_secs(86_400),
            )
            .await;
    }

    pub async fn last_scan_time(&self, user_id: &str) -> Option<DateTime<Utc>> {
        let raw = self
            .cache
            .get(&Self::last_scan_key(user_id))
            .await
            .ok()
            .flatten()?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Drop every cached result for one user (strategy change, tier change,
    /// explicit refresh).
    pub async fn invalidate_user(&self, user_id: &str) {
        let pattern = format!("user_opportunities:{}:*", user_id);
        if let Ok(keys) = self.cache.scan_keys(&pattern).await {
            for key in keys {
                let _ = self.cache.delete(&key).await;
            }
        }
    }

    fn record_lookup(&self, outcome: &str) {
        self.metrics
            .cache_lookups_total
            .with_label_values(&["opportunities", outcome])
            .inc();
    }
}

/// Backward compatibility: older payloads carried only one of the two
/// profile count keys.
fn ensure_profile_strategy_counts(payload: &mut Value) {
    let Some(profile) = payload.get_mut("user_profile").and_then(Value::as_object_mut) else {
        return;
    };

    let active_strategies = profile.get("active_strategies").cloned();
    let active_strategy_count = profile.get("active_strategy_count").cloned();

    match (active_strategies, active_strategy_count) {
        (None, Some(count)) => {
            profile.insert("active_strategies".into(), count);
        }
        (Some(strategies), None) => {
            profile.insert("active_strategy_count".into(), strategies);
        }
        _ => {}
    }
}
