//! Per-user opportunity discovery pipeline.
//!
//! Profile, universe, scanner fan-out, ranking, caching, recommendations,
//! degradation. Every collaborator failure becomes data; the caller always
//! receives a structurally valid envelope.

use crate::application::discovery::fallback::FallbackProvider;
use crate::application::discovery::opportunity_cache::OpportunityCache;
use crate::application::discovery::recommendations::generate_recommendations;
use crate::application::marketplace::catalog::FREE_DEFAULT_STRATEGIES;
use crate::application::scanners::{ScanContext, ScannerRegistry};
use crate::application::strategies::StrategyRouter;
use crate::application::universe::AssetUniverseService;
use crate::config::DiscoveryConfig;
use crate::domain::errors::DiscoveryError;
use crate::domain::opportunity::Opportunity;
use crate::domain::ports::{CacheStore, OnboardingHook, PortfolioReader};
use crate::domain::profile::UserOpportunityProfile;
use crate::domain::strategy::PortfolioSnapshot;
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::observability::Metrics;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How long a fetched portfolio snapshot stays fresh in process memory.
const PORTFOLIO_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(300);

enum PipelineOutcome {
    Envelope(Box<Value>),
    NoStrategies(Box<Value>),
}

struct PortfolioFetch {
    snapshot: PortfolioSnapshot,
    fetch_time_ms: f64,
    cache_hit: bool,
    timed_out: bool,
}

struct ScanOutcome {
    strategy_id: String,
    opportunities: Option<Vec<Opportunity>>,
}

pub struct OpportunityDiscoveryService {
    cache: Arc<dyn CacheStore>,
    opportunity_cache: OpportunityCache,
    fallback: FallbackProvider,
    portfolio_reader: Arc<dyn PortfolioReader>,
    onboarding: Arc<dyn OnboardingHook>,
    universe: Arc<AssetUniverseService>,
    scanners: ScannerRegistry,
    router: Arc<StrategyRouter>,
    metrics: Metrics,
    config: DiscoveryConfig,
    portfolio_breaker: CircuitBreaker,
    portfolio_cache: RwLock<HashMap<String, (PortfolioSnapshot, Instant)>>,
}

impl OpportunityDiscoveryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<dyn CacheStore>,
        portfolio_reader: Arc<dyn PortfolioReader>,
        onboarding: Arc<dyn OnboardingHook>,
        universe: Arc<AssetUniverseService>,
        scanners: ScannerRegistry,
        router: Arc<StrategyRouter>,
        metrics: Metrics,
        config: DiscoveryConfig,
    ) -> Self {
        let portfolio_breaker = CircuitBreaker::new(
            "portfolio_fetch",
            config.circuit_breaker_threshold,
            1,
            config.circuit_breaker_open_duration,
        );
        let opportunity_cache =
            OpportunityCache::new(cache.clone(), metrics.clone(), config.clone());
        let fallback = FallbackProvider::new(cache.clone(), metrics.clone());

        OpportunityDiscoveryService {
            cache,
            opportunity_cache,
            fallback,
            portfolio_reader,
            onboarding,
            universe,
            scanners,
            router,
            metrics,
            config,
            portfolio_breaker,
            portfolio_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn opportunity_cache(&self) -> &OpportunityCache {
        &self.opportunity_cache
    }

    /// External strategy add/remove event: drop the cached portfolio
    /// read-model so the next scan sees the new set. The opportunity cache
    /// invalidates itself through the fingerprint check.
    pub async fn note_strategy_change(&self, user_id: &str) {
        self.portfolio_cache.write().await.remove(user_id);
    }

    /// Main entry point: discover all opportunities for a user based on
    /// their strategy portfolio.
    pub async fn discover_opportunities_for_user(
        &self,
        user_id: &str,
        force_refresh: bool,
        include_strategy_recommendations: bool,
    ) -> Value {
        let started = Instant::now();
        let scan_id = format!("user_discovery_{}_{}", user_id, Uuid::new_v4().simple());

        info!(
            scan_id,
            user_id, force_refresh, "User opportunity discovery starting"
        );

        let mut onboarding_attempted = false;
        loop {
            let result = self
                .run_pipeline(
                    user_id,
                    force_refresh,
                    include_strategy_recommendations,
                    &scan_id,
                    started,
                )
                .await;

            match result {
                Ok(PipelineOutcome::Envelope(envelope)) => return *envelope,
                Ok(PipelineOutcome::NoStrategies(envelope)) => {
                    if onboarding_attempted {
                        return *envelope;
                    }
                    onboarding_attempted = true;
                    match self.onboarding.provision_free_strategies(user_id).await {
                        Ok(true) => {
                            info!(scan_id, user_id, "User onboarded with free strategies");
                            self.portfolio_cache.write().await.remove(user_id);
                            continue;
                        }
                        Ok(false) => return *envelope,
                        Err(e) => {
                            warn!(scan_id, user_id, error = %e, "Automatic onboarding failed");
                            return *envelope;
                        }
                    }
                }
                Err(e) => {
                    let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
                    error!(
                        scan_id,
                        user_id,
                        execution_time_ms,
                        error = %e,
                        "User opportunity discovery failed"
                    );
                    self.metrics.scans_total.with_label_values(&["error"]).inc();
                    self.fallback
                        .track_error(user_id, &scan_id, &e.to_string(), execution_time_ms)
                        .await;
                    let fallback_result = self.fallback.provide(user_id, &scan_id).await;

                    return json!({
                        "success": false,
                        "error": format!("Opportunity discovery failed: {}", e),
                        "opportunities": fallback_result.get("opportunities").cloned().unwrap_or(json!([])),
                        "scan_id": scan_id,
                        "user_id": user_id,
                        "execution_time_ms": execution_time_ms,
                        "fallback_used": fallback_result.get("success") == Some(&json!(true)),
                        "fallback_source": fallback_result.get("source").cloned().unwrap_or(Value::Null),
                        "error_type": "pipeline_failure",
                    });
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        user_id: &str,
        force_refresh: bool,
        include_strategy_recommendations: bool,
        scan_id: &str,
        started: Instant,
    ) -> anyhow::Result<PipelineOutcome> {
        let mut cache_hits = 0u64;
        let mut cache_misses = 0u64;
        let mut total_timeouts = 0u64;
        let mut total_errors = 0u64;

        // Portfolio and profile
        let fetch = self.portfolio_with_breaker(user_id).await;
        if fetch.cache_hit {
            cache_hits += 1;
        } else {
            cache_misses += 1;
        }
        if fetch.timed_out {
            total_timeouts += 1;
        }
        let portfolio = fetch.snapshot;
        if !portfolio.success {
            total_errors += 1;
        }

        let last_scan_time = self.opportunity_cache.last_scan_time(user_id).await;
        let profile = UserOpportunityProfile::from_portfolio(
            user_id,
            &portfolio.active_strategies,
            portfolio.total_monthly_cost,
            last_scan_time,
        );

        if profile.active_strategy_count == 0 {
            return Ok(PipelineOutcome::NoStrategies(Box::new(
                self.no_strategies_envelope(user_id, scan_id),
            )));
        }

        // Cache probe
        if !force_refresh
            && let Some(cached) = self.opportunity_cache.get(&profile).await
        {
            info!(
                scan_id,
                user_id,
                opportunities = cached
                    .get("opportunities")
                    .and_then(serde_json::Value::as_array)
                    .map(|a| a.len())
                    .unwrap_or(0),
                "Serving cached opportunity data"
            );
            self.metrics
                .scans_total
                .with_label_values(&["cached"])
                .inc();
            return Ok(PipelineOutcome::Envelope(Box::new(cached)));
        }

        // Universe discovery at the profile's tier ceiling
        let universe = self
            .universe
            .discover(profile.max_asset_tier, None, None, force_refresh)
            .await;
        if universe.is_empty() {
            warn!(scan_id, user_id, user_tier = %profile.user_tier, "No assets discovered");
            self.metrics.scans_total.with_label_values(&["empty"]).inc();
            return Ok(PipelineOutcome::Envelope(Box::new(json!({
                "success": false,
                "error": DiscoveryError::EmptyUniverse.to_string(),
                "opportunities": [],
                "scan_id": scan_id,
                "user_id": user_id,
            }))));
        }

        // Price preload for the scan's working set
        let preload_assets = universe.top_assets_by_volume(100);
        self.router.prices().preload(&preload_assets).await;

        // Scanner fan-out under the global semaphore
        let universe = Arc::new(universe);
        let ctx = Arc::new(ScanContext {
            scan_id: scan_id.to_string(),
            profile: profile.clone(),
            portfolio: portfolio.clone(),
            universe: universe.clone(),
            router: self.router.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.scanner_semaphore.max(1)));
        let stage_timeout = self.config.scanner_stage_timeout();
        let mut tasks = FuturesUnordered::new();

        for strategy in &portfolio.active_strategies {
            // Legacy marketplace ids carry an ai_ prefix
            let function = strategy
                .strategy_id
                .trim_start_matches("ai_")
                .to_string();
            let Some(scanner) = self.scanners.get(&function) else {
                warn!(scan_id, strategy_id = %strategy.strategy_id, "No scanner for strategy");
                continue;
            };

            let semaphore = semaphore.clone();
            let ctx = ctx.clone();
            tasks.push(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return ScanOutcome {
                        strategy_id: function,
                        opportunities: Some(Vec::new()),
                    };
                };
                match timeout(stage_timeout, scanner.scan(&ctx)).await {
                    Ok(opportunities) => ScanOutcome {
                        strategy_id: function,
                        opportunities: Some(opportunities),
                    },
                    Err(_) => ScanOutcome {
                        strategy_id: function,
                        opportunities: None,
                    },
                }
            });
        }

        let mut all_opportunities: Vec<Opportunity> = Vec::new();
        let mut strategy_performance = serde_json::Map::new();

        while let Some(outcome) = tasks.next().await {
            match outcome.opportunities {
                Some(opportunities) => {
                    if !opportunities.is_empty() {
                        let total_potential: f64 = opportunities
                            .iter()
                            .map(|o| o.profit_potential_usd)
                            .sum();
                        let avg_confidence: f64 = opportunities
                            .iter()
                            .map(|o| o.confidence_score)
                            .sum::<f64>()
                            / opportunities.len() as f64;
                        strategy_performance.insert(
                            outcome.strategy_id.clone(),
                            json!({
                                "count": opportunities.len(),
                                "total_potential": total_potential,
                                "avg_confidence": avg_confidence,
                            }),
                        );
                        self.metrics
                            .opportunities_total
                            .with_label_values(&[&outcome.strategy_id])
                            .inc_by(opportunities.len() as f64);
                        all_opportunities.extend(opportunities);
                    }
                }
                None => {
                    warn!(scan_id, strategy_id = %outcome.strategy_id, "Scanner stage timed out");
                    self.metrics
                        .scanner_timeouts_total
                        .with_label_values(&[&outcome.strategy_id])
                        .inc();
                    total_timeouts += 1;
                }
            }
        }

        // Rank by expected value and apply the tier scan limit. The sort is
        // stable so ties keep insertion order.
        all_opportunities.sort_by(|a, b| {
            b.ranking_score()
                .partial_cmp(&a.ranking_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let total_found = all_opportunities.len();
        all_opportunities.truncate(profile.opportunity_scan_limit);

        info!(
            scan_id,
            total_found,
            after_filtering = all_opportunities.len(),
            user_limit = profile.opportunity_scan_limit,
            "Opportunities ranked and filtered"
        );

        let signal_analysis = signal_statistics(&all_opportunities);
        let above_original = signal_analysis["threshold_analysis"]["opportunities_above_original"]
            .as_u64()
            .unwrap_or(0);

        let strategy_recommendations = if include_strategy_recommendations {
            generate_recommendations(&profile, &portfolio, all_opportunities.len())
        } else {
            Vec::new()
        };

        let scan_state = if total_timeouts > 0 { "partial" } else { "complete" };
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let cache_hit_rate = cache_hits as f64 / (cache_hits + cache_misses).max(1) as f64;

        let serialized_opportunities: Vec<Value> = all_opportunities
            .iter()
            .map(|o| serde_json::to_value(o).unwrap_or(Value::Null))
            .collect();

        let envelope = json!({
            "success": true,
            "scan_id": scan_id,
            "user_id": user_id,
            "opportunities": serialized_opportunities,
            "total_opportunities": all_opportunities.len(),
            "signal_analysis": signal_analysis,
            "threshold_transparency": {
                "message": format!(
                    "Found {} total opportunities. {} meet our highest standards (>6.0), but we're showing all {} to give you full market visibility.",
                    all_opportunities.len(), above_original, all_opportunities.len()
                ),
                "recommendation": "Focus on HIGH confidence opportunities for best results",
            },
            "user_profile": {
                "active_strategies": profile.active_strategy_count,
                "active_strategy_count": profile.active_strategy_count,
                "user_tier": profile.user_tier,
                "monthly_strategy_cost": profile.total_monthly_strategy_cost,
                "scan_limit": profile.opportunity_scan_limit,
                "strategy_fingerprint": profile.strategy_fingerprint,
            },
            "strategy_performance": strategy_performance,
            "asset_discovery": {
                "total_assets_scanned": universe.total_assets(),
                "asset_tiers": universe.tier_names(),
                "max_tier_accessed": profile.max_asset_tier,
            },
            "strategy_recommendations": strategy_recommendations,
            "execution_time_ms": execution_time_ms,
            "last_updated": Utc::now().to_rfc3339(),
            "performance_metrics": {
                "portfolio_fetch_time_ms": fetch.fetch_time_ms,
                "cache_hit_rate": cache_hit_rate,
                "total_timeouts": total_timeouts,
                "total_errors": total_errors,
            },
            "metadata": {
                "scan_state": scan_state,
            },
        });

        self.opportunity_cache
            .store(&profile, &envelope, scan_state == "partial")
            .await;

        self.metrics
            .scans_total
            .with_label_values(&["complete"])
            .inc();
        self.metrics
            .scan_duration_seconds
            .with_label_values(&[profile.user_tier.as_str()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            scan_id,
            user_id,
            total_opportunities = all_opportunities.len(),
            strategies_used = profile.active_strategy_count,
            execution_time_ms,
            "User opportunity discovery completed"
        );

        Ok(PipelineOutcome::Envelope(Box::new(envelope)))
    }

    /// Portfolio fetch with in-process caching, hard timeout, and circuit
    /// breaker. While open, the last cached snapshot or an empty shell is
    /// served without touching the backend.
    async fn portfolio_with_breaker(&self, user_id: &str) -> PortfolioFetch {
        let fetch_started = Instant::now();

        {
            let cache = self.portfolio_cache.read().await;
            if let Some((snapshot, stored_at)) = cache.get(user_id)
                && stored_at.elapsed() < PORTFOLIO_CACHE_TTL
            {
                return PortfolioFetch {
                    snapshot: snapshot.clone(),
                    fetch_time_ms: fetch_started.elapsed().as_secs_f64() * 1000.0,
                    cache_hit: true,
                    timed_out: false,
                };
            }
        }

        let fetch_timeout = self.config.portfolio_fetch_timeout;
        let result = self
            .portfolio_breaker
            .call(async {
                match timeout(fetch_timeout, self.portfolio_reader.get_user_portfolio(user_id))
                    .await
                {
                    Ok(Ok(snapshot)) => Ok(snapshot),
                    Ok(Err(e)) => Err((e, false)),
                    Err(_) => Err((anyhow::anyhow!("portfolio fetch timed out"), true)),
                }
            })
            .await;

        self.metrics
            .circuit_breaker_open
            .set(if self.portfolio_breaker.is_open().await {
                1.0
            } else {
                0.0
            });

        match result {
            Ok(snapshot) => {
                let mut cache = self.portfolio_cache.write().await;
                cache.insert(user_id.to_string(), (snapshot.clone(), Instant::now()));
                PortfolioFetch {
                    snapshot,
                    fetch_time_ms: fetch_started.elapsed().as_secs_f64() * 1000.0,
                    cache_hit: false,
                    timed_out: false,
                }
            }
            Err(CircuitBreakerError::Open(reason)) => {
                warn!(user_id, reason, "Portfolio circuit open, serving cached or shell");
                let stale = {
                    let cache = self.portfolio_cache.read().await;
                    cache.get(user_id).map(|(snapshot, _)| snapshot.clone())
                };
                PortfolioFetch {
                    snapshot: stale.unwrap_or_else(PortfolioSnapshot::empty_shell),
                    fetch_time_ms: fetch_started.elapsed().as_secs_f64() * 1000.0,
                    cache_hit: false,
                    timed_out: false,
                }
            }
            Err(CircuitBreakerError::Inner((e, timed_out))) => {
                warn!(user_id, error = %e, "Portfolio fetch failed, serving cached or shell");
                let stale = {
                    let cache = self.portfolio_cache.read().await;
                    cache.get(user_id).map(|(snapshot, _)| snapshot.clone())
                };
                PortfolioFetch {
                    snapshot: stale.unwrap_or_else(PortfolioSnapshot::empty_shell),
                    fetch_time_ms: fetch_started.elapsed().as_secs_f64() * 1000.0,
                    cache_hit: false,
                    timed_out,
                }
            }
        }
    }

    /// Guidance envelope for a user with no active strategies, listing the
    /// free defaults as recommendations.
    fn no_strategies_envelope(&self, user_id: &str, scan_id: &str) -> Value {
        let free_defaults: Vec<Value> = FREE_DEFAULT_STRATEGIES
            .iter()
            .map(|id| {
                json!({
                    "strategy_id": id,
                    "name": id.replace('_', " "),
                    "benefit": "Free starter strategy",
                    "reason": "Activate your free strategies to start discovering opportunities",
                    "type": "free_activation",
                })
            })
            .collect();

        json!({
            "success": true,
            "scan_id": scan_id,
            "user_id": user_id,
            "opportunities": [],
            "total_opportunities": 0,
            "message": "No active trading strategies found. Activate your free strategies to start discovering opportunities.",
            "strategy_recommendations": free_defaults,
            "user_profile": {
                "active_strategies": 0,
                "active_strategy_count": 0,
                "user_tier": "basic",
                "monthly_strategy_cost": 0,
                "scan_limit": 10,
                "strategy_fingerprint": "none",
            },
            "next_action": "Visit the strategy marketplace to activate your free strategies",
            "metadata": {"scan_state": "complete"},
        })
    }

    /// Shared cache handle, exposed for composition and diagnostics.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }
}

/// Strength histogram and threshold transparency over the ranked set.
fn signal_statistics(opportunities: &[Opportunity]) -> Value {
    let mut very_strong = 0u64;
    let mut strong = 0u64;
    let mut moderate = 0u64;
    let mut weak = 0u64;

    for opportunity in opportunities {
        let strength = opportunity.signal_strength();
        if strength > 6.0 {
            very_strong += 1;
        } else if strength > 4.5 {
            strong += 1;
        } else if strength > 3.0 {
            moderate += 1;
        } else {
            weak += 1;
        }
    }

    json!({
        "total_signals_analyzed": opportunities.len(),
        "signals_by_strength": {
            "very_strong": very_strong,
            "strong": strong,
            "moderate": moderate,
            "weak": weak,
        },
        "threshold_analysis": {
            "original_threshold": 6.0,
            "opportunities_above_original": very_strong,
            "opportunities_shown": opportunities.len(),
            "additional_opportunities_revealed": opportunities.len() as u64 - very_strong,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scanners::common::opportunity_skeleton;

    #[test]
    fn test_signal_statistics_buckets() {
        let mut strong_opp = opportunity_skeleton(
            "spot_momentum_strategy",
            "Momentum".into(),
            "spot_momentum",
            "BTC",
            "binance",
        );
        strong_opp
            .metadata
            .insert("signal_strength".into(), json!(7.5));
        let mut weak_opp = opportunity_skeleton(
            "spot_momentum_strategy",
            "Momentum".into(),
            "spot_momentum",
            "ETH",
            "binance",
        );
        weak_opp
            .metadata
            .insert("signal_strength".into(), json!(2.0));

        let stats = signal_statistics(&[strong_opp, weak_opp]);
        assert_eq!(stats["signals_by_strength"]["very_strong"], json!(1));
        assert_eq!(stats["signals_by_strength"]["weak"], json!(1));
        assert_eq!(
            stats["threshold_analysis"]["additional_opportunities_revealed"],
            json!(1)
        );
    }
}
