//! Prometheus metrics definitions for coinscout.
//!
//! All metrics use the `coinscout_` prefix and are read-only.

use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the discovery engine
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Discovery scans by terminal status (complete, cached, fallback, error)
    pub scans_total: CounterVec,
    /// Opportunities emitted per strategy
    pub opportunities_total: CounterVec,
    /// Cache lookups by cache name and outcome
    pub cache_lookups_total: CounterVec,
    /// Scanner stage timeouts
    pub scanner_timeouts_total: CounterVec,
    /// Errors absorbed per component
    pub component_errors_total: CounterVec,
    /// End-to-end scan latency in seconds
    pub scan_duration_seconds: HistogramVec,
    /// Exchange ticker fetch latency in seconds
    pub exchange_fetch_seconds: HistogramVec,
    /// Assets in the most recent discovered universe
    pub universe_assets: GenericGauge<AtomicF64>,
    /// Portfolio circuit breaker state (0=closed, 1=open)
    pub circuit_breaker_open: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let scans_total = CounterVec::new(
            Opts::new("coinscout_scans_total", "Discovery scans by status"),
            &["status"],
        )?;
        registry.register(Box::new(scans_total.clone()))?;

        let opportunities_total = CounterVec::new(
            Opts::new(
                "coinscout_opportunities_total",
                "Opportunities emitted per strategy",
            ),
            &["strategy_id"],
        )?;
        registry.register(Box::new(opportunities_total.clone()))?;

        let cache_lookups_total = CounterVec::new(
            Opts::new(
                "coinscout_cache_lookups_total",
                "Cache lookups by cache and outcome",
            ),
            &["cache", "outcome"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let scanner_timeouts_total = CounterVec::new(
            Opts::new(
                "coinscout_scanner_timeouts_total",
                "Scanner stage timeouts per strategy",
            ),
            &["strategy_id"],
        )?;
        registry.register(Box::new(scanner_timeouts_total.clone()))?;

        let component_errors_total = CounterVec::new(
            Opts::new(
                "coinscout_component_errors_total",
                "Errors absorbed per component",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_errors_total.clone()))?;

        let scan_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "coinscout_scan_duration_seconds",
                "End-to-end discovery scan latency",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["user_tier"],
        )?;
        registry.register(Box::new(scan_duration_seconds.clone()))?;

        let exchange_fetch_seconds = HistogramVec::new(
            HistogramOpts::new(
                "coinscout_exchange_fetch_seconds",
                "Exchange ticker fetch latency",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]),
            &["exchange"],
        )?;
        registry.register(Box::new(exchange_fetch_seconds.clone()))?;

        let universe_assets = Gauge::with_opts(Opts::new(
            "coinscout_universe_assets",
            "Assets in the most recent discovered universe",
        ))?;
        registry.register(Box::new(universe_assets.clone()))?;

        let circuit_breaker_open = Gauge::with_opts(Opts::new(
            "coinscout_circuit_breaker_open",
            "Portfolio circuit breaker state (0=closed, 1=open)",
        ))?;
        registry.register(Box::new(circuit_breaker_open.clone()))?;

        Ok(Metrics {
            registry: Arc::new(registry),
            scans_total,
            opportunities_total,
            cache_lookups_total,
            scanner_timeouts_total,
            component_errors_total,
            scan_duration_seconds,
            exchange_fetch_seconds,
            universe_assets,
            circuit_breaker_open,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}
