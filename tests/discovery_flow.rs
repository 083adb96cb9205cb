//! End-to-end discovery pipeline scenarios over a local canned ticker feed.

mod common;

use async_trait::async_trait;
use coinscout::application::marketplace::{InMemoryMarketplace, StrategyCatalog};
use coinscout::application::scanners::{OpportunityScanner, ScanContext, ScannerRegistry};
use coinscout::domain::opportunity::{Opportunity, RiskLevel};
use coinscout::domain::ports::PortfolioReader;
use coinscout::domain::profile::strategy_fingerprint;
use coinscout::domain::strategy::{ActiveStrategy, PortfolioSnapshot, StrategyTier};
use common::{Harness, NoOnboarding, descriptor, spawn_ticker_server, ticker_row};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

const ALL_STRATEGY_IDS: [&str; 14] = [
    "spot_momentum_strategy",
    "spot_mean_reversion",
    "spot_breakout_strategy",
    "funding_arbitrage",
    "statistical_arbitrage",
    "pairs_trading",
    "scalping_strategy",
    "market_making",
    "futures_trade",
    "options_trade",
    "risk_management",
    "portfolio_optimization",
    "hedge_position",
    "complex_strategy",
];

struct StubPortfolio {
    snapshot: Mutex<PortfolioSnapshot>,
}

impl StubPortfolio {
    fn with_strategies(ids: &[&str], total_monthly_cost: u32) -> Arc<Self> {
        Arc::new(StubPortfolio {
            snapshot: Mutex::new(snapshot_of(ids, total_monthly_cost)),
        })
    }

    async fn replace(&self, ids: &[&str], total_monthly_cost: u32) {
        *self.snapshot.lock().await = snapshot_of(ids, total_monthly_cost);
    }
}

fn snapshot_of(ids: &[&str], total_monthly_cost: u32) -> PortfolioSnapshot {
    PortfolioSnapshot {
        success: true,
        active_strategies: ids
            .iter()
            .map(|id| ActiveStrategy {
                strategy_id: id.to_string(),
                name: id.to_string(),
                monthly_credit_cost: 0,
                tier: StrategyTier::Free,
            })
            .collect(),
        total_monthly_cost,
    }
}

#[async_trait]
impl PortfolioReader for StubPortfolio {
    async fn get_user_portfolio(&self, _user_id: &str) -> anyhow::Result<PortfolioSnapshot> {
        Ok(self.snapshot.lock().await.clone())
    }
}

/// Scanner stub standing in for a strategy backend that always reports one
/// opportunity at strength 5.0 with confidence 50.
struct StubScanner {
    id: &'static str,
    profit: f64,
}

#[async_trait]
impl OpportunityScanner for StubScanner {
    fn strategy_id(&self) -> &'static str {
        self.id
    }

    fn display_name(&self) -> &'static str {
        self.id
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.id) {
            return Vec::new();
        }
        let Some(asset) = ctx.universe.top_assets_by_volume(1).into_iter().next() else {
            return Vec::new();
        };

        let mut opportunity = coinscout::application::scanners::common::opportunity_skeleton(
            self.id,
            self.id.to_string(),
            "stub",
            &asset.symbol,
            &asset.exchange,
        );
        opportunity.profit_potential_usd = self.profit;
        opportunity.confidence_score = 50.0;
        opportunity.risk_level = RiskLevel::Medium;
        opportunity.required_capital_usd = 1_000.0;
        opportunity.estimated_timeframe = "4h".into();
        opportunity
            .metadata
            .insert("signal_strength".into(), json!(5.0));
        vec![opportunity]
    }
}

fn stub_registry() -> ScannerRegistry {
    let scanners: Vec<Arc<dyn OpportunityScanner>> = ALL_STRATEGY_IDS
        .iter()
        .enumerate()
        .map(|(index, id)| {
            Arc::new(StubScanner {
                id: *id,
                profit: 100.0 + index as f64 * 10.0,
            }) as Arc<dyn OpportunityScanner>
        })
        .collect();
    ScannerRegistry::from_scanners(scanners)
}

async fn harness_with_btc_feed() -> Harness {
    let feed = json!([ticker_row("BTCUSDT", 50_000.0, 2_000_000.0, 2.0)]);
    let base = spawn_ticker_server(200, feed.to_string()).await;
    Harness::over(vec![descriptor(
        "binance",
        &format!("{}/ticker/24hr", base),
        1200,
        1,
    )])
}

/// Seed a fresh tiered snapshot straight into the universe cache.
async fn seed_universe_cache(
    harness: &Harness,
    key: &str,
    symbol: &str,
    price: f64,
    volume: f64,
) {
    use coinscout::domain::asset::{Asset, Tier, TieredUniverse};

    let asset = Asset {
        symbol: symbol.to_string(),
        exchange: "binance".into(),
        quote_currency: "USDT".into(),
        volume_24h_usd: volume,
        price_usd: price,
        market_cap_usd: None,
        tier: Tier::classify(volume),
        last_updated: chrono::Utc::now(),
        metadata: Default::default(),
    };
    let mut universe = TieredUniverse::empty();
    universe
        .tiers
        .entry(asset.tier)
        .or_default()
        .push(asset);

    let entry = json!({"assets": universe, "timestamp": chrono::Utc::now()});
    harness
        .cache
        .set(key, &entry.to_string(), std::time::Duration::from_secs(600))
        .await
        .unwrap();
}

fn opportunity_multiset(envelope: &Value) -> BTreeSet<(String, String)> {
    envelope["opportunities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| {
            (
                o["strategy_id"].as_str().unwrap().to_string(),
                o["symbol"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

fn assert_ranking_law(envelope: &Value) {
    let opportunities = envelope["opportunities"].as_array().unwrap();
    let scores: Vec<f64> = opportunities
        .iter()
        .map(|o| {
            o["profit_potential_usd"].as_f64().unwrap() * o["confidence_score"].as_f64().unwrap()
        })
        .collect();
    for pair in scores.windows(2) {
        assert!(
            pair[0] >= pair[1],
            "ranking law violated: {} < {}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn test_empty_portfolio_yields_guidance_with_free_defaults() {
    let harness = harness_with_btc_feed().await;
    let portfolio = StubPortfolio::with_strategies(&[], 0);
    let discovery = harness.discovery(portfolio, Arc::new(NoOnboarding), stub_registry());

    let envelope = discovery
        .discover_opportunities_for_user("basic-user", false, true)
        .await;

    assert_eq!(envelope["success"], json!(true));
    assert_eq!(envelope["total_opportunities"], json!(0));
    assert_eq!(envelope["user_profile"]["active_strategy_count"], json!(0));

    let recommended: BTreeSet<&str> = envelope["strategy_recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["strategy_id"].as_str())
        .collect();
    for id in [
        "risk_management",
        "portfolio_optimization",
        "spot_momentum_strategy",
    ] {
        assert!(recommended.contains(id), "missing free default {}", id);
    }
}

#[tokio::test]
async fn test_fourteen_strategies_yield_one_opportunity_each() {
    // The enterprise user's universe is seeded directly: one retail-tier
    // asset, visible through the universe cache regardless of feed state
    let harness = Harness::over(vec![descriptor(
        "binance",
        "https://unreachable.invalid/ticker",
        1200,
        1,
    )]);
    seed_universe_cache(
        &harness,
        "enterprise_assets:institutional:binance",
        "BTC",
        50_000.0,
        2_000_000.0,
    )
    .await;

    let portfolio = StubPortfolio::with_strategies(&ALL_STRATEGY_IDS, 420);
    let discovery = harness.discovery(portfolio, Arc::new(NoOnboarding), stub_registry());

    let envelope = discovery
        .discover_opportunities_for_user("enterprise-user", false, true)
        .await;

    assert_eq!(envelope["success"], json!(true));
    assert_eq!(envelope["total_opportunities"], json!(14));
    assert_eq!(envelope["user_profile"]["user_tier"], json!("enterprise"));

    let opportunities = envelope["opportunities"].as_array().unwrap();
    let strategy_ids: BTreeSet<&str> = opportunities
        .iter()
        .map(|o| o["strategy_id"].as_str().unwrap())
        .collect();
    assert_eq!(strategy_ids.len(), 14, "one opportunity per strategy");

    for opportunity in opportunities {
        assert_eq!(opportunity["symbol"], json!("BTC"));
        let confidence = opportunity["confidence_score"].as_f64().unwrap();
        assert!((confidence - 50.0).abs() < 1e-9);
    }

    assert_ranking_law(&envelope);

    // Fingerprint soundness: the envelope echoes the current set's hash
    let strategies: Vec<ActiveStrategy> = ALL_STRATEGY_IDS
        .iter()
        .map(|id| ActiveStrategy {
            strategy_id: id.to_string(),
            name: id.to_string(),
            monthly_credit_cost: 0,
            tier: StrategyTier::Free,
        })
        .collect();
    assert_eq!(
        envelope["user_profile"]["strategy_fingerprint"],
        json!(strategy_fingerprint(&strategies))
    );

    // Strategy performance aggregates cover every contributing strategy
    let performance = envelope["strategy_performance"].as_object().unwrap();
    assert_eq!(performance.len(), 14);
    for entry in performance.values() {
        assert_eq!(entry["count"], json!(1));
    }
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let harness = harness_with_btc_feed().await;
    let portfolio = StubPortfolio::with_strategies(&["spot_momentum_strategy"], 0);
    let discovery = harness.discovery(portfolio, Arc::new(NoOnboarding), stub_registry());

    let first = discovery
        .discover_opportunities_for_user("cache-user", false, true)
        .await;
    let second = discovery
        .discover_opportunities_for_user("cache-user", false, true)
        .await;

    // A cache hit replays the original envelope, scan id included
    assert_eq!(first["scan_id"], second["scan_id"]);
}

#[tokio::test]
async fn test_portfolio_change_invalidates_cache_and_recomputes_fingerprint() {
    let harness = harness_with_btc_feed().await;
    let portfolio = StubPortfolio::with_strategies(&["spot_momentum_strategy", "pairs_trading"], 0);
    let discovery = harness.discovery(
        portfolio.clone(),
        Arc::new(NoOnboarding),
        stub_registry(),
    );

    let first = discovery
        .discover_opportunities_for_user("fp-user", false, true)
        .await;

    // Same strategy count, different set: the cache key collides but the
    // fingerprint must not
    portfolio
        .replace(&["spot_momentum_strategy", "market_making"], 0)
        .await;
    discovery.note_strategy_change("fp-user").await;

    let second = discovery
        .discover_opportunities_for_user("fp-user", false, true)
        .await;

    assert_ne!(first["scan_id"], second["scan_id"], "cache must be bypassed");
    let expected = strategy_fingerprint(&[
        ActiveStrategy {
            strategy_id: "spot_momentum_strategy".into(),
            name: String::new(),
            monthly_credit_cost: 0,
            tier: StrategyTier::Free,
        },
        ActiveStrategy {
            strategy_id: "market_making".into(),
            name: String::new(),
            monthly_credit_cost: 0,
            tier: StrategyTier::Free,
        },
    ]);
    assert_eq!(
        second["user_profile"]["strategy_fingerprint"],
        json!(expected)
    );
}

#[tokio::test]
async fn test_rescan_over_unchanged_data_is_idempotent() {
    let harness = harness_with_btc_feed().await;
    let portfolio =
        StubPortfolio::with_strategies(&["spot_momentum_strategy", "market_making"], 0);
    let discovery = harness.discovery(portfolio, Arc::new(NoOnboarding), stub_registry());

    let first = discovery
        .discover_opportunities_for_user("idem-user", false, true)
        .await;

    // Recompute against the same underlying data
    discovery.opportunity_cache().invalidate_user("idem-user").await;

    let second = discovery
        .discover_opportunities_for_user("idem-user", false, true)
        .await;

    assert_eq!(opportunity_multiset(&first), opportunity_multiset(&second));
}

#[tokio::test]
async fn test_onboarding_hook_provisions_and_rescans_once() {
    let harness = harness_with_btc_feed().await;
    let marketplace = Arc::new(InMemoryMarketplace::new(StrategyCatalog::default()));
    let discovery = harness.discovery(
        marketplace.clone(),
        marketplace.clone(),
        ScannerRegistry::with_default_scanners(),
    );

    let envelope = discovery
        .discover_opportunities_for_user("fresh-user", false, true)
        .await;

    // The retry after onboarding sees the three free strategies
    assert_eq!(envelope["success"], json!(true));
    assert_eq!(envelope["user_profile"]["active_strategy_count"], json!(3));
}

#[tokio::test]
async fn test_envelope_carries_the_contractual_sections() {
    let harness = harness_with_btc_feed().await;
    let portfolio = StubPortfolio::with_strategies(&["spot_momentum_strategy"], 0);
    let discovery = harness.discovery(portfolio, Arc::new(NoOnboarding), stub_registry());

    let envelope = discovery
        .discover_opportunities_for_user("shape-user", false, true)
        .await;

    for key in [
        "success",
        "scan_id",
        "user_id",
        "opportunities",
        "total_opportunities",
        "signal_analysis",
        "threshold_transparency",
        "user_profile",
        "strategy_performance",
        "asset_discovery",
        "strategy_recommendations",
        "execution_time_ms",
        "last_updated",
        "performance_metrics",
        "metadata",
    ] {
        assert!(envelope.get(key).is_some(), "envelope missing {}", key);
    }

    assert_eq!(envelope["metadata"]["scan_state"], json!("complete"));
    assert_eq!(
        envelope["asset_discovery"]["max_tier_accessed"],
        json!("retail")
    );
    let analysis = &envelope["signal_analysis"];
    assert_eq!(
        analysis["threshold_analysis"]["original_threshold"],
        json!(6.0)
    );
}
