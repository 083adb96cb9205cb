//! Multi-exchange discovery over canned feeds: tier filtering, best-quote
//! selection, rate-limit cooldown, and graceful degradation.

mod common;

use coinscout::domain::asset::Tier;
use coinscout::domain::exchange::AssetType;
use coinscout::domain::ports::CacheStore;
use common::{Harness, descriptor, spawn_ticker_server, ticker_row};
use serde_json::json;

#[tokio::test]
async fn test_tier_filtering_respects_user_ceiling() {
    let feed = json!([
        ticker_row("AAAUSDT", 10.0, 1_500_000_000.0, 1.0),
        ticker_row("BBBUSDT", 5.0, 15_000_000.0, 1.0),
        ticker_row("CCCUSDT", 1.0, 50_000.0, 1.0),
    ]);
    let base = spawn_ticker_server(200, feed.to_string()).await;
    let harness = Harness::over(vec![descriptor(
        "binance",
        &format!("{}/ticker/24hr", base),
        1200,
        1,
    )]);

    let universe = harness
        .universe
        .discover(
            Tier::Professional,
            None,
            Some(vec![AssetType::Spot]),
            true,
        )
        .await;

    assert!(universe.find_asset("AAA").is_some());
    assert!(universe.find_asset("BBB").is_some());
    assert!(universe.find_asset("CCC").is_none());
    assert_eq!(
        universe.find_asset("AAA").unwrap().tier,
        Tier::Institutional
    );
    assert_eq!(
        universe.find_asset("BBB").unwrap().tier,
        Tier::Professional
    );
}

#[tokio::test]
async fn test_best_quote_picks_highest_volume_across_exchanges() {
    let thin = json!([ticker_row("BTCUSDT", 50_000.0, 2_000_000.0, 1.0)]);
    let deep = json!([ticker_row("BTCUSDT", 50_100.0, 8_000_000.0, 1.0)]);
    let thin_base = spawn_ticker_server(200, thin.to_string()).await;
    let deep_base = spawn_ticker_server(200, deep.to_string()).await;

    let harness = Harness::over(vec![
        descriptor("binance", &format!("{}/ticker/24hr", thin_base), 1200, 1),
        descriptor("kucoin2", &format!("{}/ticker/24hr", deep_base), 300, 3),
    ]);

    let universe = harness
        .universe
        .discover(Tier::Retail, None, Some(vec![AssetType::Spot]), true)
        .await;

    let btc = universe.find_asset("BTC").unwrap();
    assert_eq!(btc.exchange, "kucoin2");
    assert_eq!(btc.volume_24h_usd, 8_000_000.0);
}

#[tokio::test]
async fn test_rate_limited_exchange_is_cooled_down_and_skipped() {
    let healthy_feed = json!([ticker_row("ETHUSDT", 3_000.0, 9_000_000.0, 1.0)]);
    let healthy = spawn_ticker_server(200, healthy_feed.to_string()).await;
    let limited = spawn_ticker_server(429, "{}".to_string()).await;

    let harness = Harness::over(vec![
        descriptor("binance", &format!("{}/ticker/24hr", healthy), 1200, 1),
        descriptor("kraken2", &format!("{}/ticker/24hr", limited), 60, 2),
    ]);

    let universe = harness
        .universe
        .discover(Tier::Retail, None, Some(vec![AssetType::Spot]), true)
        .await;

    // The healthy exchange still populates the universe
    assert!(universe.find_asset("ETH").is_some());

    // The 429 left a cooldown marker; the exchange is excluded without
    // another request for the cooldown window
    let marker = harness
        .cache
        .get("exchange_rate_limit:kraken2")
        .await
        .unwrap();
    assert_eq!(marker, Some("limited".to_string()));
}

#[tokio::test]
async fn test_all_feeds_down_yields_empty_universe_without_error() {
    let harness = Harness::over(vec![
        descriptor("binance", "https://unreachable.invalid/ticker", 1200, 1),
        descriptor("kraken2", "https://also-unreachable.invalid/ticker", 60, 2),
    ]);

    let universe = harness
        .universe
        .discover(Tier::Retail, None, Some(vec![AssetType::Spot]), true)
        .await;

    assert!(universe.is_empty());
}
