//! Arbitrage-family scanners: funding-rate carry, cross-sectional stat-arb,
//! and correlated pairs.

use super::common::{normalize_confidence, opportunity_skeleton, quality_metadata};
use super::{OpportunityScanner, ScanContext, bounded_scan};
use crate::domain::envelope::{AnalysisEntry, StrategyPayload, StrategyRequest};
use crate::domain::opportunity::{Opportunity, QualityTier, RiskLevel};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

fn opportunity_from_entry(
    entry: &AnalysisEntry,
    strategy_id: &'static str,
    strategy_name: &str,
    opportunity_type: &str,
) -> Opportunity {
    let mut opportunity = opportunity_skeleton(
        strategy_id,
        strategy_name.to_string(),
        opportunity_type,
        &entry.symbol,
        &entry.exchange,
    );
    opportunity.profit_potential_usd = entry.profit_potential_usd.max(0.0);
    opportunity.confidence_score = normalize_confidence(Some(entry.confidence), None) * 100.0;
    opportunity.risk_level = entry.risk_level.unwrap_or(RiskLevel::Medium);
    opportunity.required_capital_usd = entry.required_capital_usd.max(0.0);
    opportunity.estimated_timeframe = entry.timeframe.clone();
    opportunity.entry_price = entry.entry_price;
    opportunity.exit_price = entry.exit_price;
    for (key, value) in &entry.extras {
        opportunity.metadata.insert(key.clone(), value.clone());
    }
    opportunity
}

/// Funding-rate carry scanner. One router call covering the top-volume
/// symbols; venues without funding data contribute nothing.
pub struct FundingArbitrageScanner;

#[async_trait]
impl OpportunityScanner for FundingArbitrageScanner {
    fn strategy_id(&self) -> &'static str {
        "funding_arbitrage"
    }

    fn display_name(&self) -> &'static str {
        "Funding Arbitrage"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own funding arbitrage, skipping");
            return Vec::new();
        }

        let symbols = ctx.universe.top_symbols_by_volume(20).join(",");
        let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
            .with_parameter("symbols", json!(symbols))
            .with_parameter("exchanges", json!("all"))
            .with_parameter("min_funding_rate", json!(0.005));
        let envelope = ctx.router.execute_strategy(&request).await;

        if !envelope.success {
            return Vec::new();
        }
        let StrategyPayload::Analysis { opportunities, .. } = &envelope.payload else {
            return Vec::new();
        };

        opportunities
            .iter()
            .map(|entry| {
                let mut opportunity = opportunity_from_entry(
                    entry,
                    self.strategy_id(),
                    self.display_name(),
                    "funding_arbitrage",
                );
                let strength = (opportunity.confidence_score / 10.0).min(10.0);
                quality_metadata(
                    &mut opportunity,
                    strength,
                    QualityTier::classify(strength, 8.0, 6.0),
                    strength > 8.0,
                );
                opportunity
            })
            .collect()
    }
}

/// Cross-sectional statistical arbitrage. One router call over the
/// higher-tier symbol universe.
pub struct StatisticalArbitrageScanner;

#[async_trait]
impl OpportunityScanner for StatisticalArbitrageScanner {
    fn strategy_id(&self) -> &'static str {
        "statistical_arbitrage"
    }

    fn display_name(&self) -> &'static str {
        "Statistical Arbitrage"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own statistical arbitrage, skipping");
            return Vec::new();
        }

        let universe = ctx.universe.symbols_for_statistical_universe(50).join(",");
        let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
            .with_strategy_type("mean_reversion")
            .with_parameter("universe", json!(universe));
        let envelope = ctx.router.execute_strategy(&request).await;

        if !envelope.success {
            return Vec::new();
        }
        let StrategyPayload::Analysis { opportunities, .. } = &envelope.payload else {
            return Vec::new();
        };

        opportunities
            .iter()
            .map(|entry| {
                let mut opportunity = opportunity_from_entry(
                    entry,
                    self.strategy_id(),
                    self.display_name(),
                    "statistical_arbitrage",
                );
                let z = entry
                    .extras
                    .get("z_score")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0)
                    .abs();
                let strength = (z * 2.0).min(10.0);
                quality_metadata(
                    &mut opportunity,
                    strength,
                    QualityTier::classify(z, 3.0, 2.0),
                    z > 3.0,
                );
                opportunity
            })
            .collect()
    }
}

/// Correlated-pairs scanner: serial router calls per candidate pair (the
/// legs' lookups are correlated), inclusion above signal strength 3.0.
pub struct PairsTradingScanner;

#[async_trait]
impl OpportunityScanner for PairsTradingScanner {
    fn strategy_id(&self) -> &'static str {
        "pairs_trading"
    }

    fn display_name(&self) -> &'static str {
        "Pairs Trading"
    }

    async fn scan(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        if !ctx.owns(self.strategy_id()) {
            debug!(scan_id = %ctx.scan_id, "User does not own pairs trading, skipping");
            return Vec::new();
        }

        let pairs = ctx.universe.correlation_pairs(10);
        bounded_scan(pairs, 3, |(first, second)| async move {
            let pair_label = format!("{}-{}", first, second);
            let request = StrategyRequest::new(self.strategy_id(), &ctx.profile.user_id)
                .with_strategy_type("statistical_arbitrage")
                .with_parameter("pair_symbols", json!(pair_label.clone()));
            let envelope = ctx.router.execute_strategy(&request).await;

            if !envelope.success {
                return Vec::new();
            }
            let Some(signal) = envelope.signal() else {
                return Vec::new();
            };
            let strength = signal.strength;
            if strength <= 3.0 {
                return Vec::new();
            }

            let quality = QualityTier::classify(strength, 5.0, 4.0);
            let mut opportunity = opportunity_skeleton(
                self.strategy_id(),
                format!(
                    "{} ({} confidence)",
                    self.display_name(),
                    quality.as_str().to_uppercase()
                ),
                "pairs_trading",
                &pair_label,
                "binance",
            );
            opportunity.confidence_score =
                normalize_confidence(Some(strength * 10.0), None) * 100.0;
            opportunity.risk_level = RiskLevel::from_signal_strength(strength);
            opportunity.required_capital_usd = signal
                .extras
                .get("required_capital")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(10_000.0);
            opportunity.profit_potential_usd = signal
                .extras
                .get("expected_profit")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
                .max(0.0);
            opportunity.estimated_timeframe = "72h".into();

            quality_metadata(&mut opportunity, strength, quality, strength > 5.0);
            if let Some(z) = signal.extras.get("spread_z_score") {
                opportunity
                    .metadata
                    .insert("spread_z_score".into(), z.clone());
            }
            opportunity
                .metadata
                .insert("pair_symbols".into(), json!([first, second]));

            vec![opportunity]
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context_with;
    use super::*;
    use crate::application::strategies::test_support::asset_with;

    #[tokio::test]
    async fn test_stat_arb_scanner_emits_for_outliers() {
        let ctx = context_with(
            &[
                // 24h change 9% against a 3% dispersion proxy -> |z| = 3
                asset_with("SOL", 100.0, 12_000_000.0, 103.0, 97.0, 9.0),
                asset_with("ADA", 0.5, 8_000_000.0, 0.515, 0.485, 1.0),
            ],
            &["statistical_arbitrage"],
        )
        .await;

        let opportunities = StatisticalArbitrageScanner.scan(&ctx).await;
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].symbol, "SOL");
        assert_eq!(opportunities[0].opportunity_type, "statistical_arbitrage");
        assert!(opportunities[0].upholds_invariants());
    }

    #[tokio::test]
    async fn test_pairs_scanner_needs_divergent_majors() {
        let ctx = context_with(
            &[
                asset_with("BTC", 50_000.0, 200_000_000.0, 51_000.0, 48_000.0, 8.0),
                asset_with("ETH", 3_000.0, 90_000_000.0, 3_100.0, 2_900.0, 0.5),
            ],
            &["pairs_trading"],
        )
        .await;

        let opportunities = PairsTradingScanner.scan(&ctx).await;
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].symbol, "BTC-ETH");
        assert!(opportunities[0].metadata.contains_key("spread_z_score"));
    }

    #[tokio::test]
    async fn test_pairs_scanner_quiet_market_is_empty() {
        let ctx = context_with(
            &[
                asset_with("BTC", 50_000.0, 200_000_000.0, 50_200.0, 49_800.0, 1.0),
                asset_with("ETH", 3_000.0, 90_000_000.0, 3_010.0, 2_990.0, 0.8),
            ],
            &["pairs_trading"],
        )
        .await;

        assert!(PairsTradingScanner.scan(&ctx).await.is_empty());
    }

    #[tokio::test]
    async fn test_funding_scanner_without_funding_data_is_empty() {
        let ctx = context_with(
            &[asset_with("BTC", 50_000.0, 200_000_000.0, 51_000.0, 49_000.0, 1.0)],
            &["funding_arbitrage"],
        )
        .await;

        assert!(FundingArbitrageScanner.scan(&ctx).await.is_empty());
    }
}
