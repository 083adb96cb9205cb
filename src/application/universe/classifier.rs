//! Volume-based asset classification.
//!
//! Collapses per-exchange ticker maps to one best-quote asset per symbol,
//! buckets by tier, and filters to the caller's minimum tier.

use crate::domain::asset::{Asset, Tier, TieredUniverse};
use std::collections::HashMap;

/// Select the best quote per symbol and bucket the result by volume tier.
///
/// Best quote = highest 24h USD volume across exchanges; ties break toward
/// the lower exchange priority number. Deterministic for a given input set.
pub fn classify_assets(
    per_exchange: Vec<HashMap<String, Asset>>,
    exchange_priority: &HashMap<String, u8>,
) -> TieredUniverse {
    let mut best: HashMap<String, Asset> = HashMap::new();

    for assets in per_exchange {
        for (symbol, asset) in assets {
            if !asset.is_valid() {
                continue;
            }
            match best.get(&symbol) {
                Some(current) => {
                    let wins = asset.volume_24h_usd > current.volume_24h_usd
                        || (asset.volume_24h_usd == current.volume_24h_usd
                            && priority_of(exchange_priority, &asset.exchange)
                                < priority_of(exchange_priority, &current.exchange));
                    if wins {
                        best.insert(symbol, asset);
                    }
                }
                None => {
                    best.insert(symbol, asset);
                }
            }
        }
    }

    let mut universe = TieredUniverse::empty();
    for (_, mut asset) in best {
        let tier = Tier::classify(asset.volume_24h_usd);
        asset.tier = tier;
        universe.tiers.entry(tier).or_default().push(asset);
    }

    for bucket in universe.tiers.values_mut() {
        bucket.sort_by(|a, b| {
            b.volume_24h_usd
                .partial_cmp(&a.volume_24h_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    universe
}

fn priority_of(exchange_priority: &HashMap<String, u8>, exchange: &str) -> u8 {
    exchange_priority.get(exchange).copied().unwrap_or(u8::MAX)
}

/// Retain only the tiers the caller may see: priority ≤ the minimum tier's.
pub fn filter_by_min_tier(universe: TieredUniverse, min_tier: Tier) -> TieredUniverse {
    let min_priority = min_tier.priority();
    let tiers = universe
        .tiers
        .into_iter()
        .filter(|(tier, _)| tier.priority() <= min_priority)
        .collect();
    TieredUniverse { tiers }
}
