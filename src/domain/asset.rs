use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Volume tier for a tradeable asset.
///
/// Ordered by 24h USD volume threshold: an asset is assigned to the highest
/// tier whose threshold it meets. Priority is the inverse of the ordering
/// (Institutional = 1 .. Any = 7) and is what user-facing filters compare on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Institutional,
    Enterprise,
    Professional,
    Retail,
    Emerging,
    Micro,
    Any,
}

impl Tier {
    /// All tiers in priority order (highest volume first).
    pub const ALL: [Tier; 7] = [
        Tier::Institutional,
        Tier::Enterprise,
        Tier::Professional,
        Tier::Retail,
        Tier::Emerging,
        Tier::Micro,
        Tier::Any,
    ];

    /// Inclusive lower bound on 24h USD volume for this tier.
    pub fn min_volume_usd(&self) -> f64 {
        match self {
            Tier::Institutional => 100_000_000.0,
            Tier::Enterprise => 50_000_000.0,
            Tier::Professional => 10_000_000.0,
            Tier::Retail => 1_000_000.0,
            Tier::Emerging => 100_000.0,
            Tier::Micro => 10_000.0,
            Tier::Any => 0.0,
        }
    }

    /// Priority number, lower is higher-volume. Institutional = 1, Any = 7.
    pub fn priority(&self) -> u8 {
        match self {
            Tier::Institutional => 1,
            Tier::Enterprise => 2,
            Tier::Professional => 3,
            Tier::Retail => 4,
            Tier::Emerging => 5,
            Tier::Micro => 6,
            Tier::Any => 7,
        }
    }

    /// The highest tier whose threshold `volume_usd` meets.
    pub fn classify(volume_usd: f64) -> Tier {
        for tier in Tier::ALL {
            if volume_usd >= tier.min_volume_usd() {
                return tier;
            }
        }
        Tier::Any
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Institutional => "institutional",
            Tier::Enterprise => "enterprise",
            Tier::Professional => "professional",
            Tier::Retail => "retail",
            Tier::Emerging => "emerging",
            Tier::Micro => "micro",
            Tier::Any => "any",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches("tier_").to_lowercase().as_str() {
            "institutional" => Ok(Tier::Institutional),
            "enterprise" => Ok(Tier::Enterprise),
            "professional" => Ok(Tier::Professional),
            "retail" => Ok(Tier::Retail),
            "emerging" => Ok(Tier::Emerging),
            "micro" => Ok(Tier::Micro),
            "any" => Ok(Tier::Any),
            other => anyhow::bail!("Unknown asset tier: {}", other),
        }
    }
}

/// A normalized tradeable instrument on a single exchange.
///
/// Created by a ticker parser, re-tiered during classification, immutable
/// once the universe snapshot is published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub exchange: String,
    pub quote_currency: String,
    pub volume_24h_usd: f64,
    pub price_usd: f64,
    pub market_cap_usd: Option<f64>,
    pub tier: Tier,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Asset {
    pub fn is_valid(&self) -> bool {
        !self.symbol.is_empty() && self.price_usd > 0.0 && self.volume_24h_usd >= 0.0
    }
}

/// Tier-classified discovery output: every tier is present, buckets sorted by
/// 24h volume descending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TieredUniverse {
    pub tiers: BTreeMap<Tier, Vec<Asset>>,
}

impl TieredUniverse {
    pub fn empty() -> Self {
        let mut tiers = BTreeMap::new();
        for tier in Tier::ALL {
            tiers.insert(tier, Vec::new());
        }
        TieredUniverse { tiers }
    }

    pub fn total_assets(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_assets() == 0
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.keys().map(|t| t.to_string()).collect()
    }

    fn flattened_by_volume(&self) -> Vec<&Asset> {
        let mut all: Vec<&Asset> = self.tiers.values().flatten().collect();
        all.sort_by(|a, b| {
            b.volume_24h_usd
                .partial_cmp(&a.volume_24h_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all
    }

    /// Top symbols by 24h volume across all tiers.
    pub fn top_symbols_by_volume(&self, limit: usize) -> Vec<String> {
        self.flattened_by_volume()
            .into_iter()
            .take(limit)
            .map(|a| a.symbol.clone())
            .collect()
    }

    /// Top assets by 24h volume across all tiers.
    pub fn top_assets_by_volume(&self, limit: usize) -> Vec<Asset> {
        self.flattened_by_volume()
            .into_iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Symbols for cross-sectional statistical work. Prefers the three
    /// highest tiers, splitting the budget between them, then tops up from
    /// the retail bucket.
    pub fn symbols_for_statistical_universe(&self, limit: usize) -> Vec<String> {
        let preferred = [Tier::Institutional, Tier::Enterprise, Tier::Professional];
        let per_tier = (limit / preferred.len()).max(1);

        let mut symbols = Vec::new();
        for tier in preferred {
            if let Some(assets) = self.tiers.get(&tier) {
                symbols.extend(assets.iter().take(per_tier).map(|a| a.symbol.clone()));
            }
        }

        if symbols.len() < limit
            && let Some(retail) = self.tiers.get(&Tier::Retail)
        {
            let remaining = limit - symbols.len();
            symbols.extend(retail.iter().take(remaining).map(|a| a.symbol.clone()));
        }

        symbols.truncate(limit);
        symbols
    }

    /// Candidate correlated pairs among the major high-volume symbols.
    pub fn correlation_pairs(&self, max_pairs: usize) -> Vec<(String, String)> {
        const MAJORS: [&str; 8] = ["BTC", "ETH", "BNB", "ADA", "SOL", "DOT", "AVAX", "MATIC"];

        let top = self.top_symbols_by_volume(20);
        let majors: Vec<&String> = top.iter().filter(|s| MAJORS.contains(&s.as_str())).collect();

        let mut pairs = Vec::new();
        'outer: for i in 0..majors.len() {
            for j in (i + 1)..majors.len() {
                pairs.push((majors[i].clone(), majors[j].clone()));
                if pairs.len() >= max_pairs {
                    break 'outer;
                }
            }
        }
        pairs
    }

    /// Look up an asset by symbol, preferring the highest-volume quote.
    pub fn find_asset(&self, symbol: &str) -> Option<&Asset> {
        self.flattened_by_volume()
            .into_iter()
            .find(|a| a.symbol == symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds_strictly_decrease() {
        for pair in Tier::ALL.windows(2) {
            assert!(
                pair[0].min_volume_usd() > pair[1].min_volume_usd(),
                "{:?} must have a higher threshold than {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_classify_picks_highest_qualifying_tier() {
        assert_eq!(Tier::classify(1_500_000_000.0), Tier::Institutional);
        assert_eq!(Tier::classify(100_000_000.0), Tier::Institutional);
        assert_eq!(Tier::classify(99_999_999.0), Tier::Enterprise);
        assert_eq!(Tier::classify(15_000_000.0), Tier::Professional);
        assert_eq!(Tier::classify(2_000_000.0), Tier::Retail);
        assert_eq!(Tier::classify(50_000.0), Tier::Micro);
        assert_eq!(Tier::classify(5_000.0), Tier::Any);
    }

    #[test]
    fn test_tier_priority_is_inverse_of_volume_order() {
        assert_eq!(Tier::Institutional.priority(), 1);
        assert_eq!(Tier::Any.priority(), 7);
        for pair in Tier::ALL.windows(2) {
            assert!(pair[0].priority() < pair[1].priority());
        }
    }

    #[test]
    fn test_tier_parses_both_plain_and_prefixed_names() {
        assert_eq!("professional".parse::<Tier>().unwrap(), Tier::Professional);
        assert_eq!("tier_retail".parse::<Tier>().unwrap(), Tier::Retail);
        assert!("platinum".parse::<Tier>().is_err());
    }
}
