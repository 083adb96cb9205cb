use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk bucket attached to every opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    MediumHigh,
    High,
    VeryHigh,
}

impl RiskLevel {
    /// Map raw signal strength (0-10 scale) onto a risk bucket. Stronger
    /// signals carry lower execution risk.
    pub fn from_signal_strength(strength: f64) -> RiskLevel {
        if strength > 7.0 {
            RiskLevel::Low
        } else if strength > 5.0 {
            RiskLevel::Medium
        } else if strength > 3.0 {
            RiskLevel::MediumHigh
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::MediumHigh => "medium_high",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality bucket derived from each strategy's strong/consider thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    /// Classify a raw score against a strategy's strong / consider bounds.
    pub fn classify(score: f64, strong: f64, consider: f64) -> QualityTier {
        if score > strong {
            QualityTier::High
        } else if score > consider {
            QualityTier::Medium
        } else {
            QualityTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            QualityTier::High => "STRONG BUY",
            QualityTier::Medium => "CONSIDER",
            QualityTier::Low => "MONITOR",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ranked, metadata-annotated trade idea. Owned by the scan that
/// produced it and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub strategy_id: String,
    pub strategy_name: String,
    pub opportunity_type: String,
    pub symbol: String,
    pub exchange: String,
    pub profit_potential_usd: f64,
    /// Normalized to [0, 100].
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub required_capital_usd: f64,
    pub estimated_timeframe: String,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub discovered_at: DateTime<Utc>,
}

impl Opportunity {
    /// Ranking key: expected value proxy. Higher sorts first.
    pub fn ranking_score(&self) -> f64 {
        self.profit_potential_usd * self.confidence_score
    }

    /// Signal strength recorded by the scanner, 0.0 when absent.
    pub fn signal_strength(&self) -> f64 {
        self.metadata
            .get("signal_strength")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn upholds_invariants(&self) -> bool {
        self.profit_potential_usd >= 0.0
            && self.required_capital_usd >= 0.0
            && (0.0..=100.0).contains(&self.confidence_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ladder() {
        assert_eq!(RiskLevel::from_signal_strength(8.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_signal_strength(6.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_signal_strength(4.0), RiskLevel::MediumHigh);
        assert_eq!(RiskLevel::from_signal_strength(2.0), RiskLevel::High);
    }

    #[test]
    fn test_quality_tier_boundaries_are_exclusive() {
        assert_eq!(QualityTier::classify(6.1, 6.0, 4.5), QualityTier::High);
        assert_eq!(QualityTier::classify(6.0, 6.0, 4.5), QualityTier::Medium);
        assert_eq!(QualityTier::classify(4.5, 6.0, 4.5), QualityTier::Low);
    }

    #[test]
    fn test_risk_level_serializes_snake_case() {
        let json = serde_json::to_string(&RiskLevel::MediumHigh).unwrap();
        assert_eq!(json, "\"medium_high\"");
    }
}
