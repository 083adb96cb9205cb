use crate::domain::opportunity::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Directional action attached to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalAction::Hold)
    }

    /// Long/short orientation for trade-plan math. Hold has no side.
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            SignalAction::Buy => Some(TradeSide::Long),
            SignalAction::Sell => Some(TradeSide::Short),
            SignalAction::Hold => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Long,
    Short,
}

/// Core signal block every signal-bearing backend emits.
///
/// `strength` lives on a 0-10 scale; `confidence` on 0-100 and may be absent,
/// in which case consumers derive it as `strength * 10`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalData {
    pub action: SignalAction,
    pub strength: f64,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub extras: JsonMap,
}

impl SignalData {
    pub fn new(action: SignalAction, strength: f64) -> Self {
        SignalData {
            action,
            strength,
            confidence: None,
            extras: JsonMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extras.insert(key.to_string(), value);
        self
    }

    pub fn confidence_or_derived(&self) -> f64 {
        self.confidence.unwrap_or(self.strength * 10.0)
    }
}

/// Point-in-time market snapshot for one `(exchange, symbol)` pair.
///
/// `indicators.price_snapshot.current` is the canonical entry price when a
/// strategy does not produce an explicit one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub exchange: String,
    pub current: f64,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub change_24h_pct: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub as_of: DateTime<Utc>,
}

/// Indicator block attached to signal envelopes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorData {
    pub price_snapshot: Option<PriceSnapshot>,
    #[serde(default)]
    pub values: JsonMap,
}

/// Risk-management levels a backend may compute for its signal. Everything is
/// optional; the scanner enrichment step fills the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskControls {
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub position_size: Option<f64>,
    pub position_notional: Option<f64>,
    pub risk_amount: Option<f64>,
    pub potential_profit: Option<f64>,
    pub risk_reward_ratio: Option<f64>,
    pub max_risk_percent: Option<f64>,
}

/// One row of an analysis-style backend output (funding arbitrage,
/// statistical arbitrage and friends emit lists of these).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub symbol: String,
    pub exchange: String,
    pub profit_potential_usd: f64,
    /// Raw confidence in whatever scale the strategy documents; scanners
    /// normalize before building opportunities.
    pub confidence: f64,
    pub risk_level: Option<RiskLevel>,
    pub required_capital_usd: f64,
    pub timeframe: String,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub extras: JsonMap,
}

/// Portfolio-protection recommendation from the risk-management backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationAction {
    pub risk_type: String,
    pub strategy: String,
    pub recommendation: String,
    pub rationale: String,
    /// [0, 1]
    pub urgency: f64,
    pub cost_estimate_usd: f64,
}

/// Hedge recommendation from the risk-management / hedge backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeAction {
    pub hedge_type: String,
    pub hedge_instrument: String,
    /// [0, 1]
    pub effectiveness: f64,
    /// [0, 1]
    pub urgency_score: f64,
    pub hedge_cost_usd: f64,
    pub risk_reduction_pct: f64,
}

/// Rebalancing recommendation from the portfolio-optimization backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceAction {
    pub symbol: String,
    pub action: String,
    /// Fraction of portfolio notional to move, [0, 1].
    pub amount_fraction: f64,
    /// Normalized improvement potential, [0, 1].
    pub improvement_potential: f64,
    pub urgency: String,
    pub strategy: String,
    pub risk_reduction: f64,
}

/// Function-specific payload of a router envelope. Scanners match on the
/// variant instead of probing loosely shaped maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyPayload {
    Signal {
        signal: SignalData,
        indicators: Option<IndicatorData>,
        risk_management: Option<RiskControls>,
    },
    Analysis {
        opportunities: Vec<AnalysisEntry>,
        #[serde(default)]
        summary: JsonMap,
    },
    RiskReview {
        mitigation_strategies: Vec<MitigationAction>,
        hedge_recommendations: Vec<HedgeAction>,
        #[serde(default)]
        summary: JsonMap,
    },
    Rebalance {
        recommendations: Vec<RebalanceAction>,
        #[serde(default)]
        strategy_analysis: JsonMap,
    },
    Report {
        #[serde(default)]
        data: JsonMap,
    },
    Failure {
        error: String,
        #[serde(default)]
        available_functions: Vec<String>,
    },
}

/// Uniform wrapper returned by every router function: shared header plus a
/// tagged payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyEnvelope {
    pub success: bool,
    pub function: String,
    pub timestamp: DateTime<Utc>,
    pub payload: StrategyPayload,
}

impl StrategyEnvelope {
    pub fn ok(function: &str, payload: StrategyPayload) -> Self {
        StrategyEnvelope {
            success: true,
            function: function.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn failure(function: &str, error: impl Into<String>) -> Self {
        StrategyEnvelope {
            success: false,
            function: function.to_string(),
            timestamp: Utc::now(),
            payload: StrategyPayload::Failure {
                error: error.into(),
                available_functions: Vec::new(),
            },
        }
    }

    pub fn unknown_function(function: &str, available: &[&str]) -> Self {
        StrategyEnvelope {
            success: false,
            function: function.to_string(),
            timestamp: Utc::now(),
            payload: StrategyPayload::Failure {
                error: format!("Unknown strategy function: {}", function),
                available_functions: available.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    pub fn signal(&self) -> Option<&SignalData> {
        match &self.payload {
            StrategyPayload::Signal { signal, .. } => Some(signal),
            _ => None,
        }
    }

    pub fn indicators(&self) -> Option<&IndicatorData> {
        match &self.payload {
            StrategyPayload::Signal { indicators, .. } => indicators.as_ref(),
            _ => None,
        }
    }

    pub fn risk_controls(&self) -> Option<&RiskControls> {
        match &self.payload {
            StrategyPayload::Signal {
                risk_management, ..
            } => risk_management.as_ref(),
            _ => None,
        }
    }

    /// Canonical entry price: the indicator price snapshot.
    pub fn entry_price(&self) -> Option<f64> {
        self.indicators()
            .and_then(|i| i.price_snapshot.as_ref())
            .map(|p| p.current)
    }
}

/// Risk posture a caller may request for an execution-capable function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

/// Input to `StrategyRouter::execute_strategy`.
#[derive(Debug, Clone)]
pub struct StrategyRequest {
    pub function: String,
    pub strategy_type: Option<String>,
    /// Pair in `BASE/QUOTE` form, e.g. `BTC/USDT`.
    pub symbol: Option<String>,
    pub parameters: JsonMap,
    pub risk_mode: RiskMode,
    pub exchange: Option<String>,
    pub user_id: String,
    pub simulation_mode: bool,
}

impl StrategyRequest {
    pub fn new(function: &str, user_id: &str) -> Self {
        StrategyRequest {
            function: function.to_string(),
            strategy_type: None,
            symbol: None,
            parameters: JsonMap::new(),
            risk_mode: RiskMode::Balanced,
            exchange: None,
            user_id: user_id.to_string(),
            simulation_mode: true,
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_strategy_type(mut self, strategy_type: &str) -> Self {
        self.strategy_type = Some(strategy_type.to_string());
        self
    }

    pub fn with_exchange(mut self, exchange: &str) -> Self {
        self.exchange = Some(exchange.to_string());
        self
    }

    pub fn with_parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Base symbol with any `/QUOTE` suffix stripped.
    pub fn base_symbol(&self) -> Option<&str> {
        self.symbol
            .as_deref()
            .map(|s| s.split('/').next().unwrap_or(s))
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }
}
