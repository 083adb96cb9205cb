//! Spot strategy backends: momentum, mean reversion, breakout.
//!
//! Signal math runs over the shared 24h snapshot: intraday range position as
//! the oscillator proxy, the 24h move as the trend proxy, and the quarter
//! range as the dispersion proxy.

use super::{StrategyRouter, change_pct, range_fraction, range_position};
use crate::domain::envelope::{
    IndicatorData, PriceSnapshot, RiskControls, SignalAction, SignalData, StrategyEnvelope,
    StrategyPayload, TradeSide,
};
use serde_json::json;

fn directional_controls(entry: f64, side: TradeSide, notional: f64) -> RiskControls {
    let (stop, take) = match side {
        TradeSide::Long => (entry * 0.98, entry * 1.04),
        TradeSide::Short => (entry * 1.02, entry * 0.96),
    };
    let position_size = notional / entry;
    RiskControls {
        stop_loss_price: Some(stop),
        take_profit_price: Some(take),
        position_size: Some(position_size),
        position_notional: Some(notional),
        risk_amount: Some(position_size * (entry - stop).abs()),
        potential_profit: Some(position_size * (take - entry).abs()),
        risk_reward_ratio: Some(2.0),
        max_risk_percent: Some(2.0),
    }
}

fn indicators_for(snapshot: &PriceSnapshot, values: serde_json::Map<String, serde_json::Value>) -> IndicatorData {
    IndicatorData {
        price_snapshot: Some(snapshot.clone()),
        values,
    }
}

/// Momentum: strong directional signal when the oscillator proxy and the
/// 24h trend agree.
pub async fn momentum(router: &StrategyRouter, request: &crate::domain::envelope::StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let change = change_pct(&snapshot);
    let position = range_position(&snapshot);
    // Range position mapped to an RSI-like 0-100 oscillator
    let oscillator = position * 100.0;
    let trend = if change > 0.0 { "BULLISH" } else if change < 0.0 { "BEARISH" } else { "NEUTRAL" };

    let (action, strength) = if oscillator > 60.0 && change > 0.0 {
        (SignalAction::Buy, 8.0)
    } else if oscillator < 40.0 && change < 0.0 {
        (SignalAction::Sell, 8.0)
    } else if (45.0..=55.0).contains(&oscillator) {
        (SignalAction::Hold, 3.0)
    } else {
        (SignalAction::Hold, 5.0)
    };

    let mut values = serde_json::Map::new();
    values.insert("oscillator".into(), json!(oscillator));
    values.insert("trend".into(), json!(trend));
    values.insert("momentum_score".into(), json!(strength));

    let signal = SignalData::new(action, strength)
        .with_confidence(strength * 10.0)
        .with_extra("trend", json!(trend));

    let risk_management = action
        .side()
        .map(|side| directional_controls(snapshot.current, side, 1_000.0));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(indicators_for(&snapshot, values)),
            risk_management,
        },
    )
}

/// Mean reversion: z-score of the last price against the 24h midpoint with a
/// quarter-range dispersion proxy.
pub async fn mean_reversion(router: &StrategyRouter, request: &crate::domain::envelope::StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let (Some(high), Some(low)) = (snapshot.high_24h, snapshot.low_24h) else {
        return StrategyEnvelope::failure(&request.function, "24h range unavailable");
    };
    let mean_price = (high + low) / 2.0;
    let dispersion = ((high - low) / 4.0).max(snapshot.current * 1e-6);
    let z_score = (snapshot.current - mean_price) / dispersion;

    let (action, confidence) = if z_score > 2.0 {
        (SignalAction::Sell, (z_score.abs() * 30.0).min(95.0))
    } else if z_score < -2.0 {
        (SignalAction::Buy, (z_score.abs() * 30.0).min(95.0))
    } else {
        (SignalAction::Hold, 30.0)
    };
    let strength = (z_score.abs() * 2.0).min(10.0);

    let mut values = serde_json::Map::new();
    values.insert("z_score".into(), json!(z_score));
    values.insert("deviation_score".into(), json!(z_score));
    values.insert("mean_price".into(), json!(mean_price));
    values.insert("bollinger_upper".into(), json!(mean_price + 2.0 * dispersion));
    values.insert("bollinger_lower".into(), json!(mean_price - 2.0 * dispersion));
    values.insert("reversion_target".into(), json!(mean_price));

    let signal = SignalData::new(action, strength)
        .with_confidence(confidence)
        .with_extra("z_score", json!(z_score))
        .with_extra("mean_price", json!(mean_price));

    let risk_management = action.side().map(|side| {
        let mut controls = directional_controls(snapshot.current, side, 2_000.0);
        // Reversion exits at the mean rather than a fixed take-profit
        controls.take_profit_price = Some(mean_price);
        controls
    });

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(indicators_for(&snapshot, values)),
            risk_management,
        },
    )
}

/// Breakout: price clearing the 24h extreme by 0.2% with conviction scaled
/// by the overshoot.
pub async fn breakout(router: &StrategyRouter, request: &crate::domain::envelope::StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let (Some(high), Some(low)) = (snapshot.high_24h, snapshot.low_24h) else {
        return StrategyEnvelope::failure(&request.function, "24h range unavailable");
    };

    // Yesterday's extremes act as resistance/support until retested
    let resistance = high;
    let support = low;
    let current = snapshot.current;

    let (action, overshoot) = if current > resistance * 1.002 {
        (SignalAction::Buy, (current - resistance) / resistance)
    } else if current < support * 0.998 {
        (SignalAction::Sell, (support - current) / support)
    } else {
        (SignalAction::Hold, 0.0)
    };

    let breakout_probability = if action.is_actionable() {
        (0.5 + overshoot * 25.0).clamp(0.5, 0.95)
    } else {
        // Proximity to the nearer extreme, never past the inclusion gate
        let proximity = range_position(&snapshot);
        (0.25 + (proximity - 0.5).abs() * 0.5).clamp(0.0, 0.5)
    };
    let strength = breakout_probability * 10.0;

    let mut values = serde_json::Map::new();
    values.insert("breakout_probability".into(), json!(breakout_probability));
    values.insert("resistance_level".into(), json!(resistance));
    values.insert("support_level".into(), json!(support));
    values.insert(
        "direction".into(),
        json!(match action {
            SignalAction::Buy => "up",
            SignalAction::Sell => "down",
            SignalAction::Hold => "none",
        }),
    );
    values.insert("volume_surge".into(), json!(range_fraction(&snapshot) * 10.0));

    let signal = SignalData::new(action, strength)
        .with_confidence(breakout_probability * 100.0)
        .with_extra("breakout_probability", json!(breakout_probability));

    let risk_management = action.side().map(|side| {
        let (stop, take) = match side {
            TradeSide::Long => (current * 0.98, current * 1.05),
            TradeSide::Short => (current * 1.02, current * 0.95),
        };
        let position_size = 3_000.0 / current;
        RiskControls {
            stop_loss_price: Some(stop),
            take_profit_price: Some(take),
            position_size: Some(position_size),
            position_notional: Some(3_000.0),
            risk_amount: Some(position_size * (current - stop).abs()),
            potential_profit: Some(position_size * (take - current).abs()),
            risk_reward_ratio: Some(2.5),
            max_risk_percent: Some(2.0),
        }
    });

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(indicators_for(&snapshot, values)),
            risk_management,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::domain::envelope::{SignalAction, StrategyRequest};

    #[tokio::test]
    async fn test_momentum_buy_near_range_top_in_uptrend() {
        let router = router_with_assets(&[asset_with(
            "BTC", 50_900.0, 2_000_000.0, 51_000.0, 48_000.0, 4.2,
        )])
        .await;

        let request = StrategyRequest::new("spot_momentum_strategy", "u1").with_symbol("BTC/USDT");
        let envelope = router.execute_strategy(&request).await;

        assert!(envelope.success);
        let signal = envelope.signal().unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.strength, 8.0);
        assert_eq!(envelope.entry_price(), Some(50_900.0));
        let controls = envelope.risk_controls().unwrap();
        assert!(controls.stop_loss_price.unwrap() < 50_900.0);
        assert!(controls.take_profit_price.unwrap() > 50_900.0);
    }

    #[tokio::test]
    async fn test_momentum_holds_mid_range() {
        let router = router_with_assets(&[asset_with(
            "ETH", 2_995.0, 9_000_000.0, 3_100.0, 2_900.0, 0.1,
        )])
        .await;

        let request = StrategyRequest::new("spot_momentum_strategy", "u1").with_symbol("ETH/USDT");
        let envelope = router.execute_strategy(&request).await;
        let signal = envelope.signal().unwrap();
        assert_eq!(signal.action, SignalAction::Hold);
    }

    #[tokio::test]
    async fn test_mean_reversion_sells_stretched_price() {
        // Mid 100, dispersion 10; price 125 -> z = 2.5
        let router = router_with_assets(&[asset_with(
            "SOL", 125.0, 12_000_000.0, 120.0, 80.0, 8.0,
        )])
        .await;

        let request = StrategyRequest::new("spot_mean_reversion", "u1").with_symbol("SOL/USDT");
        let envelope = router.execute_strategy(&request).await;

        let signal = envelope.signal().unwrap();
        assert_eq!(signal.action, SignalAction::Sell);
        let z = signal.extras["z_score"].as_f64().unwrap();
        assert!((z - 2.5).abs() < 1e-9);
        // Reversion target is the midpoint
        let controls = envelope.risk_controls().unwrap();
        assert_eq!(controls.take_profit_price, Some(100.0));
    }

    #[tokio::test]
    async fn test_breakout_above_resistance_signals_buy() {
        let router = router_with_assets(&[asset_with(
            "AVAX", 40.4, 15_000_000.0, 40.0, 36.0, 6.0,
        )])
        .await;

        let request = StrategyRequest::new("spot_breakout_strategy", "u1").with_symbol("AVAX/USDT");
        let envelope = router.execute_strategy(&request).await;

        let signal = envelope.signal().unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        let probability = signal.extras["breakout_probability"].as_f64().unwrap();
        assert!(probability > 0.5);
    }

    #[tokio::test]
    async fn test_breakout_inside_range_stays_below_gate() {
        let router = router_with_assets(&[asset_with(
            "DOT", 8.0, 5_000_000.0, 9.0, 7.0, 0.5,
        )])
        .await;

        let request = StrategyRequest::new("spot_breakout_strategy", "u1").with_symbol("DOT/USDT");
        let envelope = router.execute_strategy(&request).await;

        let signal = envelope.signal().unwrap();
        assert_eq!(signal.action, SignalAction::Hold);
        let probability = signal.extras["breakout_probability"].as_f64().unwrap();
        assert!(probability <= 0.5);
    }
}
