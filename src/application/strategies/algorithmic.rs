//! Algorithmic strategy backends: pairs, cross-sectional stat-arb, market
//! making, scalping, swing and the generic ensemble.

use super::{StrategyRouter, change_pct, range_fraction, range_position};
use crate::domain::envelope::{
    AnalysisEntry, IndicatorData, SignalAction, SignalData, StrategyEnvelope, StrategyPayload,
    StrategyRequest,
};
use crate::domain::opportunity::RiskLevel;
use serde_json::json;

/// Generic ensemble: momentum and reversion proxies blended into one signal.
pub async fn algorithmic_trading(
    router: &StrategyRouter,
    request: &StrategyRequest,
) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let change = change_pct(&snapshot);
    let position = range_position(&snapshot);
    let momentum_component = (change.abs() * 1.2).min(10.0);
    let reversion_component = ((position - 0.5).abs() * 12.0).min(10.0);
    let strength = (momentum_component * 0.6 + reversion_component * 0.4).min(10.0);

    let action = if strength < 3.0 {
        SignalAction::Hold
    } else if change >= 0.0 {
        SignalAction::Buy
    } else {
        SignalAction::Sell
    };

    let mut values = serde_json::Map::new();
    values.insert("momentum_component".into(), json!(momentum_component));
    values.insert("reversion_component".into(), json!(reversion_component));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal: SignalData::new(action, strength).with_confidence(strength * 10.0),
            indicators: Some(IndicatorData {
                price_snapshot: Some(snapshot),
                values,
            }),
            risk_management: None,
        },
    )
}

/// Pairs trading over `pair_symbols` ("BASE_A-BASE_B"): the spread z proxy
/// is half the 24h performance differential.
pub async fn pairs_trading(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let Some(pair) = request.param_str("pair_symbols").map(str::to_string) else {
        return StrategyEnvelope::failure(&request.function, "pair_symbols parameter required");
    };
    let mut parts = pair.split('-');
    let (Some(first), Some(second)) = (parts.next(), parts.next()) else {
        return StrategyEnvelope::failure(&request.function, "pair_symbols must be A-B");
    };

    let exchange = request.exchange.as_deref().unwrap_or("binance");
    let (Some(lead), Some(lag)) = (
        router.prices().get(exchange, first.trim()).await,
        router.prices().get(exchange, second.trim()).await,
    ) else {
        return StrategyEnvelope::failure(&request.function, "Price unavailable for pair leg");
    };

    let spread_z = (change_pct(&lead) - change_pct(&lag)) / 2.0;
    let signal_strength = (spread_z.abs() * 2.5).min(10.0);

    // Diverging legs: short the outperformer, long the laggard
    let action = if spread_z > 1.0 {
        SignalAction::Sell
    } else if spread_z < -1.0 {
        SignalAction::Buy
    } else {
        SignalAction::Hold
    };

    let notional = request.param_f64("notional").unwrap_or(10_000.0);
    let expected_profit = spread_z.abs() * notional * 0.01;

    let signal = SignalData::new(action, signal_strength)
        .with_confidence(signal_strength * 10.0)
        .with_extra("spread_z_score", json!(spread_z))
        .with_extra("signal_type", json!("divergence"))
        .with_extra("expected_profit", json!(expected_profit))
        .with_extra("required_capital", json!(notional))
        .with_extra("pair_symbols", json!([first.trim(), second.trim()]));

    let mut values = serde_json::Map::new();
    values.insert("lead_change_pct".into(), json!(change_pct(&lead)));
    values.insert("lag_change_pct".into(), json!(change_pct(&lag)));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(IndicatorData {
                price_snapshot: Some(lead),
                values,
            }),
            risk_management: None,
        },
    )
}

/// Cross-sectional statistical arbitrage over a `universe` parameter
/// ("BTC,ETH,..."): each symbol's 24h move is standardized against its own
/// dispersion proxy; outliers become analysis rows.
pub async fn statistical_arbitrage(
    router: &StrategyRouter,
    request: &StrategyRequest,
) -> StrategyEnvelope {
    let Some(universe) = request.param_str("universe").map(str::to_string) else {
        return StrategyEnvelope::failure(&request.function, "universe parameter required");
    };
    let exchange = request.exchange.as_deref().unwrap_or("binance");

    let mut opportunities = Vec::new();
    let mut scanned = 0usize;

    for symbol in universe.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(snapshot) = router.prices().get(exchange, symbol).await else {
            continue;
        };
        scanned += 1;

        let dispersion_pct = (range_fraction(&snapshot) * 100.0 / 2.0).max(0.5);
        let z_score = change_pct(&snapshot) / dispersion_pct;
        if z_score.abs() <= 1.5 {
            continue;
        }

        let confidence = (60.0 + z_score.abs() * 10.0).min(95.0);
        let mut extras = serde_json::Map::new();
        extras.insert("z_score".into(), json!(z_score));
        extras.insert("strategy_type".into(), json!("mean_reversion"));
        extras.insert("lookback_period".into(), json!("24h"));

        opportunities.push(AnalysisEntry {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            profit_potential_usd: z_score.abs() * 100.0,
            confidence,
            risk_level: Some(RiskLevel::MediumHigh),
            required_capital_usd: 5_000.0,
            timeframe: "24h".into(),
            entry_price: Some(snapshot.current),
            exit_price: None,
            extras,
        });
    }

    let mut summary = serde_json::Map::new();
    summary.insert("symbols_scanned".into(), json!(scanned));
    summary.insert("entry_threshold_z".into(), json!(1.5));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Analysis {
            opportunities,
            summary,
        },
    )
}

/// Market making: quoted spread estimated from realized range; worth quoting
/// only on deep books.
pub async fn market_making(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let volume = snapshot.volume_24h_usd.unwrap_or(0.0);
    // Realized-range fraction scaled down to a quotable spread estimate
    let current_spread = (range_fraction(&snapshot) * 0.05).clamp(0.0002, 0.02);
    let liquidity_score = (volume / 10_000_000.0).min(10.0);
    let daily_profit_est = volume * current_spread * 0.00005;

    let strength = ((current_spread * 10_000.0 / 2.0) * (liquidity_score / 10.0)).min(10.0);
    let action = if current_spread > 0.001 && liquidity_score >= 1.0 {
        SignalAction::Buy
    } else {
        SignalAction::Hold
    };

    let half_spread = snapshot.current * current_spread / 2.0;
    let signal = SignalData::new(action, strength)
        .with_confidence((current_spread * 10_000.0).min(100.0))
        .with_extra("current_spread", json!(current_spread))
        .with_extra("volume_24h", json!(volume))
        .with_extra("liquidity_score", json!(liquidity_score))
        .with_extra("daily_profit_est", json!(daily_profit_est))
        .with_extra("bid_price", json!(snapshot.current - half_spread))
        .with_extra("ask_price", json!(snapshot.current + half_spread))
        .with_extra("required_capital", json!(5_000.0));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(IndicatorData {
                price_snapshot: Some(snapshot),
                values: serde_json::Map::new(),
            }),
            risk_management: None,
        },
    )
}

/// Scalping: short-horizon momentum gated on volume depth.
pub async fn scalping(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let change = change_pct(&snapshot);
    let volume = snapshot.volume_24h_usd.unwrap_or(0.0);
    let volume_factor = (volume / 50_000_000.0).min(2.0);
    let momentum_score = (change.abs() * 1.2 * (0.5 + volume_factor)).min(10.0);

    let direction = if change >= 0.0 { "long" } else { "short" };
    let action = if momentum_score > 3.0 {
        if change >= 0.0 {
            SignalAction::Buy
        } else {
            SignalAction::Sell
        }
    } else {
        SignalAction::Hold
    };

    let profit_target = request.param_f64("profit_target").unwrap_or(0.005);
    let stop_loss = request.param_f64("stop_loss").unwrap_or(0.002);
    let notional = request.param_f64("order_amount").unwrap_or(1_000.0);

    let signal = SignalData::new(action, momentum_score)
        .with_confidence(momentum_score * 10.0)
        .with_extra("momentum_score", json!(momentum_score))
        .with_extra("direction", json!(direction))
        .with_extra("volume_surge", json!(volume_factor))
        .with_extra("profit_potential", json!(notional * profit_target))
        .with_extra("required_capital", json!(notional))
        .with_extra(
            "target_price",
            json!(match action {
                SignalAction::Sell => snapshot.current * (1.0 - profit_target),
                _ => snapshot.current * (1.0 + profit_target),
            }),
        )
        .with_extra(
            "stop_price",
            json!(match action {
                SignalAction::Sell => snapshot.current * (1.0 + stop_loss),
                _ => snapshot.current * (1.0 - stop_loss),
            }),
        );

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(IndicatorData {
                price_snapshot: Some(snapshot),
                values: serde_json::Map::new(),
            }),
            risk_management: None,
        },
    )
}

/// Swing trading: medium-horizon trend follow once the 24h move clears 3%.
pub async fn swing_trading(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let change = change_pct(&snapshot);
    let strength = (change.abs() * 1.5).min(10.0);
    let action = if change > 3.0 {
        SignalAction::Buy
    } else if change < -3.0 {
        SignalAction::Sell
    } else {
        SignalAction::Hold
    };

    let holding_period = request.param_f64("holding_period").unwrap_or(7.0);

    let signal = SignalData::new(action, strength)
        .with_confidence(strength * 10.0)
        .with_extra("holding_period_days", json!(holding_period))
        .with_extra("trend_strength", json!(change / 3.0));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(IndicatorData {
                price_snapshot: Some(snapshot),
                values: serde_json::Map::new(),
            }),
            risk_management: None,
        },
    )
}
