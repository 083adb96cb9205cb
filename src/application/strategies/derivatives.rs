//! Derivatives strategy backends: futures, perpetuals, options and the
//! leverage/margin utility functions.
//!
//! Options math is plain Black-Scholes (zero rate) over the shared snapshot;
//! implied volatility is proxied from the realized 24h range when the caller
//! does not supply one.

use super::{StrategyRouter, change_pct, range_fraction, range_position};
use crate::domain::envelope::{
    AnalysisEntry, HedgeAction, IndicatorData, JsonMap, SignalAction, SignalData,
    StrategyEnvelope, StrategyPayload, StrategyRequest,
};
use crate::domain::opportunity::RiskLevel;
use serde_json::json;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

const MAINTENANCE_MARGIN_RATE: f64 = 0.005;

pub(crate) struct BsGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    pub call_price: f64,
    pub put_price: f64,
    pub d2: f64,
}

pub(crate) fn norm_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0).map(|n| n.cdf(x)).unwrap_or(0.5)
}

/// Black-Scholes greeks at zero rate. `None` on degenerate inputs.
pub(crate) fn black_scholes(spot: f64, strike: f64, t_years: f64, vol: f64) -> Option<BsGreeks> {
    if spot <= 0.0 || strike <= 0.0 || t_years <= 0.0 || vol <= 0.0 {
        return None;
    }
    let normal = Normal::new(0.0, 1.0).ok()?;
    let sqrt_t = t_years.sqrt();
    let d1 = ((spot / strike).ln() + 0.5 * vol * vol * t_years) / (vol * sqrt_t);
    let d2 = d1 - vol * sqrt_t;

    Some(BsGreeks {
        delta: normal.cdf(d1),
        gamma: normal.pdf(d1) / (spot * vol * sqrt_t),
        // Per-day decay
        theta: -(spot * normal.pdf(d1) * vol) / (2.0 * sqrt_t) / 365.0,
        // Per 1% vol move
        vega: spot * normal.pdf(d1) * sqrt_t / 100.0,
        rho: strike * t_years * normal.cdf(d2) / 100.0,
        call_price: spot * normal.cdf(d1) - strike * normal.cdf(d2),
        put_price: strike * normal.cdf(-d2) - spot * normal.cdf(-d1),
        d2,
    })
}

/// Annualized volatility proxied from the realized 24h range.
pub(crate) fn implied_vol_proxy(range_frac: f64) -> f64 {
    (range_frac * 4.0).clamp(0.2, 2.0)
}

fn long_liquidation(entry: f64, leverage: f64) -> f64 {
    entry * (1.0 - 1.0 / leverage + MAINTENANCE_MARGIN_RATE)
}

fn short_liquidation(entry: f64, leverage: f64) -> f64 {
    entry * (1.0 + 1.0 / leverage - MAINTENANCE_MARGIN_RATE)
}

/// Trend-following futures signal with leverage-aware risk extras.
pub async fn futures_trade(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let leverage = request.param_f64("leverage").unwrap_or(10.0).clamp(1.0, 125.0);
    let change = change_pct(&snapshot);
    let volatility = range_fraction(&snapshot);

    let strength = (change.abs() * 1.4).min(10.0);
    let action = if change > 1.5 {
        SignalAction::Buy
    } else if change < -1.5 {
        SignalAction::Sell
    } else {
        SignalAction::Hold
    };
    let direction = match action {
        SignalAction::Sell => "short",
        _ => "long",
    };

    let stop_pct = request.param_f64("stop_loss_pct").unwrap_or(2.0) / 100.0;
    let take_pct = request.param_f64("take_profit_pct").unwrap_or(6.0) / 100.0;
    let margin = request.param_f64("margin").unwrap_or(1_000.0);
    let notional = margin * leverage;

    let liquidation_price = match action {
        SignalAction::Sell => short_liquidation(snapshot.current, leverage),
        _ => long_liquidation(snapshot.current, leverage),
    };

    let signal = SignalData::new(action, strength)
        .with_confidence(strength * 10.0)
        .with_extra("direction", json!(direction))
        .with_extra("leverage", json!(leverage))
        .with_extra("volatility", json!(volatility))
        .with_extra("liquidation_price", json!(liquidation_price))
        .with_extra("required_margin", json!(margin))
        .with_extra("profit_potential", json!(notional * take_pct))
        .with_extra("volume_24h", json!(snapshot.volume_24h_usd.unwrap_or(0.0)));

    let (stop, take) = match action {
        SignalAction::Sell => (
            snapshot.current * (1.0 + stop_pct),
            snapshot.current * (1.0 - take_pct),
        ),
        _ => (
            snapshot.current * (1.0 - stop_pct),
            snapshot.current * (1.0 + take_pct),
        ),
    };

    let risk_management = crate::domain::envelope::RiskControls {
        stop_loss_price: Some(stop),
        take_profit_price: Some(take),
        position_size: Some(notional / snapshot.current),
        position_notional: Some(notional),
        risk_amount: Some(notional * stop_pct),
        potential_profit: Some(notional * take_pct),
        risk_reward_ratio: Some(take_pct / stop_pct),
        max_risk_percent: Some(stop_pct * 100.0),
    };

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(IndicatorData {
                price_snapshot: Some(snapshot),
                values: serde_json::Map::new(),
            }),
            risk_management: Some(risk_management),
        },
    )
}

/// Perpetual swap variant: futures signal plus funding-rate context when the
/// feed reports one.
pub async fn perpetual_trade(
    router: &StrategyRouter,
    request: &StrategyRequest,
) -> StrategyEnvelope {
    let mut envelope = futures_trade(router, request).await;
    envelope.function = request.function.clone();

    if let StrategyPayload::Signal { signal, .. } = &mut envelope.payload {
        let funding_rate = request.param_f64("funding_rate").unwrap_or(0.0);
        signal
            .extras
            .insert("funding_rate".into(), json!(funding_rate));
        signal
            .extras
            .insert("contract".into(), json!("perpetual"));
    }
    envelope
}

/// Options signal: probability-of-profit from Black-Scholes over a strike 5%
/// out of the money.
pub async fn options_trade(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let spot = snapshot.current;
    let strike = request.param_f64("strike_price").unwrap_or(spot * 1.05);
    let expiry_days = request.param_f64("expiry_days").unwrap_or(30.0).max(1.0);
    let t_years = expiry_days / 365.0;
    let vol = request
        .param_f64("volatility")
        .filter(|v| *v > 0.0)
        .unwrap_or_else(|| implied_vol_proxy(range_fraction(&snapshot)));

    let Some(greeks) = black_scholes(spot, strike, t_years, vol) else {
        return StrategyEnvelope::failure(&request.function, "Degenerate option inputs");
    };

    let probability_of_profit = norm_cdf(greeks.d2);
    let strength = (probability_of_profit * 10.0).min(10.0);
    let action = if probability_of_profit > 0.55 {
        SignalAction::Buy
    } else {
        SignalAction::Hold
    };

    let strategy_type = request
        .strategy_type
        .clone()
        .unwrap_or_else(|| "iron_condor".to_string());

    let signal = SignalData::new(action, strength)
        .with_confidence(probability_of_profit * 100.0)
        .with_extra("strategy_type", json!(strategy_type))
        .with_extra("probability_of_profit", json!(probability_of_profit))
        .with_extra("max_profit", json!(greeks.call_price.max(0.0) * 100.0))
        .with_extra("days_to_expiry", json!(expiry_days))
        .with_extra("required_capital", json!(strike * 0.1))
        .with_extra(
            "greeks",
            json!({
                "delta": greeks.delta,
                "gamma": greeks.gamma,
                "theta": greeks.theta,
                "vega": greeks.vega,
                "implied_volatility": vol,
            }),
        );

    let mut values = serde_json::Map::new();
    values.insert("call_price".into(), json!(greeks.call_price));
    values.insert("put_price".into(), json!(greeks.put_price));
    values.insert("strike".into(), json!(strike));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Signal {
            signal,
            indicators: Some(IndicatorData {
                price_snapshot: Some(snapshot),
                values,
            }),
            risk_management: None,
        },
    )
}

/// Multi-leg composite: momentum, breakout and reversion components blended
/// into one conviction score.
pub async fn complex_strategy(
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
    let breakout_component = if position > 0.95 || position < 0.05 {
        8.0
    } else {
        position.max(1.0 - position) * 4.0
    };
    let reversion_component = ((position - 0.5).abs() * 8.0).min(10.0);

    let strength =
        (momentum_component * 0.5 + breakout_component * 0.3 + reversion_component * 0.2).min(10.0);
    let action = if strength < 4.0 {
        SignalAction::Hold
    } else if change >= 0.0 {
        SignalAction::Buy
    } else {
        SignalAction::Sell
    };

    let signal = SignalData::new(action, strength)
        .with_confidence(strength * 10.0)
        .with_extra(
            "components",
            json!({
                "momentum": momentum_component,
                "breakout": breakout_component,
                "reversion": reversion_component,
            }),
        )
        .with_extra("legs", json!(3));

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

/// Standalone greeks report for one option contract.
pub async fn calculate_greeks(
    router: &StrategyRouter,
    request: &StrategyRequest,
) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let spot = request.param_f64("underlying_price").unwrap_or(snapshot.current);
    let strike = request.param_f64("strike_price").unwrap_or(spot * 1.1);
    let t_years = request.param_f64("time_to_expiry").unwrap_or(30.0 / 365.0);
    let vol = request
        .param_f64("volatility")
        .filter(|v| *v > 0.0)
        .unwrap_or_else(|| implied_vol_proxy(range_fraction(&snapshot)));

    let Some(greeks) = black_scholes(spot, strike, t_years, vol) else {
        return StrategyEnvelope::failure(&request.function, "Degenerate option inputs");
    };

    let mut data = JsonMap::new();
    data.insert("underlying_price".into(), json!(spot));
    data.insert("strike_price".into(), json!(strike));
    data.insert("time_to_expiry_years".into(), json!(t_years));
    data.insert("implied_volatility".into(), json!(vol));
    data.insert("delta".into(), json!(greeks.delta));
    data.insert("gamma".into(), json!(greeks.gamma));
    data.insert("theta".into(), json!(greeks.theta));
    data.insert("vega".into(), json!(greeks.vega));
    data.insert("rho".into(), json!(greeks.rho));
    data.insert("call_price".into(), json!(greeks.call_price));
    data.insert("put_price".into(), json!(greeks.put_price));

    StrategyEnvelope::ok(&request.function, StrategyPayload::Report { data })
}

/// Synthetic strike ladder priced with Black-Scholes around the spot.
pub async fn options_chain(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let expiry_days = request.param_f64("expiry_days").unwrap_or(30.0).max(1.0);
    let t_years = expiry_days / 365.0;
    let vol = implied_vol_proxy(range_fraction(&snapshot));

    let mut strikes = Vec::new();
    for step in -4i32..=4 {
        let strike = snapshot.current * (1.0 + step as f64 * 0.05);
        if let Some(greeks) = black_scholes(snapshot.current, strike, t_years, vol) {
            strikes.push(json!({
                "strike": strike,
                "call_price": greeks.call_price,
                "put_price": greeks.put_price,
                "delta": greeks.delta,
            }));
        }
    }

    let mut data = JsonMap::new();
    data.insert("underlying".into(), json!(snapshot.symbol));
    data.insert("underlying_price".into(), json!(snapshot.current));
    data.insert("expiry_days".into(), json!(expiry_days));
    data.insert("implied_volatility".into(), json!(vol));
    data.insert("strikes".into(), json!(strikes));

    StrategyEnvelope::ok(&request.function, StrategyPayload::Report { data })
}

/// Spot/perp basis from the feed's funding rate. No funding data means no
/// basis opportunities, not fabricated ones.
pub async fn basis_trade(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let mut opportunities = Vec::new();
    let mut summary = JsonMap::new();

    // Funding rate arrives through ticker metadata on venues that report it
    let funding = request.param_f64("funding_rate");
    if let Some(funding) = funding {
        summary.insert("funding_rate".into(), json!(funding));
        let annualized_bps = funding * 3.0 * 365.0 * 10_000.0;
        summary.insert("annualized_basis_bps".into(), json!(annualized_bps));

        if funding.abs() >= 0.0005 {
            let notional = request.param_f64("notional").unwrap_or(10_000.0);
            let mut extras = JsonMap::new();
            extras.insert("carry_side".into(), json!(if funding > 0.0 { "short_perp" } else { "long_perp" }));
            opportunities.push(AnalysisEntry {
                symbol: snapshot.symbol.clone(),
                exchange: snapshot.exchange.clone(),
                profit_potential_usd: funding.abs() * 3.0 * notional,
                confidence: 75.0,
                risk_level: Some(RiskLevel::Medium),
                required_capital_usd: notional,
                timeframe: "8h".into(),
                entry_price: Some(snapshot.current),
                exit_price: None,
                extras,
            });
        }
    } else {
        summary.insert("funding_rate".into(), serde_json::Value::Null);
        summary.insert(
            "note".into(),
            json!("no funding data on this feed; basis not observable"),
        );
    }

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Analysis {
            opportunities,
            summary,
        },
    )
}

/// Liquidation price report for a prospective leveraged position.
pub async fn liquidation_price(
    router: &StrategyRouter,
    request: &StrategyRequest,
) -> StrategyEnvelope {
    let entry = match request.param_f64("entry_price") {
        Some(entry) if entry > 0.0 => entry,
        _ => match router.snapshot(request).await {
            Ok(snapshot) => snapshot.current,
            Err(envelope) => return *envelope,
        },
    };

    let leverage = request.param_f64("leverage").unwrap_or(10.0).clamp(1.0, 125.0);
    let position_type = request.param_str("position_type").unwrap_or("long");

    let liquidation = if position_type.eq_ignore_ascii_case("short") {
        short_liquidation(entry, leverage)
    } else {
        long_liquidation(entry, leverage)
    };
    let distance_pct = ((entry - liquidation).abs() / entry) * 100.0;

    let mut data = JsonMap::new();
    data.insert("entry_price".into(), json!(entry));
    data.insert("leverage".into(), json!(leverage));
    data.insert("position_type".into(), json!(position_type));
    data.insert("liquidation_price".into(), json!(liquidation));
    data.insert("liquidation_distance_pct".into(), json!(distance_pct));
    data.insert(
        "maintenance_margin_rate".into(),
        json!(MAINTENANCE_MARGIN_RATE),
    );

    StrategyEnvelope::ok(&request.function, StrategyPayload::Report { data })
}

/// Leverage sizing report: margin, notional and liquidation distance for a
/// target leverage.
pub async fn leverage_position(
    router: &StrategyRouter,
    request: &StrategyRequest,
) -> StrategyEnvelope {
    let snapshot = match router.snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(envelope) => return *envelope,
    };

    let leverage = request.param_f64("leverage").unwrap_or(5.0).clamp(1.0, 125.0);
    let position_size = request.param_f64("position_size").unwrap_or(0.01).max(0.0);
    let notional = position_size * snapshot.current;
    let margin_required = notional / leverage;
    let volatility = range_fraction(&snapshot);
    // Daily volatility eats into liquidation distance; flag overleveraged
    // setups
    let liquidation_distance = 1.0 / leverage - MAINTENANCE_MARGIN_RATE;
    let safe = liquidation_distance > volatility;

    let mut data = JsonMap::new();
    data.insert("symbol".into(), json!(snapshot.symbol));
    data.insert("leverage".into(), json!(leverage));
    data.insert("position_size".into(), json!(position_size));
    data.insert("position_notional_usd".into(), json!(notional));
    data.insert("margin_required_usd".into(), json!(margin_required));
    data.insert(
        "liquidation_distance_pct".into(),
        json!(liquidation_distance * 100.0),
    );
    data.insert("daily_volatility_pct".into(), json!(volatility * 100.0));
    data.insert("within_safety_envelope".into(), json!(safe));

    StrategyEnvelope::ok(&request.function, StrategyPayload::Report { data })
}

/// Margin report. Positions are owned by the exchange aggregator, so without
/// injected position state the report is an explicit empty snapshot.
pub async fn margin_status(_router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let mut data = JsonMap::new();
    data.insert(
        "exchange".into(),
        json!(request.exchange.as_deref().unwrap_or("binance")),
    );
    data.insert("open_positions".into(), json!([]));
    data.insert("margin_used_usd".into(), json!(0.0));
    data.insert("margin_ratio".into(), json!(0.0));
    data.insert("simulation".into(), json!(request.simulation_mode));

    StrategyEnvelope::ok(&request.function, StrategyPayload::Report { data })
}

/// Cross-venue funding-rate harvest over a `symbols` list. Venues that do
/// not publish funding simply contribute nothing.
pub async fn funding_arbitrage(
    router: &StrategyRouter,
    request: &StrategyRequest,
) -> StrategyEnvelope {
    let symbols: Vec<String> = request
        .param_str("symbols")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if symbols.is_empty() {
        return StrategyEnvelope::failure(&request.function, "symbols parameter required");
    }

    let min_funding_rate = request.param_f64("min_funding_rate").unwrap_or(0.005);
    let exchange = request.exchange.as_deref().unwrap_or("binance");
    let notional = request.param_f64("notional").unwrap_or(10_000.0);

    let mut opportunities = Vec::new();
    let mut observed = 0usize;

    for symbol in &symbols {
        let Some(snapshot) = router.prices().get(exchange, symbol).await else {
            continue;
        };
        // Funding ships in snapshot metadata only on perp feeds; the change
        // differential across 24h stands in as the carry proxy elsewhere
        let Some(funding) = request
            .param_f64(&format!("funding_rate_{}", symbol.to_lowercase()))
            .or_else(|| request.param_f64("funding_rate"))
        else {
            observed += 1;
            continue;
        };
        observed += 1;

        if funding.abs() < min_funding_rate {
            continue;
        }

        let mut extras = JsonMap::new();
        extras.insert("funding_rate_long".into(), json!(0.0));
        extras.insert("funding_rate_short".into(), json!(funding));
        extras.insert("spread_percentage".into(), json!(funding * 100.0));

        opportunities.push(AnalysisEntry {
            symbol: symbol.clone(),
            exchange: exchange.to_string(),
            profit_potential_usd: funding.abs() * 3.0 * notional,
            confidence: 70.0,
            risk_level: Some(RiskLevel::Medium),
            required_capital_usd: notional,
            timeframe: "8h".into(),
            entry_price: Some(snapshot.current),
            exit_price: None,
            extras,
        });
    }

    let mut summary = JsonMap::new();
    summary.insert("symbols_observed".into(), json!(observed));
    summary.insert("min_funding_rate".into(), json!(min_funding_rate));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::Analysis {
            opportunities,
            summary,
        },
    )
}

/// Hedge recommendations driven by observed market stress.
pub async fn hedge_position(router: &StrategyRouter, request: &StrategyRequest) -> StrategyEnvelope {
    let exchange = request.exchange.as_deref().unwrap_or("binance");
    let anchor_symbol = request.base_symbol().unwrap_or("BTC");
    let Some(anchor) = router.prices().get(exchange, anchor_symbol).await else {
        return StrategyEnvelope::failure(
            &request.function,
            format!("Price unavailable for {}", anchor_symbol),
        );
    };

    let hedge_ratio = request.param_f64("hedge_ratio").unwrap_or(0.5).clamp(0.0, 1.0);
    let drawdown = change_pct(&anchor).min(0.0).abs();
    // Market under stress raises hedge urgency
    let urgency_score = (0.3 + drawdown / 10.0).clamp(0.0, 1.0);

    let hedge_recommendations = vec![HedgeAction {
        hedge_type: "short_hedge".into(),
        hedge_instrument: format!("{}-PERP", anchor_symbol),
        effectiveness: 0.85,
        urgency_score,
        hedge_cost_usd: anchor.current * 0.01 * hedge_ratio,
        risk_reduction_pct: hedge_ratio * 80.0,
    }];

    let mut summary = JsonMap::new();
    summary.insert("anchor_symbol".into(), json!(anchor_symbol));
    summary.insert("anchor_change_24h_pct".into(), json!(change_pct(&anchor)));
    summary.insert("hedge_ratio".into(), json!(hedge_ratio));

    StrategyEnvelope::ok(
        &request.function,
        StrategyPayload::RiskReview {
            mitigation_strategies: Vec::new(),
            hedge_recommendations,
            summary,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::envelope::StrategyRequest;

    #[test]
    fn test_black_scholes_atm_call_delta_is_near_half() {
        let greeks = black_scholes(100.0, 100.0, 30.0 / 365.0, 0.6).unwrap();
        assert!((greeks.delta - 0.5).abs() < 0.1);
        assert!(greeks.gamma > 0.0);
        assert!(greeks.theta < 0.0);
        assert!(greeks.vega > 0.0);
        assert!(greeks.call_price > 0.0);
        // Put-call parity at zero rate: C - P = S - K = 0
        assert!((greeks.call_price - greeks.put_price).abs() < 1e-9);
    }

    #[test]
    fn test_black_scholes_rejects_degenerate_inputs() {
        assert!(black_scholes(0.0, 100.0, 0.1, 0.5).is_none());
        assert!(black_scholes(100.0, 100.0, 0.0, 0.5).is_none());
        assert!(black_scholes(100.0, 100.0, 0.1, 0.0).is_none());
    }

    #[test]
    fn test_liquidation_sides_bracket_entry() {
        let long = long_liquidation(100.0, 10.0);
        let short = short_liquidation(100.0, 10.0);
        assert!(long < 100.0);
        assert!(short > 100.0);
        // Higher leverage pulls liquidation closer
        assert!(long_liquidation(100.0, 20.0) > long);
    }

    #[tokio::test]
    async fn test_futures_trade_reports_leverage_and_liquidation() {
        let router = router_with_assets(&[asset_with(
            "BTC", 50_000.0, 200_000_000.0, 51_000.0, 47_000.0, 4.0,
        )])
        .await;

        let request = StrategyRequest::new("futures_trade", "u1")
            .with_symbol("BTC/USDT")
            .with_parameter("leverage", json!(10.0));
        let envelope = router.execute_strategy(&request).await;

        let signal = envelope.signal().unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.extras["leverage"], json!(10.0));
        let liq = signal.extras["liquidation_price"].as_f64().unwrap();
        assert!(liq < 50_000.0);
        let controls = envelope.risk_controls().unwrap();
        assert!((controls.risk_reward_ratio.unwrap() - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_greeks_report_has_all_five() {
        let router = router_with_assets(&[asset_with(
            "ETH", 3_000.0, 90_000_000.0, 3_100.0, 2_900.0, 1.0,
        )])
        .await;

        let request = StrategyRequest::new("calculate_greeks", "u1").with_symbol("ETH/USDT");
        let envelope = router.execute_strategy(&request).await;

        match envelope.payload {
            StrategyPayload::Report { data } => {
                for key in ["delta", "gamma", "theta", "vega", "rho"] {
                    assert!(data.contains_key(key), "missing {}", key);
                }
            }
            _ => panic!("expected report payload"),
        }
    }

    #[tokio::test]
    async fn test_basis_trade_without_funding_reports_no_opportunities() {
        let router = router_with_assets(&[asset_with(
            "BTC", 50_000.0, 200_000_000.0, 51_000.0, 49_000.0, 1.0,
        )])
        .await;

        let request = StrategyRequest::new("basis_trade", "u1").with_symbol("BTC/USDT");
        let envelope = router.execute_strategy(&request).await;

        match envelope.payload {
            StrategyPayload::Analysis { opportunities, .. } => assert!(opportunities.is_empty()),
            _ => panic!("expected analysis payload"),
        }
    }

    #[tokio::test]
    async fn test_funding_arbitrage_gates_on_min_rate() {
        let router = router_with_assets(&[asset_with(
            "BTC", 50_000.0, 200_000_000.0, 51_000.0, 49_000.0, 1.0,
        )])
        .await;

        let request = StrategyRequest::new("funding_arbitrage", "u1")
            .with_parameter("symbols", json!("BTC"))
            .with_parameter("funding_rate", json!(0.008))
            .with_parameter("min_funding_rate", json!(0.005));
        let envelope = router.execute_strategy(&request).await;

        match envelope.payload {
            StrategyPayload::Analysis { opportunities, .. } => {
                assert_eq!(opportunities.len(), 1);
                assert_eq!(opportunities[0].symbol, "BTC");
            }
            _ => panic!("expected analysis payload"),
        }
    }

    #[tokio::test]
    async fn test_hedge_urgency_rises_with_drawdown() {
        let calm = router_with_assets(&[asset_with(
            "BTC", 50_000.0, 200_000_000.0, 51_000.0, 49_000.0, 1.0,
        )])
        .await;
        let stressed = router_with_assets(&[asset_with(
            "BTC", 45_000.0, 200_000_000.0, 51_000.0, 44_000.0, -8.0,
        )])
        .await;

        let request = StrategyRequest::new("hedge_position", "u1").with_symbol("BTC/USDT");

        let calm_envelope = calm.execute_strategy(&request).await;
        let stressed_envelope = stressed.execute_strategy(&request).await;

        let urgency = |envelope: &StrategyEnvelope| match &envelope.payload {
            StrategyPayload::RiskReview {
                hedge_recommendations,
                ..
            } => hedge_recommendations[0].urgency_score,
            _ => panic!("expected risk review payload"),
        };

        assert!(urgency(&stressed_envelope) > urgency(&calm_envelope));
    }
}
