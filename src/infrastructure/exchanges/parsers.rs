//! Per-exchange ticker payload parsers.
//!
//! Each parser normalizes one exchange's 24h ticker format into
//! `symbol -> Asset`, keyed by base symbol with the quote suffix stripped.
//! Entries without a positive price and volume are discarded; secondary
//! fields survive in asset metadata.

use crate::domain::asset::{Asset, Tier};
use crate::domain::exchange::AssetType;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Known quote currencies, longest-first so BUSD is not mistaken for USD.
const QUOTE_CURRENCIES: [&str; 8] = ["USDT", "BUSD", "USDC", "BTC", "ETH", "BNB", "USD", "EUR"];

/// Strip a known quote suffix from a raw pair symbol.
///
/// Returns `(base, quote)`. A base shorter than 2 chars rejects the strip;
/// symbols with no recognizable suffix pass through with an empty quote.
pub fn split_base_quote(raw_symbol: &str) -> Option<(String, String)> {
    let symbol = raw_symbol.trim().to_uppercase();
    if symbol.len() < 2 {
        return None;
    }

    for quote in QUOTE_CURRENCIES {
        if symbol.len() > quote.len()
            && symbol.ends_with(quote)
        {
            let base = &symbol[..symbol.len() - quote.len()];
            if base.len() >= 2 {
                return Some((base.to_string(), quote.to_string()));
            }
        }
    }

    Some((symbol, String::new()))
}

fn value_as_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn build_asset(
    symbol: String,
    quote: String,
    exchange_id: &str,
    volume_usd: f64,
    price_usd: f64,
    asset_type: AssetType,
    metadata: Map<String, Value>,
) -> Option<(String, Asset)> {
    if symbol.is_empty() || volume_usd <= 0.0 || price_usd <= 0.0 {
        return None;
    }

    let mut metadata = metadata;
    metadata.insert("asset_type".into(), json!(asset_type.as_str()));

    let asset = Asset {
        symbol: symbol.clone(),
        exchange: exchange_id.to_string(),
        quote_currency: quote,
        volume_24h_usd: volume_usd,
        price_usd,
        market_cap_usd: None,
        tier: Tier::classify(volume_usd),
        last_updated: Utc::now(),
        metadata,
    };
    Some((symbol, asset))
}

/// One exchange's ticker-payload decoder.
pub trait TickerParser: Send + Sync {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset>;
}

/// Binance: top-level array of 24hr ticker objects with decimal strings.
pub struct BinanceParser;

impl TickerParser for BinanceParser {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset> {
        let mut assets = HashMap::new();
        let Some(items) = data.as_array() else {
            return assets;
        };

        for item in items {
            let Some(raw_symbol) = item.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            let Some((base, quote)) = split_base_quote(raw_symbol) else {
                continue;
            };

            let volume_usd = value_as_f64(item.get("quoteVolume"));
            let price_usd = value_as_f64(item.get("lastPrice"));

            let mut metadata = Map::new();
            metadata.insert(
                "price_change_pct".into(),
                json!(value_as_f64(item.get("priceChangePercent"))),
            );
            metadata.insert("high_24h".into(), json!(value_as_f64(item.get("highPrice"))));
            metadata.insert("low_24h".into(), json!(value_as_f64(item.get("lowPrice"))));

            if let Some((symbol, asset)) = build_asset(
                base, quote, exchange_id, volume_usd, price_usd, asset_type, metadata,
            ) {
                assets.insert(symbol, asset);
            }
        }
        assets
    }
}

/// KuCoin: `data.ticker` array with `BASE-QUOTE` symbols and USD volumes in
/// `volValue`.
pub struct KucoinParser;

impl TickerParser for KucoinParser {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset> {
        let mut assets = HashMap::new();
        let Some(items) = data
            .get("data")
            .and_then(|d| d.get("ticker"))
            .and_then(Value::as_array)
        else {
            return assets;
        };

        for item in items {
            let Some(raw_symbol) = item.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            let mut parts = raw_symbol.split('-');
            let base = parts.next().unwrap_or("").to_uppercase();
            let quote = parts.next().unwrap_or("").to_uppercase();
            if base.len() < 2 {
                continue;
            }

            let volume_usd = value_as_f64(item.get("volValue"));
            let price_usd = value_as_f64(item.get("last"));

            let mut metadata = Map::new();
            metadata.insert(
                "change_rate".into(),
                json!(value_as_f64(item.get("changeRate"))),
            );
            metadata.insert("high_24h".into(), json!(value_as_f64(item.get("high"))));
            metadata.insert("low_24h".into(), json!(value_as_f64(item.get("low"))));

            if let Some((symbol, asset)) = build_asset(
                base, quote, exchange_id, volume_usd, price_usd, asset_type, metadata,
            ) {
                assets.insert(symbol, asset);
            }
        }
        assets
    }
}

/// Bybit v5: `result.list` array; USD turnover in `turnover24h`.
pub struct BybitParser;

impl TickerParser for BybitParser {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset> {
        let mut assets = HashMap::new();
        let Some(items) = data
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(Value::as_array)
        else {
            return assets;
        };

        for item in items {
            let Some(raw_symbol) = item.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            let Some((base, quote)) = split_base_quote(raw_symbol) else {
                continue;
            };

            let volume_usd = value_as_f64(item.get("turnover24h"));
            let price_usd = value_as_f64(item.get("lastPrice"));

            let mut metadata = Map::new();
            metadata.insert(
                "price_change_pct".into(),
                // Bybit reports the ratio, not percent
                json!(value_as_f64(item.get("price24hPcnt")) * 100.0),
            );
            metadata.insert(
                "high_24h".into(),
                json!(value_as_f64(item.get("highPrice24h"))),
            );
            metadata.insert(
                "low_24h".into(),
                json!(value_as_f64(item.get("lowPrice24h"))),
            );
            if let Some(funding) = item.get("fundingRate") {
                metadata.insert("funding_rate".into(), json!(value_as_f64(Some(funding))));
            }

            if let Some((symbol, asset)) = build_asset(
                base, quote, exchange_id, volume_usd, price_usd, asset_type, metadata,
            ) {
                assets.insert(symbol, asset);
            }
        }
        assets
    }
}

/// OKX: `data` array with `BASE-QUOTE` inst ids; quote-currency volume in
/// `volCcy24h`.
pub struct OkxParser;

impl TickerParser for OkxParser {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset> {
        let mut assets = HashMap::new();
        let Some(items) = data.get("data").and_then(Value::as_array) else {
            return assets;
        };

        for item in items {
            let Some(inst_id) = item.get("instId").and_then(Value::as_str) else {
                continue;
            };
            let mut parts = inst_id.split('-');
            let base = parts.next().unwrap_or("").to_uppercase();
            let quote = parts.next().unwrap_or("").to_uppercase();
            if base.len() < 2 {
                continue;
            }

            let volume_usd = value_as_f64(item.get("volCcy24h"));
            let price_usd = value_as_f64(item.get("last"));

            let open = value_as_f64(item.get("open24h"));
            let change_pct = if open > 0.0 {
                (price_usd - open) / open * 100.0
            } else {
                0.0
            };

            let mut metadata = Map::new();
            metadata.insert("price_change_pct".into(), json!(change_pct));
            metadata.insert("high_24h".into(), json!(value_as_f64(item.get("high24h"))));
            metadata.insert("low_24h".into(), json!(value_as_f64(item.get("low24h"))));

            if let Some((symbol, asset)) = build_asset(
                base, quote, exchange_id, volume_usd, price_usd, asset_type, metadata,
            ) {
                assets.insert(symbol, asset);
            }
        }
        assets
    }
}

/// Kraken: `result` map keyed by pair name with array-shaped fields.
/// Base volume (`v[1]`) is converted to USD with the last price (`c[0]`).
pub struct KrakenParser;

impl KrakenParser {
    /// Kraken uses X/Z-prefixed asset codes (XXBTZUSD) and XBT for BTC.
    fn normalize_pair(pair: &str) -> Option<String> {
        let upper = pair.to_uppercase();
        let base = ["ZUSD", "ZEUR", "USDT", "USDC", "USD", "EUR"]
            .iter()
            .find_map(|quote| upper.strip_suffix(*quote))?;

        let mut base = base.to_string();
        if base.len() > 3 && (base.starts_with('X') || base.starts_with('Z')) {
            base.remove(0);
        }
        if base == "XBT" {
            base = "BTC".to_string();
        }
        (base.len() >= 2).then_some(base)
    }
}

impl TickerParser for KrakenParser {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset> {
        let mut assets = HashMap::new();
        let Some(result) = data.get("result").and_then(Value::as_object) else {
            return assets;
        };

        for (pair, ticker) in result {
            let Some(base) = Self::normalize_pair(pair) else {
                continue;
            };

            let last = value_as_f64(ticker.get("c").and_then(|c| c.get(0)));
            let base_volume = value_as_f64(ticker.get("v").and_then(|v| v.get(1)));
            let volume_usd = base_volume * last;

            let mut metadata = Map::new();
            metadata.insert(
                "high_24h".into(),
                json!(value_as_f64(ticker.get("h").and_then(|h| h.get(1)))),
            );
            metadata.insert(
                "low_24h".into(),
                json!(value_as_f64(ticker.get("l").and_then(|l| l.get(1)))),
            );
            let open = value_as_f64(ticker.get("o"));
            if open > 0.0 {
                metadata.insert(
                    "price_change_pct".into(),
                    json!((last - open) / open * 100.0),
                );
            }

            if let Some((symbol, asset)) = build_asset(
                base,
                "USD".to_string(),
                exchange_id,
                volume_usd,
                last,
                asset_type,
                metadata,
            ) {
                assets.insert(symbol, asset);
            }
        }
        assets
    }
}

/// Gate.io: top-level array with `BASE_QUOTE` currency pairs.
pub struct GateParser;

impl TickerParser for GateParser {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset> {
        let mut assets = HashMap::new();
        let Some(items) = data.as_array() else {
            return assets;
        };

        for item in items {
            let Some(pair) = item.get("currency_pair").and_then(Value::as_str) else {
                continue;
            };
            let mut parts = pair.split('_');
            let base = parts.next().unwrap_or("").to_uppercase();
            let quote = parts.next().unwrap_or("").to_uppercase();
            if base.len() < 2 {
                continue;
            }

            let volume_usd = value_as_f64(item.get("quote_volume"));
            let price_usd = value_as_f64(item.get("last"));

            let mut metadata = Map::new();
            metadata.insert(
                "price_change_pct".into(),
                json!(value_as_f64(item.get("change_percentage"))),
            );
            metadata.insert("high_24h".into(), json!(value_as_f64(item.get("high_24h"))));
            metadata.insert("low_24h".into(), json!(value_as_f64(item.get("low_24h"))));

            if let Some((symbol, asset)) = build_asset(
                base, quote, exchange_id, volume_usd, price_usd, asset_type, metadata,
            ) {
                assets.insert(symbol, asset);
            }
        }
        assets
    }
}

/// Bitfinex v2: array of positional ticker arrays starting with `tSYMBOL`.
/// Base volume (index 8) is converted to USD with the last price (index 7).
pub struct BitfinexParser;

impl TickerParser for BitfinexParser {
    fn parse(
        &self,
        data: &Value,
        exchange_id: &str,
        asset_type: AssetType,
    ) -> HashMap<String, Asset> {
        let mut assets = HashMap::new();
        let Some(items) = data.as_array() else {
            return assets;
        };

        for item in items {
            let Some(fields) = item.as_array() else {
                continue;
            };
            if fields.len() < 11 {
                continue;
            }
            let Some(raw_symbol) = fields[0].as_str() else {
                continue;
            };
            // Trading pairs only, e.g. tBTCUSD; funding symbols start with f
            let Some(pair) = raw_symbol.strip_prefix('t') else {
                continue;
            };
            let Some((base, quote)) = split_base_quote(pair) else {
                continue;
            };

            let last = value_as_f64(fields.get(7));
            let base_volume = value_as_f64(fields.get(8));
            let volume_usd = base_volume * last;

            let mut metadata = Map::new();
            metadata.insert(
                "price_change_pct".into(),
                json!(value_as_f64(fields.get(6)) * 100.0),
            );
            metadata.insert("high_24h".into(), json!(value_as_f64(fields.get(9))));
            metadata.insert("low_24h".into(), json!(value_as_f64(fields.get(10))));

            if let Some((symbol, asset)) = build_asset(
                base, quote, exchange_id, volume_usd, last, asset_type, metadata,
            ) {
                assets.insert(symbol, asset);
            }
        }
        assets
    }
}

/// Parser registry keyed by the descriptor's `parser` field.
pub fn parser_registry() -> HashMap<String, Arc<dyn TickerParser>> {
    let mut parsers: HashMap<String, Arc<dyn TickerParser>> = HashMap::new();
    parsers.insert("binance".into(), Arc::new(BinanceParser));
    parsers.insert("kraken".into(), Arc::new(KrakenParser));
    parsers.insert("kucoin".into(), Arc::new(KucoinParser));
    parsers.insert("bybit".into(), Arc::new(BybitParser));
    parsers.insert("okx".into(), Arc::new(OkxParser));
    parsers.insert("gate".into(), Arc::new(GateParser));
    parsers.insert("bitfinex".into(), Arc::new(BitfinexParser));
    parsers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_base_quote_strips_known_suffixes_in_order() {
        assert_eq!(
            split_base_quote("BTCUSDT"),
            Some(("BTC".into(), "USDT".into()))
        );
        assert_eq!(
            split_base_quote("SOLBUSD"),
            Some(("SOL".into(), "BUSD".into()))
        );
        assert_eq!(
            split_base_quote("ETHBTC"),
            Some(("ETH".into(), "BTC".into()))
        );
        // Base would be a single char: no strip, falls through as-is
        assert_eq!(split_base_quote("TUSDT"), Some(("TUSDT".into(), "".into())));
    }

    #[test]
    fn test_binance_parser_discards_zero_volume_entries() {
        let payload = json!([
            {"symbol": "BTCUSDT", "lastPrice": "50000", "quoteVolume": "2000000",
             "priceChangePercent": "2.5", "highPrice": "51000", "lowPrice": "48000"},
            {"symbol": "DEADUSDT", "lastPrice": "0.5", "quoteVolume": "0",
             "priceChangePercent": "0", "highPrice": "0", "lowPrice": "0"}
        ]);

        let assets = BinanceParser.parse(&payload, "binance", AssetType::Spot);
        assert_eq!(assets.len(), 1);
        let btc = &assets["BTC"];
        assert_eq!(btc.price_usd, 50_000.0);
        assert_eq!(btc.volume_24h_usd, 2_000_000.0);
        assert_eq!(btc.quote_currency, "USDT");
        assert_eq!(btc.metadata["price_change_pct"], json!(2.5));
    }

    #[test]
    fn test_kucoin_parser_splits_dash_pairs() {
        let payload = json!({"data": {"ticker": [
            {"symbol": "ETH-USDT", "last": "3000", "volValue": "5000000",
             "changeRate": "0.01", "high": "3100", "low": "2900"}
        ]}});

        let assets = KucoinParser.parse(&payload, "kucoin", AssetType::Spot);
        assert_eq!(assets["ETH"].quote_currency, "USDT");
        assert_eq!(assets["ETH"].volume_24h_usd, 5_000_000.0);
    }

    #[test]
    fn test_kraken_parser_normalizes_legacy_pairs() {
        let payload = json!({"error": [], "result": {
            "XXBTZUSD": {"c": ["50000", "0.1"], "v": ["10", "40"],
                          "h": ["0", "51000"], "l": ["0", "49000"], "o": "49500"}
        }});

        let assets = KrakenParser.parse(&payload, "kraken", AssetType::Spot);
        let btc = &assets["BTC"];
        assert_eq!(btc.price_usd, 50_000.0);
        assert_eq!(btc.volume_24h_usd, 2_000_000.0);
    }

    #[test]
    fn test_bitfinex_parser_skips_funding_symbols() {
        let payload = json!([
            ["tBTCUSD", 0, 0, 0, 0, 0, 0.02, 50000.0, 100.0, 51000.0, 48000.0],
            ["fUSD", 0, 0, 0, 0, 0, 0, 0.0001, 1000.0, 0, 0]
        ]);

        let assets = BitfinexParser.parse(&payload, "bitfinex", AssetType::Spot);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets["BTC"].volume_24h_usd, 5_000_000.0);
    }

    #[test]
    fn test_okx_parser_derives_change_from_open() {
        let payload = json!({"data": [
            {"instId": "SOL-USDT", "last": "110", "open24h": "100",
             "volCcy24h": "12000000", "high24h": "115", "low24h": "99"}
        ]});

        let assets = OkxParser.parse(&payload, "okx", AssetType::Spot);
        let sol = &assets["SOL"];
        assert!((sol.metadata["price_change_pct"].as_f64().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_registry_covers_all_static_parsers() {
        let registry = parser_registry();
        for key in ["binance", "kraken", "kucoin", "bybit", "okx", "gate", "bitfinex"] {
            assert!(registry.contains_key(key), "missing parser {}", key);
        }
    }
}
