//! Sina finance fallback for index futures.
//!
//! EastMoney has no open futures endpoint, so IF/IH/IC/IM daily bars come
//! from Sina's JSONP kline API instead. The payload arrives wrapped in a
//! `var _temp=([...])` shim that has to be peeled off before parsing.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use quotebot_core::{Error, Result};

const DAILY_KLINE_API: &str =
    "https://stock2.finance.sina.com.cn/futures/api/jsonp.php/var%20_temp=/InnerFuturesNewService.getDailyKLine";
const REFERER: &str = "https://finance.sina.com.cn/";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Main continuous contracts and their display names.
pub const MAIN_CONTRACTS: &[(&str, &str)] = &[
    ("IF0", "沪深300期货"),
    ("IH0", "上证50期货"),
    ("IC0", "中证500期货"),
    ("IM0", "中证1000期货"),
];

/// Display name for a contract symbol, falling back to the symbol itself.
pub fn contract_label(symbol: &str) -> String {
    MAIN_CONTRACTS
        .iter()
        .find(|(sym, _)| sym.eq_ignore_ascii_case(symbol))
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| symbol.to_uppercase())
}

pub struct SinaFuturesService {
    client: Client,
}

impl SinaFuturesService {
    /// Cloning a reqwest client shares the underlying pool.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Daily bars for `symbol`, oldest first, trimmed to the trailing `limit`.
    pub async fn daily_kline(&self, symbol: &str, limit: u32) -> Result<Value> {
        let symbol = symbol.to_uppercase();
        debug!(symbol = %symbol, "新浪期货 daily kline");
        let resp = self
            .client
            .get(DAILY_KLINE_API)
            .query(&[("symbol", symbol.as_str())])
            .header("Referer", REFERER)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("新浪期货 {} request timed out: {}", symbol, e))
                } else {
                    Error::Provider(format!("新浪期货 {} request failed: {}", symbol, e))
                }
            })?;
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Provider(format!("新浪期货 {} read failed: {}", symbol, e)))?;

        let rows = parse_jsonp_rows(&body)?;
        let mut bars: Vec<Value> = rows.iter().filter_map(row_to_bar).collect();
        if bars.is_empty() {
            return Err(Error::Provider(format!("新浪期货: {} 无K线数据", symbol)));
        }
        let keep = limit.max(1) as usize;
        if bars.len() > keep {
            bars.drain(..bars.len() - keep);
        }
        Ok(json!({
            "symbol": symbol,
            "name": contract_label(&symbol),
            "count": bars.len(),
            "bars": bars,
            "source": "sina",
        }))
    }
}

/// Strip the `var _temp=(...)` JSONP wrapper and parse the inner array.
fn parse_jsonp_rows(body: &str) -> Result<Vec<Value>> {
    let start = body
        .find("([")
        .ok_or_else(|| Error::Provider("新浪期货: unexpected JSONP payload".into()))?;
    let end = body
        .rfind("])")
        .ok_or_else(|| Error::Provider("新浪期货: unexpected JSONP payload".into()))?;
    let inner = &body[start + 1..end + 1];
    let parsed: Value = serde_json::from_str(inner)
        .map_err(|e| Error::Provider(format!("新浪期货: bad JSON payload: {}", e)))?;
    match parsed {
        Value::Array(rows) => Ok(rows),
        _ => Err(Error::Provider("新浪期货: payload is not an array".into())),
    }
}

/// Rows come either as objects with string-valued numbers or as positional
/// arrays `[date, open, high, low, close, volume, ...]`.
fn row_to_bar(row: &Value) -> Option<Value> {
    if let Some(obj) = row.as_object() {
        let date = obj.get("d")?.as_str()?.to_string();
        let num = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
        };
        return Some(json!({
            "date": date,
            "open": num("o"),
            "high": num("h"),
            "low": num("l"),
            "close": num("c"),
            "volume": num("v"),
        }));
    }
    let arr = row.as_array()?;
    if arr.len() < 6 {
        return None;
    }
    let date = arr[0].as_str()?.to_string();
    let num = |v: &Value| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
    };
    Some(json!({
        "date": date,
        "open": num(&arr[1]),
        "high": num(&arr[2]),
        "low": num(&arr[3]),
        "close": num(&arr[4]),
        "volume": num(&arr[5]),
    }))
}
