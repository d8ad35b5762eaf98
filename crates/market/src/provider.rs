//! Upstream data boundary.
//!
//! Handlers never build URLs themselves; everything they need from the
//! outside world goes through [`MarketProvider`]. The production
//! implementation lives in [`crate::eastmoney`], tests drop in fakes.

use async_trait::async_trait;
use serde_json::Value;

use quotebot_core::Result;

/// Scope of a capital-flow query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowScope<'a> {
    /// Daily main-force flow series for one stock, by secid.
    Stock(&'a str),
    /// Market-wide (沪深两市) daily flow series.
    Market,
    /// Northbound / southbound (沪深港通) realtime snapshot.
    North,
    /// Sector ranking by today's main-force net inflow.
    Sector,
}

/// Which board universe a sector ranking runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Industry,
    Concept,
}

impl BoardKind {
    pub fn label(&self) -> &'static str {
        match self {
            BoardKind::Industry => "行业板块",
            BoardKind::Concept => "概念板块",
        }
    }
}

/// One method per data category. Every upstream failure surfaces as
/// `Error::Provider` (or `Error::Timeout` for elapsed deadlines) so the
/// cache and the handlers treat all of them uniformly.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Realtime snapshot for one secid.
    async fn quote(&self, secid: &str) -> Result<Value>;

    /// Valuation fields (PE/PB, market cap, turnover) for one secid.
    async fn fundamentals(&self, secid: &str) -> Result<Value>;

    /// Candles. `klt`: 1/5/15/30/60 minute buckets, 101 daily, 102 weekly,
    /// 103 monthly. `end` is a YYYYMMDD upper bound, empty for today.
    async fn kline(&self, secid: &str, klt: u32, limit: u32, end: &str) -> Result<Value>;

    /// Intraday bars, `bucket` minutes wide.
    async fn minute_series(&self, secid: &str, bucket: u32, limit: u32) -> Result<Value>;

    /// Limit-up and limit-down pools for a YYYYMMDD trade date.
    async fn limit_pool(&self, date: &str) -> Result<Value>;

    /// Capital flow for the given scope; `limit` caps series length.
    async fn capital_flow(&self, scope: FlowScope<'_>, limit: u32) -> Result<Value>;

    /// Board gainers (or losers when `ascending`) with leader stocks.
    async fn sector_rank(&self, kind: BoardKind, ascending: bool, limit: u32) -> Result<Value>;

    /// Convertible-bond ranking by today's change.
    async fn bond_rank(&self, limit: u32) -> Result<Value>;

    /// Margin-trading balance history, newest first.
    async fn margin_summary(&self, limit: u32) -> Result<Value>;

    /// Dragon-tiger board (龙虎榜) entries, newest first.
    async fn dragon_tiger(&self, limit: u32) -> Result<Value>;

    /// Daily bars for an index-futures contract (IF0/IH0/IC0/IM0 or a
    /// dated contract like IF2412).
    async fn futures_daily(&self, symbol: &str, limit: u32) -> Result<Value>;
}

/// Convert a router symbol into an EastMoney `market.code` secid.
///
/// Already-qualified ids (`1.000001`, `100.HSI`) pass through untouched, so
/// index aliases resolved upstream keep their market prefix.
pub fn to_secid(symbol: &str) -> String {
    let s = symbol.trim();
    if s.contains('.') {
        return s.to_string();
    }
    let lower = s.to_lowercase();
    if let Some(digits) = lower.strip_prefix("hk") {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return format!("116.{:0>5}", digits);
        }
    }
    for (prefix, market) in [("sh", "1"), ("sz", "0")] {
        if let Some(code) = lower.strip_prefix(prefix) {
            if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
                return format!("{}.{}", market, code);
            }
        }
    }
    if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) {
        // 5xxxxx SH funds, 6xxxxx SH stocks, 9xxxxx SH B shares; everything
        // else trades on the Shenzhen feed.
        return match &s[..1] {
            "5" | "6" | "9" => format!("1.{}", s),
            _ => format!("0.{}", s),
        };
    }
    // Anything left is treated as a US ticker.
    format!("105.{}", s.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_secid_a_shares() {
        assert_eq!(to_secid("600519"), "1.600519");
        assert_eq!(to_secid("000858"), "0.000858");
        assert_eq!(to_secid("300750"), "0.300750");
        assert_eq!(to_secid("510050"), "1.510050");
        assert_eq!(to_secid("900901"), "1.900901");
    }

    #[test]
    fn test_to_secid_prefixed() {
        assert_eq!(to_secid("sh000300"), "1.000300");
        assert_eq!(to_secid("sz002594"), "0.002594");
        assert_eq!(to_secid("SH600036"), "1.600036");
    }

    #[test]
    fn test_to_secid_hk_pads_to_five() {
        assert_eq!(to_secid("hk00700"), "116.00700");
        assert_eq!(to_secid("hk9988"), "116.09988");
        assert_eq!(to_secid("HK386"), "116.00386");
    }

    #[test]
    fn test_to_secid_passthrough_and_us() {
        assert_eq!(to_secid("1.000001"), "1.000001");
        assert_eq!(to_secid("100.HSI"), "100.HSI");
        assert_eq!(to_secid("105.AAPL"), "105.AAPL");
        assert_eq!(to_secid("aapl"), "105.AAPL");
        assert_eq!(to_secid("TSLA"), "105.TSLA");
    }
}
