//! Parameter extraction: symbols, row caps, timeframe, lookback and trade
//! date, each from a disjoint pattern class. Extraction is independent of the
//! classified intent except for per-intent lookback defaults.
//!
//! Symbol scanning works on digit runs rather than `\b`-anchored patterns:
//! the regex word boundary is Unicode-aware, so `\b\d{6}\b` never matches a
//! code glued to CJK text like `600519分时`.

use std::collections::HashSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use quotebot_core::types::{Intent, Timeframe, TradeDate};

use crate::alias;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static HK_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)hk(\d{4,5})").unwrap());
static US_TICKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]{2,5}").unwrap());
static TOP_N_EN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)top\s*(\d+)").unwrap());
static TOP_N_ZH: Lazy<Regex> = Lazy::new(|| Regex::new(r"前\s*(\d+)\s*(?:名|条|个|只)?").unwrap());
static LOOKBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:近|最近)\s*(\d+)\s*个?\s*(交易日|日|天|周|月)").unwrap());
static DATE_DASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").unwrap());

/// Uppercase tokens that look like US tickers but never are in queries.
static TICKER_STOPWORDS: &[&str] = &[
    "ETF", "LOF", "QDII", "ROE", "EPS", "GDP", "CPI", "PPI", "PMI", "IPO", "KDJ", "MACD",
    "RSI", "BOLL", "TOP", "HK", "PE", "PB", "PS", "ST", "IF", "IH", "IC", "IM",
];

fn char_before(text: &str, pos: usize) -> Option<char> {
    text[..pos].chars().next_back()
}

fn char_after(text: &str, pos: usize) -> Option<char> {
    text[pos..].chars().next()
}

/// All instrument codes a query names, in order of appearance class:
/// bare A-share codes, HK codes, US tickers, then alias resolutions.
/// Deduplicated with insertion order preserved; empty when nothing resolves.
pub fn extract_symbols(text: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();

    // A-share: runs of exactly six digits, optional textual sh/sz prefix.
    for m in DIGIT_RUN.find_iter(text) {
        if m.as_str().len() != 6 {
            continue;
        }
        let lower_before = text[..m.start()].to_lowercase();
        if lower_before.ends_with("sh") {
            codes.push(format!("sh{}", m.as_str()));
        } else if lower_before.ends_with("sz") {
            codes.push(format!("sz{}", m.as_str()));
        } else {
            codes.push(m.as_str().to_string());
        }
    }

    // Hong Kong: hk + 4-5 digits, not embedded in a longer ASCII token.
    for caps in HK_CODE.captures_iter(text) {
        let (whole, digits) = match (caps.get(0), caps.get(1)) {
            (Some(w), Some(d)) => (w, d.as_str()),
            _ => continue,
        };
        if let Some(c) = char_before(text, whole.start()) {
            if c.is_ascii_alphanumeric() {
                continue;
            }
        }
        if let Some(c) = char_after(text, whole.end()) {
            if c.is_ascii_digit() {
                continue;
            }
        }
        codes.push(format!("hk{}", digits));
    }

    // US tickers: standalone uppercase words only. A CJK or alphanumeric
    // neighbor means the letters are part of running text (K线, HK00700),
    // not a ticker.
    for m in US_TICKER.find_iter(text) {
        let token = m.as_str();
        if TICKER_STOPWORDS.contains(&token) {
            continue;
        }
        let ok_before = match char_before(text, m.start()) {
            None => true,
            Some(c) => c.is_ascii_whitespace() || c.is_ascii_punctuation(),
        };
        let ok_after = match char_after(text, m.end()) {
            None => true,
            Some(c) => c.is_ascii_whitespace() || c.is_ascii_punctuation(),
        };
        if ok_before && ok_after {
            codes.push(token.to_string());
        }
    }

    codes.extend(alias::resolve_names(text));

    let mut seen = HashSet::new();
    codes.retain(|c| seen.insert(c.clone()));
    codes
}

/// Row cap for ranking answers: `top N` / `前N名(条/个/只)`, default 10,
/// capped at 50.
pub fn extract_top_n(text: &str) -> u32 {
    for re in [&*TOP_N_EN, &*TOP_N_ZH] {
        if let Some(n) = re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        {
            if n > 0 {
                return n.min(50);
            }
        }
    }
    10
}

pub fn extract_timeframe(text: &str) -> Timeframe {
    for n in [60u32, 30, 15, 5, 1] {
        if text.contains(&format!("{}分钟", n)) {
            return Timeframe::Minute(n);
        }
    }
    let lower = text.to_lowercase();
    if text.contains("周线") || lower.contains("week") {
        return Timeframe::Week;
    }
    if text.contains("月线") || lower.contains("month") {
        return Timeframe::Month;
    }
    // 日线 and no marker both mean daily bars.
    Timeframe::Day
}

/// History depth in trading days: `近N日/天/周/月`. 周 counts 5 trading
/// days, 月 counts 22. Clamped to one trading year.
pub fn extract_lookback(text: &str, intent: Intent) -> u32 {
    if let Some(caps) = LOOKBACK.captures(text) {
        let n = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        if n > 0 {
            let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("日");
            let days = match unit {
                "周" => n.saturating_mul(5),
                "月" => n.saturating_mul(22),
                _ => n,
            };
            return days.clamp(1, 250);
        }
    }
    default_lookback(intent)
}

pub fn default_lookback(intent: Intent) -> u32 {
    match intent {
        Intent::KlineAnalysis => 30,
        Intent::MoneyFlow => 10,
        // Minute bars: two hours of a trading session.
        Intent::IntradayAnalysis => 120,
        Intent::MarginLhb => 10,
        Intent::FundBond => 30,
        _ => 30,
    }
}

pub fn extract_date(text: &str) -> TradeDate {
    if let Some(caps) = DATE_DASHED.captures(text) {
        if let Some(d) = dashed_ymd(&caps) {
            return TradeDate::On(d);
        }
    }
    for m in DIGIT_RUN.find_iter(text) {
        if m.as_str().len() == 8 {
            if let Some(d) = compact_ymd(m.as_str()) {
                return TradeDate::On(d);
            }
        }
    }
    if text.contains("今天") || text.contains("今日") {
        return TradeDate::Today;
    }
    if text.contains("昨天") || text.contains("昨日") {
        return TradeDate::Yesterday;
    }
    TradeDate::Today
}

fn dashed_ymd(caps: &regex::Captures) -> Option<NaiveDate> {
    let y: i32 = caps.get(1)?.as_str().parse().ok()?;
    let m: u32 = caps.get(2)?.as_str().parse().ok()?;
    let d: u32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

fn compact_ymd(run: &str) -> Option<NaiveDate> {
    let y: i32 = run[..4].parse().ok()?;
    let m: u32 = run[4..6].parse().ok()?;
    let d: u32 = run[6..8].parse().ok()?;
    // An 8-digit run is only a date when it reads as one.
    if !(1990..=2100).contains(&y) {
        return None;
    }
    NaiveDate::from_ymd_opt(y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_digit_codes_adjacent_to_cjk() {
        assert_eq!(extract_symbols("600519分时"), vec!["600519"]);
        assert_eq!(extract_symbols("600519 000001对比"), vec!["600519", "000001"]);
    }

    #[test]
    fn test_sh_sz_prefix_kept() {
        assert_eq!(extract_symbols("sh000300走势"), vec!["sh000300"]);
        assert_eq!(extract_symbols("SZ002594"), vec!["sz002594"]);
    }

    #[test]
    fn test_hk_codes() {
        assert_eq!(extract_symbols("港股hk00700现价"), vec!["hk00700"]);
        assert_eq!(extract_symbols("hk0386"), vec!["hk0386"]);
        // Embedded in an ASCII token: not a HK code.
        assert!(extract_symbols("shk0070x").is_empty());
    }

    #[test]
    fn test_us_tickers_standalone_only() {
        assert_eq!(extract_symbols("AAPL MSFT 怎么样"), vec!["AAPL", "MSFT"]);
        // Glued to CJK text these are prose, not tickers.
        assert!(extract_symbols("创业板ETF净值").contains(&"0.399006".to_string()));
        assert!(!extract_symbols("创业板ETF净值").contains(&"ETF".to_string()));
        assert!(extract_symbols("K线怎么看").is_empty());
    }

    #[test]
    fn test_alias_after_direct_codes_and_dedup() {
        assert_eq!(extract_symbols("贵州茅台600519"), vec!["600519"]);
        assert_eq!(extract_symbols("茅台和五粮液"), vec!["600519", "000858"]);
    }

    #[test]
    fn test_top_n() {
        assert_eq!(extract_top_n("前5只"), 5);
        assert_eq!(extract_top_n("top20涨停"), 20);
        assert_eq!(extract_top_n("涨停板"), 10);
        assert_eq!(extract_top_n("前999名"), 50);
    }

    #[test]
    fn test_timeframe() {
        assert_eq!(extract_timeframe("60分钟K线"), Timeframe::Minute(60));
        assert_eq!(extract_timeframe("周线走势"), Timeframe::Week);
        assert_eq!(extract_timeframe("茅台月线"), Timeframe::Month);
        // 近30日K线 carries 日 but no 日线 marker: still daily.
        assert_eq!(extract_timeframe("茅台近30日K线"), Timeframe::Day);
    }

    #[test]
    fn test_lookback() {
        assert_eq!(extract_lookback("近30日K线", Intent::KlineAnalysis), 30);
        assert_eq!(extract_lookback("最近2周", Intent::KlineAnalysis), 10);
        assert_eq!(extract_lookback("近3个月资金流", Intent::MoneyFlow), 66);
        assert_eq!(extract_lookback("K线", Intent::KlineAnalysis), 30);
        assert_eq!(extract_lookback("资金流向", Intent::MoneyFlow), 10);
        assert_eq!(extract_lookback("分时", Intent::IntradayAnalysis), 120);
    }

    #[test]
    fn test_date() {
        assert_eq!(extract_date("今日涨停"), TradeDate::Today);
        assert_eq!(extract_date("昨天的涨停"), TradeDate::Yesterday);
        assert_eq!(
            extract_date("2026-08-21涨停"),
            TradeDate::On(NaiveDate::from_ymd_opt(2026, 8, 21).unwrap())
        );
        assert_eq!(
            extract_date("20260821涨停"),
            TradeDate::On(NaiveDate::from_ymd_opt(2026, 8, 21).unwrap())
        );
        assert_eq!(extract_date("涨停统计"), TradeDate::Today);
    }

    #[test]
    fn test_six_digit_run_is_not_a_date() {
        // 600519 stays a symbol; the date defaults to today.
        assert_eq!(extract_date("600519K线"), TradeDate::Today);
        assert_eq!(extract_symbols("600519K线"), vec!["600519"]);
    }
}
