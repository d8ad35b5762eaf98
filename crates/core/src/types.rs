use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Asia::Shanghai;
use serde::{Deserialize, Serialize};

/// Query intent. Classification picks exactly one per query; the dispatcher
/// partitions them across handlers, so no two handlers share an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 大盘指数实时行情
    IndexRealtime,
    /// 个股/指数 K 线（日/周/月线）
    KlineAnalysis,
    /// 分时、盘口明细
    IntradayAnalysis,
    /// 涨停/跌停池统计
    LimitStats,
    /// 资金流向（个股/大盘/北向/板块）
    MoneyFlow,
    /// 基本面与估值
    Fundamental,
    /// 个股综合概览
    StockOverview,
    /// 行业/概念板块涨跌排名
    SectorAnalysis,
    /// 基金、ETF、可转债
    FundBond,
    /// 港股、美股指数
    HkUsMarket,
    /// 融资融券与龙虎榜
    MarginLhb,
    /// 股指期货与期权
    Derivatives,
    /// 无法识别的查询
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::IndexRealtime => "index_realtime",
            Intent::KlineAnalysis => "kline_analysis",
            Intent::IntradayAnalysis => "intraday_analysis",
            Intent::LimitStats => "limit_stats",
            Intent::MoneyFlow => "money_flow",
            Intent::Fundamental => "fundamental",
            Intent::StockOverview => "stock_overview",
            Intent::SectorAnalysis => "sector_analysis",
            Intent::FundBond => "fund_bond",
            Intent::HkUsMarket => "hk_us_market",
            Intent::MarginLhb => "margin_lhb",
            Intent::Derivatives => "derivatives",
            Intent::Unknown => "unknown",
        }
    }

    /// Chinese display label used in message titles.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::IndexRealtime => "大盘行情",
            Intent::KlineAnalysis => "K线分析",
            Intent::IntradayAnalysis => "分时行情",
            Intent::LimitStats => "涨跌停统计",
            Intent::MoneyFlow => "资金流向",
            Intent::Fundamental => "基本面",
            Intent::StockOverview => "个股综合",
            Intent::SectorAnalysis => "板块行情",
            Intent::FundBond => "基金债券",
            Intent::HkUsMarket => "港美股行情",
            Intent::MarginLhb => "两融龙虎榜",
            Intent::Derivatives => "衍生品行情",
            Intent::Unknown => "未识别",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Intent::IndexRealtime => "📈",
            Intent::KlineAnalysis => "🕯️",
            Intent::IntradayAnalysis => "⏱️",
            Intent::LimitStats => "🚦",
            Intent::MoneyFlow => "💰",
            Intent::Fundamental => "📊",
            Intent::StockOverview => "📌",
            Intent::SectorAnalysis => "🧩",
            Intent::FundBond => "🏛️",
            Intent::HkUsMarket => "🌍",
            Intent::MarginLhb => "🏦",
            Intent::Derivatives => "📉",
            Intent::Unknown => "❓",
        }
    }
}

/// Bar granularity for kline / minute-series requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    /// Minute bars; bucket is one of 1, 5, 15, 30, 60.
    Minute(u32),
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub fn label(&self) -> String {
        match self {
            Timeframe::Minute(n) => format!("{}分钟", n),
            Timeframe::Day => "日线".to_string(),
            Timeframe::Week => "周线".to_string(),
            Timeframe::Month => "月线".to_string(),
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Day
    }
}

/// Trade date a query refers to. Resolution happens against Beijing "now"
/// at fetch time, not at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDate {
    Today,
    Yesterday,
    On(NaiveDate),
}

impl TradeDate {
    pub fn resolve(&self) -> NaiveDate {
        match self {
            TradeDate::Today => beijing_today(),
            TradeDate::Yesterday => {
                let today = beijing_today();
                today.pred_opt().unwrap_or(today)
            }
            TradeDate::On(d) => *d,
        }
    }

    /// Compact `YYYYMMDD` form used in provider URLs and cache keys.
    pub fn yyyymmdd(&self) -> String {
        self.resolve().format("%Y%m%d").to_string()
    }
}

impl Default for TradeDate {
    fn default() -> Self {
        TradeDate::Today
    }
}

/// Structured request produced by the router. Built once per query and
/// immutable afterwards; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRequest {
    pub intent: Intent,
    /// Resolved instrument codes, deduplicated, insertion order preserved.
    /// Empty when the query names no resolvable instrument; the handler
    /// decides the default.
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    /// Number of bars / days of history to fetch. Always positive.
    pub lookback: u32,
    /// Row cap for ranking-style answers. Always positive.
    pub top_n: u32,
    pub date: TradeDate,
    /// Original query text, kept for clarification prompts and logs.
    pub raw: String,
}

impl ParsedRequest {
    pub fn primary_symbol(&self) -> Option<&str> {
        self.symbols.first().map(|s| s.as_str())
    }
}

/// Presentation-neutral outcome of one handler invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub ok: bool,
    pub title: String,
    /// Ordered content lines, already unit-labeled (亿/万/%).
    pub lines: Vec<String>,
    pub tip: Option<String>,
    pub error: Option<String>,
    /// True when any section of the answer came from an expired cache entry.
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn success(title: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            ok: true,
            title: title.into(),
            lines,
            tip: None,
            error: None,
            stale: false,
            fetched_at: Utc::now(),
        }
    }

    pub fn failure(title: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            title: title.into(),
            lines: Vec::new(),
            tip: None,
            error: Some(error.into()),
            stale: false,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = Some(tip.into());
        self
    }

    pub fn mark_stale(mut self, stale: bool) -> Self {
        self.stale = self.stale || stale;
        self
    }
}

/// Final chat output: 1..=`max_parts` ordered parts, each within the channel
/// character budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub parts: Vec<String>,
}

impl RenderedMessage {
    pub fn single(text: impl Into<String>) -> Self {
        Self { parts: vec![text.into()] }
    }
}

pub fn beijing_now() -> DateTime<chrono_tz::Tz> {
    Utc::now().with_timezone(&Shanghai)
}

pub fn beijing_today() -> NaiveDate {
    beijing_now().date_naive()
}

/// Seconds until the next Beijing midnight, floored at one minute so a
/// just-before-midnight write does not produce a throwaway TTL.
pub fn secs_until_beijing_midnight() -> u64 {
    let elapsed = beijing_now().num_seconds_from_midnight() as u64;
    (86_400_u64.saturating_sub(elapsed)).max(60)
}
