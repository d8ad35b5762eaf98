//! Intent handlers.
//!
//! One async fn per intent. A handler turns cached provider payloads into a
//! presentation-neutral [`ResultRecord`]; it never builds final chat text and
//! never returns an error. Upstream trouble becomes an `ok = false` record
//! carrying a user-facing message, and partially failed multi-fetch handlers
//! degrade to whatever sections succeeded.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use quotebot_core::fmt::{fmt_amount, fmt_date, fmt_md, fmt_pct, fmt_price};
use quotebot_core::{ParsedRequest, Result, ResultRecord, Timeframe};

use crate::cache::{CacheHit, QuoteCache, TtlClass};
use crate::provider::{to_secid, BoardKind, FlowScope, MarketProvider};
use crate::sina::{contract_label, MAIN_CONTRACTS};

/// Indexes quoted when a 大盘 query names none.
const DEFAULT_INDEXES: &[(&str, &str)] = &[
    ("上证指数", "1.000001"),
    ("深证成指", "0.399001"),
    ("创业板指", "0.399006"),
    ("沪深300", "1.000300"),
    ("上证50", "1.000016"),
];

const HK_INDEXES: &[(&str, &str)] = &[("恒生指数", "100.HSI"), ("恒生科技指数", "100.HSTECH")];

const US_INDEXES: &[(&str, &str)] = &[
    ("道琼斯", "100.DJIA"),
    ("纳斯达克", "100.NDX"),
    ("标普500", "100.SPX"),
];

/// Option queries fall back to the underlying ETFs until a chain feed lands.
const OPTION_UNDERLYINGS: &[(&str, &str)] = &[("上证50ETF", "1.510050"), ("沪深300ETF", "1.510300")];

pub(crate) struct HandlerContext {
    provider: Arc<dyn MarketProvider>,
    cache: Arc<QuoteCache>,
}

impl HandlerContext {
    pub(crate) fn new(provider: Arc<dyn MarketProvider>, cache: Arc<QuoteCache>) -> Self {
        Self { provider, cache }
    }

    /// Route a fetch through the cache under the class TTL. The future is
    /// built eagerly but only polled on a cache miss.
    async fn cached<Fut>(&self, key: String, class: TtlClass, fetch: Fut) -> Result<CacheHit>
    where
        Fut: Future<Output = Result<Value>>,
    {
        let ttl = self.cache.ttl(class);
        self.cache.get_or_fetch(&key, ttl, move || fetch).await
    }
}

// ── shared reducers ──

fn payload_name<'a>(payload: &'a Value, fallback: &'a str) -> &'a str {
    payload["name"]
        .as_str()
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
}

/// `1.600519` → `600519`, `100.HSI` → `HSI`.
fn display_code(secid: &str) -> &str {
    secid.rsplit('.').next().unwrap_or(secid)
}

/// `上证指数: 3245.67 +0.85%`, plus the raw change for sentiment math.
fn quote_line(payload: &Value, fallback_name: &str) -> Option<(String, f64)> {
    let price = payload["price"].as_f64()?;
    let chg = payload["change_percent"].as_f64().unwrap_or(0.0);
    let name = payload_name(payload, fallback_name);
    Some((
        format!("{}: {} {}", name, fmt_price(price), fmt_pct(chg)),
        chg,
    ))
}

fn net_direction(v: f64) -> (&'static str, f64) {
    if v >= 0.0 {
        ("净流入", v)
    } else {
        ("净流出", v.abs())
    }
}

fn flow_phrase(net: f64) -> String {
    let (dir, amt) = net_direction(net);
    format!("主力{} {}", dir, fmt_amount(amt))
}

fn buy_phrase(net: f64) -> String {
    if net >= 0.0 {
        format!("净买入 {}", fmt_amount(net))
    } else {
        format!("净卖出 {}", fmt_amount(net.abs()))
    }
}

/// One-line read of a set of index changes.
fn market_sentiment(changes: &[f64]) -> &'static str {
    if changes.is_empty() {
        return "震荡整理，资金观望为主";
    }
    let avg = changes.iter().sum::<f64>() / changes.len() as f64;
    let pos = changes.iter().filter(|c| **c > 0.0).count();
    let neg = changes.iter().filter(|c| **c < 0.0).count();
    let max = changes.iter().cloned().fold(f64::MIN, f64::max);
    let min = changes.iter().cloned().fold(f64::MAX, f64::min);
    if avg >= 0.8 && pos >= 4 {
        "整体偏强，风险偏好回升"
    } else if avg <= -0.8 && neg >= 4 {
        "整体偏弱，注意控制仓位"
    } else if max - min >= 1.0 && (2..=3).contains(&pos) {
        "板块分化明显，结构性行情"
    } else {
        "震荡整理，资金观望为主"
    }
}

/// Quote a batch of `(display name, secid)` pairs concurrently, tolerating
/// per-instrument failures. Returns lines, raw changes, stale flag, and the
/// first error for the all-failed case.
async fn quote_batch(
    ctx: &HandlerContext,
    targets: &[(String, String)],
) -> (Vec<String>, Vec<f64>, bool, Option<String>) {
    let fetches = targets.iter().map(|(_, secid)| {
        ctx.cached(
            format!("quote:{}", secid),
            TtlClass::Realtime,
            ctx.provider.quote(secid),
        )
    });
    let results = join_all(fetches).await;

    let mut lines = Vec::new();
    let mut changes = Vec::new();
    let mut stale = false;
    let mut first_err = None;
    for ((fallback, secid), result) in targets.iter().zip(results) {
        match result {
            Ok(hit) => {
                stale |= hit.is_stale();
                let payload = hit.into_payload();
                if let Some((line, chg)) = quote_line(&payload, fallback) {
                    lines.push(line);
                    changes.push(chg);
                }
            }
            Err(err) => {
                debug!(secid = %secid, error = %err, "quote skipped");
                if first_err.is_none() {
                    first_err = Some(err.to_string());
                }
            }
        }
    }
    (lines, changes, stale, first_err)
}

fn bars_of(payload: &Value) -> Vec<&Value> {
    payload["bars"]
        .as_array()
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

fn items_of(payload: &Value) -> Vec<&Value> {
    payload["items"]
        .as_array()
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

/// `2026-08-21 14:55` → `14:55`.
fn hhmm(date: &str) -> &str {
    date.split(' ').nth(1).unwrap_or(date)
}

// ── handlers ──

pub(crate) async fn index_realtime(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let targets: Vec<(String, String)> = if req.symbols.is_empty() {
        DEFAULT_INDEXES
            .iter()
            .map(|(n, s)| (n.to_string(), s.to_string()))
            .collect()
    } else {
        req.symbols
            .iter()
            .map(|s| (s.clone(), to_secid(s)))
            .collect()
    };
    let (lines, changes, stale, first_err) = quote_batch(ctx, &targets).await;
    if lines.is_empty() {
        return ResultRecord::failure(
            "大盘行情",
            first_err.unwrap_or_else(|| "暂无指数行情数据".to_string()),
        );
    }
    ResultRecord::success("大盘行情", lines)
        .with_tip(market_sentiment(&changes))
        .mark_stale(stale)
}

pub(crate) async fn kline_analysis(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let symbol = req.primary_symbol().unwrap_or("000001");
    let secid = to_secid(symbol);
    let klt = match req.timeframe {
        Timeframe::Minute(m) => m,
        Timeframe::Day => 101,
        Timeframe::Week => 102,
        Timeframe::Month => 103,
    };
    let end = req.date.yyyymmdd();
    let key = format!("kline:{}:{}:{}:{}", secid, klt, req.lookback, end);
    let hit = match ctx
        .cached(
            key,
            TtlClass::Ranking,
            ctx.provider.kline(&secid, klt, req.lookback, &end),
        )
        .await
    {
        Ok(hit) => hit,
        Err(err) => return ResultRecord::failure("K线分析", err.to_string()),
    };
    let stale = hit.is_stale();
    let payload = hit.into_payload();
    let name = payload_name(&payload, display_code(&secid)).to_string();
    let bars = bars_of(&payload);
    if bars.is_empty() {
        return ResultRecord::failure("K线分析", format!("{} 暂无K线数据", name));
    }

    let title = match req.timeframe {
        Timeframe::Minute(m) => format!("{}({}) {}分钟K线", name, display_code(&secid), m),
        Timeframe::Day => format!("{}({}) 近{}日K线", name, display_code(&secid), bars.len()),
        Timeframe::Week => format!("{}({}) 近{}周K线", name, display_code(&secid), bars.len()),
        Timeframe::Month => format!("{}({}) 近{}月K线", name, display_code(&secid), bars.len()),
    };

    let mut lines = Vec::new();
    let tail = bars.len().saturating_sub(5);
    for bar in &bars[tail..] {
        lines.push(format!(
            "📅 {}: 开 {} 收 {} ({})",
            fmt_md(bar["date"].as_str().unwrap_or("")),
            fmt_price(bar["open"].as_f64().unwrap_or(0.0)),
            fmt_price(bar["close"].as_f64().unwrap_or(0.0)),
            fmt_pct(bar["change_percent"].as_f64().unwrap_or(0.0)),
        ));
    }
    let first_open = bars.first().and_then(|b| b["open"].as_f64()).unwrap_or(0.0);
    let last_close = bars.last().and_then(|b| b["close"].as_f64()).unwrap_or(0.0);
    let high = bars
        .iter()
        .filter_map(|b| b["high"].as_f64())
        .fold(f64::MIN, f64::max);
    let low = bars
        .iter()
        .filter_map(|b| b["low"].as_f64())
        .fold(f64::MAX, f64::min);
    if first_open > 0.0 && high > f64::MIN && low < f64::MAX {
        lines.push(format!(
            "区间{}根: 涨跌 {} | 最高 {} | 最低 {}",
            bars.len(),
            fmt_pct((last_close / first_open - 1.0) * 100.0),
            fmt_price(high),
            fmt_price(low),
        ));
    }
    ResultRecord::success(title, lines).mark_stale(stale)
}

pub(crate) async fn intraday_analysis(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let Some(symbol) = req.primary_symbol() else {
        return ResultRecord::failure("分时行情", "请提供股票代码或名称，如：600519分时");
    };
    let secid = to_secid(symbol);
    let bucket = match req.timeframe {
        Timeframe::Minute(m) => m,
        _ => 1,
    };
    let key = format!("minute:{}:{}:{}", secid, bucket, req.lookback);
    let hit = match ctx
        .cached(
            key,
            TtlClass::Realtime,
            ctx.provider.minute_series(&secid, bucket, req.lookback),
        )
        .await
    {
        Ok(hit) => hit,
        Err(err) => return ResultRecord::failure("分时行情", err.to_string()),
    };
    let stale = hit.is_stale();
    let payload = hit.into_payload();
    let name = payload_name(&payload, display_code(&secid)).to_string();
    let bars = bars_of(&payload);
    let Some(latest) = bars.last() else {
        return ResultRecord::failure("分时行情", format!("{} 暂无分时数据", name));
    };

    let high = bars
        .iter()
        .filter_map(|b| b["high"].as_f64())
        .fold(f64::MIN, f64::max);
    let low = bars
        .iter()
        .filter_map(|b| b["low"].as_f64())
        .fold(f64::MAX, f64::min);
    let mut lines = vec![format!(
        "最新 {} | 价 {} | 高 {} | 低 {}",
        hhmm(latest["date"].as_str().unwrap_or("")),
        fmt_price(latest["close"].as_f64().unwrap_or(0.0)),
        fmt_price(if high > f64::MIN { high } else { 0.0 }),
        fmt_price(if low < f64::MAX { low } else { 0.0 }),
    )];
    let tail = bars.len().saturating_sub(5);
    for bar in &bars[tail..] {
        lines.push(format!(
            "- {}: {} 量 {}",
            hhmm(bar["date"].as_str().unwrap_or("")),
            fmt_price(bar["close"].as_f64().unwrap_or(0.0)),
            bar["volume"].as_f64().unwrap_or(0.0) as i64,
        ));
    }
    let amount: f64 = bars.iter().filter_map(|b| b["amount"].as_f64()).sum();
    if amount > 0.0 {
        lines.push(format!("区间成交 {}", fmt_amount(amount)));
    }
    let title = if bucket == 1 {
        format!("{}({}) 分时走势", name, display_code(&secid))
    } else {
        format!("{}({}) {}分钟走势", name, display_code(&secid), bucket)
    };
    ResultRecord::success(title, lines).mark_stale(stale)
}

pub(crate) async fn limit_stats(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let date = req.date.yyyymmdd();
    let title = format!("涨跌停统计 · {}", fmt_date(&date));
    let key = format!("limit:{}", date);
    let hit = match ctx
        .cached(key, TtlClass::Realtime, ctx.provider.limit_pool(&date))
        .await
    {
        Ok(hit) => hit,
        Err(err) => return ResultRecord::failure(title, err.to_string()),
    };
    let stale = hit.is_stale();
    let payload = hit.into_payload();
    let up_count = payload["up_count"].as_u64().unwrap_or(0);
    let down_count = payload["down_count"].as_u64().unwrap_or(0);

    let mut ups: Vec<&Value> = payload["up_items"]
        .as_array()
        .map(|a| a.iter().collect())
        .unwrap_or_default();
    // 连板数 first, turnover breaks ties.
    ups.sort_by(|a, b| {
        let streak = b["streak"]
            .as_u64()
            .unwrap_or(0)
            .cmp(&a["streak"].as_u64().unwrap_or(0));
        streak.then_with(|| {
            b["amount"]
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&a["amount"].as_f64().unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    let mut lines = vec![format!("涨停: {} 家 | 跌停: {} 家", up_count, down_count)];
    if ups.is_empty() {
        lines.push("今日暂无涨停个股".to_string());
    } else {
        for (i, it) in ups.iter().take(req.top_n as usize).enumerate() {
            lines.push(format!(
                "{}. {}({}) {}连板 成交 {}",
                i + 1,
                it["name"].as_str().unwrap_or(""),
                it["code"].as_str().unwrap_or(""),
                it["streak"].as_u64().unwrap_or(1),
                fmt_amount(it["amount"].as_f64().unwrap_or(0.0)),
            ));
        }
    }
    ResultRecord::success(title, lines).mark_stale(stale)
}

enum FlowKind {
    North,
    Market,
    Sector,
    Stock,
}

fn detect_flow_kind(raw: &str) -> FlowKind {
    if raw.contains("北向") || raw.contains("南向") {
        FlowKind::North
    } else if raw.contains("大盘") || raw.contains("两市") || raw.contains("市场资金") {
        FlowKind::Market
    } else if raw.contains("板块") || raw.contains("行业") || raw.contains("概念") {
        FlowKind::Sector
    } else {
        FlowKind::Stock
    }
}

pub(crate) async fn money_flow(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    match detect_flow_kind(&req.raw) {
        FlowKind::North => {
            let hit = match ctx
                .cached(
                    "flow:north".to_string(),
                    TtlClass::Realtime,
                    ctx.provider.capital_flow(FlowScope::North, 1),
                )
                .await
            {
                Ok(hit) => hit,
                Err(err) => return ResultRecord::failure("沪深港通资金", err.to_string()),
            };
            let stale = hit.is_stale();
            let payload = hit.into_payload();
            let mut lines = Vec::new();
            // kamt units are 万元.
            match payload.get("north").filter(|v| !v.is_null()) {
                Some(n) => {
                    let (dir, amt) = net_direction(n["total_net"].as_f64().unwrap_or(0.0) * 1e4);
                    lines.push(format!("北向资金: {} {}", dir, fmt_amount(amt)));
                    lines.push(format!(
                        "沪股通 {} | 深股通 {}",
                        fmt_amount(n["first_net"].as_f64().unwrap_or(0.0) * 1e4),
                        fmt_amount(n["second_net"].as_f64().unwrap_or(0.0) * 1e4),
                    ));
                }
                None => lines.push("北向资金: 盘中数据暂停披露".to_string()),
            }
            if let Some(s) = payload.get("south").filter(|v| !v.is_null()) {
                let (dir, amt) = net_direction(s["total_net"].as_f64().unwrap_or(0.0) * 1e4);
                lines.push(format!("南向资金: {} {}", dir, fmt_amount(amt)));
            }
            ResultRecord::success("沪深港通资金", lines).mark_stale(stale)
        }
        FlowKind::Market => {
            let key = format!("flow:market:{}", req.lookback);
            let hit = match ctx
                .cached(
                    key,
                    TtlClass::Realtime,
                    ctx.provider.capital_flow(FlowScope::Market, req.lookback),
                )
                .await
            {
                Ok(hit) => hit,
                Err(err) => return ResultRecord::failure("大盘资金流向", err.to_string()),
            };
            let stale = hit.is_stale();
            let payload = hit.into_payload();
            let items = items_of(&payload);
            if items.is_empty() {
                return ResultRecord::failure("大盘资金流向", "暂无大盘资金流数据");
            }
            let lines = flow_series_lines(&items, req.lookback as usize);
            ResultRecord::success("大盘资金流向", lines).mark_stale(stale)
        }
        FlowKind::Sector => {
            let key = format!("flow:sector:{}", req.top_n);
            let hit = match ctx
                .cached(
                    key,
                    TtlClass::Realtime,
                    ctx.provider.capital_flow(FlowScope::Sector, req.top_n),
                )
                .await
            {
                Ok(hit) => hit,
                Err(err) => return ResultRecord::failure("板块资金流向", err.to_string()),
            };
            let stale = hit.is_stale();
            let payload = hit.into_payload();
            let items = items_of(&payload);
            if items.is_empty() {
                return ResultRecord::failure("板块资金流向", "暂无板块资金流数据");
            }
            let lines: Vec<String> = items
                .iter()
                .take(req.top_n as usize)
                .map(|it| {
                    format!(
                        "{}: {} ({})",
                        it["name"].as_str().unwrap_or(""),
                        flow_phrase(it["main_net"].as_f64().unwrap_or(0.0)),
                        fmt_pct(it["change_percent"].as_f64().unwrap_or(0.0)),
                    )
                })
                .collect();
            ResultRecord::success("板块资金流向", lines).mark_stale(stale)
        }
        FlowKind::Stock => {
            let Some(symbol) = req.primary_symbol() else {
                return ResultRecord::failure(
                    "资金流向",
                    "请输入股票代码或名称，如：茅台资金流向、600519资金流",
                );
            };
            let secid = to_secid(symbol);
            let key = format!("flow:stock:{}:{}", secid, req.lookback);
            let hit = match ctx
                .cached(
                    key,
                    TtlClass::Realtime,
                    ctx.provider
                        .capital_flow(FlowScope::Stock(&secid), req.lookback),
                )
                .await
            {
                Ok(hit) => hit,
                Err(err) => return ResultRecord::failure("资金流向", err.to_string()),
            };
            let stale = hit.is_stale();
            let payload = hit.into_payload();
            let name = payload_name(&payload, display_code(&secid)).to_string();
            let items = items_of(&payload);
            if items.is_empty() {
                return ResultRecord::failure("资金流向", format!("{} 暂无资金流数据", name));
            }
            let title = format!("{}({}) 资金流向", name, display_code(&secid));
            let lines = flow_series_lines(&items, req.lookback as usize);
            ResultRecord::success(title, lines).mark_stale(stale)
        }
    }
}

/// Daily flow rows arrive oldest first; render a running total then the
/// latest days newest first.
fn flow_series_lines(items: &[&Value], lookback: usize) -> Vec<String> {
    let total: f64 = items.iter().filter_map(|it| it["main_net"].as_f64()).sum();
    let mut lines = vec![format!("近{}日{}", items.len(), flow_phrase(total))];
    for it in items.iter().rev().take(lookback) {
        lines.push(format!(
            "- {}: {} ({:.1}%)",
            fmt_md(it["date"].as_str().unwrap_or("")),
            flow_phrase(it["main_net"].as_f64().unwrap_or(0.0)),
            it["main_pct"].as_f64().unwrap_or(0.0),
        ));
    }
    lines
}

pub(crate) async fn fundamental(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let Some(symbol) = req.primary_symbol() else {
        return ResultRecord::failure("基本面", "请输入股票代码或名称，如：茅台基本面");
    };
    let secid = to_secid(symbol);
    let key = format!("fund:{}", secid);
    let hit = match ctx
        .cached(key, TtlClass::Daily, ctx.provider.fundamentals(&secid))
        .await
    {
        Ok(hit) => hit,
        Err(err) => return ResultRecord::failure("基本面", err.to_string()),
    };
    let stale = hit.is_stale();
    let payload = hit.into_payload();
    let name = payload_name(&payload, display_code(&secid)).to_string();

    let mut lines = Vec::new();
    if let Some(price) = payload["price"].as_f64() {
        lines.push(format!(
            "现价: {} ({})",
            fmt_price(price),
            fmt_pct(payload["change_percent"].as_f64().unwrap_or(0.0)),
        ));
    }
    if let Some(pe) = payload["pe_ratio"].as_f64() {
        lines.push(format!("市盈率(动): {:.2}", pe));
    }
    if let Some(pb) = payload["pb_ratio"].as_f64() {
        lines.push(format!("市净率: {:.2}", pb));
    }
    if let Some(cap) = payload["total_market_cap"].as_f64() {
        lines.push(format!("总市值: {}", fmt_amount(cap)));
    }
    if let Some(cap) = payload["float_market_cap"].as_f64() {
        lines.push(format!("流通市值: {}", fmt_amount(cap)));
    }
    if let Some(turnover) = payload["turnover_rate"].as_f64() {
        lines.push(format!("换手率: {:.2}%", turnover));
    }
    if lines.is_empty() {
        return ResultRecord::failure("基本面", format!("{} 暂无基本面数据", name));
    }
    let title = format!("{}({}) 基本面", name, display_code(&secid));
    ResultRecord::success(title, lines).mark_stale(stale)
}

pub(crate) async fn stock_overview(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let Some(symbol) = req.primary_symbol() else {
        return ResultRecord::failure("个股综合", "请输入股票代码或名称，如：茅台怎么样");
    };
    let secid = to_secid(symbol);
    let (quote_res, value_res, flow_res) = tokio::join!(
        ctx.cached(
            format!("quote:{}", secid),
            TtlClass::Realtime,
            ctx.provider.quote(&secid),
        ),
        ctx.cached(
            format!("fund:{}", secid),
            TtlClass::Daily,
            ctx.provider.fundamentals(&secid),
        ),
        ctx.cached(
            format!("flow:stock:{}:5", secid),
            TtlClass::Realtime,
            ctx.provider.capital_flow(FlowScope::Stock(&secid), 5),
        ),
    );

    let mut lines = Vec::new();
    let mut stale = false;
    let mut name = display_code(&secid).to_string();
    let mut first_err = None;
    let note_err = |err: quotebot_core::Error, first_err: &mut Option<String>| {
        debug!(secid = %secid, error = %err, "overview section skipped");
        if first_err.is_none() {
            *first_err = Some(err.to_string());
        }
    };

    match quote_res {
        Ok(hit) => {
            stale |= hit.is_stale();
            let payload = hit.into_payload();
            name = payload_name(&payload, &name).to_string();
            if let Some(price) = payload["price"].as_f64() {
                lines.push(format!(
                    "现价: {} {:+.2} ({})",
                    fmt_price(price),
                    payload["change"].as_f64().unwrap_or(0.0),
                    fmt_pct(payload["change_percent"].as_f64().unwrap_or(0.0)),
                ));
            }
            if let (Some(open), Some(high), Some(low)) = (
                payload["open"].as_f64(),
                payload["high"].as_f64(),
                payload["low"].as_f64(),
            ) {
                lines.push(format!(
                    "今开 {} | 最高 {} | 最低 {}",
                    fmt_price(open),
                    fmt_price(high),
                    fmt_price(low),
                ));
            }
            if let Some(amount) = payload["amount"].as_f64() {
                let mut line = format!("成交额 {}", fmt_amount(amount));
                if let Some(turnover) = payload["turnover_rate"].as_f64() {
                    line.push_str(&format!(" | 换手率 {:.2}%", turnover));
                }
                lines.push(line);
            }
        }
        Err(err) => note_err(err, &mut first_err),
    }

    match value_res {
        Ok(hit) => {
            stale |= hit.is_stale();
            let payload = hit.into_payload();
            let mut parts = Vec::new();
            if let Some(pe) = payload["pe_ratio"].as_f64() {
                parts.push(format!("PE {:.2}", pe));
            }
            if let Some(pb) = payload["pb_ratio"].as_f64() {
                parts.push(format!("PB {:.2}", pb));
            }
            if let Some(cap) = payload["total_market_cap"].as_f64() {
                parts.push(format!("总市值 {}", fmt_amount(cap)));
            }
            if !parts.is_empty() {
                lines.push(format!("估值: {}", parts.join(" | ")));
            }
        }
        Err(err) => note_err(err, &mut first_err),
    }

    match flow_res {
        Ok(hit) => {
            stale |= hit.is_stale();
            let payload = hit.into_payload();
            let items = items_of(&payload);
            if !items.is_empty() {
                let total: f64 = items.iter().filter_map(|it| it["main_net"].as_f64()).sum();
                lines.push(format!("近{}日{}", items.len(), flow_phrase(total)));
                if let Some(latest) = items.last() {
                    lines.push(format!(
                        "- {}: {} ({:.1}%)",
                        fmt_md(latest["date"].as_str().unwrap_or("")),
                        flow_phrase(latest["main_net"].as_f64().unwrap_or(0.0)),
                        latest["main_pct"].as_f64().unwrap_or(0.0),
                    ));
                }
            }
        }
        Err(err) => note_err(err, &mut first_err),
    }

    let title = format!("{}({}) 综合概览", name, display_code(&secid));
    if lines.is_empty() {
        return ResultRecord::failure(
            title,
            first_err.unwrap_or_else(|| "暂无个股数据".to_string()),
        );
    }
    ResultRecord::success(title, lines).mark_stale(stale)
}

pub(crate) async fn sector_analysis(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let kind = if req.raw.contains("概念") || req.raw.contains("题材") {
        BoardKind::Concept
    } else {
        BoardKind::Industry
    };
    let tag = match kind {
        BoardKind::Industry => "industry",
        BoardKind::Concept => "concept",
    };
    let title = format!("{}行情", kind.label());
    let n = req.top_n;
    let (gain_res, drop_res) = tokio::join!(
        ctx.cached(
            format!("sector:{}:top:{}", tag, n),
            TtlClass::Ranking,
            ctx.provider.sector_rank(kind, false, n),
        ),
        ctx.cached(
            format!("sector:{}:bottom:{}", tag, n),
            TtlClass::Ranking,
            ctx.provider.sector_rank(kind, true, n),
        ),
    );

    let mut lines = Vec::new();
    let mut stale = false;
    let mut first_err = None;
    let mut section = |header: &str, res: Result<CacheHit>, with_leader: bool| {
        match res {
            Ok(hit) => {
                stale |= hit.is_stale();
                let payload = hit.into_payload();
                let items = items_of(&payload);
                if items.is_empty() {
                    return;
                }
                lines.push(header.to_string());
                for it in items.iter().take(n as usize) {
                    let mut line = format!(
                        "{}: {}",
                        it["name"].as_str().unwrap_or(""),
                        fmt_pct(it["change_percent"].as_f64().unwrap_or(0.0)),
                    );
                    if with_leader {
                        if let Some(leader) = it["leader"].as_str().filter(|s| !s.is_empty()) {
                            line.push_str(&format!(" 领涨 {}", leader));
                        }
                    }
                    lines.push(line);
                }
            }
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err.to_string());
                }
            }
        }
    };
    section("涨幅居前:", gain_res, true);
    section("跌幅居前:", drop_res, false);

    if lines.is_empty() {
        return ResultRecord::failure(
            title,
            first_err.unwrap_or_else(|| "暂无板块行情数据".to_string()),
        );
    }
    ResultRecord::success(title, lines).mark_stale(stale)
}

pub(crate) async fn fund_bond(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    if req.raw.contains("债") {
        let key = format!("bond:{}", req.top_n);
        let hit = match ctx
            .cached(key, TtlClass::Ranking, ctx.provider.bond_rank(req.top_n))
            .await
        {
            Ok(hit) => hit,
            Err(err) => return ResultRecord::failure("可转债行情", err.to_string()),
        };
        let stale = hit.is_stale();
        let payload = hit.into_payload();
        let items = items_of(&payload);
        if items.is_empty() {
            return ResultRecord::failure("可转债行情", "暂无可转债行情数据");
        }
        let lines: Vec<String> = items
            .iter()
            .take(req.top_n as usize)
            .enumerate()
            .map(|(i, it)| {
                let mut line = format!(
                    "{}. {} {} {}",
                    i + 1,
                    it["name"].as_str().unwrap_or(""),
                    fmt_price(it["price"].as_f64().unwrap_or(0.0)),
                    fmt_pct(it["change_percent"].as_f64().unwrap_or(0.0)),
                );
                if let Some(stock) = it["stock_name"].as_str().filter(|s| !s.is_empty()) {
                    line.push_str(&format!(" | 正股 {}", stock));
                }
                line
            })
            .collect();
        return ResultRecord::success("可转债行情", lines).mark_stale(stale);
    }

    // Fund branch: quote the named ETF, 创业板ETF by default.
    let symbol = req.primary_symbol().unwrap_or("159915");
    let secid = to_secid(symbol);
    let hit = match ctx
        .cached(
            format!("quote:{}", secid),
            TtlClass::Ranking,
            ctx.provider.quote(&secid),
        )
        .await
    {
        Ok(hit) => hit,
        Err(err) => return ResultRecord::failure("基金行情", err.to_string()),
    };
    let stale = hit.is_stale();
    let payload = hit.into_payload();
    let name = payload_name(&payload, display_code(&secid)).to_string();
    let mut lines = Vec::new();
    if let Some(price) = payload["price"].as_f64() {
        lines.push(format!(
            "现价: {} ({})",
            fmt_price(price),
            fmt_pct(payload["change_percent"].as_f64().unwrap_or(0.0)),
        ));
    }
    if let (Some(open), Some(high), Some(low)) = (
        payload["open"].as_f64(),
        payload["high"].as_f64(),
        payload["low"].as_f64(),
    ) {
        lines.push(format!(
            "今开 {} | 最高 {} | 最低 {}",
            fmt_price(open),
            fmt_price(high),
            fmt_price(low),
        ));
    }
    if let Some(amount) = payload["amount"].as_f64() {
        lines.push(format!("成交额 {}", fmt_amount(amount)));
    }
    if lines.is_empty() {
        return ResultRecord::failure("基金行情", format!("{} 暂无行情数据", name));
    }
    let title = format!("{}({}) 行情", name, display_code(&secid));
    ResultRecord::success(title, lines).mark_stale(stale)
}

pub(crate) async fn hk_us_market(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    let us = ["美股", "纳斯达克", "纳指", "道琼斯", "道指", "标普"]
        .iter()
        .any(|k| req.raw.contains(k));
    let targets: Vec<(String, String)> = if !req.symbols.is_empty() {
        req.symbols
            .iter()
            .map(|s| (s.clone(), to_secid(s)))
            .collect()
    } else if us {
        US_INDEXES
            .iter()
            .map(|(n, s)| (n.to_string(), s.to_string()))
            .collect()
    } else {
        HK_INDEXES
            .iter()
            .map(|(n, s)| (n.to_string(), s.to_string()))
            .collect()
    };
    let title = if us {
        "美股行情"
    } else if req.symbols.is_empty() {
        "港股行情"
    } else {
        "港美股行情"
    };
    let (lines, _, stale, first_err) = quote_batch(ctx, &targets).await;
    if lines.is_empty() {
        return ResultRecord::failure(
            title,
            first_err.unwrap_or_else(|| "暂无行情数据".to_string()),
        );
    }
    ResultRecord::success(title, lines).mark_stale(stale)
}

pub(crate) async fn margin_lhb(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    if req.raw.contains("龙虎榜") {
        let key = format!("lhb:{}", req.top_n);
        let hit = match ctx
            .cached(key, TtlClass::Daily, ctx.provider.dragon_tiger(req.top_n))
            .await
        {
            Ok(hit) => hit,
            Err(err) => return ResultRecord::failure("龙虎榜", err.to_string()),
        };
        let stale = hit.is_stale();
        let payload = hit.into_payload();
        let items = items_of(&payload);
        if items.is_empty() {
            return ResultRecord::failure("龙虎榜", "暂无龙虎榜数据");
        }
        let title = match items.first().and_then(|it| it["date"].as_str()) {
            Some(date) if !date.is_empty() => format!("龙虎榜 · {}", date),
            _ => "龙虎榜".to_string(),
        };
        let lines: Vec<String> = items
            .iter()
            .take(req.top_n as usize)
            .map(|it| {
                format!(
                    "{}({}) {} {}",
                    it["name"].as_str().unwrap_or(""),
                    it["code"].as_str().unwrap_or(""),
                    fmt_pct(it["change_percent"].as_f64().unwrap_or(0.0)),
                    buy_phrase(it["net_buy"].as_f64().unwrap_or(0.0)),
                )
            })
            .collect();
        return ResultRecord::success(title, lines).mark_stale(stale);
    }

    let key = format!("margin:{}", req.lookback);
    let hit = match ctx
        .cached(key, TtlClass::Daily, ctx.provider.margin_summary(req.lookback))
        .await
    {
        Ok(hit) => hit,
        Err(err) => return ResultRecord::failure("两融余额", err.to_string()),
    };
    let stale = hit.is_stale();
    let payload = hit.into_payload();
    let items = items_of(&payload);
    if items.is_empty() {
        return ResultRecord::failure("两融余额", "暂无两融数据");
    }
    // Datacenter rows are newest first.
    let lines: Vec<String> = items
        .iter()
        .take(req.lookback as usize)
        .map(|it| {
            format!(
                "- {}: 两融余额 {}",
                fmt_md(it["date"].as_str().unwrap_or("")),
                fmt_amount(it["total"].as_f64().unwrap_or(0.0)),
            )
        })
        .collect();
    let mut record = ResultRecord::success("两融余额", lines).mark_stale(stale);
    if let (Some(latest), Some(prev)) = (
        items.first().and_then(|it| it["total"].as_f64()),
        items.get(1).and_then(|it| it["total"].as_f64()),
    ) {
        let delta = latest - prev;
        let word = if delta >= 0.0 { "增加" } else { "减少" };
        record = record.with_tip(format!("较前一交易日{} {}", word, fmt_amount(delta.abs())));
    }
    record
}

static CONTRACT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(i[fhcm])(\d{1,4})").unwrap());

/// Contract codes named in the query, or the four main contracts.
fn extract_contracts(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let push_unique = |s: String, out: &mut Vec<String>| {
        if !out.iter().any(|x| x == &s) {
            out.push(s);
        }
    };
    for (kw, sym) in [
        ("沪深300", "IF0"),
        ("上证50", "IH0"),
        ("中证500", "IC0"),
        ("中证1000", "IM0"),
    ] {
        if raw.contains(kw) {
            push_unique(sym.to_string(), &mut out);
        }
    }
    for caps in CONTRACT_RE.captures_iter(raw) {
        let Some(m) = caps.get(0) else { continue };
        // ASCII neighbors would make this part of a longer token.
        let before = raw[..m.start()].chars().next_back();
        let after = raw[m.end()..].chars().next();
        if before.is_some_and(|c| c.is_ascii_alphanumeric()) {
            continue;
        }
        if after.is_some_and(|c| c.is_ascii_alphanumeric()) {
            continue;
        }
        push_unique(format!("{}{}", caps[1].to_uppercase(), &caps[2]), &mut out);
    }
    if out.is_empty() {
        MAIN_CONTRACTS.iter().map(|(s, _)| s.to_string()).collect()
    } else {
        out
    }
}

pub(crate) async fn derivatives(ctx: &HandlerContext, req: &ParsedRequest) -> ResultRecord {
    if req.raw.contains("期权") {
        let targets: Vec<(String, String)> = OPTION_UNDERLYINGS
            .iter()
            .map(|(n, s)| (n.to_string(), s.to_string()))
            .collect();
        let (lines, _, stale, first_err) = quote_batch(ctx, &targets).await;
        if lines.is_empty() {
            return ResultRecord::failure(
                "ETF期权标的",
                first_err.unwrap_or_else(|| "暂无行情数据".to_string()),
            );
        }
        return ResultRecord::success("ETF期权标的", lines)
            .with_tip("期权链行情暂未接入，先看标的ETF走势")
            .mark_stale(stale);
    }

    let contracts = extract_contracts(&req.raw);
    let limit = req.lookback.max(2);
    let fetches = contracts.iter().map(|sym| {
        ctx.cached(
            format!("futures:{}:{}", sym, limit),
            TtlClass::Realtime,
            ctx.provider.futures_daily(sym, limit),
        )
    });
    let results = join_all(fetches).await;

    let mut lines = Vec::new();
    let mut stale = false;
    let mut first_err = None;
    for (sym, result) in contracts.iter().zip(results) {
        match result {
            Ok(hit) => {
                stale |= hit.is_stale();
                let payload = hit.into_payload();
                let bars = bars_of(&payload);
                let Some(last) = bars.last().and_then(|b| b["close"].as_f64()) else {
                    continue;
                };
                let name = payload["name"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| contract_label(sym));
                let prev = bars
                    .len()
                    .checked_sub(2)
                    .and_then(|i| bars.get(i))
                    .and_then(|b| b["close"].as_f64());
                match prev {
                    Some(prev) if prev > 0.0 => lines.push(format!(
                        "{}({}): {} {}",
                        name,
                        sym,
                        fmt_price(last),
                        fmt_pct((last / prev - 1.0) * 100.0),
                    )),
                    _ => lines.push(format!("{}({}): {}", name, sym, fmt_price(last))),
                }
            }
            Err(err) => {
                debug!(contract = %sym, error = %err, "futures quote skipped");
                if first_err.is_none() {
                    first_err = Some(err.to_string());
                }
            }
        }
    }
    if lines.is_empty() {
        return ResultRecord::failure(
            "股指期货",
            first_err.unwrap_or_else(|| "暂无期货行情数据".to_string()),
        );
    }
    ResultRecord::success("股指期货", lines).mark_stale(stale)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use quotebot_core::{CacheConfig, Error, Intent, TradeDate};

    use super::*;

    #[derive(Default)]
    struct FakeProvider {
        fail_quotes: bool,
        fail_secids: HashSet<String>,
        fail_flow: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn record(&self, tag: String) {
            self.calls.lock().unwrap().push(tag);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    fn index_name(secid: &str) -> &'static str {
        match secid {
            "1.000001" => "上证指数",
            "0.399001" => "深证成指",
            "0.399006" => "创业板指",
            "1.000300" => "沪深300",
            "1.000016" => "上证50",
            "100.HSI" => "恒生指数",
            "1.510050" => "上证50ETF",
            "1.510300" => "沪深300ETF",
            "0.159915" => "创业板ETF",
            "1.600519" => "贵州茅台",
            _ => "测试标的",
        }
    }

    #[async_trait]
    impl MarketProvider for FakeProvider {
        async fn quote(&self, secid: &str) -> Result<Value> {
            self.record(format!("quote:{}", secid));
            if self.fail_quotes || self.fail_secids.contains(secid) {
                return Err(Error::Provider(format!("东方财富 {} unavailable", secid)));
            }
            Ok(json!({
                "secid": secid,
                "name": index_name(secid),
                "price": 3245.67,
                "change": 27.40,
                "change_percent": 1.2,
                "open": 3230.00,
                "high": 3260.00,
                "low": 3221.00,
                "amount": 4.89e9,
                "turnover_rate": 0.26,
                "pe_ratio": 28.51,
                "pb_ratio": 8.20,
                "total_market_cap": 1.92e12,
                "float_market_cap": 1.92e12,
            }))
        }

        async fn fundamentals(&self, secid: &str) -> Result<Value> {
            self.record(format!("fundamentals:{}", secid));
            self.quote(secid).await
        }

        async fn kline(&self, secid: &str, klt: u32, limit: u32, _end: &str) -> Result<Value> {
            self.record(format!("kline:{}:{}", secid, klt));
            let n = limit.min(28) as usize;
            let bars: Vec<Value> = (1..=n)
                .map(|i| {
                    json!({
                        "date": format!("2026-08-{:02}", i),
                        "open": 1500.0 + i as f64,
                        "close": 1501.0 + i as f64,
                        "high": 1505.0 + i as f64,
                        "low": 1495.0 + i as f64,
                        "volume": 32000.0,
                        "amount": 4.89e9,
                        "change_percent": 0.66,
                    })
                })
                .collect();
            Ok(json!({
                "secid": secid,
                "name": index_name(secid),
                "klt": klt,
                "count": bars.len(),
                "bars": bars,
            }))
        }

        async fn minute_series(&self, secid: &str, bucket: u32, limit: u32) -> Result<Value> {
            self.record(format!("minute:{}:{}", secid, bucket));
            let n = limit.min(10) as usize;
            let bars: Vec<Value> = (0..n)
                .map(|i| {
                    json!({
                        "date": format!("2026-08-21 14:{:02}", 30 + i),
                        "open": 1528.0,
                        "close": 1528.0 + i as f64,
                        "high": 1541.0,
                        "low": 1512.0,
                        "volume": 3200.0,
                        "amount": 1.2e8,
                    })
                })
                .collect();
            Ok(json!({
                "secid": secid,
                "name": index_name(secid),
                "bars": bars,
            }))
        }

        async fn limit_pool(&self, date: &str) -> Result<Value> {
            self.record(format!("limit:{}", date));
            Ok(json!({
                "date": date,
                "up_count": 42,
                "down_count": 3,
                "up_items": [
                    {"code": "000001", "name": "平安银行", "streak": 1, "amount": 9.0e8},
                    {"code": "600519", "name": "贵州茅台", "streak": 3, "amount": 1.24e9},
                    {"code": "000858", "name": "五粮液", "streak": 2, "amount": 1.0e8},
                ],
                "down_items": [],
            }))
        }

        async fn capital_flow(&self, scope: FlowScope<'_>, limit: u32) -> Result<Value> {
            if self.fail_flow {
                self.record("flow:fail".to_string());
                return Err(Error::Provider("东方财富 flow unavailable".into()));
            }
            match scope {
                FlowScope::Stock(secid) => {
                    self.record(format!("flow:stock:{}:{}", secid, limit));
                    let items: Vec<Value> = (1..=limit.min(5))
                        .map(|i| {
                            json!({
                                "date": format!("2026-08-{:02}", 14 + i),
                                "main_net": 1.2e8,
                                "main_pct": 3.5,
                            })
                        })
                        .collect();
                    Ok(json!({"scope": "stock", "name": index_name(secid), "items": items}))
                }
                FlowScope::Market => {
                    self.record(format!("flow:market:{}", limit));
                    Ok(json!({
                        "scope": "market",
                        "items": [
                            {"date": "2026-08-20", "main_net": -2.1e9, "main_pct": -1.8},
                            {"date": "2026-08-21", "main_net": 3.4e9, "main_pct": 2.9},
                        ],
                    }))
                }
                FlowScope::North => {
                    self.record("flow:north".to_string());
                    Ok(json!({
                        "scope": "north",
                        "north": {"time": "14:55", "first_net": 80000.0, "second_net": 40000.0, "total_net": 120000.0},
                        "south": {"time": "14:55", "first_net": 30000.0, "second_net": 20000.0, "total_net": 50000.0},
                    }))
                }
                FlowScope::Sector => {
                    self.record(format!("flow:sector:{}", limit));
                    Ok(json!({
                        "scope": "sector",
                        "items": [
                            {"name": "医药制造", "change_percent": 2.31, "main_net": 1.2e8},
                        ],
                    }))
                }
            }
        }

        async fn sector_rank(&self, kind: BoardKind, ascending: bool, limit: u32) -> Result<Value> {
            let tag = match kind {
                BoardKind::Industry => "industry",
                BoardKind::Concept => "concept",
            };
            self.record(format!("sector:{}:{}:{}", tag, ascending, limit));
            let items = if ascending {
                json!([{"name": "房地产开发", "change_percent": -1.84, "leader": ""}])
            } else {
                json!([{"name": "医药制造", "change_percent": 2.31, "leader": "恒瑞医药"}])
            };
            Ok(json!({"kind": kind.label(), "items": items}))
        }

        async fn bond_rank(&self, limit: u32) -> Result<Value> {
            self.record(format!("bond:{}", limit));
            Ok(json!({
                "items": [
                    {"name": "东财转3", "price": 128.45, "change_percent": 2.31, "amount": 1.24e9, "stock_name": "东方财富"},
                ],
            }))
        }

        async fn margin_summary(&self, limit: u32) -> Result<Value> {
            self.record(format!("margin:{}", limit));
            Ok(json!({
                "items": [
                    {"date": "2026-08-21", "total": 1.8234e12},
                    {"date": "2026-08-20", "total": 1.8200e12},
                ],
            }))
        }

        async fn dragon_tiger(&self, limit: u32) -> Result<Value> {
            self.record(format!("lhb:{}", limit));
            Ok(json!({
                "items": [
                    {"code": "600519", "name": "贵州茅台", "date": "2026-08-21", "change_percent": 10.01, "net_buy": 2.3e8},
                ],
            }))
        }

        async fn futures_daily(&self, symbol: &str, limit: u32) -> Result<Value> {
            self.record(format!("futures:{}:{}", symbol, limit));
            Ok(json!({
                "symbol": symbol,
                "name": contract_label(symbol),
                "bars": [
                    {"date": "2026-08-20", "close": 3940.8},
                    {"date": "2026-08-21", "close": 3975.4},
                ],
            }))
        }
    }

    fn ctx_with(provider: Arc<FakeProvider>) -> HandlerContext {
        let cache = Arc::new(QuoteCache::new(&CacheConfig {
            max_entries: 256,
            realtime_ttl_secs: 45,
            ranking_ttl_secs: 90,
        }));
        HandlerContext::new(provider, cache)
    }

    fn req(intent: Intent, raw: &str, symbols: &[&str]) -> ParsedRequest {
        ParsedRequest {
            intent,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            timeframe: Timeframe::Day,
            lookback: 10,
            top_n: 10,
            date: TradeDate::Today,
            raw: raw.to_string(),
        }
    }

    #[tokio::test]
    async fn test_index_realtime_defaults_and_tip() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = index_realtime(&ctx, &req(Intent::IndexRealtime, "大盘怎么样", &[])).await;
        assert!(record.ok);
        assert_eq!(record.lines.len(), 5);
        assert!(record.lines[0].contains("上证指数"));
        assert!(record.lines[0].contains("+1.20%"));
        // All five up 1.2% reads as a strong session.
        assert_eq!(record.tip.as_deref(), Some("整体偏强，风险偏好回升"));
        assert_eq!(provider.count("quote:"), 5);
    }

    #[tokio::test]
    async fn test_index_realtime_tolerates_partial_failure() {
        let provider = Arc::new(FakeProvider {
            fail_secids: ["1.000300".to_string()].into_iter().collect(),
            ..FakeProvider::default()
        });
        let ctx = ctx_with(provider.clone());
        let record = index_realtime(&ctx, &req(Intent::IndexRealtime, "大盘", &[])).await;
        assert!(record.ok);
        assert_eq!(record.lines.len(), 4);

        let all_down = Arc::new(FakeProvider {
            fail_quotes: true,
            ..FakeProvider::default()
        });
        let ctx = ctx_with(all_down);
        let record = index_realtime(&ctx, &req(Intent::IndexRealtime, "大盘", &[])).await;
        assert!(!record.ok);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn test_quote_cache_reused_across_calls() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let request = req(Intent::IndexRealtime, "大盘", &[]);
        index_realtime(&ctx, &request).await;
        index_realtime(&ctx, &request).await;
        assert_eq!(provider.count("quote:"), 5);
    }

    #[tokio::test]
    async fn test_kline_shape_and_summary() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let mut request = req(Intent::KlineAnalysis, "茅台近30日K线", &["600519"]);
        request.lookback = 30;
        let record = kline_analysis(&ctx, &request).await;
        assert!(record.ok);
        assert!(record.title.contains("贵州茅台(600519)"));
        assert!(record.title.contains("日K线"));
        // 5 bars plus the range summary.
        assert_eq!(record.lines.len(), 6);
        assert!(record.lines[0].starts_with("📅 "));
        assert!(record.lines[5].starts_with("区间"));
        assert_eq!(provider.count("kline:1.600519:101"), 1);
    }

    #[tokio::test]
    async fn test_kline_defaults_symbol() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = kline_analysis(&ctx, &req(Intent::KlineAnalysis, "K线", &[])).await;
        assert!(record.ok);
        assert_eq!(provider.count("kline:0.000001:101"), 1);
    }

    #[tokio::test]
    async fn test_intraday_requires_symbol() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = intraday_analysis(&ctx, &req(Intent::IntradayAnalysis, "分时图", &[])).await;
        assert!(!record.ok);
        assert!(record.error.as_deref().unwrap_or("").contains("股票代码"));
        assert!(provider.calls().is_empty());

        let record =
            intraday_analysis(&ctx, &req(Intent::IntradayAnalysis, "600519分时", &["600519"]))
                .await;
        assert!(record.ok);
        assert!(record.lines[0].starts_with("最新 "));
    }

    #[tokio::test]
    async fn test_limit_stats_sorts_by_streak_then_amount() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = limit_stats(&ctx, &req(Intent::LimitStats, "今日涨停", &[])).await;
        assert!(record.ok);
        assert_eq!(record.lines[0], "涨停: 42 家 | 跌停: 3 家");
        assert!(record.lines[1].contains("贵州茅台"));
        assert!(record.lines[1].contains("3连板"));
        assert!(record.lines[2].contains("五粮液"));
        assert!(record.lines[3].contains("平安银行"));
    }

    #[tokio::test]
    async fn test_money_flow_scope_detection() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());

        let record = money_flow(&ctx, &req(Intent::MoneyFlow, "北向资金", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "沪深港通资金");
        assert!(record.lines[0].contains("北向资金: 净流入 12.00亿"));

        let record = money_flow(&ctx, &req(Intent::MoneyFlow, "大盘资金流向", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "大盘资金流向");
        // Newest day first after the running total.
        assert!(record.lines[1].contains("08-21"));

        let record = money_flow(&ctx, &req(Intent::MoneyFlow, "板块资金流向", &[])).await;
        assert_eq!(record.title, "板块资金流向");
        assert!(record.lines[0].contains("医药制造"));

        let record = money_flow(&ctx, &req(Intent::MoneyFlow, "资金流向", &[])).await;
        assert!(!record.ok);
        assert!(record.error.as_deref().unwrap_or("").contains("股票代码"));

        let record = money_flow(
            &ctx,
            &req(Intent::MoneyFlow, "茅台资金流向", &["600519"]),
        )
        .await;
        assert!(record.ok);
        assert!(record.title.contains("贵州茅台"));
    }

    #[tokio::test]
    async fn test_fundamental_lines() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = fundamental(&ctx, &req(Intent::Fundamental, "茅台基本面", &["600519"])).await;
        assert!(record.ok);
        assert!(record.lines.iter().any(|l| l.starts_with("市盈率(动): 28.51")));
        assert!(record.lines.iter().any(|l| l.contains("总市值")));
        assert_eq!(provider.count("fundamentals:"), 1);

        let record = fundamental(&ctx, &req(Intent::Fundamental, "基本面", &[])).await;
        assert!(!record.ok);
    }

    #[tokio::test]
    async fn test_overview_survives_flow_failure() {
        let provider = Arc::new(FakeProvider {
            fail_flow: true,
            ..FakeProvider::default()
        });
        let ctx = ctx_with(provider.clone());
        let record =
            stock_overview(&ctx, &req(Intent::StockOverview, "茅台怎么样", &["600519"])).await;
        assert!(record.ok);
        assert!(record.title.contains("综合概览"));
        assert!(record.lines.iter().any(|l| l.starts_with("现价")));
        assert!(record.lines.iter().any(|l| l.starts_with("估值")));
        assert!(!record.lines.iter().any(|l| l.contains("主力")));
    }

    #[tokio::test]
    async fn test_sector_kind_detection() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record =
            sector_analysis(&ctx, &req(Intent::SectorAnalysis, "概念板块行情", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "概念板块行情");
        assert!(provider.calls().iter().all(|c| !c.starts_with("sector:industry")));
        assert!(record.lines.contains(&"涨幅居前:".to_string()));
        assert!(record.lines.iter().any(|l| l.contains("领涨 恒瑞医药")));
        assert!(record.lines.contains(&"跌幅居前:".to_string()));

        let record = sector_analysis(&ctx, &req(Intent::SectorAnalysis, "板块行情", &[])).await;
        assert_eq!(record.title, "行业板块行情");
    }

    #[tokio::test]
    async fn test_fund_bond_branches() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = fund_bond(&ctx, &req(Intent::FundBond, "可转债行情", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "可转债行情");
        assert!(record.lines[0].contains("东财转3"));
        assert!(record.lines[0].contains("正股 东方财富"));

        let record = fund_bond(&ctx, &req(Intent::FundBond, "ETF行情", &[])).await;
        assert!(record.ok);
        assert!(record.title.contains("创业板ETF"));
        assert_eq!(provider.count("quote:0.159915"), 1);
    }

    #[tokio::test]
    async fn test_hk_us_keyword_split() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = hk_us_market(&ctx, &req(Intent::HkUsMarket, "美股行情", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "美股行情");
        assert_eq!(provider.count("quote:100."), 3);

        let record = hk_us_market(&ctx, &req(Intent::HkUsMarket, "港股行情", &[])).await;
        assert_eq!(record.title, "港股行情");
        assert!(record.lines.iter().any(|l| l.contains("恒生指数")));

        let record = hk_us_market(
            &ctx,
            &req(Intent::HkUsMarket, "恒生指数怎么样", &["100.HSI"]),
        )
        .await;
        assert!(record.ok);
        assert_eq!(record.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_margin_lhb_branches() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = margin_lhb(&ctx, &req(Intent::MarginLhb, "今日龙虎榜", &[])).await;
        assert!(record.ok);
        assert!(record.title.starts_with("龙虎榜"));
        assert!(record.lines[0].contains("净买入 2.30亿"));

        let record = margin_lhb(&ctx, &req(Intent::MarginLhb, "两融余额", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "两融余额");
        assert!(record.lines[0].contains("两融余额 18234.00亿"));
        assert!(record.tip.as_deref().unwrap_or("").contains("增加"));
        assert_eq!(provider.count("margin:"), 1);
    }

    #[tokio::test]
    async fn test_derivatives_contract_extraction() {
        assert_eq!(extract_contracts("IF2412期货"), vec!["IF2412"]);
        assert_eq!(extract_contracts("沪深300期货"), vec!["IF0"]);
        assert_eq!(extract_contracts("中证1000股指期货"), vec!["IM0"]);
        assert_eq!(
            extract_contracts("股指期货"),
            vec!["IF0", "IH0", "IC0", "IM0"]
        );
        // notify2024 must not read as a contract.
        assert_eq!(
            extract_contracts("notify2024"),
            vec!["IF0", "IH0", "IC0", "IM0"]
        );
    }

    #[tokio::test]
    async fn test_derivatives_futures_and_options() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = ctx_with(provider.clone());
        let record = derivatives(&ctx, &req(Intent::Derivatives, "IF2412期货", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "股指期货");
        assert_eq!(record.lines.len(), 1);
        assert!(record.lines[0].contains("IF2412"));
        assert!(record.lines[0].contains("+0.88%"));
        assert_eq!(provider.count("futures:IF2412"), 1);

        let record = derivatives(&ctx, &req(Intent::Derivatives, "50ETF期权", &[])).await;
        assert!(record.ok);
        assert_eq!(record.title, "ETF期权标的");
        assert!(record.tip.as_deref().unwrap_or("").contains("期权链"));
        assert_eq!(provider.count("quote:1.510050"), 1);
    }
}
