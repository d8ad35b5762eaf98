//! EastMoney (东方财富) HTTP provider.
//!
//! Quotes, klines and rankings come from the push2 endpoints, billboard and
//! margin data from datacenter-web, index futures from the Sina fallback in
//! [`crate::sina`]. Raw payloads are normalized into flat JSON the handlers
//! can reduce without knowing f-field numbering.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use quotebot_core::{Error, ProviderConfig, Result, TradeDate};

use crate::provider::{BoardKind, FlowScope, MarketProvider};
use crate::sina::SinaFuturesService;

const QUOTE_REFERER: &str = "https://quote.eastmoney.com";
const DATA_REFERER: &str = "https://data.eastmoney.com";
const KLINE_UT: &str = "fa5fd1943c7b386f172d6893dbfba10b";
const FLOW_UT: &str = "b2884a393a59ad64002292a3e90d46a5";
const POOL_UT: &str = "7eea3edcaed734bea9cbfc24409ed989";

pub struct EastMoneyProvider {
    client: Client,
    user_agent: String,
    sina: SinaFuturesService,
}

impl EastMoneyProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Provider(format!("http client init failed: {}", e)))?;
        let sina = SinaFuturesService::new(client.clone());
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            sina,
        })
    }

    async fn get_json(&self, url: &str, referer: &str, what: &str) -> Result<Value> {
        debug!(url = %url, "东方财富 {}", what);
        let resp = self
            .client
            .get(url)
            .header("Referer", referer)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("东方财富 {} request timed out: {}", what, e))
                } else {
                    Error::Provider(format!("东方财富 {} request failed: {}", what, e))
                }
            })?;
        resp.json::<Value>()
            .await
            .map_err(|e| Error::Provider(format!("东方财富 {} response parse failed: {}", what, e)))
    }
}

/// `data` is `null` when a secid is unknown or the feed has nothing to say.
fn non_null_data<'a>(body: &'a Value, context: &str) -> Result<&'a Value> {
    body.get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| Error::Provider(format!("东方财富: 未找到{}", context)))
}

/// clist responses carry rows under `data.diff`.
fn diff_rows<'a>(body: &'a Value, context: &str) -> Result<&'a Vec<Value>> {
    non_null_data(body, context)?
        .get("diff")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Provider(format!("东方财富: 未找到{}", context)))
}

/// datacenter responses carry rows under `result.data`.
fn datacenter_rows<'a>(body: &'a Value, context: &str) -> Result<&'a Vec<Value>> {
    body.get("result")
        .filter(|r| !r.is_null())
        .and_then(|r| r.get("data"))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Provider(format!("东方财富: 未找到{}", context)))
}

/// Kline rows arrive as CSV strings:
/// date,open,close,high,low,volume,amount,amplitude,change%,change,turnover.
fn parse_kline_row(line: &str) -> Option<Value> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 11 {
        return None;
    }
    let num = |i: usize| parts[i].parse::<f64>().ok();
    Some(json!({
        "date": parts[0],
        "open": num(1),
        "close": num(2),
        "high": num(3),
        "low": num(4),
        "volume": num(5),
        "amount": num(6),
        "amplitude": num(7),
        "change_percent": num(8),
        "change": num(9),
        "turnover_rate": num(10),
    }))
}

/// Flow kline rows: date, five net-inflow buckets, five ratios, close, change%.
fn parse_flow_row(line: &str) -> Option<Value> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 13 {
        return None;
    }
    let num = |i: usize| parts[i].parse::<f64>().ok();
    Some(json!({
        "date": parts[0],
        "main_net": num(1),
        "main_pct": num(6),
        "close": num(11),
        "change_percent": num(12),
    }))
}

/// Codes occasionally arrive as bare numbers with the leading zeros eaten.
fn code_str(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => format!("{:0>6}", n.to_string()),
        _ => String::new(),
    }
}

/// Shared shape for the limit-up and limit-down pools. Prices are scaled by
/// 1000 on the wire; `streak_key` is `lbc` for the up pool, `days` for down.
fn parse_pool(body: &Value, streak_key: &str) -> (u64, Vec<Value>) {
    let data = body.get("data").filter(|d| !d.is_null());
    let count = data
        .and_then(|d| d.get("tc"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let items = data
        .and_then(|d| d.get("pool"))
        .and_then(Value::as_array)
        .map(|pool| {
            pool.iter()
                .map(|it| {
                    let f = |k: &str| it.get(k).and_then(Value::as_f64);
                    json!({
                        "code": code_str(it.get("c")),
                        "name": it.get("n").and_then(Value::as_str).unwrap_or(""),
                        "price": f("p").map(|v| v / 1000.0),
                        "change_percent": f("zdp"),
                        "amount": f("amount").or_else(|| f("cjje")),
                        "streak": it.get(streak_key)
                            .or_else(|| it.get("lbc"))
                            .and_then(Value::as_u64)
                            .unwrap_or(1),
                        "turnover_rate": f("hs"),
                        "industry": it.get("hybk").and_then(Value::as_str).unwrap_or(""),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    (count, items)
}

/// Last row of a kamt minute series that actually parses; rows degrade to
/// `-` placeholders outside trading hours.
fn latest_kamt_row(data: &Value, key: &str) -> Option<Value> {
    let rows = data.get(key)?.as_array()?;
    for row in rows.iter().rev() {
        let line = row.as_str()?;
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 6 {
            continue;
        }
        let num = |i: usize| parts[i].parse::<f64>().ok();
        if let (Some(first), Some(second), Some(total)) = (num(1), num(3), num(5)) {
            return Some(json!({
                "time": parts[0],
                "first_net": first,
                "second_net": second,
                "total_net": total,
            }));
        }
    }
    None
}

#[async_trait]
impl MarketProvider for EastMoneyProvider {
    async fn quote(&self, secid: &str) -> Result<Value> {
        let url = format!(
            "https://push2.eastmoney.com/api/qt/stock/get?secid={}&fields=f43,f44,f45,f46,f47,f48,f50,f51,f52,f55,f57,f58,f60,f116,f117,f162,f167,f168,f169,f170,f171,f292",
            secid
        );
        let body = self.get_json(&url, QUOTE_REFERER, "quote").await?;
        let data = non_null_data(&body, &format!(" {} 的行情数据", secid))?;
        // HK quotes scale prices by 1000, everything else by 100.
        let divisor = if secid.starts_with("116.") { 1000.0 } else { 100.0 };
        let f = |key: &str| data.get(key).and_then(Value::as_f64);
        Ok(json!({
            "secid": secid,
            "symbol": data.get("f57").and_then(Value::as_str).unwrap_or(secid),
            "name": data.get("f58").and_then(Value::as_str).unwrap_or(""),
            "price": f("f43").map(|v| v / divisor),
            "change": f("f169").map(|v| v / divisor),
            "change_percent": f("f170").map(|v| v / 100.0),
            "open": f("f46").map(|v| v / divisor),
            "high": f("f44").map(|v| v / divisor),
            "low": f("f45").map(|v| v / divisor),
            "previous_close": f("f60").map(|v| v / divisor),
            "volume": f("f47"),
            "amount": f("f48"),
            "volume_ratio": f("f50").map(|v| v / 100.0),
            "turnover_rate": f("f168").map(|v| v / 100.0),
            "pe_ratio": f("f162").map(|v| v / 100.0),
            "pb_ratio": f("f167").map(|v| v / 100.0),
            "total_market_cap": f("f116"),
            "float_market_cap": f("f117"),
            "source": "eastmoney",
        }))
    }

    async fn fundamentals(&self, secid: &str) -> Result<Value> {
        // Valuation fields ride on the quote endpoint; the separate method
        // exists so callers can cache them on the daily class.
        self.quote(secid).await
    }

    async fn kline(&self, secid: &str, klt: u32, limit: u32, end: &str) -> Result<Value> {
        let end_date = if end.is_empty() {
            TradeDate::Today.yyyymmdd()
        } else {
            end.to_string()
        };
        let url = format!(
            "https://push2his.eastmoney.com/api/qt/stock/kline/get?secid={}&fields1=f1,f2,f3,f4,f5,f6&fields2=f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61&klt={}&fqt=1&lmt={}&end={}&ut={}",
            secid, klt, limit, end_date, KLINE_UT
        );
        let body = self.get_json(&url, QUOTE_REFERER, "kline").await?;
        let data = non_null_data(&body, &format!(" {} 的K线数据", secid))?;
        let bars: Vec<Value> = data
            .get("klines")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .filter_map(parse_kline_row)
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(Error::Provider(format!("东方财富: {} 无K线数据", secid)));
        }
        Ok(json!({
            "secid": secid,
            "name": data.get("name").and_then(Value::as_str).unwrap_or(""),
            "klt": klt,
            "count": bars.len(),
            "bars": bars,
            "source": "eastmoney",
        }))
    }

    async fn minute_series(&self, secid: &str, bucket: u32, limit: u32) -> Result<Value> {
        // Minute buckets share the kline endpoint, klt is the bucket width.
        self.kline(secid, bucket, limit, "").await
    }

    async fn limit_pool(&self, date: &str) -> Result<Value> {
        let up_url = format!(
            "https://push2ex.eastmoney.com/getTopicZTPool?ut={}&dpt=wz.ztzt&Pageindex=0&pagesize=320&sort=fbt%3Aasc&date={}",
            POOL_UT, date
        );
        let down_url = format!(
            "https://push2ex.eastmoney.com/getTopicDTPool?ut={}&dpt=wz.ztzt&Pageindex=0&pagesize=320&sort=fund%3Aasc&date={}",
            POOL_UT, date
        );
        let (up_body, down_body) = tokio::try_join!(
            self.get_json(&up_url, QUOTE_REFERER, "limit-up pool"),
            self.get_json(&down_url, QUOTE_REFERER, "limit-down pool"),
        )?;
        // A null pool on a non-trading day is an empty result, not an error.
        let (up_count, up_items) = parse_pool(&up_body, "lbc");
        let (down_count, down_items) = parse_pool(&down_body, "days");
        Ok(json!({
            "date": date,
            "up_count": up_count,
            "down_count": down_count,
            "up_items": up_items,
            "down_items": down_items,
            "source": "eastmoney",
        }))
    }

    async fn capital_flow(&self, scope: FlowScope<'_>, limit: u32) -> Result<Value> {
        match scope {
            FlowScope::Stock(secid) => {
                let url = format!(
                    "https://push2.eastmoney.com/api/qt/stock/fflow/kline/get?lmt={}&klt=101&secid={}&fields1=f1,f2,f3,f7&fields2=f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61,f62,f63,f64,f65&ut={}",
                    limit, secid, FLOW_UT
                );
                let body = self.get_json(&url, QUOTE_REFERER, "stock flow").await?;
                let data = non_null_data(&body, &format!(" {} 的资金流数据", secid))?;
                let items: Vec<Value> = data
                    .get("klines")
                    .and_then(Value::as_array)
                    .map(|rows| {
                        rows.iter()
                            .filter_map(Value::as_str)
                            .filter_map(parse_flow_row)
                            .collect()
                    })
                    .unwrap_or_default();
                if items.is_empty() {
                    return Err(Error::Provider(format!("东方财富: {} 无资金流数据", secid)));
                }
                Ok(json!({
                    "scope": "stock",
                    "secid": secid,
                    "name": data.get("name").and_then(Value::as_str).unwrap_or(""),
                    "items": items,
                    "source": "eastmoney",
                }))
            }
            FlowScope::Market => {
                let url = format!(
                    "https://push2his.eastmoney.com/api/qt/stock/fflow/daykline/get?lmt={}&klt=101&secid=1.000001&secid2=0.399001&fields1=f1,f2,f3,f7&fields2=f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61,f62,f63,f64,f65&ut={}",
                    limit, FLOW_UT
                );
                let body = self.get_json(&url, QUOTE_REFERER, "market flow").await?;
                let data = non_null_data(&body, "大盘资金流数据")?;
                let items: Vec<Value> = data
                    .get("klines")
                    .and_then(Value::as_array)
                    .map(|rows| {
                        rows.iter()
                            .filter_map(Value::as_str)
                            .filter_map(parse_flow_row)
                            .collect()
                    })
                    .unwrap_or_default();
                if items.is_empty() {
                    return Err(Error::Provider("东方财富: 无大盘资金流数据".into()));
                }
                Ok(json!({
                    "scope": "market",
                    "items": items,
                    "source": "eastmoney",
                }))
            }
            FlowScope::North => {
                let url = format!(
                    "https://push2.eastmoney.com/api/qt/kamt.rtmin/get?fields1=f1,f2,f3,f4&fields2=f51,f52,f53,f54,f55,f56&ut={}",
                    FLOW_UT
                );
                let body = self.get_json(&url, QUOTE_REFERER, "north flow").await?;
                let data = non_null_data(&body, "沪深港通资金数据")?;
                // Units are 万元. Northbound minute rows stay as `-` outside
                // disclosure windows, so either side may be missing.
                let north = latest_kamt_row(data, "s2n");
                let south = latest_kamt_row(data, "n2s");
                if north.is_none() && south.is_none() {
                    return Err(Error::Provider("东方财富: 沪深港通资金暂无数据".into()));
                }
                Ok(json!({
                    "scope": "north",
                    "date": data.get("s2nDate").and_then(Value::as_str).unwrap_or(""),
                    "north": north,
                    "south": south,
                    "source": "eastmoney",
                }))
            }
            FlowScope::Sector => {
                let url = format!(
                    "https://push2.eastmoney.com/api/qt/clist/get?pn=1&pz={}&po=1&np=1&fltt=2&invt=2&fid=f62&fs=m:90+t:2&fields=f2,f3,f12,f14,f62,f184",
                    limit
                );
                let body = self.get_json(&url, QUOTE_REFERER, "sector flow").await?;
                let rows = diff_rows(&body, "板块资金流数据")?;
                let items: Vec<Value> = rows
                    .iter()
                    .map(|it| {
                        json!({
                            "code": code_str(it.get("f12")),
                            "name": it.get("f14").and_then(Value::as_str).unwrap_or(""),
                            "change_percent": it.get("f3").and_then(Value::as_f64),
                            "main_net": it.get("f62").and_then(Value::as_f64),
                            "main_pct": it.get("f184").and_then(Value::as_f64),
                        })
                    })
                    .collect();
                Ok(json!({
                    "scope": "sector",
                    "items": items,
                    "source": "eastmoney",
                }))
            }
        }
    }

    async fn sector_rank(&self, kind: BoardKind, ascending: bool, limit: u32) -> Result<Value> {
        let fs = match kind {
            BoardKind::Industry => "m:90+t:2",
            BoardKind::Concept => "m:90+t:3",
        };
        let po = if ascending { 0 } else { 1 };
        let url = format!(
            "https://push2.eastmoney.com/api/qt/clist/get?pn=1&pz={}&po={}&np=1&fltt=2&invt=2&fid=f3&fs={}&fields=f2,f3,f4,f12,f14,f104,f105,f128,f136",
            limit, po, fs
        );
        let body = self.get_json(&url, QUOTE_REFERER, "sector rank").await?;
        let rows = diff_rows(&body, "板块行情数据")?;
        let items: Vec<Value> = rows
            .iter()
            .map(|it| {
                json!({
                    "code": code_str(it.get("f12")),
                    "name": it.get("f14").and_then(Value::as_str).unwrap_or(""),
                    "change_percent": it.get("f3").and_then(Value::as_f64),
                    "up_count": it.get("f104").and_then(Value::as_u64),
                    "down_count": it.get("f105").and_then(Value::as_u64),
                    "leader": it.get("f128").and_then(Value::as_str).unwrap_or(""),
                    "leader_change": it.get("f136").and_then(Value::as_f64),
                })
            })
            .collect();
        Ok(json!({
            "kind": kind.label(),
            "ascending": ascending,
            "items": items,
            "source": "eastmoney",
        }))
    }

    async fn bond_rank(&self, limit: u32) -> Result<Value> {
        // b:MK0354 is the convertible-bond universe.
        let url = format!(
            "https://push2.eastmoney.com/api/qt/clist/get?pn=1&pz={}&po=1&np=1&fltt=2&invt=2&fid=f3&fs=b:MK0354&fields=f2,f3,f6,f12,f14,f234",
            limit
        );
        let body = self.get_json(&url, QUOTE_REFERER, "bond rank").await?;
        let rows = diff_rows(&body, "可转债行情数据")?;
        let items: Vec<Value> = rows
            .iter()
            .map(|it| {
                json!({
                    "code": code_str(it.get("f12")),
                    "name": it.get("f14").and_then(Value::as_str).unwrap_or(""),
                    "price": it.get("f2").and_then(Value::as_f64),
                    "change_percent": it.get("f3").and_then(Value::as_f64),
                    "amount": it.get("f6").and_then(Value::as_f64),
                    "stock_name": it.get("f234").and_then(Value::as_str).unwrap_or(""),
                })
            })
            .collect();
        Ok(json!({
            "items": items,
            "source": "eastmoney",
        }))
    }

    async fn margin_summary(&self, limit: u32) -> Result<Value> {
        let url = format!(
            "https://datacenter-web.eastmoney.com/api/data/v1/get?reportName=RPTA_RZRQ_LSHJ&columns=ALL&source=WEB&client=WEB&sortColumns=dim_date&sortTypes=-1&pageSize={}&pageNumber=1",
            limit
        );
        let body = self.get_json(&url, DATA_REFERER, "margin summary").await?;
        let rows = datacenter_rows(&body, "两融数据")?;
        let items: Vec<Value> = rows
            .iter()
            .map(|it| {
                let date: String = it
                    .get("DIM_DATE")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .chars()
                    .take(10)
                    .collect();
                json!({
                    "date": date,
                    "rzye": it.get("RZYE").and_then(Value::as_f64),
                    "rqye": it.get("RQYE").and_then(Value::as_f64),
                    "total": it.get("RZRQYE").and_then(Value::as_f64),
                })
            })
            .collect();
        Ok(json!({
            "items": items,
            "source": "eastmoney",
        }))
    }

    async fn dragon_tiger(&self, limit: u32) -> Result<Value> {
        let url = format!(
            "https://datacenter-web.eastmoney.com/api/data/v1/get?reportName=RPT_DAILYBILLBOARD_DETAILSNEW&columns=SECUCODE,SECURITY_NAME_ABBR,TRADE_DATE,CHANGE_RATE,CLOSE_PRICE,TURNOVERVALUE,BILLBOARD_NET_AMT,BILLBOARD_BUY_AMT,BILLBOARD_SELL_AMT,BILLBOARD_DEAL_AMT,ACCUM_AMOUNT,DEAL_NET_RATIO,DEAL_AMOUNT_RATIO,EXPLANATION&pageSize={}&sortColumns=TRADE_DATE,TURNOVERVALUE&sortTypes=-1,-1&source=WEB&client=DATACENTER",
            limit
        );
        let body = self.get_json(&url, DATA_REFERER, "dragon tiger").await?;
        let rows = datacenter_rows(&body, "龙虎榜数据")?;
        let items: Vec<Value> = rows
            .iter()
            .map(|it| {
                let code = it
                    .get("SECUCODE")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .split('.')
                    .next()
                    .unwrap_or("")
                    .to_string();
                let date: String = it
                    .get("TRADE_DATE")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .chars()
                    .take(10)
                    .collect();
                json!({
                    "code": code,
                    "name": it.get("SECURITY_NAME_ABBR").and_then(Value::as_str).unwrap_or(""),
                    "date": date,
                    "change_percent": it.get("CHANGE_RATE").and_then(Value::as_f64),
                    "net_buy": it.get("BILLBOARD_NET_AMT").and_then(Value::as_f64),
                    "reason": it.get("EXPLANATION").and_then(Value::as_str).unwrap_or(""),
                })
            })
            .collect();
        Ok(json!({
            "items": items,
            "source": "eastmoney",
        }))
    }

    async fn futures_daily(&self, symbol: &str, limit: u32) -> Result<Value> {
        self.sina.daily_kline(symbol, limit).await
    }
}
