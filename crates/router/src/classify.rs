//! Keyword/pattern intent classification. One ordered rule list, evaluated
//! top to bottom, first matching rule wins; a query matching nothing is
//! `Intent::Unknown`, which is a deliberate branch, not an error.

use once_cell::sync::Lazy;
use regex::Regex;

use quotebot_core::types::Intent;

struct IntentRule {
    intent: Intent,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
    /// Any of these present → the rule is skipped even on a keyword hit.
    negative: &'static [&'static str],
}

impl IntentRule {
    fn matches(&self, lower: &str) -> bool {
        for neg in self.negative {
            if lower.contains(neg) {
                return false;
            }
        }
        for pattern in &self.patterns {
            if pattern.is_match(lower) {
                return true;
            }
        }
        for kw in self.keywords {
            if lower.contains(kw) {
                return true;
            }
        }
        false
    }
}

/// Rule order is the routing priority. 涨停/分时/K线 queries often also
/// mention 大盘 or 行情, so the specific intents sit above the broad ones;
/// MoneyFlow sits above SectorAnalysis so 板块资金流向 routes to flow.
static RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    vec![
        IntentRule {
            intent: Intent::LimitStats,
            keywords: &["涨停", "跌停", "涨跌停", "连板"],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::IntradayAnalysis,
            keywords: &["分时", "盘口", "逐笔", "明细"],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::KlineAnalysis,
            keywords: &["k线", "日线", "周线", "月线", "kline", "蜡烛图"],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::StockOverview,
            keywords: &["怎么样", "分析一下", "看下", "评估", "综合"],
            patterns: vec![],
            negative: &["板块", "行业", "概念", "大盘", "指数", "基金", "期货", "资金", "行情"],
        },
        IntentRule {
            intent: Intent::MoneyFlow,
            keywords: &[
                "资金流", "主力资金", "北向资金", "南向资金", "行业资金", "板块资金", "资金面",
            ],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::Fundamental,
            keywords: &[
                "基本面", "财报", "财务", "市盈率", "市净率", "估值", "roe", "毛利率",
                "净利率", "资产负债率",
            ],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::MarginLhb,
            keywords: &["融资融券", "两融", "龙虎榜", "融资余额", "融券余额"],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::HkUsMarket,
            keywords: &[
                "港股", "美股", "纳斯达克", "道琼斯", "标普", "恒生", "恒指", "nasdaq", "dow",
                "sp500",
            ],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::Derivatives,
            keywords: &["期货", "期权", "衍生品", "主力合约", "股指期货"],
            // Contract codes like if2412 / ih0, not embedded in ASCII words.
            patterns: vec![Regex::new(r"(?:^|[^a-z0-9])(?:if|ih|ic|im)\d{1,4}([^0-9]|$)").unwrap()],
            negative: &[],
        },
        IntentRule {
            intent: Intent::FundBond,
            keywords: &["基金", "净值", "可转债", "转债", "债券", "etf"],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::SectorAnalysis,
            keywords: &["板块", "行业", "概念", "题材", "轮动", "涨幅榜", "跌幅榜"],
            patterns: vec![],
            negative: &[],
        },
        IntentRule {
            intent: Intent::IndexRealtime,
            keywords: &["大盘", "指数", "上证", "深证", "创业板", "行情", "实时"],
            patterns: vec![],
            negative: &[],
        },
    ]
});

/// Classify a raw query. Total: every input maps to some intent.
pub fn classify(text: &str) -> Intent {
    let lower = text.to_lowercase();
    for rule in RULES.iter() {
        if rule.matches(&lower) {
            return rule.intent;
        }
    }
    Intent::Unknown
}

pub fn rule_count() -> usize {
    RULES.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_intents() {
        assert_eq!(classify("今日涨停"), Intent::LimitStats);
        assert_eq!(classify("600519分时"), Intent::IntradayAnalysis);
        assert_eq!(classify("茅台近30日K线"), Intent::KlineAnalysis);
        assert_eq!(classify("茅台资金流向"), Intent::MoneyFlow);
        assert_eq!(classify("贵州茅台市盈率"), Intent::Fundamental);
        assert_eq!(classify("今日龙虎榜"), Intent::MarginLhb);
        assert_eq!(classify("恒生指数现在多少点"), Intent::HkUsMarket);
        assert_eq!(classify("股指期货走势"), Intent::Derivatives);
        assert_eq!(classify("可转债涨幅"), Intent::FundBond);
        assert_eq!(classify("今天哪个板块涨得好"), Intent::SectorAnalysis);
        assert_eq!(classify("大盘怎么样"), Intent::IndexRealtime);
    }

    #[test]
    fn test_unmatched_is_unknown() {
        assert_eq!(classify("abc"), Intent::Unknown);
        assert_eq!(classify("你好"), Intent::Unknown);
        assert_eq!(classify(""), Intent::Unknown);
        // A bare code names an instrument but no operation.
        assert_eq!(classify("600519"), Intent::Unknown);
    }

    #[test]
    fn test_priority_specific_before_broad() {
        // 涨停 outranks 大盘/行情.
        assert_eq!(classify("大盘涨停统计"), Intent::LimitStats);
        // K线 outranks 行情.
        assert_eq!(classify("上证指数K线行情"), Intent::KlineAnalysis);
        // 资金流 outranks 板块: the documented tie-break.
        assert_eq!(classify("板块资金流向"), Intent::MoneyFlow);
        assert_eq!(classify("行业资金排名"), Intent::MoneyFlow);
    }

    #[test]
    fn test_overview_negatives() {
        assert_eq!(classify("600519怎么样"), Intent::StockOverview);
        assert_eq!(classify("分析一下茅台"), Intent::StockOverview);
        // 怎么样 questions about markets or sectors are not stock overviews.
        assert_eq!(classify("大盘怎么样"), Intent::IndexRealtime);
        assert_eq!(classify("医药板块怎么样"), Intent::SectorAnalysis);
        assert_eq!(classify("恒生指数怎么样"), Intent::HkUsMarket);
    }

    #[test]
    fn test_futures_contract_pattern() {
        assert_eq!(classify("IF2412走势"), Intent::Derivatives);
        assert_eq!(classify("ih0主力"), Intent::Derivatives);
        // if embedded in an English word must not trigger.
        assert_eq!(classify("notify2024"), Intent::Unknown);
    }

    #[test]
    fn test_english_keywords_case_insensitive() {
        assert_eq!(classify("Kline for 600519"), Intent::KlineAnalysis);
        assert_eq!(classify("NASDAQ 行情"), Intent::HkUsMarket);
    }
}
