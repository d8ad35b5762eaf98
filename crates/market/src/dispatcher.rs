//! Intent → handler routing.

use std::sync::Arc;

use tracing::debug;

use quotebot_core::{Intent, ParsedRequest, ResultRecord};

use crate::cache::QuoteCache;
use crate::handlers::{self, HandlerContext};
use crate::provider::MarketProvider;

/// Routes a parsed request to exactly one handler. Unknown intents
/// short-circuit to a clarification reply without touching the provider.
pub struct Dispatcher {
    ctx: HandlerContext,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn MarketProvider>, cache: Arc<QuoteCache>) -> Self {
        Self {
            ctx: HandlerContext::new(provider, cache),
        }
    }

    pub async fn dispatch(&self, req: &ParsedRequest) -> ResultRecord {
        debug!(intent = req.intent.as_str(), symbols = ?req.symbols, "dispatch");
        match req.intent {
            Intent::IndexRealtime => handlers::index_realtime(&self.ctx, req).await,
            Intent::KlineAnalysis => handlers::kline_analysis(&self.ctx, req).await,
            Intent::IntradayAnalysis => handlers::intraday_analysis(&self.ctx, req).await,
            Intent::LimitStats => handlers::limit_stats(&self.ctx, req).await,
            Intent::MoneyFlow => handlers::money_flow(&self.ctx, req).await,
            Intent::Fundamental => handlers::fundamental(&self.ctx, req).await,
            Intent::StockOverview => handlers::stock_overview(&self.ctx, req).await,
            Intent::SectorAnalysis => handlers::sector_analysis(&self.ctx, req).await,
            Intent::FundBond => handlers::fund_bond(&self.ctx, req).await,
            Intent::HkUsMarket => handlers::hk_us_market(&self.ctx, req).await,
            Intent::MarginLhb => handlers::margin_lhb(&self.ctx, req).await,
            Intent::Derivatives => handlers::derivatives(&self.ctx, req).await,
            Intent::Unknown => ResultRecord::failure(
                "未识别查询",
                "未能识别查询意图，请补充标的或时间范围，例如：茅台近30日K线、今日涨停、北向资金",
            ),
        }
    }
}
