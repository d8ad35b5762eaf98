//! End-to-end query pipeline: free text in, chat-ready parts out.
//!
//! Wires the router, the dispatcher and the renderer behind two calls:
//! [`Pipeline::answer`] for chat surfaces (never fails, upstream errors come
//! back as rendered failure messages) and [`Pipeline::process`] for callers
//! that want the parsed request and the raw record.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use quotebot_core::{Config, ParsedRequest, RenderedMessage, Result, ResultRecord};
use quotebot_market::{Dispatcher, EastMoneyProvider, MarketProvider, QuoteCache};
use quotebot_render::ChannelProfile;

pub struct Pipeline {
    dispatcher: Dispatcher,
}

impl Pipeline {
    /// Pipeline over a caller-supplied provider, with its own cache sized
    /// from `config.cache`.
    pub fn new(config: &Config, provider: Arc<dyn MarketProvider>) -> Self {
        let cache = Arc::new(QuoteCache::new(&config.cache));
        Self {
            dispatcher: Dispatcher::new(provider, cache),
        }
    }

    /// Production wiring: EastMoney over the process-wide cache.
    pub fn with_defaults(config: &Config) -> Result<Self> {
        let provider = Arc::new(EastMoneyProvider::new(&config.provider)?);
        Ok(Self {
            dispatcher: Dispatcher::new(provider, quotebot_market::cache::global()),
        })
    }

    /// Parse and dispatch without rendering.
    pub async fn process(&self, query: &str) -> (ParsedRequest, ResultRecord) {
        let req = quotebot_router::parse(query);
        let record = self.dispatcher.dispatch(&req).await;
        (req, record)
    }

    /// Full run: parse, dispatch, render.
    pub async fn answer(&self, query: &str, profile: &ChannelProfile) -> RenderedMessage {
        let request_id = uuid::Uuid::new_v4().to_string();
        let start = Instant::now();
        let (req, record) = self.process(query).await;
        let message = quotebot_render::render(&req, &record, profile);
        info!(
            request_id = %request_id,
            intent = req.intent.as_str(),
            symbols = req.symbols.len(),
            ok = record.ok,
            parts = message.parts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query answered"
        );
        message
    }
}
