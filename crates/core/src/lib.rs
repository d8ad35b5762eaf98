pub mod config;
pub mod error;
pub mod fmt;
pub mod paths;
pub mod types;

pub use config::{CacheConfig, Config, ProviderConfig, RenderConfig};
pub use error::{Error, Result};
pub use paths::Paths;
pub use types::{
    Intent, ParsedRequest, RenderedMessage, ResultRecord, Timeframe, TradeDate,
};
