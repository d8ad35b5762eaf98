//! Market data access: the provider boundary, the EastMoney and Sina HTTP
//! services behind it, the TTL cache, and the per-intent handler group
//! reached through [`Dispatcher`].

pub mod cache;
pub mod dispatcher;
pub mod eastmoney;
mod handlers;
pub mod provider;
pub mod sina;

pub use cache::{CacheHit, CacheStats, QuoteCache, TtlClass};
pub use dispatcher::Dispatcher;
pub use eastmoney::EastMoneyProvider;
pub use provider::{to_secid, BoardKind, FlowScope, MarketProvider};
