//! Turns a [`ResultRecord`](quotebot_core::ResultRecord) into channel-ready
//! message parts: block assembly, length caps, and multi-part splitting.

pub mod format;
pub mod profile;

pub use format::render;
pub use profile::ChannelProfile;
