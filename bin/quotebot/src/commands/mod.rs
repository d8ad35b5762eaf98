pub mod ask;
pub mod completions_cmd;
pub mod repl;
pub mod status;

use quotebot_core::Config;
use quotebot_render::ChannelProfile;

/// CLI flag wins over the configured default channel; budgets always come
/// from the resolved config.
pub(crate) fn resolve_profile(config: &Config, channel: Option<&str>) -> ChannelProfile {
    let name = channel.unwrap_or(&config.render.default_channel);
    ChannelProfile::by_name(name).with_config(&config.render)
}
