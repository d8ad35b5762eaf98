//! Channel profiles: presentation limits per chat surface.
//!
//! Profiles only shape output. They never influence routing or fetching.

use quotebot_core::RenderConfig;

#[derive(Debug, Clone)]
pub struct ChannelProfile {
    pub name: &'static str,
    /// Per-part character budget, counted in chars not bytes.
    pub max_chars: usize,
    pub max_lines: usize,
    pub max_parts: usize,
    pub emoji: bool,
}

impl ChannelProfile {
    pub fn qq() -> Self {
        Self {
            name: "qq",
            max_chars: 1000,
            max_lines: 15,
            max_parts: 3,
            emoji: true,
        }
    }

    pub fn telegram() -> Self {
        Self {
            name: "telegram",
            max_chars: 1000,
            max_lines: 15,
            max_parts: 3,
            emoji: true,
        }
    }

    /// Emoji-free profile for piped output and tests.
    pub fn plain() -> Self {
        Self {
            name: "plain",
            max_chars: 1000,
            max_lines: 15,
            max_parts: 3,
            emoji: false,
        }
    }

    /// Preset lookup; unknown names fall back to plain.
    pub fn by_name(name: &str) -> Self {
        match name {
            "qq" => Self::qq(),
            "telegram" | "tg" => Self::telegram(),
            _ => Self::plain(),
        }
    }

    /// Apply configured budget overrides on top of a preset.
    pub fn with_config(mut self, config: &RenderConfig) -> Self {
        self.max_chars = config.max_chars.max(64);
        self.max_lines = config.max_lines.max(1);
        self.max_parts = config.max_parts.max(1);
        self
    }
}

impl Default for ChannelProfile {
    fn default() -> Self {
        Self::qq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name_and_fallback() {
        assert_eq!(ChannelProfile::by_name("qq").name, "qq");
        assert!(ChannelProfile::by_name("telegram").emoji);
        assert_eq!(ChannelProfile::by_name("tg").name, "telegram");
        let unknown = ChannelProfile::by_name("irc");
        assert_eq!(unknown.name, "plain");
        assert!(!unknown.emoji);
    }

    #[test]
    fn test_with_config_clamps() {
        let config = RenderConfig {
            max_chars: 10,
            max_lines: 0,
            max_parts: 0,
            default_channel: "qq".to_string(),
        };
        let profile = ChannelProfile::qq().with_config(&config);
        assert_eq!(profile.max_chars, 64);
        assert_eq!(profile.max_lines, 1);
        assert_eq!(profile.max_parts, 1);
    }
}
