//! Text command prefixes.
//!
//! The prefix for a message is resolved most specific first:
//! channel override, then guild override, then the global prefix.

use std::collections::BTreeMap;

use gavel_core::{ChannelId, GuildId, PersistentObject};
use serde::{Deserialize, Serialize};

/// Fallback when neither config nor persisted settings name a prefix.
pub const DEFAULT_PREFIX: &str = "!";

/// Persisted prefix settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixSettings {
    global: String,
    guilds: BTreeMap<GuildId, String>,
    channels: BTreeMap<ChannelId, String>,
}

impl Default for PrefixSettings {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl PersistentObject for PrefixSettings {
    const KEY: &'static str = "prefix_settings";
}

impl PrefixSettings {
    pub fn new(global: impl Into<String>) -> Self {
        Self {
            global: global.into(),
            guilds: BTreeMap::new(),
            channels: BTreeMap::new(),
        }
    }

    /// The prefix in effect for a message in `channel` of `guild`.
    pub fn resolve(&self, guild: GuildId, channel: ChannelId) -> &str {
        self.channels
            .get(&channel)
            .or_else(|| self.guilds.get(&guild))
            .unwrap_or(&self.global)
    }

    pub fn global(&self) -> &str {
        &self.global
    }

    pub fn set_global(&mut self, prefix: impl Into<String>) {
        self.global = prefix.into();
    }

    /// Sets or, with `None`, clears the guild override.
    pub fn set_guild(&mut self, guild: GuildId, prefix: Option<String>) -> Option<String> {
        match prefix {
            Some(p) => self.guilds.insert(guild, p),
            None => self.guilds.remove(&guild),
        }
    }

    /// Sets or, with `None`, clears the channel override.
    pub fn set_channel(&mut self, channel: ChannelId, prefix: Option<String>) -> Option<String> {
        match prefix {
            Some(p) => self.channels.insert(channel, p),
            None => self.channels.remove(&channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order() {
        let guild = GuildId(1);
        let channel = ChannelId(2);
        let mut settings = PrefixSettings::default();
        assert_eq!(settings.resolve(guild, channel), "!");

        settings.set_guild(guild, Some("?".into()));
        assert_eq!(settings.resolve(guild, channel), "?");

        settings.set_channel(channel, Some(">>".into()));
        assert_eq!(settings.resolve(guild, channel), ">>");
        assert_eq!(settings.resolve(guild, ChannelId(3)), "?");

        assert_eq!(settings.set_channel(channel, None), Some(">>".into()));
        assert_eq!(settings.resolve(guild, channel), "?");
    }
}
