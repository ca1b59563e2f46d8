//! Module visibility per guild and per channel.
//!
//! Visibility is resolved from three persisted sets:
//!
//! ```text
//! channel(c) = (permitted_in_guild ∪ permitted_in_channel[c]) − blocked_in_channel[c]
//! guild      =  permitted_in_guild
//! ```
//!
//! A module never sits in both the permit and the block set of one channel.
//! The channel operations keep that invariant by removing the module from the
//! opposing set, and [`PermitBlockConfig::repair`] restores it on load by
//! dropping the permit.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use gavel_core::{ChannelId, PersistentObject};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::registry::ADMIN_MODULE;

// ─── Outcomes ─────────────────────────────────────────────────────────────────

/// Result of permitting a module in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitOutcome {
    /// Added to the channel permit set.
    PermittedInChannel,
    /// Already in the channel permit set.
    AlreadyPermittedInChannel,
    /// Guild-permitted and was blocked here; the block was removed.
    PermittedInGuildRemovedFromBlocklist,
    /// Guild-permitted and not blocked here.
    AlreadyPermittedInGuild,
}

impl fmt::Display for PermitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PermittedInChannel => "Module permitted in channel",
            Self::AlreadyPermittedInChannel => "Module was already permitted in channel",
            Self::PermittedInGuildRemovedFromBlocklist => {
                "Module is permitted in the guild, removed it from the channel block list"
            }
            Self::AlreadyPermittedInGuild => "Module is already permitted in the guild",
        })
    }
}

/// Result of blocking a module in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Was channel-permitted; the permit became a block.
    PermittedInChannelNowBlockedInChannel,
    /// Guild-permitted; now blocked in this channel.
    PermittedInGuildNowBlockedInChannel,
    /// Not visible in the channel to begin with. Nothing changed.
    AlreadyNotPermittedInChannelOrGuild,
}

impl fmt::Display for BlockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PermittedInChannelNowBlockedInChannel => {
                "Module was permitted in channel, now blocked in channel"
            }
            Self::PermittedInGuildNowBlockedInChannel => {
                "Module is permitted in the guild, now blocked in channel"
            }
            Self::AlreadyNotPermittedInChannelOrGuild => {
                "Module was not permitted in channel or guild"
            }
        })
    }
}

// ─── PermitBlockConfig ────────────────────────────────────────────────────────

/// Persisted permit and block sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermitBlockConfig {
    permitted_in_guild: BTreeSet<String>,
    permitted_in_channel: BTreeMap<ChannelId, BTreeSet<String>>,
    blocked_in_channel: BTreeMap<ChannelId, BTreeSet<String>>,
}

impl Default for PermitBlockConfig {
    fn default() -> Self {
        Self {
            permitted_in_guild: BTreeSet::from([ADMIN_MODULE.to_string()]),
            permitted_in_channel: BTreeMap::new(),
            blocked_in_channel: BTreeMap::new(),
        }
    }
}

impl PersistentObject for PermitBlockConfig {
    const KEY: &'static str = "module_permissions";
}

impl PermitBlockConfig {
    /// A config with nothing permitted anywhere.
    pub fn empty() -> Self {
        Self {
            permitted_in_guild: BTreeSet::new(),
            permitted_in_channel: BTreeMap::new(),
            blocked_in_channel: BTreeMap::new(),
        }
    }

    /// Module names visible in `channel`.
    pub fn resolve_channel(&self, channel: ChannelId) -> BTreeSet<String> {
        let mut modules = self.permitted_in_guild.clone();
        if let Some(permitted) = self.permitted_in_channel.get(&channel) {
            modules.extend(permitted.iter().cloned());
        }
        if let Some(blocked) = self.blocked_in_channel.get(&channel) {
            modules.retain(|m| !blocked.contains(m));
        }
        modules
    }

    /// Module names visible guild-wide.
    pub fn resolve_guild(&self) -> BTreeSet<String> {
        self.permitted_in_guild.clone()
    }

    pub fn is_permitted_in_guild(&self, module: &str) -> bool {
        self.permitted_in_guild.contains(module)
    }

    pub fn is_permitted_in_channel(&self, channel: ChannelId, module: &str) -> bool {
        self.permitted_in_channel
            .get(&channel)
            .is_some_and(|s| s.contains(module))
    }

    pub fn is_blocked_in_channel(&self, channel: ChannelId, module: &str) -> bool {
        self.blocked_in_channel
            .get(&channel)
            .is_some_and(|s| s.contains(module))
    }

    /// Channels with any override.
    pub fn channels(&self) -> BTreeSet<ChannelId> {
        self.permitted_in_channel
            .keys()
            .chain(self.blocked_in_channel.keys())
            .copied()
            .collect()
    }

    /// Permits `module` guild-wide. Returns whether anything changed.
    pub fn permit_in_guild(&mut self, module: &str) -> bool {
        self.permitted_in_guild.insert(module.to_string())
    }

    /// Removes the guild-wide permit and every channel permit of `module`.
    ///
    /// Returns whether anything changed.
    pub fn block_in_guild(&mut self, module: &str) -> bool {
        let mut changed = self.permitted_in_guild.remove(module);
        for permitted in self.permitted_in_channel.values_mut() {
            changed |= permitted.remove(module);
        }
        self.permitted_in_channel.retain(|_, s| !s.is_empty());
        changed
    }

    pub fn permit_in_channel(&mut self, channel: ChannelId, module: &str) -> PermitOutcome {
        if self.permitted_in_guild.contains(module) {
            return if remove_from(&mut self.blocked_in_channel, channel, module) {
                PermitOutcome::PermittedInGuildRemovedFromBlocklist
            } else {
                PermitOutcome::AlreadyPermittedInGuild
            };
        }
        if self.is_permitted_in_channel(channel, module) {
            return PermitOutcome::AlreadyPermittedInChannel;
        }
        remove_from(&mut self.blocked_in_channel, channel, module);
        self.permitted_in_channel
            .entry(channel)
            .or_default()
            .insert(module.to_string());
        PermitOutcome::PermittedInChannel
    }

    pub fn block_in_channel(&mut self, channel: ChannelId, module: &str) -> BlockOutcome {
        if remove_from(&mut self.permitted_in_channel, channel, module) {
            self.blocked_in_channel
                .entry(channel)
                .or_default()
                .insert(module.to_string());
            return BlockOutcome::PermittedInChannelNowBlockedInChannel;
        }
        if self.permitted_in_guild.contains(module) && !self.is_blocked_in_channel(channel, module)
        {
            self.blocked_in_channel
                .entry(channel)
                .or_default()
                .insert(module.to_string());
            return BlockOutcome::PermittedInGuildNowBlockedInChannel;
        }
        BlockOutcome::AlreadyNotPermittedInChannelOrGuild
    }

    /// Drops redundant and stale entries.
    ///
    /// Removes names `is_known` rejects, channel permits already covered by
    /// the guild permit, channel blocks of modules that are not permitted in
    /// the guild, and empty channel sets. Returns whether anything changed.
    pub fn trim(&mut self, is_known: impl Fn(&str) -> bool) -> bool {
        let before = self.clone();

        self.permitted_in_guild.retain(|m| is_known(m));
        let guild = &self.permitted_in_guild;
        for permitted in self.permitted_in_channel.values_mut() {
            permitted.retain(|m| is_known(m) && !guild.contains(m));
        }
        for blocked in self.blocked_in_channel.values_mut() {
            blocked.retain(|m| is_known(m) && guild.contains(m));
        }
        self.permitted_in_channel.retain(|_, s| !s.is_empty());
        self.blocked_in_channel.retain(|_, s| !s.is_empty());

        let changed = *self != before;
        if changed {
            info!("Trimmed module permissions");
        }
        changed
    }

    /// Removes modules found in both the permit and block set of a channel
    /// from the permit set. Returns the repaired `(channel, module)` pairs.
    pub fn repair(&mut self) -> Vec<(ChannelId, String)> {
        let mut repaired = Vec::new();
        for (channel, blocked) in &self.blocked_in_channel {
            if let Some(permitted) = self.permitted_in_channel.get_mut(channel) {
                for module in blocked {
                    if permitted.remove(module) {
                        warn!(
                            channel = %channel,
                            module = %module,
                            "Module was both permitted and blocked in channel, removed the permit"
                        );
                        repaired.push((*channel, module.clone()));
                    }
                }
            }
        }
        self.permitted_in_channel.retain(|_, s| !s.is_empty());
        repaired
    }
}

/// Removes `module` from `map[channel]`, dropping the set once empty.
fn remove_from(
    map: &mut BTreeMap<ChannelId, BTreeSet<String>>,
    channel: ChannelId,
    module: &str,
) -> bool {
    let Some(set) = map.get_mut(&channel) else {
        return false;
    };
    let removed = set.remove(module);
    if set.is_empty() {
        map.remove(&channel);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: ChannelId = ChannelId(10);
    const D: ChannelId = ChannelId(20);

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn config(guild: &[&str]) -> PermitBlockConfig {
        let mut config = PermitBlockConfig::empty();
        for module in guild {
            config.permit_in_guild(module);
        }
        config
    }

    #[test]
    fn test_default_permits_admin() {
        let config = PermitBlockConfig::default();
        assert_eq!(config.resolve_guild(), names(&["admin"]));
    }

    #[test]
    fn test_channel_resolution() {
        let mut config = config(&["a", "b"]);
        config.block_in_channel(C, "b");
        assert_eq!(config.resolve_channel(C), names(&["a"]));
        assert_eq!(config.resolve_channel(D), names(&["a", "b"]));
        assert_eq!(config.resolve_guild(), names(&["a", "b"]));
    }

    #[test]
    fn test_permit_removes_guild_module_from_blocklist() {
        let mut config = config(&["a", "b"]);
        config.block_in_channel(C, "b");
        assert_eq!(
            config.permit_in_channel(C, "b"),
            PermitOutcome::PermittedInGuildRemovedFromBlocklist
        );
        assert_eq!(config.resolve_channel(C), names(&["a", "b"]));
        assert_eq!(
            config.permit_in_channel(C, "b"),
            PermitOutcome::AlreadyPermittedInGuild
        );
    }

    #[test]
    fn test_permit_in_channel_only() {
        let mut config = config(&["a"]);
        assert_eq!(config.permit_in_channel(C, "x"), PermitOutcome::PermittedInChannel);
        assert_eq!(
            config.permit_in_channel(C, "x"),
            PermitOutcome::AlreadyPermittedInChannel
        );
        assert_eq!(config.resolve_channel(C), names(&["a", "x"]));
        assert_eq!(config.resolve_channel(D), names(&["a"]));
    }

    #[test]
    fn test_block_outcomes() {
        let mut config = config(&["a"]);
        config.permit_in_channel(C, "x");

        assert_eq!(
            config.block_in_channel(C, "x"),
            BlockOutcome::PermittedInChannelNowBlockedInChannel
        );
        assert!(!config.is_permitted_in_channel(C, "x"));
        assert!(config.is_blocked_in_channel(C, "x"));

        assert_eq!(
            config.block_in_channel(C, "a"),
            BlockOutcome::PermittedInGuildNowBlockedInChannel
        );
        let before = config.clone();
        assert_eq!(
            config.block_in_channel(C, "a"),
            BlockOutcome::AlreadyNotPermittedInChannelOrGuild
        );
        assert_eq!(
            config.block_in_channel(D, "nothing"),
            BlockOutcome::AlreadyNotPermittedInChannelOrGuild
        );
        assert_eq!(config, before);
    }

    #[test]
    fn test_block_in_guild_clears_channel_permits() {
        let mut config = config(&["a"]);
        config.permit_in_channel(C, "x");
        assert!(config.block_in_guild("x"));
        assert!(!config.is_permitted_in_channel(C, "x"));
        assert!(config.block_in_guild("a"));
        assert!(!config.block_in_guild("a"));
        assert!(config.resolve_channel(C).is_empty());
    }

    #[test]
    fn test_trim() {
        let mut config = config(&["a", "gone"]);
        config.permitted_in_channel.insert(C, names(&["a", "x"]));
        config.blocked_in_channel.insert(D, names(&["y"]));
        config.blocked_in_channel.insert(ChannelId(30), BTreeSet::new());

        assert!(config.trim(|m| m != "gone"));
        assert_eq!(config.resolve_guild(), names(&["a"]));
        assert_eq!(config.permitted_in_channel.get(&C), Some(&names(&["x"])));
        assert!(config.blocked_in_channel.is_empty());
        assert!(!config.trim(|m| m != "gone"));
    }

    #[test]
    fn test_repair_drops_conflicting_permit() {
        let mut config = config(&[]);
        config.permitted_in_channel.insert(C, names(&["x", "y"]));
        config.blocked_in_channel.insert(C, names(&["x"]));

        let repaired = config.repair();
        assert_eq!(repaired, vec![(C, "x".to_string())]);
        assert_eq!(config.resolve_channel(C), names(&["y"]));
        assert!(config.repair().is_empty());
    }

    #[test]
    fn test_channel_keys_serialize_as_strings() {
        let mut config = config(&["a"]);
        config.permit_in_channel(C, "x");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"10\""));
        let back: PermitBlockConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
