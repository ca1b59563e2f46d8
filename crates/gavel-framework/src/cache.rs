//! Visibility cache.
//!
//! Three memo cells, each filled on first access and dropped together on the
//! next permission-affecting write:
//!
//! | Cell               | Key       | Value                          |
//! |--------------------|-----------|--------------------------------|
//! | channel modules    | channel   | loaded modules visible there   |
//! | channel commands   | channel   | text command trie              |
//! | guild modules      | -         | loaded modules visible anywhere|
//!
//! The cache itself holds no lock. Its owner keeps it behind one mutex and
//! performs "clear, then optionally rebuild" while holding it, so a reader
//! sees either the old state or the new one.
//!
//! Channels read since the last flush are tracked so the owner can rebuild
//! exactly those. [`clear`](VisibilityCache::clear) hands the set over and
//! starts a new one, so a channel nobody reads between two writes is not
//! rebuilt again.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use gavel_core::ChannelId;

use crate::registry::LoadedModule;
use crate::text::TextCommand;
use crate::trie::CommandTrie;

/// Modules visible in one scope, sorted by name.
pub type ModuleList = Arc<[Arc<LoadedModule>]>;

/// Text commands visible in one channel.
pub type TextIndex = Arc<CommandTrie<Arc<TextCommand>>>;

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub flushes: u64,
    /// Channels cached right now.
    pub channels: usize,
    /// Channels read since the last flush.
    pub tracked: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits, {} misses, {} flushes, {} channels cached",
            self.hits, self.misses, self.flushes, self.channels
        )
    }
}

/// The three memo cells plus the channels read since the last flush.
#[derive(Default)]
pub struct VisibilityCache {
    channel_modules: HashMap<ChannelId, ModuleList>,
    channel_commands: HashMap<ChannelId, TextIndex>,
    guild_modules: Option<ModuleList>,
    touched: BTreeSet<ChannelId>,
    hits: u64,
    misses: u64,
    flushes: u64,
}

impl VisibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_modules(
        &mut self,
        channel: ChannelId,
        compute: impl FnOnce() -> ModuleList,
    ) -> ModuleList {
        self.touched.insert(channel);
        if let Some(list) = self.channel_modules.get(&channel) {
            self.hits += 1;
            return Arc::clone(list);
        }
        self.misses += 1;
        let list = compute();
        self.channel_modules.insert(channel, Arc::clone(&list));
        list
    }

    pub fn channel_commands(
        &mut self,
        channel: ChannelId,
        compute: impl FnOnce() -> TextIndex,
    ) -> TextIndex {
        self.touched.insert(channel);
        if let Some(index) = self.channel_commands.get(&channel) {
            self.hits += 1;
            return Arc::clone(index);
        }
        self.misses += 1;
        let index = compute();
        self.channel_commands.insert(channel, Arc::clone(&index));
        index
    }

    pub fn guild_modules(&mut self, compute: impl FnOnce() -> ModuleList) -> ModuleList {
        if let Some(list) = &self.guild_modules {
            self.hits += 1;
            return Arc::clone(list);
        }
        self.misses += 1;
        let list = compute();
        self.guild_modules = Some(Arc::clone(&list));
        list
    }

    /// Drops every cell and returns the channels read since the last clear.
    pub fn clear(&mut self) -> Vec<ChannelId> {
        self.channel_modules.clear();
        self.channel_commands.clear();
        self.guild_modules = None;
        self.flushes += 1;
        std::mem::take(&mut self.touched).into_iter().collect()
    }

    /// Marks channels for rebuild on the next flush.
    pub fn remember_channels(&mut self, channels: impl IntoIterator<Item = ChannelId>) {
        self.touched.extend(channels);
    }

    /// Forgets the channels read so far without dropping any cell.
    ///
    /// Used after an eager rebuild, which reads channels on nobody's behalf.
    pub fn untrack(&mut self) {
        self.touched.clear();
    }

    /// Channels read since the last flush.
    pub fn tracked_channels(&self) -> Vec<ChannelId> {
        self.touched.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channel_modules.is_empty()
            && self.channel_commands.is_empty()
            && self.guild_modules.is_none()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            flushes: self.flushes,
            channels: self.channel_modules.len(),
            tracked: self.touched.len(),
        }
    }
}

impl fmt::Debug for VisibilityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilityCache")
            .field("stats", &self.stats())
            .field("tracked", &self.touched.len())
            .finish_non_exhaustive()
    }
}
