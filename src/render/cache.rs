use std::collections::{HashMap, HashSet};

use crate::core::segment::SegmentKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub markup: String,
    /// The source that produced `markup`.
    pub source: String,
}

/// Last successful render per segment key.
///
/// Owned by one renderer; entries survive transient engine failures and are
/// evicted as soon as their key disappears from a pass.
#[derive(Debug, Default)]
pub struct RenderCache {
    entries: HashMap<SegmentKey, CacheEntry>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SegmentKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Entry for `key` only if it was produced from exactly `source`.
    pub fn get_fresh(&self, key: &SegmentKey, source: &str) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|entry| entry.source == source)
    }

    pub fn store(&mut self, key: SegmentKey, markup: impl Into<String>, source: impl Into<String>) {
        self.entries.insert(
            key,
            CacheEntry {
                markup: markup.into(),
                source: source.into(),
            },
        );
    }

    pub fn contains(&self, key: &SegmentKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes every entry whose key is not in `keys`; returns the evicted
    /// keys in order.
    pub fn retain_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a SegmentKey>) -> Vec<SegmentKey> {
        let live: HashSet<&SegmentKey> = keys.into_iter().collect();
        let mut evicted: Vec<SegmentKey> = self
            .entries
            .keys()
            .filter(|key| !live.contains(key))
            .cloned()
            .collect();
        evicted.sort();
        for key in &evicted {
            self.entries.remove(key);
        }
        if !evicted.is_empty() {
            tracing::trace!(evicted = evicted.len(), remaining = self.entries.len(), "render cache evicted");
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
