//! Bounded FIFO cache of finalized tags.
//!
//! Keyed by everything that can change the outcome for a given text: the
//! escalation policy, the confidence threshold, and the active label set.
//! Eviction removes the single oldest-inserted entry; lookups do not refresh
//! an entry's position.

use std::collections::{HashMap, VecDeque};

use policytag_shared::{LabelSet, LlmPolicy, Tag};

/// Cache key. The threshold is stored as raw bits so the key is `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    policy: LlmPolicy,
    threshold_bits: u64,
    label_set: LabelSet,
}

impl CacheKey {
    pub fn new(text: &str, policy: LlmPolicy, threshold: f64, label_set: LabelSet) -> Self {
        Self {
            text: text.to_string(),
            policy,
            threshold_bits: threshold.to_bits(),
            label_set,
        }
    }
}

/// Hit/miss counters, reported in the run manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Explicit tag cache, constructed once and passed by `&mut` into the tagger.
///
/// Not synchronized; wrap lookup and insert in one lock if chunks are ever
/// tagged concurrently.
#[derive(Debug)]
pub struct TagCache {
    max_entries: usize,
    entries: HashMap<CacheKey, Tag>,
    order: VecDeque<CacheKey>,
    stats: CacheStats,
}

impl TagCache {
    /// `max_entries == 0` disables caching.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: HashMap::new(),
            order: VecDeque::new(),
            stats: CacheStats::default(),
        }
    }

    /// Return an owned copy of the cached tag, if any.
    pub fn get(&mut self, key: &CacheKey) -> Option<Tag> {
        match self.entries.get(key) {
            Some(tag) => {
                self.stats.hits += 1;
                Some(tag.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a tag, evicting the oldest entry when full.
    pub fn insert(&mut self, key: CacheKey, tag: Tag) {
        if self.max_entries == 0 {
            return;
        }
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = tag;
            return;
        }
        while self.entries.len() >= self.max_entries {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, tag);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
