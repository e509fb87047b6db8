//! Per-session bundle cache
//!
//! Bounded LRU keyed by `(bundle id, tier)`. The two tiers of one bundle are
//! separate entries and never satisfy each other. A cache belongs to exactly
//! one session and is dropped with it.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::loader::LoadedBundle;
use capload_types::{CandidateId, Tier};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

/// One cached bundle tier
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Bundle id
    pub bundle_id: CandidateId,
    /// Tier held by this entry
    pub tier: Tier,
    /// Loaded content and metadata
    pub bundle: LoadedBundle,
    /// When the entry was inserted
    pub loaded_at: DateTime<Utc>,
}

impl CacheEntry {
    fn matches(&self, bundle_id: &CandidateId, tier: Tier) -> bool {
        self.tier == tier && &self.bundle_id == bundle_id
    }
}

/// Bounded LRU of loaded bundles
#[derive(Debug)]
pub struct BundleCache {
    /// Least recently used at the front
    entries: VecDeque<CacheEntry>,
    capacity: usize,
}

impl BundleCache {
    /// Empty cache bounded by `config.capacity`
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            entries: VecDeque::with_capacity(config.capacity),
            capacity: config.capacity,
        })
    }

    /// Look up an entry and mark it most recently used
    pub fn get(&mut self, bundle_id: &CandidateId, tier: Tier) -> Option<&CacheEntry> {
        let index = self.position(bundle_id, tier)?;
        let entry = self.entries.remove(index)?;
        self.entries.push_back(entry);
        self.entries.back()
    }

    /// Look up an entry without touching recency
    #[must_use]
    pub fn peek(&self, bundle_id: &CandidateId, tier: Tier) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.matches(bundle_id, tier))
    }

    /// Insert a loaded bundle as most recently used
    ///
    /// An entry with the same key is replaced. Returns the entry evicted to
    /// stay within capacity, if any.
    pub fn insert(&mut self, bundle: LoadedBundle) -> Option<CacheEntry> {
        let entry = CacheEntry {
            bundle_id: bundle.id.clone(),
            tier: bundle.tier,
            bundle,
            loaded_at: Utc::now(),
        };

        if let Some(index) = self.position(&entry.bundle_id, entry.tier) {
            self.entries.remove(index);
        }
        self.entries.push_back(entry);

        if self.entries.len() > self.capacity {
            let evicted = self.entries.pop_front()?;
            debug!(
                "Evicted {} tier of bundle '{}' from session cache",
                evicted.tier, evicted.bundle_id
            );
            return Some(evicted);
        }
        None
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured bound
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, bundle_id: &CandidateId, tier: Tier) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(bundle_id, tier))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bundle::parse_metadata;

    fn bundle(id: &str, tier: Tier, content: &str) -> LoadedBundle {
        let header = format!("id: {id}\nversion: 1.0.0\nprofile: {id}\n");
        LoadedBundle {
            id: CandidateId::new(id),
            tier,
            content: content.to_string(),
            metadata: parse_metadata(id, &header).unwrap(),
            removals: Vec::new(),
        }
    }

    fn cache(capacity: usize) -> BundleCache {
        BundleCache::new(CacheConfig { capacity }).unwrap()
    }

    #[test]
    fn test_tiers_are_separate_slots() {
        let mut cache = cache(3);
        cache.insert(bundle("react", Tier::Summary, "short"));

        let id = CandidateId::new("react");
        assert!(cache.get(&id, Tier::Detail).is_none());
        assert_eq!(
            cache.get(&id, Tier::Summary).unwrap().bundle.content,
            "short"
        );

        cache.insert(bundle("react", Tier::Detail, "long"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&id, Tier::Detail).unwrap().bundle.content, "long");
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = cache(3);
        assert!(cache.insert(bundle("a", Tier::Summary, "a")).is_none());
        assert!(cache.insert(bundle("b", Tier::Summary, "b")).is_none());
        assert!(cache.insert(bundle("c", Tier::Summary, "c")).is_none());

        // Touch "a" so "b" becomes least recently used
        cache.get(&CandidateId::new("a"), Tier::Summary).unwrap();

        let evicted = cache.insert(bundle("d", Tier::Summary, "d")).unwrap();
        assert_eq!(evicted.bundle_id.as_str(), "b");
        assert_eq!(cache.len(), 3);
        assert!(cache.peek(&CandidateId::new("b"), Tier::Summary).is_none());
        assert!(cache.peek(&CandidateId::new("a"), Tier::Summary).is_some());
    }

    #[test]
    fn test_peek_does_not_touch_recency() {
        let mut cache = cache(2);
        cache.insert(bundle("a", Tier::Summary, "a"));
        cache.insert(bundle("b", Tier::Summary, "b"));

        cache.peek(&CandidateId::new("a"), Tier::Summary).unwrap();
        let evicted = cache.insert(bundle("c", Tier::Summary, "c")).unwrap();
        assert_eq!(evicted.bundle_id.as_str(), "a");
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut cache = cache(2);
        cache.insert(bundle("a", Tier::Summary, "old"));
        assert!(cache.insert(bundle("a", Tier::Summary, "new")).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache
                .peek(&CandidateId::new("a"), Tier::Summary)
                .unwrap()
                .bundle
                .content,
            "new"
        );

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(BundleCache::new(CacheConfig { capacity: 0 }).is_err());
    }
}
