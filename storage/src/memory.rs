//! C9 memory manager: tracks per-id access recency/frequency and decides
//! eviction order once `max_memory_nodes` is exceeded. Eviction itself
//! (cascading through C1/C3/C8) is the caller's job; this module only
//! tracks access stats and proposes candidates.

use alayasiki_core::config::{EvictionStrategy, MemoryConfig};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
struct AccessRecord {
    id: String,
    access_count: usize,
    last_accessed: i64,
    first_seen: i64,
}

#[derive(Debug)]
pub struct MemoryManager {
    entries: VecDeque<AccessRecord>,
    index: HashMap<String, usize>,
    config: MemoryConfigHandle,
}

#[derive(Debug, Clone)]
struct MemoryConfigHandle {
    max_memory_nodes: usize,
    eviction_strategy: EvictionStrategy,
}

impl MemoryManager {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            index: HashMap::new(),
            config: MemoryConfigHandle {
                max_memory_nodes: config.max_memory_nodes,
                eviction_strategy: config.eviction_strategy,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records ingest or an explicit `markAccessed`/query-hit touch.
    pub fn record_access(&mut self, id: &str, at: i64) {
        if let Some(&pos) = self.index.get(id) {
            if let Some(entry) = self.entries.get_mut(pos) {
                entry.access_count = entry.access_count.saturating_add(1);
                entry.last_accessed = at;
                return;
            }
        }
        self.index.insert(id.to_string(), self.entries.len());
        self.entries.push_back(AccessRecord {
            id: id.to_string(),
            access_count: 1,
            last_accessed: at,
            first_seen: at,
        });
    }

    pub fn forget(&mut self, id: &str) {
        if let Some(pos) = self.index.remove(id) {
            self.entries.remove(pos);
            self.reindex_from(pos);
        }
    }

    fn reindex_from(&mut self, from: usize) {
        for (i, entry) in self.entries.iter().enumerate().skip(from) {
            self.index.insert(entry.id.clone(), i);
        }
    }

    pub fn access_frequency(&self, id: &str) -> usize {
        self.index
            .get(id)
            .and_then(|&pos| self.entries.get(pos))
            .map(|e| e.access_count)
            .unwrap_or(0)
    }

    pub fn last_accessed(&self, id: &str) -> Option<i64> {
        self.index.get(id).and_then(|&pos| self.entries.get(pos)).map(|e| e.last_accessed)
    }

    /// The ids most recently accessed, most recent first.
    pub fn recently_accessed(&self, limit: usize) -> Vec<String> {
        let mut sorted: Vec<&AccessRecord> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        sorted.into_iter().take(limit).map(|e| e.id.clone()).collect()
    }

    /// How many ids are currently over `max_memory_nodes`.
    pub fn overflow(&self) -> usize {
        self.entries.len().saturating_sub(self.config.max_memory_nodes)
    }

    /// Returns ids to evict (oldest-first per policy) to bring the tracked
    /// set back within `max_memory_nodes`. `now` matters only for the
    /// `Temporal` policy, which prioritizes the least-recently-touched
    /// entries the same way `Lru` does but additionally treats entries
    /// older than `temporal_cutoff` as immediately eligible regardless of
    /// recency.
    pub fn eviction_candidates(&self, now: i64, temporal_cutoff_age: i64) -> Vec<String> {
        let overflow = self.overflow();
        if overflow == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<&AccessRecord> = self.entries.iter().collect();
        match self.config.eviction_strategy {
            EvictionStrategy::Lru => ranked.sort_by(|a, b| a.last_accessed.cmp(&b.last_accessed)),
            EvictionStrategy::Lfu => ranked.sort_by(|a, b| a.access_count.cmp(&b.access_count)),
            EvictionStrategy::Temporal => ranked.sort_by(|a, b| {
                let a_stale = now - a.first_seen >= temporal_cutoff_age;
                let b_stale = now - b.first_seen >= temporal_cutoff_age;
                b_stale.cmp(&a_stale).then_with(|| a.last_accessed.cmp(&b.last_accessed))
            }),
        }
        ranked.into_iter().take(overflow).map(|e| e.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, strategy: EvictionStrategy) -> MemoryConfig {
        MemoryConfig { max_memory_nodes: max, eviction_strategy: strategy, persistence_enabled: true }
    }

    #[test]
    fn lru_evicts_least_recently_touched_first() {
        let mut manager = MemoryManager::new(&config(2, EvictionStrategy::Lru));
        manager.record_access("a", 1);
        manager.record_access("b", 2);
        manager.record_access("c", 3);

        let candidates = manager.eviction_candidates(3, 1_000_000);
        assert_eq!(candidates, vec!["a".to_string()]);
    }

    #[test]
    fn lfu_evicts_least_frequently_touched_first() {
        let mut manager = MemoryManager::new(&config(2, EvictionStrategy::Lfu));
        manager.record_access("a", 1);
        manager.record_access("a", 2);
        manager.record_access("b", 3);
        manager.record_access("c", 4);

        let candidates = manager.eviction_candidates(4, 1_000_000);
        assert_eq!(candidates, vec!["b".to_string()]);
    }

    #[test]
    fn forget_removes_tracking_and_reindexes() {
        let mut manager = MemoryManager::new(&config(10, EvictionStrategy::Lru));
        manager.record_access("a", 1);
        manager.record_access("b", 2);
        manager.forget("a");

        assert_eq!(manager.access_frequency("a"), 0);
        assert_eq!(manager.access_frequency("b"), 1);
    }

    #[test]
    fn no_overflow_means_no_candidates() {
        let mut manager = MemoryManager::new(&config(10, EvictionStrategy::Lru));
        manager.record_access("a", 1);
        assert!(manager.eviction_candidates(1, 1_000).is_empty());
    }
}
