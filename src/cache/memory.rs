//! Memory Tier - RAM-based Hot Cache
//!
//! Plain map from key to entry plus the bookkeeping the eviction engine needs.
//! No internal locking: the coordinator worker is the only owner.
//!
//! Every slot carries two ticks from a logical clock that advances on each
//! insert and touch. Wall-clock timestamps can collide for operations that
//! land in the same clock granule; the ticks keep recency ordering total.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::entry::CacheEntry;

/// An entry held by the memory tier
#[derive(Debug, Clone)]
pub struct MemorySlot {
    entry: CacheEntry,
    inserted: u64,
    touched: u64,
}

impl MemorySlot {
    #[inline]
    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    /// Logical time of insertion
    #[inline]
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Logical time of the last insert or read
    #[inline]
    pub fn touched(&self) -> u64 {
        self.touched
    }
}

/// Memory tier
#[derive(Debug, Default)]
pub struct MemoryTier {
    slots: HashMap<String, MemorySlot>,
    /// Sum of `size_bytes` over all slots
    current_size: u64,
    clock: u64,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Insert or replace; returns the replaced entry
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let tick = self.tick();
        let size = entry.size();
        let slot = MemorySlot {
            entry,
            inserted: tick,
            touched: tick,
        };

        let old = self.slots.insert(slot.entry.key().to_string(), slot);
        self.current_size += size;
        old.map(|old| {
            self.current_size -= old.entry.size();
            old.entry
        })
    }

    /// Lookup without touching access stats
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.slots.get(key).map(|slot| &slot.entry)
    }

    /// Record a read on the entry and return it
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        let tick = self.tick();
        let slot = self.slots.get_mut(key)?;
        slot.entry.record_access(now);
        slot.touched = tick;
        Some(&slot.entry)
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.slots.remove(key)?;
        self.current_size -= slot.entry.size();
        Some(slot.entry)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.current_size = 0;
    }

    pub fn keys(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// Keys of entries expired at `now`
    pub fn expired_keys(&self, now: DateTime<Utc>) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn slots(&self) -> impl Iterator<Item = &MemorySlot> {
        self.slots.values()
    }

    /// Total stored payload bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.current_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
