//! Memory Tier Eviction
//!
//! Runs when memory usage exceeds the budget and removes victims in policy
//! order until usage is at or below the target (75% of the budget). The gap
//! between trigger and target keeps back-to-back inserts from evicting one
//! entry each.
//!
//! Eviction only ever touches the memory tier; in hybrid mode the disk copy
//! survives and can be promoted again later.

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::memory::{MemorySlot, MemoryTier};

/// Victim ordering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed first
    #[default]
    Lru,
    /// Least frequently accessed first
    Lfu,
    /// Oldest insertion first
    Fifo,
    /// Closest to (or past) expiry first
    Ttl,
    /// Largest payload first
    Size,
}

impl EvictionPolicy {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Lfu => "LFU",
            EvictionPolicy::Fifo => "FIFO",
            EvictionPolicy::Ttl => "TTL",
            EvictionPolicy::Size => "Size",
        }
    }

    /// Compare two slots; `Less` means `a` is evicted before `b`
    fn compare(&self, a: &MemorySlot, b: &MemorySlot, now: DateTime<Utc>) -> Ordering {
        let (ea, eb) = (a.entry(), b.entry());
        match self {
            EvictionPolicy::Lru => (ea.last_accessed(), a.touched())
                .cmp(&(eb.last_accessed(), b.touched())),
            EvictionPolicy::Lfu => (ea.access_count(), a.touched())
                .cmp(&(eb.access_count(), b.touched())),
            EvictionPolicy::Fifo => (ea.created(), a.inserted()).cmp(&(eb.created(), b.inserted())),
            EvictionPolicy::Ttl => (ea.remaining_ttl(now), a.inserted())
                .cmp(&(eb.remaining_ttl(now), b.inserted())),
            EvictionPolicy::Size => {
                (Reverse(ea.size()), a.inserted()).cmp(&(Reverse(eb.size()), b.inserted()))
            }
        }
    }

    /// Keys in eviction order
    pub fn victim_order(&self, tier: &MemoryTier, now: DateTime<Utc>) -> Vec<String> {
        let mut slots: Vec<&MemorySlot> = tier.slots().collect();
        slots.sort_by(|a, b| self.compare(a, b, now));
        slots
            .into_iter()
            .map(|slot| slot.entry().key().to_string())
            .collect()
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Evicted keys, in eviction order
    pub evicted: Vec<String>,
    /// Bytes released from the memory tier
    pub freed_bytes: u64,
}

impl EvictionOutcome {
    pub fn count(&self) -> u64 {
        self.evicted.len() as u64
    }
}

/// Evict from `tier` if it holds more than `max_bytes`, stopping as soon as
/// usage is at or below `target_bytes`.
pub fn evict(
    tier: &mut MemoryTier,
    policy: EvictionPolicy,
    max_bytes: u64,
    target_bytes: u64,
    now: DateTime<Utc>,
) -> EvictionOutcome {
    let mut outcome = EvictionOutcome::default();
    if tier.size() <= max_bytes {
        return outcome;
    }

    let mut usage = tier.size();
    for key in policy.victim_order(tier, now) {
        if usage <= target_bytes {
            break;
        }
        if let Some(entry) = tier.remove(&key) {
            usage -= entry.size();
            outcome.freed_bytes += entry.size();
            outcome.evicted.push(key);
        }
    }

    tracing::debug!(
        policy = %policy,
        evicted = outcome.evicted.len(),
        freed_bytes = outcome.freed_bytes,
        usage,
        "Evicted memory tier entries"
    );
    outcome
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{CacheEntry, EntryOrigin};
    use bytes::Bytes;
    use std::time::Duration;

    fn make_entry(key: &str, size: usize, ttl: Duration, created: DateTime<Utc>) -> CacheEntry {
        CacheEntry::created_at(
            key,
            Bytes::from(vec![0u8; size]),
            ttl,
            EntryOrigin::default(),
            false,
            false,
            created,
        )
    }

    fn tier_of(entries: Vec<CacheEntry>) -> MemoryTier {
        let mut tier = MemoryTier::new();
        for entry in entries {
            tier.insert(entry);
        }
        tier
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_no_eviction_under_budget() {
        let now = Utc::now();
        let mut tier = tier_of(vec![
            make_entry("a", 100, HOUR, now),
            make_entry("b", 100, HOUR, now),
        ]);

        let outcome = evict(&mut tier, EvictionPolicy::Lru, 200, 150, now);
        assert_eq!(outcome, EvictionOutcome::default());
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn test_eviction_reaches_target() {
        let now = Utc::now();
        let entries = (0..10)
            .map(|i| make_entry(&format!("k{}", i), 100, HOUR, now))
            .collect();
        let mut tier = tier_of(entries);

        let outcome = evict(&mut tier, EvictionPolicy::Fifo, 800, 600, now);
        assert_eq!(outcome.count(), 4);
        assert_eq!(outcome.freed_bytes, 400);
        assert_eq!(tier.size(), 600);
        // Insertion ticks break the identical creation timestamps
        assert_eq!(outcome.evicted, vec!["k0", "k1", "k2", "k3"]);
    }

    #[test]
    fn test_lru_order() {
        let now = Utc::now();
        let mut tier = tier_of(vec![
            make_entry("a", 10, HOUR, now),
            make_entry("b", 10, HOUR, now),
            make_entry("c", 10, HOUR, now),
        ]);
        tier.touch("a", now + secs(1));
        tier.touch("c", now + secs(2));

        assert_eq!(
            EvictionPolicy::Lru.victim_order(&tier, now),
            vec!["b", "a", "c"]
        );
    }

    #[test]
    fn test_lru_same_instant_uses_touch_order() {
        let now = Utc::now();
        let mut tier = tier_of(vec![
            make_entry("a", 10, HOUR, now),
            make_entry("b", 10, HOUR, now),
        ]);
        tier.touch("a", now);

        assert_eq!(EvictionPolicy::Lru.victim_order(&tier, now), vec!["b", "a"]);
    }

    #[test]
    fn test_lfu_order() {
        let now = Utc::now();
        let mut tier = tier_of(vec![
            make_entry("hot", 10, HOUR, now),
            make_entry("warm", 10, HOUR, now),
            make_entry("cold", 10, HOUR, now),
        ]);
        for _ in 0..5 {
            tier.touch("hot", now);
        }
        tier.touch("warm", now);

        assert_eq!(
            EvictionPolicy::Lfu.victim_order(&tier, now),
            vec!["cold", "warm", "hot"]
        );
    }

    #[test]
    fn test_fifo_order_by_creation() {
        let now = Utc::now();
        // Inserted newest first; creation time decides
        let tier = tier_of(vec![
            make_entry("new", 10, HOUR, now),
            make_entry("mid", 10, HOUR, now - secs(10)),
            make_entry("old", 10, HOUR, now - secs(20)),
        ]);

        assert_eq!(
            EvictionPolicy::Fifo.victim_order(&tier, now),
            vec!["old", "mid", "new"]
        );
    }

    #[test]
    fn test_ttl_order_closest_to_expiry_first() {
        let now = Utc::now();
        let tier = tier_of(vec![
            make_entry("long", 10, Duration::from_secs(1000), now),
            make_entry("expired", 10, Duration::from_secs(5), now - secs(60)),
            make_entry("short", 10, Duration::from_secs(30), now),
        ]);

        assert_eq!(
            EvictionPolicy::Ttl.victim_order(&tier, now),
            vec!["expired", "short", "long"]
        );
    }

    #[test]
    fn test_ttl_equal_lifetimes_is_age_descending() {
        let now = Utc::now();
        let tier = tier_of(vec![
            make_entry("young", 10, HOUR, now),
            make_entry("old", 10, HOUR, now - secs(600)),
        ]);

        assert_eq!(
            EvictionPolicy::Ttl.victim_order(&tier, now),
            vec!["old", "young"]
        );
    }

    #[test]
    fn test_size_order_largest_first() {
        let now = Utc::now();
        let mut tier = tier_of(vec![
            make_entry("small", 10, HOUR, now),
            make_entry("large", 1000, HOUR, now),
            make_entry("medium", 100, HOUR, now),
        ]);

        assert_eq!(
            EvictionPolicy::Size.victim_order(&tier, now),
            vec!["large", "medium", "small"]
        );

        // One large victim frees enough
        let outcome = evict(&mut tier, EvictionPolicy::Size, 1000, 750, now);
        assert_eq!(outcome.evicted, vec!["large"]);
        assert_eq!(tier.size(), 110);
    }

    #[test]
    fn test_policy_names_and_serde() {
        assert_eq!(EvictionPolicy::Lru.to_string(), "LRU");
        assert_eq!(EvictionPolicy::Size.name(), "Size");
        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Lru);

        let parsed: EvictionPolicy = serde_json::from_str("\"ttl\"").unwrap();
        assert_eq!(parsed, EvictionPolicy::Ttl);
    }
}
