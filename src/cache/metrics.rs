//! Cache Metrics Collection
//!
//! Counters owned by the coordinator worker and the immutable snapshot handed
//! to statistics consumers.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Where a hit was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTier {
    Memory,
    Disk,
}

/// Cache counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    memory_hits: u64,
    disk_hits: u64,
    misses: u64,
    evictions: u64,
    promotions: u64,
    corruptions: u64,

    // Retrieve latency (sum + count for the mean)
    access_latency_total: Duration,
    access_samples: u64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self, tier: HitTier) {
        match tier {
            HitTier::Memory => self.memory_hits += 1,
            HitTier::Disk => self.disk_hits += 1,
        }
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }

    pub fn record_promotion(&mut self) {
        self.promotions += 1;
    }

    pub fn record_corruption(&mut self) {
        self.corruptions += 1;
    }

    pub fn record_access_latency(&mut self, duration: Duration) {
        self.access_latency_total += duration;
        self.access_samples += 1;
    }

    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// hits / (hits + misses); 0.0 before any access
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Mean retrieve latency; zero before any access
    pub fn average_access_latency(&self) -> Duration {
        if self.access_samples == 0 {
            return Duration::ZERO;
        }
        let nanos = self.access_latency_total.as_nanos() / self.access_samples as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Zero every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Snapshot combining counters with tier gauges supplied by the caller
    pub fn snapshot(&self, gauges: TierGauges) -> CacheStatistics {
        CacheStatistics {
            entry_count: gauges.memory_entries + gauges.disk_only_entries,
            memory_entries: gauges.memory_entries,
            disk_entries: gauges.disk_entries,
            memory_usage: gauges.memory_bytes,
            disk_usage: gauges.disk_bytes,
            hits: self.hits(),
            memory_hits: self.memory_hits,
            disk_hits: self.disk_hits,
            misses: self.misses,
            evictions: self.evictions,
            promotions: self.promotions,
            corruptions: self.corruptions,
            hit_rate: self.hit_rate(),
            average_access_latency: self.average_access_latency(),
        }
    }
}

/// Tier sizes measured at snapshot time
#[derive(Debug, Clone, Copy, Default)]
pub struct TierGauges {
    pub memory_entries: u64,
    pub memory_bytes: u64,
    pub disk_entries: u64,
    pub disk_bytes: u64,
    /// Entries counted only on disk (disk-only mode)
    pub disk_only_entries: u64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatistics {
    /// Live entries: the memory tier, or the disk tier in disk-only mode
    pub entry_count: u64,
    pub memory_entries: u64,
    pub disk_entries: u64,
    /// Bytes held by the memory tier
    pub memory_usage: u64,
    /// Bytes held by the disk tier
    pub disk_usage: u64,
    pub hits: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub promotions: u64,
    pub corruptions: u64,
    pub hit_rate: f64,
    pub average_access_latency: Duration,
}

/// Latency tracker for timing operations
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================
