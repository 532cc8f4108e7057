//! Tiered Cache Engine
//!
//! Two-tier (memory + disk) cache for response payloads with TTL expiry,
//! pluggable eviction, optional LZ4 compression and optional AES-GCM
//! encryption at rest.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │   Cache handle (Clone)        Cache handle        Maintenance task   │
//! │          │                         │                      │          │
//! │          └──────────── bounded command queue ─────────────┘          │
//! │                                    │                                 │
//! ├────────────────────────────────────▼─────────────────────────────────┤
//! │                          Coordinator worker                          │
//! │  ┌────────────────┐   ┌────────────────┐   ┌──────────────────────┐  │
//! │  │ Memory tier    │   │ Disk tier      │   │ Codec pipeline       │  │
//! │  │ HashMap +      │   │ file per key,  │   │ LZ4 then AES-GCM     │  │
//! │  │ eviction ticks │   │ atomic rename  │   │                      │  │
//! │  └────────────────┘   └────────────────┘   └──────────────────────┘  │
//! │            eviction engine (LRU / LFU / FIFO / TTL / Size)           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The worker is the only owner of tier state. Every public operation is a
//! command with a oneshot reply, so callers on any task observe a single
//! serial order of mutations.
//!
//! # Storage Modes
//!
//! - `memory`: memory tier only, nothing survives a restart
//! - `disk`: every operation goes to the cache directory
//! - `hybrid`: writes go to both tiers, disk hits are promoted into memory

pub mod codec;
pub mod config;
mod coordinator;
pub mod disk;
pub mod entry;
pub mod eviction;
pub mod memory;
pub mod metrics;

pub use codec::{Cipher, CodecPipeline};
pub use config::{parse_duration, CacheConfig, StorageMode};
pub use coordinator::{Cache, MaintenanceReport, StoreOptions};
pub use entry::{CacheEntry, EntryMetadata, EntryOrigin};
pub use eviction::EvictionPolicy;
pub use metrics::CacheStatistics;

/// Default memory tier budget (64MB)
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 64 * 1024 * 1024;

/// Default disk tier budget (1GB)
pub const DEFAULT_MAX_DISK_BYTES: u64 = 1024 * 1024 * 1024;

/// Default entry lifetime (1 hour)
pub const DEFAULT_TTL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Default background maintenance period
pub const DEFAULT_MAINTENANCE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Payloads smaller than this are never compressed
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024; // 1KB

/// Version tag written into every disk record
pub const DISK_FORMAT_VERSION: u16 = 1;

/// Eviction stops once memory usage is at or below this share of the budget
pub const EVICTION_TARGET_PERCENT: u64 = 75;

// =============================================================================
// Tests
// =============================================================================
