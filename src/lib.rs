//! Tiercache - Two-Tier Response Cache
//!
//! Caches response payloads in memory, on local disk, or both, with per-entry
//! TTLs, pluggable eviction, LZ4 compression and optional AES-256-GCM
//! encryption at rest.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tiercache::{Cache, CacheConfig, StoreOptions};
//!
//! # async fn demo() -> tiercache::Result<()> {
//! let cache = Cache::open(CacheConfig::hybrid("./cache")).await?;
//!
//! cache.store("GET /users", r#"[{"id":1}]"#).await?;
//! cache
//!     .store_with("GET /health", "ok", StoreOptions::ttl(Duration::from_secs(5)))
//!     .await?;
//!
//! if let Some(body) = cache.retrieve("GET /users").await? {
//!     println!("{} bytes", body.len());
//! }
//!
//! let stats = cache.statistics().await?;
//! println!("hit rate {:.2}", stats.hit_rate);
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Tiers, codec, eviction and the coordinator
//! - [`error`] - Error types
//! - [`telemetry`] - Logging setup

pub mod cache;
pub mod error;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{
    Cache, CacheConfig, CacheStatistics, EntryMetadata, EntryOrigin, EvictionPolicy,
    MaintenanceReport, StorageMode, StoreOptions,
};
pub use error::{Error, Result};
