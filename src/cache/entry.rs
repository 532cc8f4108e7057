//! Cache Entry Types
//!
//! The unit of storage shared by both tiers. Entries serialize as-is into the
//! disk record, so every field here is part of the on-disk format.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a cached payload came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOrigin {
    /// Source URL of the response
    pub url: Option<String>,
    /// Response headers at the time of caching
    pub headers: Option<BTreeMap<String, String>>,
    /// Response status code
    pub status: Option<u16>,
}

impl EntryOrigin {
    /// Origin with only a source URL
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Set the status code
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a header to the snapshot
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// Metadata carried with every entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Origin descriptor
    pub origin: EntryOrigin,
    /// Time to live, measured from creation
    pub ttl: Duration,
    /// Payload is LZ4 compressed
    pub compressed: bool,
    /// Payload is AES-GCM encrypted
    pub encrypted: bool,
    /// Size of the stored (processed) payload
    pub size_bytes: u64,
}

/// Cache entry containing the processed payload and its bookkeeping
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    key: String,
    payload: Bytes,
    /// Entry metadata
    pub metadata: EntryMetadata,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    access_count: u64,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time
    pub fn new(
        key: impl Into<String>,
        payload: Bytes,
        ttl: Duration,
        origin: EntryOrigin,
        compressed: bool,
        encrypted: bool,
    ) -> Self {
        Self::created_at(key, payload, ttl, origin, compressed, encrypted, Utc::now())
    }

    /// Create an entry with an explicit creation time
    pub fn created_at(
        key: impl Into<String>,
        payload: Bytes,
        ttl: Duration,
        origin: EntryOrigin,
        compressed: bool,
        encrypted: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let size_bytes = payload.len() as u64;
        Self {
            key: key.into(),
            payload,
            metadata: EntryMetadata {
                origin,
                ttl,
                compressed,
                encrypted,
                size_bytes,
            },
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
        }
    }

    /// Entry key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Processed payload (zero-copy)
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Stored payload size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.metadata.size_bytes
    }

    #[inline]
    pub fn created(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    #[inline]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Record a successful read and return the new count
    pub fn record_access(&mut self, now: DateTime<Utc>) -> u64 {
        self.last_accessed_at = now;
        self.access_count += 1;
        self.access_count
    }

    /// Time since creation; zero if the clock moved backwards
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Expired once the age strictly exceeds the TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > self.metadata.ttl
    }

    /// Lifetime left before expiry; zero once expired
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        self.metadata.ttl.saturating_sub(self.age(now))
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("size", &self.metadata.size_bytes)
            .field("compressed", &self.metadata.compressed)
            .field("encrypted", &self.metadata.encrypted)
            .field("access_count", &self.access_count)
            .field("created_at", &self.created_at)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
