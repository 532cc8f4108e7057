//! Cache Coordinator - Single-Writer Tier Orchestration
//!
//! [`Cache`] is a cheap, cloneable handle. Every operation is sent as a
//! command over a bounded queue to one worker task that owns the memory
//! tier, the disk tier, the codec and the counters. Each command runs to
//! completion before the next is taken, which gives callers on any task a
//! single serial order of mutations without locks around tier state.
//!
//! The maintenance task talks to the worker through the same queue and
//! submits each sweep step as its own command, so a maintenance cycle never
//! holds the worker across steps.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::codec::{Cipher, CodecPipeline};
use super::config::{CacheConfig, StorageMode};
use super::disk::{DiskTier, DiskUsage};
use super::entry::{CacheEntry, EntryMetadata, EntryOrigin};
use super::eviction;
use super::memory::MemoryTier;
use super::metrics::{CacheMetrics, CacheStatistics, HitTier, LatencyTracker, TierGauges};
use crate::error::{Error, Result};

/// Commands buffered before `send` applies backpressure
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Per-call store options
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Overrides the configured default TTL
    pub ttl: Option<Duration>,
    /// Origin descriptor kept with the entry
    pub origin: Option<EntryOrigin>,
}

impl StoreOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: EntryOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// What one maintenance cycle removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Expired memory entries removed
    pub expired: u64,
    /// Memory entries evicted for space
    pub evicted: u64,
    /// Disk files removed by the age sweep and the disk budget
    pub disk_swept: u64,
}

impl MaintenanceReport {
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.evicted == 0 && self.disk_swept == 0
    }
}

enum Command {
    Store {
        key: String,
        payload: Bytes,
        options: StoreOptions,
        reply: oneshot::Sender<()>,
    },
    Retrieve {
        key: String,
        reply: oneshot::Sender<Option<Bytes>>,
    },
    Remove {
        key: String,
        reply: oneshot::Sender<()>,
    },
    ClearAll {
        reply: oneshot::Sender<()>,
    },
    PurgeMemory {
        reply: oneshot::Sender<()>,
    },
    Metadata {
        key: String,
        reply: oneshot::Sender<Option<EntryMetadata>>,
    },
    MemoryContains {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    Keys {
        reply: oneshot::Sender<Vec<String>>,
    },
    Preload {
        keys: Vec<String>,
        reply: oneshot::Sender<usize>,
    },
    Statistics {
        reply: oneshot::Sender<CacheStatistics>,
    },
    SweepExpired {
        reply: oneshot::Sender<u64>,
    },
    Evict {
        reply: oneshot::Sender<u64>,
    },
    SweepDisk {
        reply: oneshot::Sender<u64>,
    },
}

// =============================================================================
// Handle
// =============================================================================

/// Tiered cache handle
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
}

struct Shared {
    tx: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    config: CacheConfig,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: stop the worker and the maintenance task
        self.shutdown.cancel();
    }
}

impl Cache {
    /// Validate `config`, open the tiers and start the worker and maintenance
    /// tasks. Must be called from within a tokio runtime.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let disk = if config.storage_mode.uses_disk() {
            Some(DiskTier::open(&config.cache_dir).await?)
        } else {
            None
        };
        let cipher = config.encryption.then(Cipher::generate);
        let codec = CodecPipeline::new(config.compression, config.compression_threshold, cipher);

        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let shutdown = CancellationToken::new();

        let worker = CacheWorker {
            config: config.clone(),
            memory: MemoryTier::new(),
            disk,
            codec,
            metrics: CacheMetrics::new(),
        };
        let worker_task = tokio::spawn(worker.run(rx, shutdown.clone()));
        let maintenance_task = tokio::spawn(run_maintenance_loop(
            tx.clone(),
            config.maintenance_interval,
            shutdown.clone(),
        ));

        info!(
            mode = %config.storage_mode,
            policy = %config.eviction_policy,
            max_memory_bytes = config.max_memory_bytes,
            max_disk_bytes = config.max_disk_bytes,
            compression = config.compression,
            encryption = config.encryption,
            "Cache opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                tx,
                shutdown,
                tasks: Mutex::new(vec![worker_task, maintenance_task]),
                config,
            }),
        })
    }

    /// Configuration this instance was opened with
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        request(&self.shared.tx, make).await
    }

    /// Store `payload` under `key` with the default TTL
    pub async fn store(&self, key: impl Into<String>, payload: impl Into<Bytes>) -> Result<()> {
        self.store_with(key, payload, StoreOptions::default()).await
    }

    /// Store with an explicit TTL and/or origin
    pub async fn store_with(
        &self,
        key: impl Into<String>,
        payload: impl Into<Bytes>,
        options: StoreOptions,
    ) -> Result<()> {
        let (key, payload) = (key.into(), payload.into());
        self.request(|reply| Command::Store {
            key,
            payload,
            options,
            reply,
        })
        .await
    }

    /// Raw payload for `key`, or `None` on a miss
    pub async fn retrieve(&self, key: impl Into<String>) -> Result<Option<Bytes>> {
        let key = key.into();
        self.request(|reply| Command::Retrieve { key, reply }).await
    }

    /// Delete `key` from every active tier
    pub async fn remove(&self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        self.request(|reply| Command::Remove { key, reply }).await
    }

    /// Empty both tiers and reset all counters
    pub async fn clear_all(&self) -> Result<()> {
        self.request(|reply| Command::ClearAll { reply }).await
    }

    /// Drop the memory tier only; disk records and counters are kept
    pub async fn purge_memory(&self) -> Result<()> {
        self.request(|reply| Command::PurgeMemory { reply }).await
    }

    /// Whether a fresh entry exists in any tier. Does not count an access.
    pub async fn contains(&self, key: impl Into<String>) -> Result<bool> {
        Ok(self.metadata(key).await?.is_some())
    }

    /// Whether the memory tier currently holds `key`
    pub async fn memory_contains(&self, key: impl Into<String>) -> Result<bool> {
        let key = key.into();
        self.request(|reply| Command::MemoryContains { key, reply })
            .await
    }

    /// Metadata of a fresh entry. Does not count an access.
    pub async fn metadata(&self, key: impl Into<String>) -> Result<Option<EntryMetadata>> {
        let key = key.into();
        self.request(|reply| Command::Metadata { key, reply }).await
    }

    /// Keys held by the memory tier
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.request(|reply| Command::Keys { reply }).await
    }

    /// Promote fresh disk entries into memory; returns how many were promoted.
    /// Only meaningful in hybrid mode.
    pub async fn preload<I, K>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.request(|reply| Command::Preload { keys, reply }).await
    }

    pub async fn statistics(&self) -> Result<CacheStatistics> {
        self.request(|reply| Command::Statistics { reply }).await
    }

    /// Run one maintenance cycle now
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        maintenance_cycle(&self.shared.tx).await
    }

    /// Stop maintenance and the worker, then wait for both. Later calls on
    /// any clone of this handle return [`Error::Closed`].
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.shared.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Cache task ended abnormally: {}", e);
            }
        }
        info!("Cache shut down");
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("mode", &self.shared.config.storage_mode)
            .field("closed", &self.shared.shutdown.is_cancelled())
            .finish()
    }
}

async fn request<T>(
    tx: &mpsc::Sender<Command>,
    make: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T> {
    let (reply, rx) = oneshot::channel();
    tx.send(make(reply)).await.map_err(|_| Error::Closed)?;
    rx.await.map_err(|_| Error::Closed)
}

// =============================================================================
// Maintenance
// =============================================================================

async fn maintenance_cycle(tx: &mpsc::Sender<Command>) -> Result<MaintenanceReport> {
    let expired = request(tx, |reply| Command::SweepExpired { reply }).await?;
    let evicted = request(tx, |reply| Command::Evict { reply }).await?;
    let disk_swept = request(tx, |reply| Command::SweepDisk { reply }).await?;
    Ok(MaintenanceReport {
        expired,
        evicted,
        disk_swept,
    })
}

async fn run_maintenance_loop(
    tx: mpsc::Sender<Command>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {}
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = maintenance_cycle(&tx) => match result {
                Ok(report) if report.is_empty() => {}
                Ok(report) => debug!(
                    expired = report.expired,
                    evicted = report.evicted,
                    disk_swept = report.disk_swept,
                    "Maintenance cycle complete"
                ),
                Err(_) => break,
            },
        }
    }
    debug!("Maintenance task stopped");
}

// =============================================================================
// Worker
// =============================================================================

struct CacheWorker {
    config: CacheConfig,
    memory: MemoryTier,
    disk: Option<DiskTier>,
    codec: CodecPipeline,
    metrics: CacheMetrics,
}

impl CacheWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }
        debug!("Cache worker stopped");
    }

    async fn handle(&mut self, command: Command) {
        // A dropped reply receiver just means the caller went away
        match command {
            Command::Store {
                key,
                payload,
                options,
                reply,
            } => {
                self.store(key, payload, options).await;
                let _ = reply.send(());
            }
            Command::Retrieve { key, reply } => {
                let _ = reply.send(self.retrieve(&key).await);
            }
            Command::Remove { key, reply } => {
                self.remove(&key).await;
                let _ = reply.send(());
            }
            Command::ClearAll { reply } => {
                self.clear_all().await;
                let _ = reply.send(());
            }
            Command::PurgeMemory { reply } => {
                self.memory.clear();
                let _ = reply.send(());
            }
            Command::Metadata { key, reply } => {
                let _ = reply.send(self.peek(&key).await);
            }
            Command::MemoryContains { key, reply } => {
                let _ = reply.send(self.memory.contains(&key));
            }
            Command::Keys { reply } => {
                let _ = reply.send(self.memory.keys());
            }
            Command::Preload { keys, reply } => {
                let _ = reply.send(self.preload(keys).await);
            }
            Command::Statistics { reply } => {
                let _ = reply.send(self.statistics().await);
            }
            Command::SweepExpired { reply } => {
                let _ = reply.send(self.sweep_expired(Utc::now()));
            }
            Command::Evict { reply } => {
                let _ = reply.send(self.evict(Utc::now()));
            }
            Command::SweepDisk { reply } => {
                let _ = reply.send(self.sweep_disk().await);
            }
        }
    }

    #[instrument(skip(self, payload, options), fields(size = payload.len()))]
    async fn store(&mut self, key: String, payload: Bytes, options: StoreOptions) {
        let encoded = self.codec.encode(&payload);
        let entry = CacheEntry::new(
            key,
            encoded.payload,
            options.ttl.unwrap_or(self.config.default_ttl),
            options.origin.unwrap_or_default(),
            encoded.compressed,
            encoded.encrypted,
        );

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.write(&entry).await {
                warn!(key = entry.key(), "Disk tier write failed: {}", e);
            }
        }

        if self.config.storage_mode.uses_memory() {
            self.memory.insert(entry);
            self.evict(Utc::now());
        }
    }

    async fn retrieve(&mut self, key: &str) -> Option<Bytes> {
        let tracker = LatencyTracker::start();
        let result = self.lookup(key).await;
        self.metrics.record_access_latency(tracker.elapsed());
        result
    }

    #[instrument(skip(self))]
    async fn lookup(&mut self, key: &str) -> Option<Bytes> {
        let now = Utc::now();

        if let Some(expired) = self.memory.get(key).map(|entry| entry.is_expired(now)) {
            if expired {
                self.memory.remove(key);
                self.metrics.record_evictions(1);
                self.metrics.record_miss();
                debug!("Memory tier entry expired");
                return None;
            }

            let entry = self.memory.touch(key, now)?;
            let decoded = self.codec.decode(
                entry.payload(),
                entry.metadata.compressed,
                entry.metadata.encrypted,
            );
            return match decoded {
                Ok(raw) => {
                    self.metrics.record_hit(HitTier::Memory);
                    debug!("Memory tier hit");
                    Some(raw)
                }
                Err(e) => {
                    warn!("Purging undecodable memory entry: {}", e);
                    self.memory.remove(key);
                    self.metrics.record_corruption();
                    self.metrics.record_miss();
                    None
                }
            };
        }

        let Some(disk) = self.disk.clone() else {
            self.metrics.record_miss();
            debug!("Miss");
            return None;
        };

        let mut entry = match disk.read(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.metrics.record_miss();
                debug!("Miss");
                return None;
            }
            Err(e) => {
                self.report_disk_error(key, &e);
                self.metrics.record_miss();
                return None;
            }
        };

        if entry.is_expired(now) {
            self.delete_from_disk(&disk, key).await;
            self.metrics.record_miss();
            debug!("Disk tier entry expired");
            return None;
        }

        let raw = match self.codec.decode(
            entry.payload(),
            entry.metadata.compressed,
            entry.metadata.encrypted,
        ) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Purging undecodable disk record: {}", e);
                self.delete_from_disk(&disk, key).await;
                self.metrics.record_corruption();
                self.metrics.record_miss();
                return None;
            }
        };

        self.metrics.record_hit(HitTier::Disk);
        debug!("Disk tier hit");

        if self.config.storage_mode == StorageMode::Hybrid {
            entry.record_access(now);
            self.promote(entry, now);
        }
        Some(raw)
    }

    fn promote(&mut self, entry: CacheEntry, now: DateTime<Utc>) {
        debug!(key = entry.key(), "Promoting to memory tier");
        self.memory.insert(entry);
        self.metrics.record_promotion();
        self.evict(now);
    }

    #[instrument(skip(self))]
    async fn remove(&mut self, key: &str) {
        self.memory.remove(key);
        if let Some(disk) = self.disk.clone() {
            self.delete_from_disk(&disk, key).await;
        }
    }

    async fn clear_all(&mut self) {
        self.memory.clear();
        if let Some(disk) = &self.disk {
            match disk.delete_all().await {
                Ok(removed) => debug!(removed, "Cleared disk tier"),
                Err(e) => warn!("Failed to clear disk tier: {}", e),
            }
        }
        self.metrics.reset();
        info!("Cache cleared");
    }

    /// Metadata of a fresh entry without recording an access
    async fn peek(&mut self, key: &str) -> Option<EntryMetadata> {
        let now = Utc::now();
        if let Some(entry) = self.memory.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.metadata.clone());
            }
        }

        let disk = self.disk.clone()?;
        match disk.read(key).await {
            Ok(Some(entry)) if !entry.is_expired(now) => Some(entry.metadata),
            Ok(_) => None,
            Err(e) => {
                self.report_disk_error(key, &e);
                None
            }
        }
    }

    #[instrument(skip(self, keys), fields(requested = keys.len()))]
    async fn preload(&mut self, keys: Vec<String>) -> usize {
        if self.config.storage_mode != StorageMode::Hybrid {
            return 0;
        }
        let Some(disk) = self.disk.clone() else {
            return 0;
        };

        let mut promoted = 0;
        for key in keys {
            let now = Utc::now();
            if self.memory.get(&key).is_some_and(|e| !e.is_expired(now)) {
                continue;
            }
            match disk.read(&key).await {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    self.promote(entry, now);
                    promoted += 1;
                }
                Ok(_) => {}
                Err(e) => self.report_disk_error(&key, &e),
            }
        }
        debug!(promoted, "Preload complete");
        promoted
    }

    async fn statistics(&self) -> CacheStatistics {
        let disk_usage = match &self.disk {
            Some(disk) => disk.usage().await.unwrap_or_else(|e| {
                warn!("Failed to measure disk tier: {}", e);
                DiskUsage::default()
            }),
            None => DiskUsage::default(),
        };
        let disk_only_entries = if self.config.storage_mode == StorageMode::Disk {
            disk_usage.files
        } else {
            0
        };

        self.metrics.snapshot(TierGauges {
            memory_entries: self.memory.len() as u64,
            memory_bytes: self.memory.size(),
            disk_entries: disk_usage.files,
            disk_bytes: disk_usage.bytes,
            disk_only_entries,
        })
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) -> u64 {
        let expired = self.memory.expired_keys(now);
        for key in &expired {
            self.memory.remove(key);
        }
        let count = expired.len() as u64;
        self.metrics.record_evictions(count);
        count
    }

    fn evict(&mut self, now: DateTime<Utc>) -> u64 {
        let outcome = eviction::evict(
            &mut self.memory,
            self.config.eviction_policy,
            self.config.max_memory_bytes,
            self.config.memory_target_bytes(),
            now,
        );
        self.metrics.record_evictions(outcome.count());
        outcome.count()
    }

    async fn sweep_disk(&mut self) -> u64 {
        let Some(disk) = &self.disk else {
            return 0;
        };

        let aged = disk
            .sweep(self.config.default_ttl)
            .await
            .unwrap_or_else(|e| {
                warn!("Disk age sweep failed: {}", e);
                0
            });
        let trimmed = disk
            .enforce_budget(self.config.max_disk_bytes)
            .await
            .unwrap_or_else(|e| {
                warn!("Disk budget enforcement failed: {}", e);
                0
            });
        aged + trimmed
    }

    async fn delete_from_disk(&self, disk: &DiskTier, key: &str) {
        if let Err(e) = disk.delete(key).await {
            warn!(key, "Disk tier delete failed: {}", e);
        }
    }

    fn report_disk_error(&mut self, key: &str, e: &Error) {
        if e.is_corruption() {
            self.metrics.record_corruption();
            warn!(key, "Purged corrupt disk record: {}", e);
        } else {
            warn!(key, "Disk tier read failed: {}", e);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
