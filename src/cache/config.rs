//! Cache Configuration
//!
//! Immutable settings for a [`Cache`](super::Cache) instance. Budgets and
//! intervals are validated once at construction; a running coordinator never
//! re-checks them.
//!
//! Durations in config files are human strings: `"500ms"`, `"30s"`, `"5m"`,
//! `"1h30m"`, `"7d"`. A bare number is read as seconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::eviction::EvictionPolicy;
use super::{
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_MAINTENANCE_INTERVAL, DEFAULT_MAX_DISK_BYTES,
    DEFAULT_MAX_MEMORY_BYTES, DEFAULT_TTL, EVICTION_TARGET_PERCENT,
};
use crate::error::{Error, Result};

/// Which tiers an instance reads from and writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Memory tier only; nothing touches the filesystem
    Memory,
    /// Disk tier only
    Disk,
    /// Write to both tiers, promote disk hits into memory
    #[default]
    Hybrid,
}

impl StorageMode {
    /// Whether the memory tier is active
    pub fn uses_memory(&self) -> bool {
        matches!(self, StorageMode::Memory | StorageMode::Hybrid)
    }

    /// Whether the disk tier is active
    pub fn uses_disk(&self) -> bool {
        matches!(self, StorageMode::Disk | StorageMode::Hybrid)
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Memory => write!(f, "memory"),
            StorageMode::Disk => write!(f, "disk"),
            StorageMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Active tiers
    pub storage_mode: StorageMode,
    /// Victim ordering used when the memory tier is over budget
    pub eviction_policy: EvictionPolicy,
    /// Memory tier budget in bytes (sum of stored payload sizes)
    pub max_memory_bytes: u64,
    /// Disk tier budget in bytes (sum of file sizes)
    pub max_disk_bytes: u64,
    /// TTL applied when `store` is not given one; also the disk sweep age
    #[serde(with = "duration_str")]
    pub default_ttl: Duration,
    /// Period of the background maintenance task
    #[serde(with = "duration_str")]
    pub maintenance_interval: Duration,
    /// Enable LZ4 compression of payloads
    pub compression: bool,
    /// Payloads smaller than this are never compressed
    pub compression_threshold: usize,
    /// Enable AES-256-GCM encryption of payloads
    pub encryption: bool,
    /// Directory holding the disk tier
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::Hybrid,
            eviction_policy: EvictionPolicy::Lru,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            default_ttl: DEFAULT_TTL,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            compression: true,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            encryption: false,
            cache_dir: PathBuf::from("./cache"),
        }
    }
}

impl CacheConfig {
    /// Memory-only configuration
    pub fn memory() -> Self {
        Self {
            storage_mode: StorageMode::Memory,
            ..Default::default()
        }
    }

    /// Disk-only configuration rooted at `dir`
    pub fn disk(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_mode: StorageMode::Disk,
            cache_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Hybrid configuration rooted at `dir`
    pub fn hybrid(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_mode: StorageMode::Hybrid,
            cache_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Check budgets and intervals
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_bytes == 0 {
            return Err(Error::Config(
                "max_memory_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_disk_bytes == 0 {
            return Err(Error::Config(
                "max_disk_bytes must be greater than 0".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(Error::Config(
                "default_ttl must be greater than 0".to_string(),
            ));
        }
        if self.maintenance_interval.is_zero() {
            return Err(Error::Config(
                "maintenance_interval must be greater than 0".to_string(),
            ));
        }
        if self.storage_mode.uses_disk() && self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config(format!(
                "cache_dir is required in {} mode",
                self.storage_mode
            )));
        }
        Ok(())
    }

    /// Memory usage the eviction engine drives down to (75% of the budget)
    pub fn memory_target_bytes(&self) -> u64 {
        (self.max_memory_bytes as u128 * EVICTION_TARGET_PERCENT as u128 / 100) as u64
    }

    /// Parse a YAML document
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s).map_err(|e| Error::ConfigParse {
            path: "<yaml>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| Error::ConfigParse {
            path: "<json>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let parse_err = |reason: String| Error::ConfigParse {
            path: path.display().to_string(),
            reason,
        };

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw).map_err(|e| parse_err(e.to_string()))?,
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&raw).map_err(|e| parse_err(e.to_string()))?
            }
            other => {
                return Err(parse_err(format!(
                    "unsupported config extension: {:?}",
                    other.unwrap_or("")
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Duration Strings
// =============================================================================

/// Parse a duration string like "30s", "5m", "1h30m", "250ms", "50us" or "2d".
///
/// A trailing bare number is treated as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut chars = s.chars().peekable();

    while chars.peek().is_some() {
        let mut num_buf = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| c.is_ascii_digit()) {
            num_buf.push(c);
            chars.next();
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| c.is_ascii_alphabetic()) {
            unit.push(c.to_ascii_lowercase());
            chars.next();
        }

        if num_buf.is_empty() {
            return Err(Error::DurationParse(format!(
                "invalid number in duration: {}",
                s
            )));
        }
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;

        let overflow = || Error::DurationParse(format!("duration overflows: {}", s));
        let secs = |unit_secs: u64| num.checked_mul(unit_secs).map(Duration::from_secs);
        let part = match unit.as_str() {
            "ns" => Some(Duration::from_nanos(num)),
            "us" => Some(Duration::from_micros(num)),
            "ms" => Some(Duration::from_millis(num)),
            "" | "s" => secs(1),
            "m" => secs(60),
            "h" => secs(3600),
            "d" => secs(86400),
            other => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    other
                )))
            }
        }
        .ok_or_else(overflow)?;
        total = total.checked_add(part).ok_or_else(overflow)?;
    }

    if total.is_zero() {
        return Err(Error::DurationParse(
            "duration must be greater than 0".to_string(),
        ));
    }

    Ok(total)
}

/// Render a duration in the format accepted by [`parse_duration`]
pub fn format_duration(d: Duration) -> String {
    let nanos = d.subsec_nanos();
    let mut secs = d.as_secs();
    let mut out = String::new();

    for (unit, size) in [("d", 86400), ("h", 3600), ("m", 60)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    for (unit, value) in [
        ("ms", nanos / 1_000_000),
        ("us", nanos / 1_000 % 1_000),
        ("ns", nanos % 1_000),
    ] {
        if value > 0 {
            out.push_str(&format!("{}{}", value, unit));
        }
    }
    if out.is_empty() {
        out.push_str("0s");
    }
    out
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage_mode, StorageMode::Hybrid);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
        assert!(config.compression);
        assert!(!config.encryption);
    }

    #[test]
    fn test_storage_mode_tiers() {
        assert!(StorageMode::Memory.uses_memory());
        assert!(!StorageMode::Memory.uses_disk());
        assert!(!StorageMode::Disk.uses_memory());
        assert!(StorageMode::Disk.uses_disk());
        assert!(StorageMode::Hybrid.uses_memory());
        assert!(StorageMode::Hybrid.uses_disk());
    }

    #[test]
    fn test_zero_budgets_rejected() {
        let mut config = CacheConfig::memory();
        config.max_memory_bytes = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = CacheConfig::memory();
        config.max_disk_bytes = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = CacheConfig::memory();
        config.default_ttl = Duration::ZERO;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = CacheConfig::memory();
        config.maintenance_interval = Duration::ZERO;
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_disk_mode_requires_dir() {
        let config = CacheConfig::disk("");
        assert_matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("disk"));

        // Memory mode ignores the directory
        let mut config = CacheConfig::memory();
        config.cache_dir = PathBuf::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_target_is_three_quarters() {
        let mut config = CacheConfig::memory();
        config.max_memory_bytes = 1000;
        assert_eq!(config.memory_target_bytes(), 750);
        config.max_memory_bytes = 400;
        assert_eq!(config.memory_target_bytes(), 300);
        config.max_memory_bytes = u64::MAX;
        assert!(config.memory_target_bytes() < u64::MAX);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1H").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_duration_combined() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(
            parse_duration("1m500ms").unwrap(),
            Duration::from_millis(60_500)
        );
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_matches!(parse_duration(""), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("0s"), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("10x"), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("h"), Err(Error::DurationParse(_)));
    }

    #[test]
    fn test_parse_duration_overflow_is_error() {
        assert_matches!(
            parse_duration("300000000000000d"),
            Err(Error::DurationParse(reason)) if reason.contains("overflows")
        );
        assert_matches!(
            parse_duration("18446744073709551615s1s"),
            Err(Error::DurationParse(reason)) if reason.contains("overflows")
        );
        assert_matches!(
            CacheConfig::from_yaml_str("default_ttl: 18446744073709551615s1s"),
            Err(Error::ConfigParse { .. })
        );
    }

    #[test]
    fn test_parse_duration_sub_millisecond_units() {
        assert_eq!(parse_duration("500us").unwrap(), Duration::from_micros(500));
        assert_eq!(parse_duration("750ns").unwrap(), Duration::from_nanos(750));
        assert_eq!(
            parse_duration("1ms250us5ns").unwrap(),
            Duration::from_nanos(1_250_005)
        );
    }

    #[test]
    fn test_format_duration_parses_back() {
        for d in [
            Duration::from_secs(1),
            Duration::from_secs(3600),
            Duration::from_secs(5400),
            Duration::from_millis(1500),
            Duration::from_secs(90_061),
            Duration::from_micros(500),
            Duration::from_nanos(1),
            Duration::new(61, 1_250_005),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_micros(500)), "500us");
    }

    #[test]
    fn test_sub_millisecond_config_survives_json_roundtrip() {
        let config = CacheConfig {
            maintenance_interval: Duration::from_micros(500),
            default_ttl: Duration::from_nanos(1_500_250),
            ..CacheConfig::memory()
        };
        config.validate().unwrap();

        let json = serde_json::to_string(&config).unwrap();
        let loaded = CacheConfig::from_json_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
storage_mode: disk
eviction_policy: lfu
max_memory_bytes: 1048576
default_ttl: 10m
maintenance_interval: 30s
encryption: true
cache_dir: /tmp/tiercache
"#;
        let config = CacheConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.storage_mode, StorageMode::Disk);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.max_memory_bytes, 1_048_576);
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.maintenance_interval, Duration::from_secs(30));
        assert!(config.encryption);
        // Unspecified fields keep their defaults
        assert_eq!(config.max_disk_bytes, DEFAULT_MAX_DISK_BYTES);
        assert!(config.compression);
    }

    #[test]
    fn test_from_json_str_rejects_invalid_budget() {
        let json = r#"{"storage_mode": "memory", "max_memory_bytes": 0}"#;
        assert_matches!(CacheConfig::from_json_str(json), Err(Error::Config(_)));

        let json = r#"{"default_ttl": "soon"}"#;
        assert_matches!(
            CacheConfig::from_json_str(json),
            Err(Error::ConfigParse { .. })
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("cache.yaml");
        std::fs::write(&path, "storage_mode: memory\neviction_policy: size\n").unwrap();
        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.storage_mode, StorageMode::Memory);
        assert_eq!(config.eviction_policy, EvictionPolicy::Size);

        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"eviction_policy": "fifo"}"#).unwrap();
        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.eviction_policy, EvictionPolicy::Fifo);

        let path = dir.path().join("cache.toml");
        std::fs::write(&path, "").unwrap();
        assert_matches!(
            CacheConfig::from_file(&path),
            Err(Error::ConfigParse { .. })
        );
    }

    #[test]
    fn test_config_serializes_durations_as_strings() {
        let config = CacheConfig::memory();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["default_ttl"], "1h");
        assert_eq!(json["maintenance_interval"], "1m");
        assert_eq!(json["storage_mode"], "memory");
    }
}
