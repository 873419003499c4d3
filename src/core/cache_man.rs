//! Two-tier scan cache: in-process map (L1) backed by JSON files on disk (L2).
//!
//! Entries are addressed by a composite key (`&["shots", root, ep, seq]`)
//! hashed with blake3. Each tier has its own TTL; an entry expires when
//! `now - timestamp > ttl`. A valid L2 hit is promoted back into L1 with a
//! fresh timestamp.
//!
//! Disk failures never reach the caller: unreadable or corrupt files are
//! misses, failed writes are logged.

use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::CacheSettings;

/// One cached value plus the time it was stored (seconds since epoch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: f64,
}

impl CacheEntry {
    fn is_expired(&self, now: f64, ttl: Duration) -> bool {
        now - self.timestamp > ttl.as_secs_f64()
    }
}

/// Hit/miss counters, per tier.
#[derive(Debug, Default)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn memory_hits(&self) -> u64 {
        self.memory_hits.load(Ordering::Relaxed)
    }

    pub fn disk_hits(&self) -> u64 {
        self.disk_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.memory_hits() + self.disk_hits() + self.misses()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.memory_hits() + self.disk_hits()) as f64 / total as f64
        }
    }

    fn reset(&self) {
        self.memory_hits.store(0, Ordering::Relaxed);
        self.disk_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Memory + disk TTL cache shared by a scanner and its workers.
#[derive(Debug)]
pub struct CacheManager {
    memory: Mutex<HashMap<String, CacheEntry>>,
    disk_dir: PathBuf,
    memory_ttl: Duration,
    disk_ttl: Duration,
    enabled: AtomicBool,
    stats: CacheStats,
}

impl CacheManager {
    pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(60);
    pub const DEFAULT_DISK_TTL: Duration = Duration::from_secs(3600);

    /// Create a cache writing its L2 files into `disk_dir`.
    ///
    /// The directory is created lazily on first write.
    pub fn new(disk_dir: impl Into<PathBuf>, memory_ttl: Duration, disk_ttl: Duration, enabled: bool) -> Self {
        let disk_dir = disk_dir.into();
        debug!(
            "CacheManager: dir={}, memory_ttl={}s, disk_ttl={}s, enabled={}",
            disk_dir.display(),
            memory_ttl.as_secs(),
            disk_ttl.as_secs(),
            enabled
        );
        Self {
            memory: Mutex::new(HashMap::new()),
            disk_dir,
            memory_ttl,
            disk_ttl,
            enabled: AtomicBool::new(enabled),
            stats: CacheStats::default(),
        }
    }

    /// Cache with default TTLs (60s memory, 3600s disk), enabled.
    pub fn with_dir(disk_dir: impl Into<PathBuf>) -> Self {
        Self::new(disk_dir, Self::DEFAULT_MEMORY_TTL, Self::DEFAULT_DISK_TTL, true)
    }

    pub fn from_settings(settings: &CacheSettings, disk_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            disk_dir,
            Duration::from_secs(settings.memory_ttl_seconds),
            Duration::from_secs(settings.disk_ttl_seconds),
            settings.enabled,
        )
    }

    pub fn disk_dir(&self) -> &Path {
        &self.disk_dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Toggle the cache. Disk contents are kept either way.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// L1 map, also after a holder panicked (entries are inserted whole).
    fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live L1 entries (expired ones included until touched).
    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    /// Hash key for a composite key: blake3 of the parts joined with `:`.
    pub fn key(parts: &[&str]) -> String {
        blake3::hash(parts.join(":").as_bytes()).to_hex().to_string()
    }

    /// Look up a value, L1 first then L2.
    pub fn get<T: DeserializeOwned>(&self, parts: &[&str]) -> Option<T> {
        self.get_at(parts, now_secs())
    }

    /// Store a value in both tiers.
    pub fn set<T: Serialize>(&self, value: &T, parts: &[&str]) {
        self.set_at(value, parts, now_secs())
    }

    pub(crate) fn get_at<T: DeserializeOwned>(&self, parts: &[&str], now: f64) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }
        let key = Self::key(parts);

        // L1
        {
            let mut memory = self.memory();
            if let Some(entry) = memory.get(&key) {
                if entry.is_expired(now, self.memory_ttl) {
                    trace!("Cache L1 expired: {}", key);
                    memory.remove(&key);
                } else if let Ok(value) = serde_json::from_value(entry.data.clone()) {
                    self.stats.memory_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
            }
        }

        // L2
        let path = self.disk_path(&key);
        let Some(entry) = read_entry(&path) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if entry.is_expired(now, self.disk_ttl) {
            trace!("Cache L2 expired: {}", path.display());
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove expired cache file {}: {}", path.display(), e);
            }
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match serde_json::from_value::<T>(entry.data.clone()) {
            Ok(value) => {
                self.memory().insert(
                    key,
                    CacheEntry {
                        data: entry.data,
                        timestamp: now,
                    },
                );
                self.stats.disk_hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                debug!("Cache entry {} has unexpected shape: {}", path.display(), e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub(crate) fn set_at<T: Serialize>(&self, value: &T, parts: &[&str], now: f64) {
        if !self.is_enabled() {
            return;
        }
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(e) => {
                warn!("Cache value not serializable: {}", e);
                return;
            }
        };
        let key = Self::key(parts);
        let entry = CacheEntry {
            data,
            timestamp: now,
        };

        self.write_disk(&key, &entry);
        self.memory().insert(key, entry);
    }

    /// Drop one entry from both tiers.
    pub fn invalidate(&self, parts: &[&str]) {
        if !self.is_enabled() {
            return;
        }
        let key = Self::key(parts);
        self.memory().remove(&key);
        let path = self.disk_path(&key);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove cache file {}: {}", path.display(), e);
            }
        }
    }

    /// Drop every entry from both tiers, including all `*.json` files in the cache dir.
    pub fn clear(&self) {
        self.memory().clear();
        self.stats.reset();

        let Ok(read_dir) = fs::read_dir(&self.disk_dir) else {
            return;
        };
        let mut removed = 0usize;
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove cache file {}: {}", path.display(), e),
                }
            }
        }
        debug!("Cache cleared: {} disk entries removed", removed);
    }

    fn disk_path(&self, key: &str) -> PathBuf {
        self.disk_dir.join(format!("{}.json", key))
    }

    fn write_disk(&self, key: &str, entry: &CacheEntry) {
        if let Err(e) = fs::create_dir_all(&self.disk_dir) {
            warn!("Failed to create cache dir {}: {}", self.disk_dir.display(), e);
            return;
        }
        let path = self.disk_path(key);
        let result = serde_json::to_vec(entry)
            .map_err(std::io::Error::from)
            .and_then(|bytes| fs::write(&path, bytes));
        if let Err(e) = result {
            warn!("Failed to write cache file {}: {}", path.display(), e);
        }
    }
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(entry) => Some(entry),
        Err(e) => {
            debug!("Corrupt cache file {}: {}", path.display(), e);
            None
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
