//! Content-addressable result cache
//!
//! Results are keyed by the SHA-256 digest of the content they were computed
//! from. The cache is bounded by entry count with least-recently-used
//! eviction, and entries optionally expire after a time-to-live.

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use drift_core::config::CacheConfig;

/// Version written to and accepted from persisted cache files
pub const CACHE_FORMAT_VERSION: &str = "1.0.0";

/// Default maximum number of entries
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// SHA-256 hex digest of a string or byte slice
pub fn compute_hash(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of a file's raw bytes
pub fn compute_file_hash(path: impl AsRef<Path>) -> Result<String, CacheError> {
    let mut file = fs::File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// A cached result with its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// Content hash
    pub key: String,
    /// Cached result
    pub value: V,
    /// Caller-supplied or serialized size of the value
    pub size: usize,
    /// Number of `get` hits
    pub hits: u64,
    /// Unix milliseconds of the last write
    pub timestamp: i64,
}

/// Cache tuning
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of entries (at least 1)
    pub max_size: usize,
    /// Entry time-to-live; zero disables expiry
    pub ttl: Duration,
    /// Default file for `persist`/`load`
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            ttl: Duration::ZERO,
            persist_path: None,
        }
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_size: config.max_size,
            ttl: Duration::from_millis(config.ttl_ms),
            persist_path: config.persist_path.clone(),
        }
    }
}

/// Counters reported by [`ResultCache::stats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// hits / (hits + misses), 0 when nothing was looked up
    pub hit_ratio: f64,
    pub size: usize,
    pub max_size: usize,
}

/// On-disk document
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheDocument<V> {
    version: String,
    created_at: String,
    entries: Vec<CacheEntry<V>>,
}

/// Bounded, time-aware result cache
pub struct ResultCache<V> {
    entries: LruCache<String, CacheEntry<V>>,
    options: CacheOptions,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> ResultCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Create a cache; `max_size` is raised to 1 if zero
    pub fn new(mut options: CacheOptions) -> Self {
        if options.max_size == 0 {
            warn!("cache max_size of 0 raised to 1");
            options.max_size = 1;
        }
        let capacity = NonZeroUsize::new(options.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            options,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    /// Store a value, sized by its JSON serialization
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let size = serde_json::to_vec(&value).map(|bytes| bytes.len()).unwrap_or(0);
        self.set_sized(key, value, size);
    }

    /// Store a value with an explicit size
    pub fn set_sized(&mut self, key: impl Into<String>, value: V, size: usize) {
        let key = key.into();
        let now = now_millis();

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.size = size;
            entry.timestamp = now;
            return;
        }

        let entry = CacheEntry {
            key: key.clone(),
            value,
            size,
            hits: 0,
            timestamp: now,
        };
        self.insert_new(key, entry);
    }

    /// Look up a value, refreshing its recency on a hit
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.peek(key) {
            Some(entry) => self.is_expired(entry, now_millis()),
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            self.entries.pop(key);
            self.expirations += 1;
            self.misses += 1;
            debug!(key, "cache entry expired");
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.hits += 1;
        self.hits += 1;
        Some(entry.value.clone())
    }

    /// Whether a live entry exists; does not touch recency or counters
    pub fn has(&self, key: &str) -> bool {
        let now = now_millis();
        self.entries
            .peek(key)
            .is_some_and(|entry| !self.is_expired(entry, now))
    }

    /// Remove an entry
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Remove a key and the keys derived from it, returning how many existed
    pub fn invalidate<S: AsRef<str>>(&mut self, key: &str, dependent_keys: &[S]) -> usize {
        let mut removed = usize::from(self.delete(key));
        for dependent in dependent_keys {
            if self.delete(dependent.as_ref()) {
                removed += 1;
            }
        }
        debug!(key, removed, "invalidated cache entries");
        removed
    }

    /// Remove every entry; counters are kept
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Eagerly drop expired entries
    pub fn prune(&mut self) -> usize {
        let now = now_millis();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }
        self.expirations += expired.len() as u64;
        if !expired.is_empty() {
            debug!(count = expired.len(), "pruned expired cache entries");
        }
        expired.len()
    }

    /// Live entries, most recently used first
    pub fn entries(&self) -> Vec<(String, CacheEntry<V>)> {
        let now = now_millis();
        self.entries
            .iter()
            .filter(|(_, entry)| !self.is_expired(entry, now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
            size: self.entries.len(),
            max_size: self.options.max_size,
        }
    }

    /// Zero the counters, keeping the entries
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.expirations = 0;
    }

    /// Write live entries to `path` or the configured persist path
    pub fn persist(&self, path: Option<&Path>) -> Result<(), CacheError> {
        let path = self.resolve_path(path)?;
        let now = now_millis();

        // Least recently used first, so loading replays recency in order.
        let entries: Vec<CacheEntry<V>> = self
            .entries
            .iter()
            .rev()
            .filter(|(_, entry)| !self.is_expired(entry, now))
            .map(|(_, entry)| entry.clone())
            .collect();

        let document = CacheDocument {
            version: CACHE_FORMAT_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            entries,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&path, json)?;

        info!(path = %path.display(), entries = document.entries.len(), "cache persisted");
        Ok(())
    }

    /// Merge entries from `path` or the configured persist path.
    ///
    /// Entries already expired are skipped. The cache is untouched when the
    /// file cannot be read or validated. Returns the number of entries loaded.
    pub fn load(&mut self, path: Option<&Path>) -> Result<usize, CacheError> {
        let path = self.resolve_path(path)?;
        let contents = fs::read_to_string(&path)?;
        let raw: serde_json::Value = serde_json::from_str(&contents)?;

        let version = raw
            .get("version")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                CacheError::InvalidFormat(format!("{}: missing version", path.display()))
            })?;
        if version != CACHE_FORMAT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                found: version.to_string(),
            });
        }

        let document: CacheDocument<V> = serde_json::from_value(raw)?;
        let now = now_millis();
        let mut loaded = 0;
        let mut skipped = 0;

        for entry in document.entries {
            if self.is_expired(&entry, now) {
                skipped += 1;
                continue;
            }
            let key = entry.key.clone();
            if self.entries.contains(&key) {
                self.entries.put(key, entry);
            } else {
                self.insert_new(key, entry);
            }
            loaded += 1;
        }

        info!(path = %path.display(), loaded, skipped, "cache loaded");
        Ok(loaded)
    }

    fn insert_new(&mut self, key: String, entry: CacheEntry<V>) {
        if self.entries.len() >= self.options.max_size {
            if let Some((evicted, _)) = self.entries.pop_lru() {
                self.evictions += 1;
                debug!(key = %evicted, "evicted least recently used entry");
            }
        }
        self.entries.put(key, entry);
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: i64) -> bool {
        let ttl = self.options.ttl.as_millis() as i64;
        ttl > 0 && now - entry.timestamp > ttl
    }

    fn resolve_path(&self, path: Option<&Path>) -> Result<PathBuf, CacheError> {
        path.map(Path::to_path_buf)
            .or_else(|| self.options.persist_path.clone())
            .ok_or(CacheError::NoPersistPath)
    }
}

impl<V> std::fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("len", &self.entries.len())
            .field("options", &self.options)
            .finish()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Neither the call nor the options name a file
    #[error("No cache persist path configured")]
    NoPersistPath,

    /// The file is not a cache document
    #[error("Invalid cache file: {0}")]
    InvalidFormat(String),

    /// The document was written by an incompatible version
    #[error("Unsupported cache version: {found} (expected {})", CACHE_FORMAT_VERSION)]
    UnsupportedVersion { found: String },

    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
