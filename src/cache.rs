//! A dependency-aware render output cache.
//!
//! Entries are keyed by a content hash of everything which affects the output
//! of a render. Each entry records the names of the templates and pages it
//! was rendered from, so a change to any of them can invalidate exactly the
//! entries which depended on it.

use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// A cached render.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// The cached content.
    pub content: String,
    /// The SHA-256 hash of `content`, hex-encoded.
    pub content_hash: String,
    /// When the content was created. A dependency modified after this time
    /// makes the entry stale.
    pub created_at: Instant,
    /// The dependencies of the content.
    pub dependencies: BTreeSet<String>,
    /// When the entry expires.
    pub expires_at: Instant,
}

/// Options for a new cache entry.
#[derive(Clone, Debug)]
pub struct EntryOptions {
    /// How long the entry is valid for.
    pub ttl: Duration,
    /// The dependencies of the entry.
    pub dependencies: BTreeSet<String>,
    /// When the content started being produced. Defaults to the time of
    /// insertion.
    pub created_at: Option<Instant>,
}

impl EntryOptions {
    /// Creates new entry options with the given time-to-live and no
    /// dependencies.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            dependencies: BTreeSet::new(),
            created_at: None,
        }
    }
}

/// Cache usage statistics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CacheStats {
    /// The number of entries currently stored.
    pub len: usize,
    /// The number of successful lookups.
    pub hits: u64,
    /// The number of failed lookups.
    pub misses: u64,
}

/// The key material of a render.
#[derive(Serialize)]
struct KeyMaterial<'a, P: Serialize, E: Serialize> {
    /// The source text.
    text: &'a str,
    /// The page identity.
    page: Option<&'a str>,
    /// The template parameters bound to the source text.
    #[serde(rename = "templateParams")]
    template_params: &'a P,
    /// Anything else which affects the output.
    extra: &'a E,
}

/// Cache state guarded by the cache lock.
#[derive(Debug, Default)]
struct Inner {
    /// Entries, by key.
    entries: HashMap<String, CacheEntry>,
    /// Keys of entries, by dependency.
    dependents: HashMap<String, HashSet<String>>,
    /// The last time each recent dependency was modified.
    modified: HashMap<String, Instant>,
    /// The latest modification time which is no longer in `modified`.
    forgotten: Option<Instant>,
    /// The longest time-to-live of any stored entry.
    max_ttl: Duration,
}

impl Inner {
    /// Returns true if the entry is usable at `now`.
    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        // A forgotten modification may have been to one of the dependencies
        let before_forgotten = !entry.dependencies.is_empty()
            && self
                .forgotten
                .is_some_and(|forgotten| entry.created_at < forgotten);

        entry.expires_at > now
            && !before_forgotten
            && entry.dependencies.iter().all(|dependency| {
                self.modified
                    .get(dependency)
                    .is_none_or(|modified| *modified <= entry.created_at)
            })
    }

    /// Removes the entry with the given key, and unlinks it from its
    /// dependencies.
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        for dependency in &entry.dependencies {
            if let Some(keys) = self.dependents.get_mut(dependency) {
                keys.remove(key);
                if keys.is_empty() {
                    self.dependents.remove(dependency);
                }
            }
        }
        Some(entry)
    }

    /// Removes expired entries, then the oldest entries until no more than
    /// `max_entries` remain.
    fn prune(&mut self, max_entries: usize, now: Instant) {
        let expired = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in &expired {
            self.remove(key);
        }

        let mut evicted = 0;
        if self.entries.len() > max_entries {
            let mut by_age = self
                .entries
                .iter()
                .map(|(key, entry)| (entry.created_at, key.clone()))
                .collect::<Vec<_>>();
            by_age.sort_unstable();
            let excess = self.entries.len() - max_entries;
            for (_, key) in by_age.into_iter().take(excess) {
                self.remove(&key);
                evicted += 1;
            }
        }

        self.forget_modifications(now);

        log::debug!(
            "Pruned render cache: {} expired, {evicted} evicted",
            expired.len()
        );
    }

    /// Drops modification times which can no longer affect any entry. An
    /// entry created before such a modification has expired by `now`.
    fn forget_modifications(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.max_ttl) else {
            return;
        };

        let mut forgotten = self.forgotten;
        self.modified.retain(|_, modified| {
            if *modified > cutoff {
                return true;
            }
            forgotten = forgotten.max(Some(*modified));
            false
        });
        self.forgotten = forgotten;
    }
}

/// A thread-safe, dependency-aware render cache.
#[derive(Debug)]
pub struct RenderCache {
    /// The cache state.
    inner: RwLock<Inner>,
    /// The number of entries at which pruning starts.
    max_entries: usize,
    /// Lookup hit count.
    hits: AtomicU64,
    /// Lookup miss count.
    misses: AtomicU64,
}

impl RenderCache {
    /// Creates a new cache which holds at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Generates a cache key from the inputs of a render.
    ///
    /// The key is the hex-encoded SHA-256 hash of the serialized inputs.
    pub fn generate_key<P, E>(text: &str, page: Option<&str>, template_params: &P, extra: &E) -> String
    where
        P: Serialize,
        E: Serialize,
    {
        let material = KeyMaterial {
            text,
            page,
            template_params,
            extra,
        };
        // Serializing string-keyed maps and strings cannot fail, but the text
        // is still hashed if it somehow does
        let serialized = serde_json::to_vec(&material).unwrap_or_else(|err| {
            log::warn!("Could not serialize cache key material: {err}");
            text.as_bytes().to_vec()
        });
        hex::encode(Sha256::digest(&serialized))
    }

    /// Returns the content stored under `key`, if it exists and is still
    /// valid. Expired or stale entries are removed.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                None => {
                    log::trace!("Render cache miss: {key}");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if inner.is_fresh(entry, now) => {
                    log::trace!("Render cache hit: {key}");
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.content.clone());
                }
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write();
        // Another writer may have replaced the entry since the read lock was
        // released
        if let Some(entry) = inner.entries.get(key)
            && inner.is_fresh(entry, now)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.content.clone());
        }
        inner.remove(key);
        log::debug!("Removed stale render cache entry: {key}");
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `content` under `key`.
    pub fn set(&self, key: String, content: String, options: EntryOptions) {
        let now = Instant::now();
        let created_at = options.created_at.unwrap_or(now);
        let entry = CacheEntry {
            content_hash: hex::encode(Sha256::digest(content.as_bytes())),
            content,
            created_at,
            dependencies: options.dependencies,
            expires_at: created_at + options.ttl,
        };

        let mut inner = self.inner.write();
        inner.max_ttl = inner.max_ttl.max(options.ttl);
        inner.remove(&key);
        for dependency in &entry.dependencies {
            inner
                .dependents
                .entry(dependency.clone())
                .or_default()
                .insert(key.clone());
        }
        inner.entries.insert(key, entry);

        if inner.entries.len() > self.max_entries {
            inner.prune(self.max_entries, now);
        }
    }

    /// Marks `dependency` as modified now, and removes every entry which
    /// depends on it. Returns the number of removed entries.
    pub fn invalidate(&self, dependency: &str) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();
        inner.forget_modifications(now);
        inner.modified.insert(dependency.to_string(), now);
        let keys = inner.dependents.remove(dependency).unwrap_or_default();
        let mut removed = 0;
        for key in &keys {
            if inner.remove(key).is_some() {
                removed += 1;
            }
        }
        log::debug!("Invalidated {dependency}: removed {removed} render cache entries");
        removed
    }

    /// The number of stored entries, including any which are expired but not
    /// yet pruned.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns usage statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
