//! Bounded, insertion-ordered size cache.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use indexmap::IndexMap;

/// A computed aggregate size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeCacheEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Modification time of the source when the computation started.
    pub source_modified: Option<SystemTime>,
    pub cached_at: Instant,
}

impl SizeCacheEntry {
    /// Create an entry stamped with the current instant.
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, source_modified: Option<SystemTime>) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            source_modified,
            cached_at: Instant::now(),
        }
    }

    fn is_expired_at(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) > ttl
    }
}

/// Size cache with a ceiling on entry count and a time-to-live.
///
/// Eviction follows insertion order, not access order: overwriting a path
/// moves it to the newest position, reading it does not.
#[derive(Debug)]
pub struct SizeCache {
    entries: IndexMap<PathBuf, SizeCacheEntry>,
    capacity: usize,
    ttl: Duration,
}

impl SizeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or overwrite an entry, then drop the oldest past the ceiling.
    pub fn insert(&mut self, entry: SizeCacheEntry) {
        self.entries.shift_remove(&entry.path);
        self.entries.insert(entry.path.clone(), entry);

        while self.entries.len() > self.capacity {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                tracing::debug!(path = %evicted.display(), "evicted size cache entry");
            }
        }
    }

    /// Fresh entry for `path` given the source's current modification time.
    pub fn get(&self, path: &Path, modified: Option<SystemTime>) -> Option<&SizeCacheEntry> {
        self.get_at(path, modified, Instant::now())
    }

    /// Like [`get`](Self::get), evaluated at `now`.
    pub fn get_at(
        &self,
        path: &Path,
        modified: Option<SystemTime>,
        now: Instant,
    ) -> Option<&SizeCacheEntry> {
        self.peek_at(path, now)
            .filter(|entry| entry.source_modified == modified)
    }

    /// Entry for `path` if within its TTL, without checking the source.
    pub fn peek(&self, path: &Path) -> Option<&SizeCacheEntry> {
        self.peek_at(path, Instant::now())
    }

    fn peek_at(&self, path: &Path, now: Instant) -> Option<&SizeCacheEntry> {
        self.entries
            .get(path)
            .filter(|entry| !entry.is_expired_at(self.ttl, now))
    }

    pub fn remove(&mut self, path: &Path) -> Option<SizeCacheEntry> {
        self.entries.shift_remove(path)
    }

    /// Delete every entry past its TTL. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(ttl, now));
        before - self.entries.len()
    }

    /// Cached paths, oldest first.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> Option<SystemTime> {
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn test_insert_over_capacity_evicts_oldest() {
        let mut cache = SizeCache::new(3, Duration::from_secs(60));
        for (i, name) in ["/a", "/b", "/c", "/d"].iter().enumerate() {
            cache.insert(SizeCacheEntry::new(*name, i as u64, None));
        }

        assert_eq!(cache.len(), 3);
        let paths: Vec<_> = cache.paths().collect();
        assert_eq!(paths, vec![Path::new("/b"), Path::new("/c"), Path::new("/d")]);
    }

    #[test]
    fn test_overwrite_moves_to_newest() {
        let mut cache = SizeCache::new(2, Duration::from_secs(60));
        cache.insert(SizeCacheEntry::new("/a", 1, None));
        cache.insert(SizeCacheEntry::new("/b", 2, None));
        cache.insert(SizeCacheEntry::new("/a", 10, None));
        cache.insert(SizeCacheEntry::new("/c", 3, None));

        assert!(cache.peek(Path::new("/b")).is_none());
        assert_eq!(cache.peek(Path::new("/a")).unwrap().size_bytes, 10);
    }

    #[test]
    fn test_reads_do_not_affect_eviction_order() {
        let mut cache = SizeCache::new(2, Duration::from_secs(60));
        cache.insert(SizeCacheEntry::new("/a", 1, None));
        cache.insert(SizeCacheEntry::new("/b", 2, None));
        assert!(cache.peek(Path::new("/a")).is_some());
        cache.insert(SizeCacheEntry::new("/c", 3, None));

        assert!(cache.peek(Path::new("/a")).is_none());
        assert!(cache.peek(Path::new("/b")).is_some());
    }

    #[test]
    fn test_modified_time_must_match() {
        let mut cache = SizeCache::new(10, Duration::from_secs(60));
        cache.insert(SizeCacheEntry::new("/dir", 42, at(100)));

        assert_eq!(cache.get(Path::new("/dir"), at(100)).unwrap().size_bytes, 42);
        assert!(cache.get(Path::new("/dir"), at(101)).is_none());
        assert!(cache.get(Path::new("/dir"), None).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = SizeCache::new(10, Duration::from_secs(5));
        let entry = SizeCacheEntry::new("/dir", 7, at(1));
        let cached_at = entry.cached_at;
        cache.insert(entry);

        let path = Path::new("/dir");
        assert!(cache.get_at(path, at(1), cached_at + Duration::from_secs(5)).is_some());
        assert!(cache.get_at(path, at(1), cached_at + Duration::from_secs(6)).is_none());
    }

    #[test]
    fn test_purge_expired() {
        let mut cache = SizeCache::new(10, Duration::ZERO);
        cache.insert(SizeCacheEntry::new("/x", 1, None));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
