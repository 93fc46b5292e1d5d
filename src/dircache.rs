//! Bounded, time-expiring directory listing cache.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::info::FileInfo;

/// Outcome of looking up a path in the cache, distinguishing "no data at
/// all" from "we can prove this path doesn't exist".
pub enum CacheLookup {
    Hit(Vec<FileInfo>),
    /// The parent directory was listed and definitively does not contain
    /// this path.
    KnownAbsent,
    Unknown,
}

struct Entry {
    listing: Vec<FileInfo>,
    inserted: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

/// Per-handle cache of directory listings, keyed by directory path (no
/// trailing slash).
pub struct DirCache {
    enabled: bool,
    ttl: Option<Duration>,
    max_paths: Option<usize>,
    inner: RwLock<Inner>,
}

impl DirCache {
    pub fn new(enabled: bool, ttl: Option<Duration>, max_paths: Option<usize>) -> Self {
        DirCache {
            enabled,
            ttl,
            max_paths,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Record a listing for `path`, evicting the oldest entry if
    /// `max_paths` would be exceeded.
    pub fn put(&self, path: &str, listing: Vec<FileInfo>) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.write().unwrap();
        let key = path.trim_end_matches('/').to_string();
        if !inner.entries.contains_key(&key) {
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(
            key,
            Entry {
                listing,
                inserted: Instant::now(),
            },
        );
        if let Some(cap) = self.max_paths {
            while inner.entries.len() > cap {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                } else {
                    break;
                }
            }
        }
    }

    fn fresh(&self, entry: &Entry) -> bool {
        match self.ttl {
            Some(ttl) => entry.inserted.elapsed() < ttl,
            None => true,
        }
    }

    /// Look up the listing cached directly under `path`.
    fn get_exact(&self, path: &str) -> Option<Vec<FileInfo>> {
        if !self.enabled {
            return None;
        }
        let key = path.trim_end_matches('/');
        let inner = self.inner.read().unwrap();
        inner.entries.get(key).and_then(|e| {
            if self.fresh(e) {
                Some(e.listing.clone())
            } else {
                None
            }
        })
    }

    /// Try the path's own listing, then the parent's, filtering for this
    /// entry. A proven-absent parent entry resolves to `KnownAbsent` rather
    /// than `Unknown`.
    pub fn lookup(&self, path: &str, parent: &str) -> CacheLookup {
        if let Some(listing) = self.get_exact(path) {
            return CacheLookup::Hit(listing);
        }
        if let Some(parent_listing) = self.get_exact(parent) {
            let trimmed = path.trim_end_matches('/');
            let matches: Vec<FileInfo> = parent_listing
                .into_iter()
                .filter(|f| {
                    f.name == path
                        || (f.name == trimmed && f.file_type == crate::info::FileType::Directory)
                })
                .collect();
            return if matches.is_empty() {
                CacheLookup::KnownAbsent
            } else {
                CacheLookup::Hit(matches)
            };
        }
        CacheLookup::Unknown
    }

    /// Drop the cached listing for `path` only.
    pub fn invalidate(&self, path: &str) {
        let key = path.trim_end_matches('/').to_string();
        let mut inner = self.inner.write().unwrap();
        inner.entries.remove(&key);
        inner.order.retain(|p| p != &key);
    }

    /// Drop `path` and every entry that is a descendant of it.
    pub fn invalidate_subtree(&self, path: &str) {
        let prefix = path.trim_end_matches('/').to_string();
        let mut inner = self.inner.write().unwrap();
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| **k == prefix || k.starts_with(&format!("{prefix}/")))
            .cloned()
            .collect();
        for k in doomed {
            inner.entries.remove(&k);
            inner.order.retain(|p| p != &k);
        }
    }

    /// Drop every cached listing.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::FileInfo;

    #[test]
    fn put_then_get_exact_hit() {
        let cache = DirCache::new(true, None, None);
        cache.put("/a", vec![FileInfo::file("/a/b.txt", 5)]);
        match cache.lookup("/a", "/") {
            CacheLookup::Hit(v) => assert_eq!(v.len(), 1),
            _ => panic!("expected hit"),
        }
    }

    #[test]
    fn parent_listing_without_child_is_known_absent() {
        let cache = DirCache::new(true, None, None);
        cache.put("/a", vec![FileInfo::file("/a/b.txt", 5)]);
        match cache.lookup("/a/missing.txt", "/a") {
            CacheLookup::KnownAbsent => {}
            _ => panic!("expected known-absent"),
        }
    }

    #[test]
    fn unknown_when_neither_cached() {
        let cache = DirCache::new(true, None, None);
        match cache.lookup("/a/b.txt", "/a") {
            CacheLookup::Unknown => {}
            _ => panic!("expected unknown"),
        }
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = DirCache::new(true, Some(Duration::from_millis(0)), None);
        cache.put("/a", vec![FileInfo::file("/a/b.txt", 5)]);
        std::thread::sleep(Duration::from_millis(5));
        match cache.lookup("/a", "/") {
            CacheLookup::Unknown => {}
            _ => panic!("expected ttl-expired entry to read as unknown"),
        }
    }

    #[test]
    fn max_paths_evicts_oldest() {
        let cache = DirCache::new(true, None, Some(1));
        cache.put("/a", vec![]);
        cache.put("/b", vec![]);
        assert!(matches!(cache.lookup("/a", "/"), CacheLookup::Unknown));
        assert!(matches!(cache.lookup("/b", "/"), CacheLookup::Hit(_)));
    }

    #[test]
    fn invalidate_subtree_drops_descendants() {
        let cache = DirCache::new(true, None, None);
        cache.put("/a", vec![]);
        cache.put("/a/b", vec![]);
        cache.put("/other", vec![]);
        cache.invalidate_subtree("/a");
        assert!(matches!(cache.lookup("/a", "/"), CacheLookup::Unknown));
        assert!(matches!(cache.lookup("/a/b", "/a"), CacheLookup::Unknown));
        assert!(matches!(cache.lookup("/other", "/"), CacheLookup::Hit(_)));
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = DirCache::new(false, None, None);
        cache.put("/a", vec![FileInfo::file("/a/b.txt", 1)]);
        assert!(matches!(cache.lookup("/a", "/"), CacheLookup::Unknown));
    }
}
