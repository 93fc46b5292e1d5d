//! In-memory reference backend, used by the crate's own test suite and
//! useful to callers who want a fast fake for theirs. Grounded in the
//! in-memory fake pattern used for testing filesystem abstractions: paths
//! are plain strings, content lives in a `Mutex<HashMap<...>>`, no real I/O.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::Backend;
use crate::config::FsConfig;
use crate::dircache::DirCache;
use crate::error::{FsError, Result};
use crate::info::{FileInfo, FileType};
use crate::instance_cache::{compute_token, get_or_construct};
use crate::transaction::TransactionState;

struct Entry {
    data: Vec<u8>,
}

/// A filesystem that lives entirely in process memory. Directories are
/// implicit: any path with a descendant entry is a directory.
pub struct MemoryFilesystem {
    files: Mutex<BTreeMap<String, Entry>>,
    uploads: Mutex<BTreeMap<String, Vec<u8>>>,
    dir_cache: DirCache,
    transaction: TransactionState,
}

impl MemoryFilesystem {
    fn build() -> Self {
        MemoryFilesystem {
            files: Mutex::new(BTreeMap::new()),
            uploads: Mutex::new(BTreeMap::new()),
            dir_cache: DirCache::new(true, None, None),
            transaction: TransactionState::new(),
        }
    }

    /// Open the in-memory filesystem. With no constructor arguments to
    /// distinguish instances, this is a process-wide singleton by default,
    /// matching a plain in-memory fake with no notion of "which one" —
    /// callers that need an isolated instance (tests, mainly) must pass
    /// `skip_instance_cache: true`.
    pub fn new(config: &FsConfig) -> Arc<Self> {
        let token = compute_token::<MemoryFilesystem>("", &[]);
        get_or_construct(token, config.skip_instance_cache, || Ok(Self::build()))
            .expect("MemoryFilesystem construction is infallible")
    }

    /// Test/debug helper: read a whole file's bytes.
    pub async fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .map(|e| e.data.clone())
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Test/debug helper: seed a file directly without going through the
    /// buffered-file write path.
    pub fn seed(&self, path: &str, data: &[u8]) {
        self.files.lock().unwrap().insert(
            path.to_string(),
            Entry {
                data: data.to_vec(),
            },
        );
    }

    fn is_directory(&self, path: &str, files: &BTreeMap<String, Entry>) -> bool {
        if path.is_empty() || path == "/" {
            return true;
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        files.keys().any(|k| k.starts_with(&prefix))
    }
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        Self::build()
    }
}

#[async_trait]
impl Backend for MemoryFilesystem {
    fn protocols(&self) -> &[&str] {
        &["mem", "memory"]
    }

    fn root_marker(&self) -> &str {
        "/"
    }

    fn dir_cache(&self) -> &DirCache {
        &self.dir_cache
    }

    fn transaction_state(&self) -> &TransactionState {
        &self.transaction
    }

    async fn ls(&self, path: &str, _detail: bool) -> Result<Vec<FileInfo>> {
        let files = self.files.lock().unwrap();
        let dir = path.trim_end_matches('/');
        let prefix = if dir.is_empty() || dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };

        if !self.is_directory(path, &files) && !files.contains_key(path) {
            return Err(FsError::NotFound(path.to_string()));
        }

        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for (key, entry) in files.iter() {
            let rest = if prefix == "/" {
                key.strip_prefix('/')
            } else {
                key.strip_prefix(prefix.as_str())
            };
            let Some(rest) = rest else { continue };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(idx) => {
                    let child_name = format!("{prefix}{}", &rest[..idx]);
                    if seen.insert(child_name.clone()) {
                        out.push(FileInfo::directory(child_name));
                    }
                }
                None => {
                    let child_name = format!("{prefix}{rest}");
                    if seen.insert(child_name.clone()) {
                        out.push(FileInfo::file(child_name, entry.data.len() as u64));
                    }
                }
            }
        }
        Ok(out)
    }

    async fn cp_file(&self, src: &str, dst: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let data = files
            .get(src)
            .map(|e| e.data.clone())
            .ok_or_else(|| FsError::NotFound(src.to_string()))?;
        files.insert(dst.to_string(), Entry { data });
        Ok(())
    }

    async fn rm_file(&self, path: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn fetch_range(&self, path: &str, start: u64, end: u64) -> Result<Bytes> {
        let files = self.files.lock().unwrap();
        let entry = files
            .get(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let len = entry.data.len() as u64;
        let start = start.min(len) as usize;
        let end = end.min(len) as usize;
        if end <= start {
            return Ok(Bytes::new());
        }
        Ok(Bytes::copy_from_slice(&entry.data[start..end]))
    }

    async fn initiate_upload(&self, path: &str) -> Result<()> {
        self.uploads.lock().unwrap().insert(path.to_string(), Vec::new());
        Ok(())
    }

    async fn upload_chunk(&self, path: &str, data: Bytes, final_: bool) -> Result<bool> {
        let mut uploads = self.uploads.lock().unwrap();
        let buf = uploads
            .entry(path.to_string())
            .or_insert_with(Vec::new);
        buf.extend_from_slice(&data);
        if final_ {
            let content = buf.clone();
            drop(uploads);
            self.uploads.lock().unwrap().remove(path);
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), Entry { data: content });
        }
        Ok(true)
    }

    async fn discard_upload(&self, path: &str) -> Result<()> {
        self.uploads.lock().unwrap().remove(path);
        Ok(())
    }

    async fn mkdir(&self, _path: &str, _create_parents: bool) -> Result<()> {
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        let files = self.files.lock().unwrap();
        if files.keys().any(|k| k.starts_with(&format!("{path}/"))) {
            return Err(FsError::InvalidArgument(format!("{path} is not empty")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated_config() -> FsConfig {
        FsConfig {
            skip_instance_cache: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ls_groups_children_by_one_path_segment() {
        let fs = MemoryFilesystem::new(&isolated_config());
        fs.seed("/a/b/c.txt", b"hello");
        fs.seed("/a/e.txt", b"hi");

        let mut listing = fs.ls("/a", true).await.unwrap();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "/a/b");
        assert!(listing[0].file_type.is_dir());
        assert_eq!(listing[1].name, "/a/e.txt");
        assert!(listing[1].file_type.is_file());
    }

    #[tokio::test]
    async fn ls_missing_directory_is_not_found() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let err = fs.ls("/missing", true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn fetch_range_clamps_to_file_size() {
        let fs = MemoryFilesystem::new(&isolated_config());
        fs.seed("/f.txt", b"0123456789");
        let got = fs.fetch_range("/f.txt", 5, 1000).await.unwrap();
        assert_eq!(&got[..], b"56789");
    }

    #[tokio::test]
    async fn upload_then_fetch_round_trips() {
        let fs = MemoryFilesystem::new(&isolated_config());
        fs.initiate_upload("/g.txt").await.unwrap();
        fs.upload_chunk("/g.txt", Bytes::from_static(b"abc"), false)
            .await
            .unwrap();
        fs.upload_chunk("/g.txt", Bytes::from_static(b"def"), true)
            .await
            .unwrap();
        assert_eq!(fs.read_all("/g.txt").await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn skip_instance_cache_yields_independent_instances() {
        let a = MemoryFilesystem::new(&isolated_config());
        let b = MemoryFilesystem::new(&isolated_config());
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
