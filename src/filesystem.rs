//! Derived operations built on top of [`Backend`]'s primitives: a capability
//! interface plus a derived-operations mixin. Concrete backends implement
//! [`Backend`]; every type implementing it gets this entire table for free
//! via the blanket `impl` at the bottom of this module.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::try_stream;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};

use crate::backend::Backend;
use crate::buffered_file::{BufferedFile, SeekFrom};
use crate::cache::CacheType;
use crate::dircache::CacheLookup;
use crate::error::{FsError, Result};
use crate::info::FileInfo;
use crate::path;
use crate::transaction::StagedFile;

/// One step of [`FileSystemOps::walk`]: the directory just listed, its
/// subdirectories, and its files. An entry whose name equals `path` itself
/// (some backends list the directory as its own child) is split out into
/// `self_info` rather than polluting `files`.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: String,
    pub dirs: Vec<FileInfo>,
    pub files: Vec<FileInfo>,
    pub self_info: Option<FileInfo>,
}

pub type WalkStream<'a> = BoxStream<'a, Result<WalkEntry>>;

/// Per-item failure handling for bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    Raise,
    Omit,
    Return,
}

/// Aggregate result of [`FileSystemOps::du`].
#[derive(Debug, Clone)]
pub enum DuResult {
    Total(u64),
    PerFile(BTreeMap<String, u64>),
}

/// Aggregate result of [`FileSystemOps::cat`].
#[derive(Debug, Clone)]
pub enum CatResult {
    Single(Bytes),
    Many(BTreeMap<String, std::result::Result<Bytes, String>>),
}

const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

async fn advance_past_previous_delim(
    backend: &dyn Backend,
    path: &str,
    pos: u64,
    delim: &[u8],
) -> Result<u64> {
    if pos == 0 {
        return Ok(0);
    }
    let mut window = (delim.len() as u64 * 4).max(4096);
    loop {
        let probe_start = pos.saturating_sub(window);
        let chunk = backend.fetch_range(path, probe_start, pos).await?;
        if let Some(idx) = rfind_subslice(&chunk, delim) {
            return Ok(probe_start + idx as u64 + delim.len() as u64);
        }
        if probe_start == 0 {
            return Ok(0);
        }
        window *= 2;
    }
}

async fn extend_to_next_delim(
    backend: &dyn Backend,
    path: &str,
    pos: u64,
    size: u64,
    delim: &[u8],
) -> Result<u64> {
    if pos >= size {
        return Ok(size);
    }
    let mut window = (delim.len() as u64 * 4).max(4096);
    loop {
        let probe_end = (pos + window).min(size);
        let chunk = backend.fetch_range(path, pos, probe_end).await?;
        if let Some(idx) = find_subslice(&chunk, delim) {
            return Ok(pos + idx as u64 + delim.len() as u64);
        }
        if probe_end >= size {
            return Ok(size);
        }
        window *= 2;
    }
}

fn hash_info(info: &FileInfo) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    info.name.hash(&mut hasher);
    info.size.hash(&mut hasher);
    (info.file_type as u8 as u64).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn resolve_slice_bound(v: Option<i64>, default: i64, size: i64) -> i64 {
    match v {
        None => default,
        Some(x) if x < 0 => (size + x).max(0),
        Some(x) => x.min(size),
    }
}

#[async_trait::async_trait]
pub trait FileSystemOps: Backend + Send + Sync + Sized + 'static {
    fn parent(&self, p: &str) -> String {
        path::parent(p, self.protocols(), self.root_marker())
    }

    fn strip_protocol(&self, p: &str) -> String {
        path::strip_protocol(p, self.protocols(), self.root_marker())
    }

    /// `ls`, but consulting and populating the directory cache first.
    async fn ls_cached(&self, path: &str, detail: bool) -> Result<Vec<FileInfo>> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, "ls_cached called");
        let parent = self.parent(&target);
        match self.dir_cache().lookup(&target, &parent) {
            CacheLookup::Hit(v) => {
                tracing::trace!(path = %target, "dircache hit");
                return Ok(v);
            }
            CacheLookup::KnownAbsent => {
                tracing::trace!(path = %target, "dircache proves absence");
                return Err(FsError::NotFound(target));
            }
            CacheLookup::Unknown => {}
        }
        let listing = self.ls(&target, detail).await?;
        self.dir_cache().put(&target, listing.clone());
        Ok(listing)
    }

    /// Try `ls(parent(path))` and filter for a single matching entry; fall
    /// back to `ls(path)` and classify by how many entries it returns.
    async fn info(&self, path: &str) -> Result<FileInfo> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, "info called");
        let trimmed = target.trim_end_matches('/');
        let parent = self.parent(&target);

        if let Ok(parent_listing) = self.ls_cached(&parent, true).await {
            let matches: Vec<&FileInfo> = parent_listing
                .iter()
                .filter(|f| f.name.trim_end_matches('/') == trimmed)
                .collect();
            if matches.len() == 1 {
                return Ok(matches[0].clone());
            }
            if matches.len() > 1 {
                return Ok(FileInfo::directory(target));
            }
        }

        match self.ls_cached(&target, true).await {
            Ok(listing) => {
                let self_matches: Vec<&FileInfo> = listing
                    .iter()
                    .filter(|f| f.name.trim_end_matches('/') == trimmed)
                    .collect();
                if self_matches.len() == 1 {
                    Ok(self_matches[0].clone())
                } else if !listing.is_empty() {
                    Ok(FileInfo::directory(target))
                } else {
                    Err(FsError::NotFound(target))
                }
            }
            Err(e) if e.is_not_found() => Err(FsError::NotFound(target)),
            Err(e) => Err(e),
        }
    }

    /// Swallows every failure as `false` rather than propagating the error.
    async fn exists(&self, path: &str) -> bool {
        self.info(path).await.is_ok()
    }

    async fn isfile(&self, path: &str) -> bool {
        matches!(self.info(path).await, Ok(fi) if fi.file_type.is_file())
    }

    async fn isdir(&self, path: &str) -> bool {
        matches!(self.info(path).await, Ok(fi) if fi.file_type.is_dir())
    }

    async fn size(&self, path: &str) -> Result<Option<u64>> {
        Ok(self.info(path).await?.size)
    }

    /// Lazy, depth-first walk yielding `(path, dirs, files)` triples.
    /// Missing paths yield a single empty triple rather than erroring, so a
    /// caller iterating a tree that's mutated underneath them doesn't have
    /// to special-case disappearance.
    fn walk<'a>(&'a self, path: &'a str, maxdepth: Option<usize>) -> WalkStream<'a> {
        let root = self.strip_protocol(path);
        tracing::debug!(path = %root, maxdepth = ?maxdepth, "walk called");
        Box::pin(try_stream! {
            let mut queue: VecDeque<(String, Option<usize>)> = VecDeque::new();
            queue.push_back((root, maxdepth));

            while let Some((current, depth)) = queue.pop_front() {
                let listing = match self.ls_cached(&current, true).await {
                    Ok(l) => l,
                    Err(e) if e.is_not_found() => {
                        yield WalkEntry { path: current, dirs: vec![], files: vec![], self_info: None };
                        continue;
                    }
                    Err(e) => Err(e)?,
                };

                let trimmed_current = current.trim_end_matches('/').to_string();
                let mut dirs = Vec::new();
                let mut files = Vec::new();
                let mut self_info = None;

                for entry in listing {
                    let trimmed = entry.name.trim_end_matches('/').to_string();
                    if trimmed == trimmed_current {
                        self_info = Some(entry);
                    } else if entry.file_type.is_dir() {
                        dirs.push(entry);
                    } else {
                        files.push(entry);
                    }
                }

                let next_depth = depth.map(|d| d.saturating_sub(1));
                let descend = depth.map(|d| d > 1).unwrap_or(true);
                if descend {
                    for d in &dirs {
                        queue.push_back((d.name.clone(), next_depth));
                    }
                }

                yield WalkEntry { path: current, dirs, files, self_info };
            }
        })
    }

    /// Flatten `walk` into a sorted list of names. If `path` is itself a
    /// file, the result is `[path]`.
    async fn find(&self, path: &str, maxdepth: Option<usize>, withdirs: bool) -> Result<Vec<String>> {
        let root = self.strip_protocol(path);
        tracing::debug!(path = %root, "find called");
        if self.isfile(&root).await {
            return Ok(vec![root]);
        }
        let mut out = Vec::new();
        let mut stream = self.walk(&root, maxdepth);
        while let Some(entry) = stream.next().await {
            let entry = entry?;
            for f in entry.files {
                out.push(f.name);
            }
            if withdirs {
                for d in entry.dirs {
                    out.push(d.name);
                }
            }
        }
        out.sort();
        out.dedup();
        tracing::debug!(path = %root, count = out.len(), "find returned");
        Ok(out)
    }

    /// Expand a glob pattern into concrete matching path names.
    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let ends = pattern.ends_with('/');
        let stripped = self.strip_protocol(pattern);
        tracing::debug!(pattern = %stripped, "glob called");

        if crate::glob::first_magic_index(&stripped).is_none() {
            let root = stripped.clone();
            if !ends {
                return if self.exists(&root).await {
                    Ok(vec![root])
                } else {
                    Ok(vec![])
                };
            }
            let search_pattern = format!("{}/*", root.trim_end_matches('/'));
            let candidates = self.find(&root, Some(1), true).await?;
            let re = crate::glob::compile(&search_pattern);
            return Ok(crate::glob::filter_matches(&re, candidates.iter().map(|s| s.as_str())));
        }

        let (root, depth) = crate::glob::root_and_depth(&stripped);
        let candidates = self.find(&root, depth, true).await?;
        let re = crate::glob::compile(&stripped);
        Ok(crate::glob::filter_matches(&re, candidates.iter().map(|s| s.as_str())))
    }

    /// Disk usage under `path`. Fetches `info` only for names `find`
    /// actually returned, each once, rather than re-listing directories.
    async fn du(&self, path: &str, total: bool) -> Result<DuResult> {
        tracing::debug!(path = %path, total, "du called");
        let names = self.find(path, None, false).await?;
        let mut sizes = BTreeMap::new();
        for name in names {
            if let Ok(info) = self.info(&name).await {
                sizes.insert(name, info.size.unwrap_or(0));
            }
        }
        if total {
            Ok(DuResult::Total(sizes.values().sum()))
        } else {
            Ok(DuResult::PerFile(sizes))
        }
    }

    /// Read `[start, end)` of `path` with negative-offset slice semantics
    /// relative to file size, matching Python slice indexing.
    async fn cat_file(&self, path: &str, start: Option<i64>, end: Option<i64>) -> Result<Bytes> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, start = ?start, end = ?end, "cat_file called");
        let info = self.info(&target).await?;
        let size = info.size.unwrap_or(0) as i64;
        let s = resolve_slice_bound(start, 0, size).max(0) as u64;
        let e = resolve_slice_bound(end, size, size).max(0) as u64;
        if e <= s {
            return Ok(Bytes::new());
        }
        self.fetch_range(&target, s, e).await
    }

    /// `head`/`tail` convenience wrappers (supplemented feature).
    async fn head(&self, path: &str, size: u64) -> Result<Bytes> {
        self.cat_file(path, Some(0), Some(size as i64)).await
    }

    async fn tail(&self, path: &str, size: u64) -> Result<Bytes> {
        self.cat_file(path, Some(-(size as i64)), None).await
    }

    /// Read a byte range, extended out to delimiter boundaries when one is
    /// given, so callers can split a large file into worker-aligned chunks
    /// without splitting a record in half.
    async fn read_block(
        &self,
        path: &str,
        offset: u64,
        length: Option<u64>,
        delim: Option<&[u8]>,
    ) -> Result<Bytes> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, offset, length = ?length, "read_block called");
        let info = self.info(&target).await?;
        let size = info.size.unwrap_or(0);
        let mut start = offset.min(size);
        let mut end = match length {
            Some(l) => (offset + l).min(size),
            None => size,
        };

        if let Some(delim) = delim {
            if start > 0 {
                start = advance_past_previous_delim(self, &target, start, delim).await?;
            }
            end = extend_to_next_delim(self, &target, end, size, delim).await?;
        }

        if end <= start {
            return Ok(Bytes::new());
        }
        self.fetch_range(&target, start, end).await
    }

    /// Expand a path/glob into concrete path names.
    async fn expand_path(
        &self,
        path: &str,
        recursive: bool,
        maxdepth: Option<usize>,
    ) -> Result<Vec<String>> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, recursive, maxdepth = ?maxdepth, "expand_path called");
        let mut set: BTreeSet<String> = BTreeSet::new();

        if path::has_magic(&target) {
            for p in self.glob(&target).await? {
                set.insert(p);
            }
        } else {
            set.insert(target);
        }

        if recursive {
            let roots: Vec<String> = set.iter().cloned().collect();
            for root in roots {
                if let Ok(found) = self.find(&root, maxdepth, false).await {
                    set.extend(found);
                }
            }
        }

        if set.is_empty() {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(set.into_iter().collect())
    }

    /// Drop `path` (and descendants when `None`) from the directory cache.
    /// Deferring this while a transaction is active is the caller's
    /// responsibility via [`crate::transaction::Transaction::defer_invalidation`]
    /// rather than something this default method detects on its own.
    async fn invalidate_cache(&self, path: Option<&str>) {
        tracing::debug!(path = ?path, "invalidate_cache called");
        match path {
            Some(p) => self.dir_cache().invalidate_subtree(&self.strip_protocol(p)),
            None => self.dir_cache().clear(),
        }
    }

    /// Content-address of `info(path)` unless the backend has a true
    /// content hash available.
    async fn checksum(&self, path: &str) -> Result<String> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, "checksum called");
        if let Some(native) = self.native_checksum(&target).await? {
            return Ok(native);
        }
        Ok(hash_info(&self.info(&target).await?))
    }

    /// Cheap change-detection token: always the info-string digest, never
    /// the backend's native hash.
    async fn ukey(&self, path: &str) -> Result<String> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, "ukey called");
        Ok(hash_info(&self.info(&target).await?))
    }

    // --- Operations that must hand a live backend reference to a
    // BufferedFile take `self: &Arc<Self>` so they can clone it into a
    // `Arc<dyn Backend>` without the trait needing to be object-safe.

    async fn open_read(
        self: &Arc<Self>,
        path: &str,
        cache_type: CacheType,
        block_size: usize,
    ) -> Result<BufferedFile> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, "open_read called");
        let info = self.info(&target).await?;
        let backend: Arc<dyn Backend> = self.clone();
        Ok(BufferedFile::open_read(backend, target, info.size, cache_type, block_size).await)
    }

    /// Whether a transaction started with [`Self::start_transaction`] is
    /// currently open on this handle.
    fn in_transaction(&self) -> bool {
        self.transaction_state().is_active()
    }

    /// Open a transaction: subsequent [`Self::open_write`] calls default
    /// `autocommit` to `false` and stage themselves into it, so their
    /// `close()` only flushes without finalizing until [`Self::end_transaction`]
    /// commits every staged file in order.
    async fn start_transaction(self: &Arc<Self>) -> Result<()> {
        tracing::debug!("start_transaction called");
        self.transaction_state().begin().await
    }

    /// Commit every file staged since `start_transaction`, in order, and
    /// apply deferred cache invalidations. Clears `in_transaction` either way.
    async fn end_transaction(self: &Arc<Self>) -> Result<()> {
        tracing::debug!("end_transaction called");
        self.transaction_state().end(self.dir_cache()).await
    }

    /// Discard every file staged since `start_transaction` instead of
    /// committing it. Clears `in_transaction` either way.
    async fn discard_transaction(self: &Arc<Self>) {
        tracing::debug!("discard_transaction called");
        self.transaction_state().discard(self.dir_cache()).await
    }

    async fn open_write(
        self: &Arc<Self>,
        path: &str,
        block_size: usize,
        autocommit: bool,
    ) -> Result<StagedFile> {
        let target = self.strip_protocol(path);
        let in_transaction = self.in_transaction();
        let autocommit = autocommit && !in_transaction;
        tracing::debug!(path = %target, autocommit, "open_write called");
        let backend: Arc<dyn Backend> = self.clone();
        let file: StagedFile = Arc::new(tokio::sync::Mutex::new(BufferedFile::open_write(
            backend, target, block_size, autocommit,
        )));
        if in_transaction {
            self.transaction_state().stage(file.clone()).await;
        }
        Ok(file)
    }

    /// Open for write, write the whole buffer, close. Inside an active
    /// transaction this stages the write rather than finalizing it.
    async fn pipe_file(self: &Arc<Self>, path: &str, data: &[u8]) -> Result<()> {
        tracing::debug!(path = %path, len = data.len(), "pipe_file called");
        let file = self.open_write(path, DEFAULT_BLOCK_SIZE, true).await?;
        let mut guard = file.lock().await;
        guard.write(data).await?;
        guard.close().await?;
        Ok(())
    }

    /// Zero-length write when truncating or the path doesn't exist; else
    /// unsupported (most backends can't update just a timestamp).
    async fn touch(self: &Arc<Self>, path: &str, truncate: bool) -> Result<()> {
        let target = self.strip_protocol(path);
        tracing::debug!(path = %target, truncate, "touch called");
        if truncate || !self.exists(&target).await {
            self.pipe_file(&target, b"").await
        } else {
            Err(FsError::NotImplemented("touch on existing file without truncate".into()))
        }
    }

    /// `cat`: single bytes when the path expands to one entry, else a map.
    async fn cat(self: &Arc<Self>, path: &str, on_error: OnError) -> Result<CatResult> {
        tracing::debug!(path = %path, "cat called");
        let expanded = self.expand_path(path, false, None).await?;
        if expanded.len() == 1 {
            return Ok(CatResult::Single(self.cat_file(&expanded[0], None, None).await?));
        }
        let mut map = BTreeMap::new();
        for p in expanded {
            match self.cat_file(&p, None, None).await {
                Ok(b) => {
                    map.insert(p, Ok(b));
                }
                Err(e) => match on_error {
                    OnError::Raise => return Err(e),
                    OnError::Omit => {}
                    OnError::Return => {
                        map.insert(p, Err(e.to_string()));
                    }
                },
            }
        }
        Ok(CatResult::Many(map))
    }

    /// Stream a remote file down to a local path in `block_size` chunks.
    async fn get_file(self: &Arc<Self>, rpath: &str, lpath: &Path) -> Result<()> {
        tracing::debug!(rpath = %rpath, lpath = %lpath.display(), "get_file called");
        let mut reader = self.open_read(rpath, CacheType::default(), DEFAULT_BLOCK_SIZE).await?;
        let mut out = tokio::fs::File::create(lpath).await?;
        loop {
            let chunk = reader.read(Some(DEFAULT_BLOCK_SIZE as u64)).await?;
            if chunk.is_empty() {
                break;
            }
            tokio::io::AsyncWriteExt::write_all(&mut out, &chunk).await?;
        }
        reader.close().await?;
        Ok(())
    }

    /// Stream a local file up to the backend in one `pipe_file` call —
    /// small enough in practice (bounded by `block_size` auto-flush inside
    /// the buffered file) that a separate chunk loop isn't needed here.
    async fn put_file(self: &Arc<Self>, lpath: &Path, rpath: &str) -> Result<()> {
        tracing::debug!(lpath = %lpath.display(), rpath = %rpath, "put_file called");
        let data = tokio::fs::read(lpath).await?;
        self.pipe_file(rpath, &data).await
    }

    /// Bulk download: expand `rpaths`, preserving subtree shape under
    /// `lpath` when it names a directory (more than one source, or the
    /// caller already created it as one).
    async fn get(self: &Arc<Self>, rpaths: &[String], lpath: &Path, recursive: bool) -> Result<()> {
        tracing::debug!(count = rpaths.len(), lpath = %lpath.display(), recursive, "get called");
        let mut expanded = Vec::new();
        for p in rpaths {
            expanded.extend(self.expand_path(p, recursive, None).await?);
        }
        let target_is_dir = expanded.len() > 1 || lpath.is_dir();
        for rp in &expanded {
            let name = rp.rsplit('/').next().unwrap_or(rp);
            let target = if target_is_dir { lpath.join(name) } else { lpath.to_path_buf() };
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.get_file(rp, &target).await?;
        }
        Ok(())
    }

    /// Bulk upload: the mirror of [`Self::get`].
    async fn put(self: &Arc<Self>, lpaths: &[PathBuf], rpath: &str) -> Result<()> {
        tracing::debug!(count = lpaths.len(), rpath = %rpath, "put called");
        let target_is_dir = rpath.ends_with('/') || lpaths.len() > 1;
        for lp in lpaths {
            let name = lp.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let target = if target_is_dir {
                format!("{}/{}", rpath.trim_end_matches('/'), name)
            } else {
                rpath.to_string()
            };
            self.put_file(lp, &target).await?;
        }
        Ok(())
    }

    /// Copy within the backend. `on_error` defaults to raise, or ignore
    /// (log and continue) when `recursive=true`.
    async fn copy(&self, path1: &str, path2: &str, recursive: bool) -> Result<()> {
        tracing::debug!(path1 = %path1, path2 = %path2, recursive, "copy called");
        let sources = self.expand_path(path1, recursive, None).await?;
        let target_is_dir = path2.ends_with('/') || sources.len() > 1;
        for src in &sources {
            let name = src.rsplit('/').next().unwrap_or(src);
            let dst = if target_is_dir {
                format!("{}/{}", path2.trim_end_matches('/'), name)
            } else {
                path2.to_string()
            };
            if let Err(e) = self.cp_file(src, &dst).await {
                if recursive {
                    tracing::warn!(path = %src, error = %e, "copy: ignoring per-file error under recursive mode");
                    continue;
                }
                return Err(e);
            }
            self.invalidate_cache(Some(&dst)).await;
        }
        Ok(())
    }

    /// `copy` then `rm`.
    async fn mv(&self, path1: &str, path2: &str, recursive: bool) -> Result<()> {
        tracing::debug!(path1 = %path1, path2 = %path2, recursive, "mv called");
        self.copy(path1, path2, recursive).await?;
        self.rm(path1, recursive, None).await
    }

    /// Delete in reverse sorted order so children precede parents.
    async fn rm(&self, path: &str, recursive: bool, maxdepth: Option<usize>) -> Result<()> {
        tracing::debug!(path = %path, recursive, maxdepth = ?maxdepth, "rm called");
        let mut paths = self.expand_path(path, recursive, maxdepth).await?;
        paths.sort();
        paths.reverse();
        for p in &paths {
            if let Err(file_err) = self.rm_file(p).await {
                if self.rmdir(p).await.is_err() {
                    return Err(file_err);
                }
            }
            self.invalidate_cache(Some(p)).await;
        }
        Ok(())
    }

    // --- Aliases ---

    async fn makedir(&self, path: &str, create_parents: bool) -> Result<()> {
        self.mkdir(&self.strip_protocol(path), create_parents).await
    }

    async fn mkdirs(&self, path: &str) -> Result<()> {
        self.mkdir(&self.strip_protocol(path), true).await
    }

    async fn listdir(&self, path: &str, detail: bool) -> Result<Vec<FileInfo>> {
        self.ls_cached(path, detail).await
    }

    async fn cp(&self, path1: &str, path2: &str, recursive: bool) -> Result<()> {
        self.copy(path1, path2, recursive).await
    }

    async fn rename(&self, path1: &str, path2: &str) -> Result<()> {
        self.mv(path1, path2, false).await
    }

    async fn stat(&self, path: &str) -> Result<FileInfo> {
        self.info(path).await
    }

    async fn disk_usage(&self, path: &str, total: bool) -> Result<DuResult> {
        self.du(path, total).await
    }

    async fn delete(&self, path: &str, recursive: bool, maxdepth: Option<usize>) -> Result<()> {
        self.rm(path, recursive, maxdepth).await
    }

    async fn download(self: &Arc<Self>, rpaths: &[String], lpath: &Path, recursive: bool) -> Result<()> {
        self.get(rpaths, lpath, recursive).await
    }

    async fn upload(self: &Arc<Self>, lpaths: &[PathBuf], rpath: &str) -> Result<()> {
        self.put(lpaths, rpath).await
    }
}

impl<T: Backend + Send + Sync + Sized + 'static> FileSystemOps for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use crate::memory::MemoryFilesystem;

    fn isolated_config() -> FsConfig {
        FsConfig {
            skip_instance_cache: true,
            ..Default::default()
        }
    }

    fn fs() -> Arc<MemoryFilesystem> {
        let fs = MemoryFilesystem::new(&isolated_config());
        fs.seed("/a/b/c.txt", b"12345");
        fs.seed("/a/b/d.txt", b"1234567");
        fs.seed("/a/e.txt", b"123");
        fs
    }

    #[tokio::test]
    async fn directory_walk_scenario() {
        let fs = fs();
        let mut names = fs.find("/a", None, false).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["/a/b/c.txt", "/a/b/d.txt", "/a/e.txt"]);

        match fs.du("/a", true).await.unwrap() {
            DuResult::Total(n) => assert_eq!(n, 15),
            _ => panic!("expected total"),
        }

        match fs.du("/a", false).await.unwrap() {
            DuResult::PerFile(map) => {
                assert_eq!(map["/a/b/c.txt"], 5);
                assert_eq!(map["/a/b/d.txt"], 7);
                assert_eq!(map["/a/e.txt"], 3);
            }
            _ => panic!("expected per-file"),
        }
    }

    #[tokio::test]
    async fn glob_with_double_star_scenario() {
        let fs = fs();
        let mut all = fs.glob("/a/**/*.txt").await.unwrap();
        all.sort();
        assert_eq!(all, vec!["/a/b/c.txt", "/a/b/d.txt", "/a/e.txt"]);

        let mut one_level = fs.glob("/a/*/*.txt").await.unwrap();
        one_level.sort();
        assert_eq!(one_level, vec!["/a/b/c.txt", "/a/b/d.txt"]);
    }

    #[tokio::test]
    async fn read_block_with_delimiter_scenario() {
        let fs = MemoryFilesystem::new(&isolated_config());
        fs.seed("/log.csv", b"Alice, 100\nBob, 200\nCharlie, 300");

        let chunk = fs.read_block("/log.csv", 0, Some(13), None).await.unwrap();
        assert_eq!(&chunk[..], b"Alice, 100\nBo");

        let aligned = fs.read_block("/log.csv", 0, Some(13), Some(b"\n")).await.unwrap();
        assert_eq!(&aligned[..], b"Alice, 100\nBob, 200\n");

        let whole = fs.read_block("/log.csv", 0, None, Some(b"\n")).await.unwrap();
        assert_eq!(&whole[..], b"Alice, 100\nBob, 200\nCharlie, 300");
    }

    #[tokio::test]
    async fn negative_slice_cat_scenario() {
        let data: Vec<u8> = (0..100u8).cycle().take(100).collect();
        let fs = MemoryFilesystem::new(&isolated_config());
        fs.seed("/hundred.bin", &data);

        let tail_by_negative = fs.cat_file("/hundred.bin", Some(-10), None).await.unwrap();
        let tail_by_positive = fs.cat_file("/hundred.bin", Some(90), None).await.unwrap();
        assert_eq!(tail_by_negative, tail_by_positive);

        let head = fs.cat_file("/hundred.bin", Some(0), Some(-10)).await.unwrap();
        assert_eq!(head.len(), 90);
    }

    #[tokio::test]
    async fn find_of_a_file_returns_itself() {
        let fs = fs();
        assert_eq!(fs.find("/a/e.txt", None, false).await.unwrap(), vec!["/a/e.txt"]);
    }

    #[tokio::test]
    async fn glob_literal_round_trip() {
        let fs = fs();
        assert_eq!(fs.glob("/a/e.txt").await.unwrap(), vec!["/a/e.txt"]);
        assert_eq!(fs.glob("/a/missing.txt").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn rm_second_call_is_not_found() {
        let fs = fs();
        fs.rm("/a/e.txt", false, None).await.unwrap();
        let err = fs.rm("/a/e.txt", false, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn expand_path_empty_is_not_found() {
        let fs = fs();
        let err = fs.expand_path("/a/*.missing", false, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn invalidate_cache_none_clears_everything() {
        let fs = fs();
        let _ = fs.ls_cached("/a", true).await.unwrap();
        fs.invalidate_cache(None).await;
        match fs.dir_cache().lookup("/a", "/") {
            CacheLookup::Unknown => {}
            _ => panic!("expected dircache to be empty"),
        }
    }

    #[tokio::test]
    async fn checksum_and_ukey_are_stable_for_unchanged_file() {
        let fs = fs();
        let c1 = fs.checksum("/a/e.txt").await.unwrap();
        let c2 = fs.checksum("/a/e.txt").await.unwrap();
        assert_eq!(c1, c2);
        let u1 = fs.ukey("/a/e.txt").await.unwrap();
        assert_eq!(u1, c1, "ukey and checksum agree when no native hash is available");
    }

    #[tokio::test]
    async fn head_and_tail() {
        let fs = fs();
        assert_eq!(&fs.head("/a/b/d.txt", 3).await.unwrap()[..], b"123");
        assert_eq!(&fs.tail("/a/b/d.txt", 3).await.unwrap()[..], b"567");
    }

    #[tokio::test]
    async fn pipe_file_then_cat_round_trips() {
        let fs = fs();
        fs.pipe_file("/new.txt", b"fresh content").await.unwrap();
        match fs.cat("/new.txt", OnError::Raise).await.unwrap() {
            CatResult::Single(b) => assert_eq!(&b[..], b"fresh content"),
            _ => panic!("expected single"),
        }
    }
}
