//! Buffered file object: cached reads and deferred multipart writes.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::backend::Backend;
use crate::cache::{self, CacheType, RangeFetcher, ReadCache};
use crate::error::{FsError, Result};
use crate::info::FileInfo;

/// Whence values accepted by [`BufferedFile::seek`], matching `std::io`'s.
#[derive(Debug, Clone, Copy)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}

enum Mode {
    Read {
        cache: Box<dyn ReadCache>,
    },
    Write {
        buffer: BytesMut,
        offset: Option<u64>,
        forced: bool,
        autocommit: bool,
    },
}

struct BackendFetcher {
    backend: Arc<dyn Backend>,
    path: String,
}

#[async_trait]
impl RangeFetcher for BackendFetcher {
    async fn fetch_range(&self, start: u64, end: u64) -> Result<Bytes> {
        self.backend.fetch_range(&self.path, start, end).await
    }
}

/// A single open file: either read mode (backed by one of the four cache
/// strategies) or write mode (backed by an in-memory buffer and the
/// backend's multipart upload primitives).
pub struct BufferedFile {
    backend: Arc<dyn Backend>,
    path: String,
    size: Option<u64>,
    loc: u64,
    block_size: usize,
    mode: Mode,
    closed: bool,
}

impl BufferedFile {
    /// Open `path` for reading. Captures `info(path).size` and builds the
    /// requested cache strategy.
    pub async fn open_read(
        backend: Arc<dyn Backend>,
        path: String,
        size: Option<u64>,
        cache_type: CacheType,
        block_size: usize,
    ) -> Self {
        BufferedFile {
            backend,
            path,
            size,
            loc: 0,
            block_size,
            mode: Mode::Read {
                cache: cache::build(cache_type, block_size),
            },
            closed: false,
        }
    }

    /// Open `path` for writing. `autocommit=false` defers the final flush to
    /// a transaction's `complete()`.
    pub fn open_write(
        backend: Arc<dyn Backend>,
        path: String,
        block_size: usize,
        autocommit: bool,
    ) -> Self {
        BufferedFile {
            backend,
            path,
            size: None,
            loc: 0,
            block_size,
            mode: Mode::Write {
                buffer: BytesMut::new(),
                offset: None,
                forced: false,
                autocommit,
            },
            closed: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tell(&self) -> u64 {
        self.loc
    }

    fn fetcher(&self) -> BackendFetcher {
        BackendFetcher {
            backend: self.backend.clone(),
            path: self.path.clone(),
        }
    }

    /// Read `n` bytes, or to end of file when `n` is `None`. Advances `loc`
    /// by the length actually returned, which may be short at EOF.
    pub async fn read(&mut self, n: Option<u64>) -> Result<Bytes> {
        let cache = match &mut self.mode {
            Mode::Read { cache } => cache,
            Mode::Write { .. } => {
                return Err(FsError::InvalidArgument("file is open for write".into()));
            }
        };
        if self.closed {
            return Err(FsError::IoClosed);
        }

        let size = self.size.unwrap_or(u64::MAX);
        let start = self.loc.min(size);
        let end = match n {
            Some(n) => (start + n).min(size),
            None => size,
        };
        if end <= start {
            return Ok(Bytes::new());
        }

        let fetcher = BackendFetcher {
            backend: self.backend.clone(),
            path: self.path.clone(),
        };
        let data = cache.get(start, end, &fetcher).await?;
        self.loc = start + data.len() as u64;
        Ok(data)
    }

    /// Seek within a file opened for reading. Illegal in write mode.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if matches!(self.mode, Mode::Write { .. }) {
            return Err(FsError::IllegalSeek);
        }
        let size = self.size.unwrap_or(0) as i64;
        let new_loc = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => self.loc as i64 + delta,
            SeekFrom::End(delta) => size + delta,
        };
        if new_loc < 0 {
            return Err(FsError::InvalidArgument("negative seek position".into()));
        }
        self.loc = new_loc as u64;
        Ok(self.loc)
    }

    /// Read forward until `delim` is found (inclusive) or EOF.
    pub async fn read_until(&mut self, delim: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::new();
        loop {
            let chunk = self.read(Some(self.block_size as u64)).await?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
            if let Some(pos) = find_subslice(&out, delim) {
                let cut = pos + delim.len();
                let remainder_len = out.len() - cut;
                self.loc -= remainder_len as u64;
                out.truncate(cut);
                break;
            }
        }
        Ok(out.freeze())
    }

    pub async fn read_line(&mut self) -> Result<Bytes> {
        self.read_until(b"\n").await
    }

    /// Read every remaining line, each retaining its trailing newline
    /// except possibly the last.
    pub async fn read_lines(&mut self) -> Result<Vec<Bytes>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// Append `data` to the write buffer, flushing automatically once it
    /// reaches `block_size`. Returns the number of bytes accepted.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        {
            let (buffer, forced) = match &mut self.mode {
                Mode::Write { buffer, forced, .. } => (buffer, *forced),
                Mode::Read { .. } => {
                    return Err(FsError::InvalidArgument("file is open for read".into()));
                }
            };
            if forced {
                return Err(FsError::WriteAfterForce);
            }
            buffer.extend_from_slice(data);
        }
        self.loc += data.len() as u64;

        let should_flush = match &self.mode {
            Mode::Write { buffer, .. } => buffer.len() >= self.block_size,
            Mode::Read { .. } => false,
        };
        if should_flush {
            self.flush(false).await?;
        }
        Ok(data.len())
    }

    /// Flush the write buffer. `force=true` finalizes the upload; once
    /// forced, no further writes are accepted.
    pub async fn flush(&mut self, force: bool) -> Result<()> {
        let (buffer_len, already_forced) = match &self.mode {
            Mode::Write { buffer, forced, .. } => (buffer.len(), *forced),
            Mode::Read { .. } => return Ok(()),
        };

        if already_forced {
            return if force {
                Err(FsError::WriteAfterForce)
            } else {
                Ok(())
            };
        }

        if buffer_len < self.block_size && !force {
            return Ok(());
        }

        let needs_initiate = match &self.mode {
            Mode::Write { offset, .. } => offset.is_none(),
            Mode::Read { .. } => false,
        };
        if needs_initiate {
            self.backend.initiate_upload(&self.path).await?;
            if let Mode::Write { offset, .. } = &mut self.mode {
                *offset = Some(0);
            }
        }

        let chunk = match &self.mode {
            Mode::Write { buffer, .. } => buffer.clone().freeze(),
            Mode::Read { .. } => unreachable!(),
        };
        let accepted = self.backend.upload_chunk(&self.path, chunk, force).await?;
        if accepted {
            let chunk_len = match &self.mode {
                Mode::Write { buffer, .. } => buffer.len() as u64,
                Mode::Read { .. } => unreachable!(),
            };
            if let Mode::Write { buffer, offset, forced, .. } = &mut self.mode {
                *offset = Some(offset.unwrap_or(0) + chunk_len);
                buffer.clear();
                if force {
                    *forced = true;
                }
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if matches!(self.mode, Mode::Write { .. }) {
            self.flush(true).await?;
            self.backend.dir_cache().invalidate(&self.path);
            if let Some(parent) = self.path.rsplit_once('/').map(|(p, _)| p) {
                self.backend.dir_cache().invalidate(parent);
            }
        }
        self.closed = true;
        Ok(())
    }

    /// Normal-exit close. In read mode just drops state. In write mode with
    /// `autocommit=true`, force-flushes and invalidates this path and its
    /// parent in the directory cache. With `autocommit=false` (a file staged
    /// into a [`crate::transaction::Transaction`]), only flushes whatever is
    /// already buffer-full; the upload stays open until [`Self::commit`] is
    /// called, so closing a staged handle never finalizes it early.
    /// Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let autocommit = match &self.mode {
            Mode::Write { autocommit, .. } => *autocommit,
            Mode::Read { .. } => true,
        };
        if !autocommit {
            self.flush(false).await?;
            return Ok(());
        }
        self.finalize().await
    }

    /// Commit this file as part of a transaction: force-flush and finalize
    /// regardless of the `autocommit` flag. Idempotent.
    pub async fn commit(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.finalize().await
    }

    /// Abandon this file: tell the backend to discard any in-progress
    /// upload rather than finalizing it.
    pub async fn discard(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if matches!(self.mode, Mode::Write { .. }) {
            let _ = self.backend.discard_upload(&self.path).await;
        }
        self.closed = true;
        Ok(())
    }

    pub fn info(&self) -> Option<FileInfo> {
        self.size.map(|s| FileInfo::file(self.path.clone(), s))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

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

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let backend: Arc<dyn Backend> = fs;

        let mut w = BufferedFile::open_write(backend.clone(), "/a.txt".into(), 4096, true);
        w.write(b"hello world").await.unwrap();
        w.close().await.unwrap();

        let size = backend.fetch_range("/a.txt", 0, u64::MAX).await.unwrap().len() as u64;
        let mut r =
            BufferedFile::open_read(backend.clone(), "/a.txt".into(), Some(size), CacheType::None, 4096)
                .await;
        let data = r.read(None).await.unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn write_after_force_fails() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let backend: Arc<dyn Backend> = fs;
        let mut w = BufferedFile::open_write(backend, "/a.txt".into(), 4096, true);
        w.write(b"x").await.unwrap();
        w.flush(true).await.unwrap();
        let err = w.write(b"y").await.unwrap_err();
        assert!(matches!(err, FsError::WriteAfterForce));
    }

    #[tokio::test]
    async fn seek_rejects_negative_position() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let backend: Arc<dyn Backend> = fs;
        let mut r =
            BufferedFile::open_read(backend, "/a.txt".into(), Some(10), CacheType::None, 4096).await;
        let err = r.seek(SeekFrom::Current(-1)).unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn seek_in_write_mode_is_illegal() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let backend: Arc<dyn Backend> = fs;
        let mut w = BufferedFile::open_write(backend, "/a.txt".into(), 4096, true);
        let err = w.seek(SeekFrom::Start(0)).unwrap_err();
        assert!(matches!(err, FsError::IllegalSeek));
    }

    #[tokio::test]
    async fn read_line_splits_on_newline() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let backend: Arc<dyn Backend> = fs;
        let mut w = BufferedFile::open_write(backend.clone(), "/lines.txt".into(), 4096, true);
        w.write(b"one\ntwo\nthree").await.unwrap();
        w.close().await.unwrap();

        let mut r = BufferedFile::open_read(
            backend.clone(),
            "/lines.txt".into(),
            Some(13),
            CacheType::None,
            4096,
        )
        .await;
        assert_eq!(&r.read_line().await.unwrap()[..], b"one\n");
        assert_eq!(&r.read_line().await.unwrap()[..], b"two\n");
        assert_eq!(&r.read_line().await.unwrap()[..], b"three");
        assert_eq!(&r.read_line().await.unwrap()[..], b"");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let backend: Arc<dyn Backend> = fs;
        let mut w = BufferedFile::open_write(backend, "/a.txt".into(), 4096, true);
        w.write(b"x").await.unwrap();
        w.close().await.unwrap();
        w.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_with_autocommit_false_defers_to_commit() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let mem = fs.clone();
        let backend: Arc<dyn Backend> = fs;
        let mut w = BufferedFile::open_write(backend, "/staged.txt".into(), 4096, false);
        w.write(b"not yet").await.unwrap();
        w.close().await.unwrap();
        assert!(mem.read_all("/staged.txt").await.is_err(), "close must not finalize a deferred write");

        w.commit().await.unwrap();
        assert_eq!(mem.read_all("/staged.txt").await.unwrap(), b"not yet");
    }
}
