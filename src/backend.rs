//! The capability interface a concrete backend implements.
//!
//! An `async_trait` object-safe interface implemented once per storage
//! backend, covering a small primitive set: list, read a byte range, write
//! via a multipart-style upload, remove, copy. Everything else is a derived
//! default method on [`crate::filesystem::FileSystemOps`].

use async_trait::async_trait;
use bytes::Bytes;

use crate::dircache::DirCache;
use crate::error::Result;
use crate::info::FileInfo;
use crate::transaction::TransactionState;

/// The primitive, backend-specific operations the derived-operations engine
/// is built on. Optional members carry a default that returns
/// [`crate::error::FsError::NotImplemented`], matching the "optional" column
/// of the external interface table.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Scheme names this backend answers to, e.g. `["file"]` or `["mem"]`.
    fn protocols(&self) -> &[&str];

    /// The string prefix representing absolute root for this backend; empty
    /// for stores with no absolute-path concept.
    fn root_marker(&self) -> &str;

    /// The per-handle directory listing cache.
    fn dir_cache(&self) -> &DirCache;

    /// The per-handle active-transaction state.
    fn transaction_state(&self) -> &TransactionState;

    /// List one directory's immediate entries. Required primitive.
    async fn ls(&self, path: &str, detail: bool) -> Result<Vec<FileInfo>>;

    /// Copy within the backend without a local round-trip. Required.
    async fn cp_file(&self, src: &str, dst: &str) -> Result<()>;

    /// Remove a single file. Required (directories go through `rmdir`).
    async fn rm_file(&self, path: &str) -> Result<()>;

    /// Read `[start, end)` of `path`. Required primitive behind every
    /// buffered-file read cache strategy.
    async fn fetch_range(&self, path: &str, start: u64, end: u64) -> Result<Bytes>;

    /// Begin a multipart-style upload to `path`. Required write primitive.
    async fn initiate_upload(&self, path: &str) -> Result<()>;

    /// Upload one chunk. `final_` marks the last chunk of the upload; the
    /// return value distinguishes acceptance (`true`) from "not ready yet"
    /// (`false`).
    async fn upload_chunk(&self, path: &str, data: Bytes, final_: bool) -> Result<bool>;

    /// Abandon an in-progress upload (abnormal exit from a buffered file in
    /// write mode). Backends without a cancelable multipart API may treat
    /// this as a no-op; it must never leave partial content visible to
    /// readers.
    async fn discard_upload(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    /// Create a directory. Optional; object stores with no directory
    /// concept leave this unimplemented.
    async fn mkdir(&self, _path: &str, _create_parents: bool) -> Result<()> {
        Err(crate::error::FsError::NotImplemented("mkdir".into()))
    }

    /// Remove an empty directory. Optional.
    async fn rmdir(&self, _path: &str) -> Result<()> {
        Err(crate::error::FsError::NotImplemented("rmdir".into()))
    }

    /// Creation timestamp, as an opaque backend-formatted string. Optional.
    async fn created(&self, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Last-modified timestamp, as an opaque backend-formatted string.
    /// Optional.
    async fn modified(&self, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// True content hash, when the backend has one cheaply available
    /// (an S3 ETag, a content-addressed store's digest). Optional; the
    /// derived `checksum` falls back to hashing `info(path)` when absent.
    async fn native_checksum(&self, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Render this handle as a [`crate::registry::FsDescriptor`]: the
    /// serializable counterpart consumed by
    /// [`crate::registry::FsRegistry::from_descriptor`]. The default
    /// records the Rust type name and first protocol with no args/options;
    /// a backend whose construction takes arguments that matter for
    /// reconstruction (a root path, credentials) should override this.
    fn to_descriptor(&self) -> crate::registry::FsDescriptor
    where
        Self: Sized,
    {
        crate::registry::FsDescriptor::new(
            std::any::type_name::<Self>(),
            self.protocols().first().copied().unwrap_or(""),
        )
    }
}
