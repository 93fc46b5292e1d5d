//! Write transaction coordinator.
//!
//! A transaction defers the commit of files opened for write and the
//! invalidation of directory-cache entries to a single point, so a caller
//! can stage several writes and either land them all or discard them all.
//! Not a distributed transaction: each staged file still commits
//! independently, in insertion order, and a failure partway through leaves
//! earlier commits in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex as AsyncMutex;

use crate::buffered_file::BufferedFile;
use crate::dircache::DirCache;
use crate::error::{FsError, Result};

/// One file staged inside a transaction. Shared with the caller's open
/// handle via `Arc<AsyncMutex<_>>` so either side can drive `commit` or
/// `discard`.
pub type StagedFile = Arc<AsyncMutex<BufferedFile>>;

/// Ordered collection of pending file handles with commit/discard semantics,
/// plus deferred cache invalidation.
pub struct Transaction {
    files: Vec<StagedFile>,
    pending_invalidations: Vec<Option<String>>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            files: Vec::new(),
            pending_invalidations: Vec::new(),
        }
    }

    /// Append a file opened for write with `autocommit=false` to the
    /// transaction's ordered list.
    pub fn stage(&mut self, file: StagedFile) {
        self.files.push(file);
    }

    /// Record a cache invalidation to apply at `complete()` rather than
    /// immediately. `None` means "invalidate everything under this
    /// filesystem handle".
    pub fn defer_invalidation(&mut self, path: Option<String>) {
        self.pending_invalidations.push(path);
    }

    /// Commit every staged file in insertion order. On the first failure,
    /// best-effort discard every remaining (not yet committed) file and
    /// propagate that first error. Either way, pending invalidations still
    /// drain against `cache` before returning.
    pub async fn complete(mut self, cache: &DirCache) -> Result<()> {
        let mut first_err: Option<FsError> = None;

        for (idx, file) in self.files.iter().enumerate() {
            if first_err.is_some() {
                let mut guard = file.lock().await;
                let _ = guard.discard().await;
                continue;
            }
            let mut guard = file.lock().await;
            if let Err(e) = guard.commit().await {
                tracing::warn!(index = idx, error = %e, "transaction file commit failed, discarding remainder");
                first_err = Some(e);
            }
        }

        self.drain_invalidations(cache);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Discard every staged file (abnormal exit from the scope). Pending
    /// invalidations still drain.
    pub async fn discard(mut self, cache: &DirCache) {
        for file in &self.files {
            let mut guard = file.lock().await;
            let _ = guard.discard().await;
        }
        self.drain_invalidations(cache);
    }

    fn drain_invalidations(&mut self, cache: &DirCache) {
        for path in self.pending_invalidations.drain(..) {
            match path {
                Some(p) => cache.invalidate_subtree(&p),
                None => cache.clear(),
            }
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped acquisition over a transaction: `start()` installs a fresh
/// `Transaction` and flips `in_transaction`; dropping the guard without
/// calling [`TransactionGuard::commit`] discards everything staged.
pub struct TransactionGuard<'a> {
    cache: &'a DirCache,
    transaction: Option<Transaction>,
}

impl<'a> TransactionGuard<'a> {
    pub fn start(cache: &'a DirCache) -> Self {
        TransactionGuard {
            cache,
            transaction: Some(Transaction::new()),
        }
    }

    /// Borrow the in-progress transaction to stage a file or an
    /// invalidation.
    pub fn transaction_mut(&mut self) -> &mut Transaction {
        self.transaction
            .as_mut()
            .expect("transaction guard used after completion")
    }

    /// Normal exit: commit every staged file, propagating the first error.
    pub async fn commit(mut self) -> Result<()> {
        let txn = self.transaction.take().expect("double commit");
        txn.complete(self.cache).await
    }

    /// Abnormal exit: discard every staged file.
    pub async fn abort(mut self) {
        let txn = self.transaction.take().expect("double abort");
        txn.discard(self.cache).await;
    }
}

/// Per-handle active-transaction state: whether a transaction is open, and
/// if so, the transaction itself. Lives on the concrete backend
/// ([`crate::backend::Backend::transaction_state`]) so `in_transaction` is
/// visible from a plain `&self` while staging and completion, which need to
/// mutate the pending transaction, go through the async methods here.
pub struct TransactionState {
    active: AtomicBool,
    current: AsyncMutex<Option<Transaction>>,
}

impl TransactionState {
    pub fn new() -> Self {
        TransactionState {
            active: AtomicBool::new(false),
            current: AsyncMutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Open a transaction. Errors if one is already active.
    pub async fn begin(&self) -> Result<()> {
        let mut guard = self.current.lock().await;
        if guard.is_some() {
            return Err(FsError::InvalidArgument("transaction already active".into()));
        }
        *guard = Some(Transaction::new());
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stage a file into the active transaction, if any. A no-op when no
    /// transaction is open (the caller didn't need to check first).
    pub async fn stage(&self, file: StagedFile) {
        let mut guard = self.current.lock().await;
        if let Some(txn) = guard.as_mut() {
            txn.stage(file);
        }
    }

    /// Commit the active transaction's staged files and drop it.
    pub async fn end(&self, cache: &DirCache) -> Result<()> {
        let txn = self.current.lock().await.take();
        self.active.store(false, Ordering::SeqCst);
        match txn {
            Some(t) => t.complete(cache).await,
            None => Ok(()),
        }
    }

    /// Discard the active transaction's staged files and drop it.
    pub async fn discard(&self, cache: &DirCache) {
        let txn = self.current.lock().await.take();
        self.active.store(false, Ordering::SeqCst);
        if let Some(t) = txn {
            t.discard(cache).await;
        }
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::config::FsConfig;
    use crate::filesystem::FileSystemOps;
    use crate::memory::MemoryFilesystem;
    use std::time::Duration;

    fn isolated_config() -> FsConfig {
        FsConfig {
            skip_instance_cache: true,
            ..Default::default()
        }
    }

    async fn staged_file(fs: &Arc<MemoryFilesystem>, path: &str) -> StagedFile {
        fs.open_write(path, 4096, false).await.unwrap()
    }

    #[tokio::test]
    async fn complete_commits_all_in_order() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let cache = DirCache::new(true, Some(Duration::from_secs(60)), None);
        let mut txn = Transaction::new();

        let a = staged_file(&fs, "/a.txt").await;
        a.lock().await.write(b"hello").await.unwrap();
        let b = staged_file(&fs, "/b.txt").await;
        b.lock().await.write(b"world").await.unwrap();

        txn.stage(a);
        txn.stage(b);
        txn.defer_invalidation(Some("/a.txt".into()));

        txn.complete(&cache).await.unwrap();

        assert_eq!(fs.read_all("/a.txt").await.unwrap(), b"hello");
        assert_eq!(fs.read_all("/b.txt").await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn discard_drops_pending_writes() {
        let fs = MemoryFilesystem::new(&isolated_config());
        let cache = DirCache::new(true, None, None);
        let mut txn = Transaction::new();

        let a = staged_file(&fs, "/x.txt").await;
        a.lock().await.write(b"discarded").await.unwrap();
        txn.stage(a);

        txn.discard(&cache).await;

        assert!(fs.read_all("/x.txt").await.is_err());
    }

    #[tokio::test]
    async fn transaction_scenario_failed_file_discards_the_other() {
        let fs = MemoryFilesystem::new(&isolated_config());
        fs.start_transaction().await.unwrap();
        assert!(fs.in_transaction());

        let good = fs.open_write("/keep.txt", 4096, true).await.unwrap();
        good.lock().await.write(b"kept").await.unwrap();

        let bad = fs.open_write("/drop.txt", 4096, true).await.unwrap();
        bad.lock().await.write(b"dropped").await.unwrap();

        // One file in the transaction failing means discarding the whole
        // transaction: neither staged file lands, regardless of which one
        // was at fault.
        fs.discard_transaction().await;
        assert!(!fs.in_transaction());

        assert!(fs.read_all("/keep.txt").await.is_err());
        assert!(fs.read_all("/drop.txt").await.is_err());
    }
}
