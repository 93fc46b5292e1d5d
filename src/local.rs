//! Local-disk reference backend. Paths are plain forward-slash strings
//! relative to a configured root, resolved to real filesystem paths and
//! confined to that root by rejecting anything that canonicalizes outside
//! it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::config::FsConfig;
use crate::dircache::DirCache;
use crate::error::{FsError, Result};
use crate::info::FileInfo;
use crate::instance_cache::{compute_token, get_or_construct};
use crate::transaction::TransactionState;

pub struct LocalFilesystem {
    root: PathBuf,
    dir_cache: DirCache,
    transaction: TransactionState,
}

impl LocalFilesystem {
    /// Open a local filesystem rooted at `root`. `root` must already exist
    /// and be a directory. Deduplicated through the process-wide instance
    /// cache by `(root, config)` unless `config.skip_instance_cache` is set.
    pub async fn new(root: impl AsRef<Path>, config: &FsConfig) -> Result<Arc<Self>> {
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        let metadata = tokio::fs::metadata(&root).await?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(root.display().to_string()));
        }
        debug!(root = %root.display(), "local filesystem opened");

        let args = root.display().to_string();
        let token = compute_token::<LocalFilesystem>(&args, &[]);
        get_or_construct(token, config.skip_instance_cache, || {
            Ok(LocalFilesystem {
                root,
                dir_cache: DirCache::new(true, None, None),
                transaction: TransactionState::new(),
            })
        })
    }

    /// Resolve a `/`-separated virtual path to a confined real path,
    /// rejecting anything that would escape `root` (symlink traversal,
    /// `..` segments surviving join).
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = path.trim_start_matches('/');
        let candidate = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        };

        let check_against = if candidate.exists() {
            candidate
                .canonicalize()
                .map_err(|e| FsError::Backend(e.into()))?
        } else {
            let parent = candidate
                .parent()
                .ok_or_else(|| FsError::InvalidArgument(format!("no parent for {path}")))?;
            let canonical_parent = parent
                .canonicalize()
                .map_err(|e| FsError::Backend(e.into()))?;
            if !canonical_parent.starts_with(&self.root) {
                warn!(path = %path, "rejected path escaping export root");
                return Err(FsError::InvalidArgument(format!(
                    "path escapes root: {path}"
                )));
            }
            return Ok(candidate);
        };

        if !check_against.starts_with(&self.root) {
            warn!(path = %path, "rejected path escaping export root");
            return Err(FsError::InvalidArgument(format!(
                "path escapes root: {path}"
            )));
        }
        Ok(check_against)
    }

    fn virtual_path(&self, real: &Path) -> String {
        let relative = real.strip_prefix(&self.root).unwrap_or(real);
        let s = relative.to_string_lossy().replace('\\', "/");
        if s.is_empty() {
            "/".to_string()
        } else {
            format!("/{s}")
        }
    }
}

#[async_trait]
impl Backend for LocalFilesystem {
    fn protocols(&self) -> &[&str] {
        &["file", "local"]
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

    fn to_descriptor(&self) -> crate::registry::FsDescriptor {
        crate::registry::FsDescriptor::new(std::any::type_name::<Self>(), "file")
            .with_arg(self.root.display().to_string())
    }

    async fn ls(&self, path: &str, _detail: bool) -> Result<Vec<FileInfo>> {
        let real = self.resolve(path)?;
        let mut read_dir = tokio::fs::read_dir(&real).await?;
        let mut out = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let meta = entry.metadata().await?;
            let child_virtual = self.virtual_path(&entry.path());
            if meta.is_dir() {
                out.push(FileInfo::directory(child_virtual));
            } else {
                out.push(FileInfo::file(child_virtual, meta.len()));
            }
        }
        Ok(out)
    }

    async fn cp_file(&self, src: &str, dst: &str) -> Result<()> {
        let src_real = self.resolve(src)?;
        let dst_real = self.resolve(dst)?;
        if let Some(parent) = dst_real.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src_real, &dst_real).await?;
        Ok(())
    }

    async fn rm_file(&self, path: &str) -> Result<()> {
        let real = self.resolve(path)?;
        tokio::fs::remove_file(&real).await?;
        Ok(())
    }

    async fn fetch_range(&self, path: &str, start: u64, end: u64) -> Result<Bytes> {
        let real = self.resolve(path)?;
        let mut file = tokio::fs::File::open(&real).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let want = end.saturating_sub(start) as usize;
        let mut buf = vec![0u8; want];
        let mut total = 0;
        while total < want {
            let n = file.read(&mut buf[total..]).await?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf.truncate(total);
        Ok(Bytes::from(buf))
    }

    async fn initiate_upload(&self, path: &str) -> Result<()> {
        let real = self.resolve(path)?;
        if let Some(parent) = real.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::File::create(&real).await?;
        Ok(())
    }

    async fn upload_chunk(&self, path: &str, data: Bytes, _final_: bool) -> Result<bool> {
        let real = self.resolve(path)?;
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&real).await?;
        file.write_all(&data).await?;
        Ok(true)
    }

    async fn discard_upload(&self, path: &str) -> Result<()> {
        let real = self.resolve(path)?;
        let _ = tokio::fs::remove_file(&real).await;
        Ok(())
    }

    async fn mkdir(&self, path: &str, create_parents: bool) -> Result<()> {
        let real = self.resolve(path)?;
        if create_parents {
            tokio::fs::create_dir_all(&real).await?;
        } else {
            tokio::fs::create_dir(&real).await?;
        }
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        let real = self.resolve(path)?;
        tokio::fs::remove_dir(&real).await?;
        Ok(())
    }

    async fn created(&self, path: &str) -> Result<Option<String>> {
        let real = self.resolve(path)?;
        let meta = tokio::fs::metadata(&real).await?;
        Ok(meta.created().ok().map(|t| format!("{t:?}")))
    }

    async fn modified(&self, path: &str) -> Result<Option<String>> {
        let real = self.resolve(path)?;
        let meta = tokio::fs::metadata(&real).await?;
        Ok(meta.modified().ok().map(|t| format!("{t:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FileSystemOps;
    use tempfile::TempDir;

    fn isolated_config() -> FsConfig {
        FsConfig {
            skip_instance_cache: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ls_lists_real_files() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"hi").await.unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

        let fs = LocalFilesystem::new(dir.path(), &isolated_config()).await.unwrap();
        let mut listing = fs.ls("/", true).await.unwrap();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "/a.txt");
        assert_eq!(listing[1].name, "/sub");
        assert!(listing[1].file_type.is_dir());
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new(dir.path(), &isolated_config()).await.unwrap();
        let err = fs.resolve("/../../etc/passwd").unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn write_then_read_through_derived_ops() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new(dir.path(), &isolated_config()).await.unwrap();
        fs.pipe_file("/greeting.txt", b"hello disk").await.unwrap();
        let data = fs.cat_file("/greeting.txt", None, None).await.unwrap();
        assert_eq!(&data[..], b"hello disk");
    }
}
