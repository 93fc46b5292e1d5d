//! The canonical entry description returned by `ls`/`info`.

use std::collections::BTreeMap;

/// Kind of entry a [`FileInfo`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Other,
}

impl FileType {
    pub fn is_file(self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Canonical description of one filesystem entry.
///
/// Two `FileInfo` values compare equal iff `name` and `file_type` agree —
/// `size` and `extra` are not part of identity.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Absolute backend-relative path, without protocol prefix, without a
    /// trailing slash.
    pub name: String,
    /// Byte count, or `None` when the backend cannot determine it.
    pub size: Option<u64>,
    pub file_type: FileType,
    /// Implementation-specific extras: version id, etag, checksum, mtime...
    pub extra: BTreeMap<String, String>,
}

impl FileInfo {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        FileInfo {
            name: name.into(),
            size: Some(size),
            file_type: FileType::File,
            extra: BTreeMap::new(),
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        FileInfo {
            name: name.into(),
            size: Some(0),
            file_type: FileType::Directory,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl PartialEq for FileInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.file_type == other.file_type
    }
}
impl Eq for FileInfo {}
