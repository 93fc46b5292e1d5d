//! Construction options recognized by the filesystem and buffered-file
//! constructors.

use std::time::Duration;

use crate::cache::CacheType;

/// Options governing a filesystem handle's directory cache and instance
/// cache participation.
#[derive(Debug, Clone)]
pub struct FsConfig {
    pub use_listings_cache: bool,
    pub listings_expiry_time: Option<Duration>,
    pub max_paths: Option<usize>,
    /// Bypass the instance cache entirely for this construction.
    pub skip_instance_cache: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        FsConfig {
            use_listings_cache: true,
            listings_expiry_time: None,
            max_paths: None,
            skip_instance_cache: false,
        }
    }
}

/// Options governing one buffered-file open. `block_size` picks a plain,
/// documented power of two (4 MiB) distinct from any one backend's own
/// multipart minimum, rather than trying to guess a universal default.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub block_size: usize,
    pub autocommit: bool,
    pub cache_type: CacheType,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            block_size: 4 * 1024 * 1024,
            autocommit: true,
            cache_type: CacheType::default(),
        }
    }
}
