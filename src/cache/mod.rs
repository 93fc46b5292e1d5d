//! Read-cache strategies for the buffered file: four tagged implementations
//! of a common byte-range provider trait, selected by `cache_type` at open
//! time.

mod block;
mod bytes_window;
mod none;
mod readahead;

pub use block::BlockCache;
pub use bytes_window::BytesCache;
pub use none::NoCache;
pub use readahead::ReadaheadCache;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Abstracts the buffered file's sole read primitive so cache strategies
/// don't need to know about [`crate::backend::Backend`] or the path they're
/// bound to.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    async fn fetch_range(&self, start: u64, end: u64) -> Result<Bytes>;
}

/// One of the four pluggable read-cache strategies.
#[async_trait]
pub trait ReadCache: Send {
    /// Serve `[start, end)`, fetching through `fetcher` for whatever isn't
    /// already held. `end` is already clamped to file size by the caller.
    async fn get(&mut self, start: u64, end: u64, fetcher: &dyn RangeFetcher) -> Result<Bytes>;
}

/// Strategy selector, mirrors the `cache_type` constructor option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    Readahead,
    None,
    Block,
    Bytes,
}

impl Default for CacheType {
    fn default() -> Self {
        CacheType::Readahead
    }
}

pub fn build(cache_type: CacheType, block_size: usize) -> Box<dyn ReadCache> {
    match cache_type {
        CacheType::Readahead => Box::new(ReadaheadCache::new(block_size)),
        CacheType::None => Box::new(NoCache),
        CacheType::Block => Box::new(BlockCache::new(block_size)),
        CacheType::Bytes => Box::new(BytesCache::new()),
    }
}
