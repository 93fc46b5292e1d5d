use async_trait::async_trait;
use bytes::Bytes;

use super::{RangeFetcher, ReadCache};
use crate::error::Result;

/// On a cache miss at position `p`, fetch `[p, p + blocksize)` and extend
/// forward on sequential access, so a caller reading a file start-to-end
/// triggers one backend round trip per `blocksize` bytes rather than one per
/// `read` call.
pub struct ReadaheadCache {
    block_size: u64,
    start: u64,
    data: Bytes,
}

impl ReadaheadCache {
    pub fn new(block_size: usize) -> Self {
        ReadaheadCache {
            block_size: block_size.max(1) as u64,
            start: 0,
            data: Bytes::new(),
        }
    }

    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    fn covers(&self, start: u64, end: u64) -> bool {
        !self.data.is_empty() && start >= self.start && end <= self.end()
    }
}

#[async_trait]
impl ReadCache for ReadaheadCache {
    async fn get(&mut self, start: u64, end: u64, fetcher: &dyn RangeFetcher) -> Result<Bytes> {
        if self.covers(start, end) {
            let lo = (start - self.start) as usize;
            let hi = (end - self.start) as usize;
            return Ok(self.data.slice(lo..hi));
        }

        let want_end = end.max(start + self.block_size);
        let fetched = fetcher.fetch_range(start, want_end).await?;
        self.start = start;
        self.data = fetched;

        let take = ((end - start) as usize).min(self.data.len());
        Ok(self.data.slice(0..take))
    }
}
