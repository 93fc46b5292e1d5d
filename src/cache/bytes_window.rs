use async_trait::async_trait;
use bytes::Bytes;

use super::{RangeFetcher, ReadCache};
use crate::error::Result;

/// Maintains a single contiguous window `[start, end)`, resized on demand to
/// cover whatever range was last requested. Unlike [`super::readahead`] it
/// never over-fetches beyond the requested bytes.
pub struct BytesCache {
    start: u64,
    data: Bytes,
}

impl BytesCache {
    pub fn new() -> Self {
        BytesCache {
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

impl Default for BytesCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadCache for BytesCache {
    async fn get(&mut self, start: u64, end: u64, fetcher: &dyn RangeFetcher) -> Result<Bytes> {
        if self.covers(start, end) {
            let lo = (start - self.start) as usize;
            let hi = (end - self.start) as usize;
            return Ok(self.data.slice(lo..hi));
        }

        let fetched = fetcher.fetch_range(start, end).await?;
        self.start = start;
        self.data = fetched.clone();
        Ok(fetched)
    }
}
