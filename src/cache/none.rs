use async_trait::async_trait;
use bytes::Bytes;

use super::{RangeFetcher, ReadCache};
use crate::error::Result;

/// Every read is a direct backend call for exactly the requested bytes.
/// No retained state, no amortization across reads.
pub struct NoCache;

#[async_trait]
impl ReadCache for NoCache {
    async fn get(&mut self, start: u64, end: u64, fetcher: &dyn RangeFetcher) -> Result<Bytes> {
        fetcher.fetch_range(start, end).await
    }
}
