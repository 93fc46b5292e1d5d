use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{RangeFetcher, ReadCache};
use crate::error::Result;

/// Maintains a set of fixed-size, block-aligned pages fetched lazily, as a
/// memory-mapped file would. Re-reading the same block never re-fetches;
/// reads spanning several blocks fetch only the missing ones.
pub struct BlockCache {
    block_size: u64,
    blocks: HashMap<u64, Bytes>,
}

impl BlockCache {
    pub fn new(block_size: usize) -> Self {
        BlockCache {
            block_size: block_size.max(1) as u64,
            blocks: HashMap::new(),
        }
    }

    fn block_index(&self, pos: u64) -> u64 {
        pos / self.block_size
    }
}

#[async_trait]
impl ReadCache for BlockCache {
    async fn get(&mut self, start: u64, end: u64, fetcher: &dyn RangeFetcher) -> Result<Bytes> {
        if end <= start {
            return Ok(Bytes::new());
        }

        let first_block = self.block_index(start);
        let last_block = self.block_index(end.saturating_sub(1));

        for idx in first_block..=last_block {
            if self.blocks.contains_key(&idx) {
                continue;
            }
            let block_start = idx * self.block_size;
            let block_end = block_start + self.block_size;
            let data = fetcher.fetch_range(block_start, block_end).await?;
            self.blocks.insert(idx, data);
        }

        let mut out = BytesMut::with_capacity((end - start) as usize);
        for idx in first_block..=last_block {
            let block_start = idx * self.block_size;
            let block = self.blocks.get(&idx).expect("just inserted");
            let lo = start.saturating_sub(block_start).min(block.len() as u64) as usize;
            let hi = end
                .saturating_sub(block_start)
                .min(block.len() as u64) as usize;
            if hi > lo {
                out.extend_from_slice(&block[lo..hi]);
            }
        }
        Ok(out.freeze())
    }
}
