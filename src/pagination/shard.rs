//! Shard planning
//!
//! Page 1 is fetched on its own to learn the total record count. Everything after
//! it is split into page-sized shards that partition `[first_page_count, total)`
//! with no gaps and no overlaps.

use serde::{Deserialize, Serialize};

/// One page of the remaining range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataShard {
    /// Records already covered before this shard (0-based offset of its first record)
    pub start_index: usize,
    /// Records in this shard
    pub page_size: usize,
    /// 1-based page number; the first shard is page 2
    pub shard_index: usize,
}

impl DataShard {
    /// Offset one past this shard's last record
    pub fn end(&self) -> usize {
        self.start_index + self.page_size
    }
}

/// Plan the shards still to fetch after page 1
///
/// # Arguments
/// * `first_page_count` - Records page 1 returned
/// * `total` - Total records reported by page 1
/// * `base_page_size` - Maximum records per shard
///
/// # Returns
/// Shards ordered by `shard_index`, starting at 2. Empty when page 1 already
/// covers `total`, or when `base_page_size` is 0.
pub fn calculate_shards(first_page_count: usize, total: usize, base_page_size: usize) -> Vec<DataShard> {
    if base_page_size == 0 || total <= first_page_count {
        return Vec::new();
    }

    let mut shards = Vec::with_capacity((total - first_page_count).div_ceil(base_page_size));
    let mut current = first_page_count;
    let mut shard_index = 2;

    while current < total {
        let page_size = base_page_size.min(total - current);
        shards.push(DataShard {
            start_index: current,
            page_size,
            shard_index,
        });
        current += page_size;
        shard_index += 1;
    }

    shards
}
