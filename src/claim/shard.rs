// src/claim/shard.rs

//! Static sharding of the item list by index.

use std::fmt;

use crate::errors::{PipeshardError, Result};
use crate::items::WorkItem;

/// One worker's slice of the item list: every item whose position `p`
/// satisfies `p % count == index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardSpec {
    pub index: usize,
    pub count: usize,
}

impl ShardSpec {
    pub fn new(index: usize, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(PipeshardError::ConfigError(
                "shard count must be at least 1".to_string(),
            ));
        }
        if index >= count {
            return Err(PipeshardError::ConfigError(format!(
                "shard index {index} is out of range for {count} shard(s)"
            )));
        }
        Ok(Self { index, count })
    }

    /// The whole item list as a single shard.
    pub fn single() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn owns(&self, position: usize) -> bool {
        position % self.count == self.index
    }

    /// Items of this shard, in input order.
    pub fn select<'a>(&self, items: &'a [WorkItem]) -> Vec<&'a WorkItem> {
        items.iter().filter(|item| self.owns(item.index)).collect()
    }
}

impl Default for ShardSpec {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}
