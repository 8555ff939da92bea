use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const DEFAULT_PARTITIONS: u32 = 256;

pub struct PartitionManager {
    pub(crate) num_partitions: u32,
}

impl PartitionManager {
    pub fn new(num_partitions: u32) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn get_partition(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish() as u32;
        hash % self.num_partitions
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}
