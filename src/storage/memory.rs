use super::clause::SelectClause;
use super::partitioner::PartitionManager;
use super::{FieldScan, Row, RowIter};

use anyhow::Result;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredRow {
    table: String,
    fields: Map<String, Value>,
}

/// Node-local, partitioned row storage.
///
/// Structure: `Partition ID -> Row key -> Row`.
pub struct RowStore {
    local_data: Arc<DashMap<u32, DashMap<String, StoredRow>>>,
    partitioner: Arc<PartitionManager>,
}

impl RowStore {
    pub fn new(partitioner: Arc<PartitionManager>) -> Self {
        Self {
            local_data: Arc::new(DashMap::new()),
            partitioner,
        }
    }

    /// Stores `row` under `key`, replacing any previous row with that key.
    /// Only JSON objects can be stored.
    pub fn put(&self, table: &str, key: &str, row: Value) -> Result<u32> {
        let fields = match row {
            Value::Object(fields) => fields,
            other => {
                return Err(anyhow::anyhow!(
                    "Row '{}' must be a JSON object, got {}",
                    key,
                    other
                ));
            }
        };

        let partition = self.partitioner.get_partition(key);
        let partition_map = self
            .local_data
            .entry(partition)
            .or_insert_with(DashMap::new);
        partition_map.insert(
            key.to_string(),
            StoredRow {
                table: table.to_string(),
                fields,
            },
        );

        tracing::debug!("Stored row {} ({}) in partition {}", key, table, partition);
        Ok(partition)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let partition = self.partitioner.get_partition(key);

        self.local_data
            .get(&partition)
            .and_then(|partition_map| {
                partition_map
                    .get(key)
                    .map(|row| Value::Object(row.fields.clone()))
            })
    }

    pub fn remove(&self, key: &str) -> bool {
        let partition = self.partitioner.get_partition(key);

        self.local_data
            .get(&partition)
            .map(|partition_map| partition_map.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn local_partition_count(&self) -> usize {
        self.local_data.len()
    }

    pub fn local_entry_count(&self) -> usize {
        self.local_data
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Matching rows of one partition, projected. The partition is copied out
    /// so no map guard outlives the call.
    fn scan_partition(&self, partition: u32, clause: &SelectClause, args: &[Value]) -> Vec<Row> {
        let Some(partition_map) = self.local_data.get(&partition) else {
            return Vec::new();
        };

        let mut keys: Vec<String> = partition_map.iter().map(|e| e.key().clone()).collect();
        keys.sort();

        keys.iter()
            .filter_map(|key| {
                let row = partition_map.get(key)?;
                clause
                    .matches(&row.table, &row.fields, args)
                    .then(|| clause.project(&row.fields))
            })
            .collect()
    }
}

impl FieldScan for RowStore {
    fn scan<'a>(&'a self, clause: &SelectClause, args: &[Value]) -> Result<RowIter<'a>> {
        clause.check_args(args)?;

        let mut partitions: Vec<u32> = self.local_data.iter().map(|e| *e.key()).collect();
        partitions.sort_unstable();

        let clause = clause.clone();
        let args = args.to_vec();

        Ok(Box::new(partitions.into_iter().flat_map(move |partition| {
            self.scan_partition(partition, &clause, &args)
        })))
    }
}
