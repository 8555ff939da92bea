//! Stock Reducers
//!
//! Common aggregates over the first selected field. Nulls are skipped like
//! SQL aggregates do; any other non-integer value fails the reduction.

use super::reducer::{Reducer, ReducerFactory};
use crate::storage::Row;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUM_COUNT: &str = "sum_count";
pub const COUNT: &str = "count";

/// Partial average: total and number of contributing rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumCount {
    pub sum: i64,
    pub count: i64,
}

fn first_integer(row: &Row) -> Result<Option<i64>> {
    match row.first() {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("Expected an integer field, got {}", value)),
    }
}

#[derive(Default)]
struct SumCountReducer {
    acc: SumCount,
}

impl SumCount {
    /// Adds `sum` over `count` rows, failing instead of wrapping.
    fn add(&mut self, sum: i64, count: i64) -> Result<()> {
        self.sum = self
            .sum
            .checked_add(sum)
            .ok_or_else(|| anyhow::anyhow!("Sum overflows i64 ({} + {})", self.sum, sum))?;
        self.count = self
            .count
            .checked_add(count)
            .ok_or_else(|| anyhow::anyhow!("Row count overflows i64"))?;
        Ok(())
    }
}

impl Reducer<Row, SumCount> for SumCountReducer {
    fn collect(&mut self, row: Row) -> Result<bool> {
        if let Some(value) = first_integer(&row)? {
            self.acc.add(value, 1)?;
        }
        Ok(true)
    }

    fn finish(self: Box<Self>) -> Result<SumCount> {
        Ok(self.acc)
    }
}

/// Remote reducer: `(sum, count)` of the first field on each node.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumCountFactory;

impl ReducerFactory<Row, SumCount> for SumCountFactory {
    fn create(&self, _args: &[Value]) -> Box<dyn Reducer<Row, SumCount>> {
        Box::new(SumCountReducer::default())
    }
}

#[derive(Default)]
struct AverageReducer {
    acc: SumCount,
}

impl Reducer<SumCount, i64> for AverageReducer {
    fn collect(&mut self, partial: SumCount) -> Result<bool> {
        self.acc.add(partial.sum, partial.count)?;
        Ok(true)
    }

    fn finish(self: Box<Self>) -> Result<i64> {
        if self.acc.count == 0 {
            return Ok(0);
        }
        Ok(self.acc.sum / self.acc.count)
    }
}

/// Local reducer: integer average over all partial `(sum, count)` pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageFactory;

impl ReducerFactory<SumCount, i64> for AverageFactory {
    fn create(&self, _args: &[Value]) -> Box<dyn Reducer<SumCount, i64>> {
        Box::new(AverageReducer::default())
    }
}

#[derive(Default)]
struct CountReducer {
    count: u64,
}

impl Reducer<Row, u64> for CountReducer {
    fn collect(&mut self, _row: Row) -> Result<bool> {
        self.count += 1;
        Ok(true)
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        Ok(self.count)
    }
}

/// Remote reducer: number of matching rows on each node.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountFactory;

impl ReducerFactory<Row, u64> for CountFactory {
    fn create(&self, _args: &[Value]) -> Box<dyn Reducer<Row, u64>> {
        Box::new(CountReducer::default())
    }
}
