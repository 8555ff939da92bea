//! Remote Reducer Registry
//!
//! Maps reducer names to factories so a node can rebuild the remote reducer a
//! query names when the scan arrives over the wire. Every node registers the
//! same names at start-up; results leave the node as JSON values.

use super::reducer::{Reducer, ReducerFactory};
use crate::storage::Row;

use anyhow::Result;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased remote reducer factory producing JSON values.
pub type JsonReducerFactory = Arc<dyn ReducerFactory<Row, Value>>;

/// Registry holding the mapping between reducer names and their factories.
pub struct ReducerRegistry {
    factories: DashMap<String, JsonReducerFactory>,
}

impl ReducerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `factory` under `name`, replacing any earlier registration.
    pub fn register<R, F>(&self, name: &str, factory: F)
    where
        R: Serialize + 'static,
        F: ReducerFactory<Row, R> + 'static,
    {
        let erased: JsonReducerFactory = Arc::new(JsonFactory {
            inner: factory,
            _marker: PhantomData,
        });

        self.factories.insert(name.to_string(), erased);

        tracing::info!("Registered remote reducer: {}", name);
    }

    pub fn get(&self, name: &str) -> Option<JsonReducerFactory> {
        self.factories.get(name).map(|entry| entry.value().clone())
    }

    /// Creates a fresh reducer for `name` bound to `args`.
    pub fn create(&self, name: &str, args: &[Value]) -> Result<Box<dyn Reducer<Row, Value>>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory.value().create(args)),
            None => {
                let error = format!("Unknown remote reducer: {}", name);
                tracing::error!("{}", error);
                Err(anyhow::anyhow!(error))
            }
        }
    }

    pub fn list_reducers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn has_reducer(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn reducer_count(&self) -> usize {
        self.factories.len()
    }
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }
}

struct JsonFactory<F, R> {
    inner: F,
    _marker: PhantomData<fn() -> R>,
}

impl<F, R> ReducerFactory<Row, Value> for JsonFactory<F, R>
where
    R: Serialize + 'static,
    F: ReducerFactory<Row, R>,
{
    fn create(&self, args: &[Value]) -> Box<dyn Reducer<Row, Value>> {
        Box::new(JsonReducer {
            inner: self.inner.create(args),
        })
    }
}

struct JsonReducer<R> {
    inner: Box<dyn Reducer<Row, R>>,
}

impl<R: Serialize + 'static> Reducer<Row, Value> for JsonReducer<R> {
    fn collect(&mut self, item: Row) -> Result<bool> {
        self.inner.collect(item)
    }

    fn finish(self: Box<Self>) -> Result<Value> {
        let value = self.inner.finish()?;
        Ok(serde_json::to_value(value)?)
    }
}
