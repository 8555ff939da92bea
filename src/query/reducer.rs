//! Reducers and Reducer Factories
//!
//! A `Reducer` folds items into private state and produces one value when
//! finished. A `ReducerFactory` builds a fresh reducer for every execution
//! context: one per target node for remote reduction, one per execution for
//! local reduction. Factories are shared between threads, reducers never are.

use super::error::ReduceError;

use anyhow::Result;
use serde_json::Value;
use std::marker::PhantomData;

/// Single-owner accumulator.
///
/// `collect` returning `Ok(false)` means "saturated": the driver stops feeding
/// items and calls `finish`. `finish` consumes the reducer, so it runs once.
pub trait Reducer<T, R>: Send {
    fn collect(&mut self, item: T) -> Result<bool>;

    fn finish(self: Box<Self>) -> Result<R>;
}

/// Builds an independent reducer bound to the query arguments.
pub trait ReducerFactory<T, R>: Send + Sync {
    fn create(&self, args: &[Value]) -> Box<dyn Reducer<T, R>>;
}

impl<T, R, F> ReducerFactory<T, R> for F
where
    F: Fn(&[Value]) -> Box<dyn Reducer<T, R>> + Send + Sync,
{
    fn create(&self, args: &[Value]) -> Box<dyn Reducer<T, R>> {
        self(args)
    }
}

/// Reducer assembled from an initial state, a step and a finisher.
pub struct FoldReducer<S, T, R, C, F> {
    state: S,
    step: C,
    done: F,
    _marker: PhantomData<fn(T) -> R>,
}

impl<S, T, R, C, F> Reducer<T, R> for FoldReducer<S, T, R, C, F>
where
    S: Send,
    C: FnMut(&mut S, T) -> Result<bool> + Send,
    F: FnOnce(S) -> Result<R> + Send,
{
    fn collect(&mut self, item: T) -> Result<bool> {
        (self.step)(&mut self.state, item)
    }

    fn finish(self: Box<Self>) -> Result<R> {
        let this = *self;
        (this.done)(this.state)
    }
}

pub fn fold<S, T, R, C, F>(init: S, step: C, done: F) -> Box<dyn Reducer<T, R>>
where
    S: Send + 'static,
    T: 'static,
    R: 'static,
    C: FnMut(&mut S, T) -> Result<bool> + Send + 'static,
    F: FnOnce(S) -> Result<R> + Send + 'static,
{
    Box::new(FoldReducer {
        state: init,
        step,
        done,
        _marker: PhantomData,
    })
}

/// Keeps every item; used when a query has no local reducer.
pub(crate) struct CollectAll<T> {
    items: Vec<T>,
}

impl<T> CollectAll<T> {
    pub(crate) fn new() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Send> Reducer<T, Vec<T>> for CollectAll<T> {
    fn collect(&mut self, item: T) -> Result<bool> {
        self.items.push(item);
        Ok(true)
    }

    fn finish(self: Box<Self>) -> Result<Vec<T>> {
        Ok(self.items)
    }
}

/// Collects every item, then reinterprets the collection as `R` through its
/// JSON form. `R = Vec<T>` always succeeds.
pub(crate) struct CollectInto<T, R> {
    items: Vec<T>,
    _marker: PhantomData<fn() -> R>,
}

impl<T, R> CollectInto<T, R> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T, R> Reducer<T, R> for CollectInto<T, R>
where
    T: serde::Serialize + Send,
    R: serde::de::DeserializeOwned,
{
    fn collect(&mut self, item: T) -> Result<bool> {
        self.items.push(item);
        Ok(true)
    }

    fn finish(self: Box<Self>) -> Result<R> {
        let as_json = serde_json::to_value(&self.items)
            .map_err(|e| ReduceError::Conversion(e.to_string()))?;
        let value = serde_json::from_value(as_json).map_err(|e| {
            ReduceError::Conversion(format!(
                "collection of remote results does not fit the local result type: {}",
                e
            ))
        })?;
        Ok(value)
    }
}
