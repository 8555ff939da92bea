//! Reduce Future
//!
//! Single-assignment result cell handed to the caller of `reduce()` /
//! `reduce_remote()`. It moves from pending to exactly one terminal outcome
//! (a value or a `ReduceError`) and never changes again.
//!
//! Consumers can `get().await`, block in `wait()` from a thread that is not
//! driving the runtime, or register `on_complete` callbacks. Callbacks run once,
//! outside the internal lock, on whichever context completes the future.

use super::error::ReduceError;
use super::types::CancelFlag;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

pub type ReduceResult<T> = Result<T, ReduceError>;

type Callback<T> = Box<dyn FnOnce(&ReduceResult<T>) + Send>;

struct Slot<T> {
    result: Option<ReduceResult<T>>,
    callbacks: Vec<Callback<T>>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    notify: Notify,
    cancel: CancelFlag,
}

pub struct ReduceFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ReduceFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ReduceFuture<T> {
    pub(crate) fn pending() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    result: None,
                    callbacks: Vec::new(),
                }),
                ready: Condvar::new(),
                notify: Notify::new(),
                cancel: CancelFlag::default(),
            }),
        }
    }

    /// A future that is already terminal.
    pub fn ready(result: ReduceResult<T>) -> Self {
        let future = Self::pending();
        future.settle(result);
        future
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the outcome if none is stored yet. Returns whether this call
    /// was the one that completed the future.
    pub(crate) fn settle(&self, result: ReduceResult<T>) -> bool {
        let callbacks = {
            let mut slot = self.lock();
            if slot.result.is_some() {
                return false;
            }
            slot.result = Some(result.clone());
            std::mem::take(&mut slot.callbacks)
        };

        self.shared.ready.notify_all();
        self.shared.notify.notify_waiters();

        for callback in callbacks {
            callback(&result);
        }
        true
    }

    pub(crate) fn fail(&self, error: ReduceError) -> bool {
        self.settle(Err(error))
    }

    pub(crate) fn cancel_flag(&self) -> CancelFlag {
        self.shared.cancel.clone()
    }

    /// Waits for the outcome without blocking the thread.
    pub async fn get(&self) -> ReduceResult<T> {
        loop {
            let notified = self.shared.notify.notified();
            if let Some(result) = self.try_get() {
                return result;
            }
            notified.await;
        }
    }

    /// Blocks the calling thread until the outcome is known.
    ///
    /// Must not be called on a thread that is driving the runtime the
    /// execution runs on.
    pub fn wait(&self) -> ReduceResult<T> {
        let mut slot = self.lock();
        loop {
            if let Some(result) = &slot.result {
                return result.clone();
            }
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_get(&self) -> Option<ReduceResult<T>> {
        self.lock().result.clone()
    }

    /// Registers a callback run exactly once with the outcome. If the future
    /// is already terminal the callback runs immediately on this thread.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&ReduceResult<T>) + Send + 'static,
    {
        let done = {
            let mut slot = self.lock();
            match &slot.result {
                Some(result) => result.clone(),
                None => {
                    slot.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        callback(&done);
    }

    /// Fails the future with `ReduceError::Cancelled` and asks the execution
    /// to stop. Returns `false` if the future had already completed.
    pub fn cancel(&self) -> bool {
        let cancelled = self.fail(ReduceError::Cancelled);
        if cancelled {
            self.shared.cancel.cancel();
        }
        cancelled
    }

    pub fn is_done(&self) -> bool {
        self.lock().result.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.lock().result, Some(Err(ReduceError::Cancelled)))
    }
}
