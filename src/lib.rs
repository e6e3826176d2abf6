//! Callback promises that can be observed by many parties, joined pairwise
//! with [`Promise::zip`] and chained into pipelines with
//! [`Promise::then_apply_async`], every stage running as its own unit of
//! work on an [`Executor`].
//!
//! # Examples
//!
//! ```
//! use promise_chain::invoke;
//! use futures::executor::block_on;
//!
//! let rice = invoke(|| "rice");
//! let veg = invoke(|| "veg");
//! let meal = rice.zip(&veg).then_apply_async(|pair| format!("{} with {}", pair.first(), pair.second()));
//! assert_eq!(block_on(meal.completion()).unwrap(), "rice with veg");
//! ```
use std::any::Any;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod flow;
pub mod pair;
pub mod promise;
pub mod record;
pub mod registry;
pub mod runner;

pub use crate::flow::{
    CallbackPublisher, LogSubscriber, Publisher, SamplePublisher, Subscriber, Subscription,
};
pub use crate::pair::Tuple2;
pub use crate::promise::{Completion, Promise};
pub use crate::record::CompletionRecord;
pub use crate::registry::CallbackRegistry;
pub use crate::runner::{
    Deferred, Eager, Executor, InlineExecutor, Job, Runner, StartPolicy, TaskHandle,
    ThreadExecutor,
};

/// Every failure a promise can settle with. Cloneable, since one error is
/// handed to every error observer of a promise and to everything chained
/// after it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
    #[error("{0}")]
    Message(String),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn task: {0}")]
    Spawn(Arc<std::io::Error>),
    #[error("request count must not be negative, got {0}")]
    NegativeRequest(i64),
}

impl Error {
    /// Wraps any error raised by user code.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Failed(Arc::new(err))
    }

    pub fn msg(message: impl Display) -> Self {
        Error::Message(message.to_string())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Error::Panicked(panic_message(payload.as_ref()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// State behind our mutexes is only touched in small sections that cannot
/// panic, so a poisoned lock still holds consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `action` on a new thread and returns the promise it resolves.
pub fn invoke<T, F>(action: F) -> Promise<T, Eager>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Runner::<Eager>::default().invoke(action)
}

/// Like [`invoke`], for actions that report failure through a `Result`.
pub fn try_invoke<T, F>(action: F) -> Promise<T, Eager>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    Runner::<Eager>::default().try_invoke(action)
}

/// Records `action` without running it. Nothing happens until
/// [`Promise::start`] or [`Promise::subscribe`] is called on this promise
/// or on anything derived from it.
pub fn defer<T, F>(action: F) -> Promise<T, Deferred>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Runner::<Deferred>::default().invoke(action)
}

pub fn try_defer<T, F>(action: F) -> Promise<T, Deferred>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    Runner::<Deferred>::default().try_invoke(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[derive(Debug, thiserror::Error)]
    #[error("oven is broken")]
    struct OvenBroken;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::new(OvenBroken).to_string(), "oven is broken");
        assert_eq!(Error::msg("no rice").to_string(), "no rice");
        assert_eq!(
            Error::NegativeRequest(-2).to_string(),
            "request count must not be negative, got -2"
        );
    }

    #[test]
    fn test_error_from_panic() {
        let payload = panic::catch_unwind(|| panic!("burnt {}", "rice")).unwrap_err();
        match Error::from_panic(payload) {
            Error::Panicked(message) => assert_eq!(message, "burnt rice"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_lock_recovers_poison() {
        let mutex = Arc::new(Mutex::new(1));
        let poisoner = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(mutex.is_poisoned());
        assert_eq!(*lock(&mutex), 1);
    }
}
