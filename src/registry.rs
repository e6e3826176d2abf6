//! Ordered observer lists and fault-isolated delivery.
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use log::{trace, warn};

use crate::{panic_message, Error};

pub type SuccessObserver<T> = Box<dyn FnOnce(&T) + Send>;
pub type ErrorObserver = Box<dyn FnOnce(&Error) + Send>;
pub type CompleteObserver = Box<dyn FnOnce() + Send>;

/// Observers queued on a promise that has not reached the matching state
/// yet. Each list is drained exactly once, in registration order.
pub struct CallbackRegistry<T> {
    success: Vec<SuccessObserver<T>>,
    error: Vec<ErrorObserver>,
    complete: Vec<CompleteObserver>,
}

impl<T> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self {
            success: vec![],
            error: vec![],
            complete: vec![],
        }
    }
}

impl<T> std::fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("success", &self.success.len())
            .field("error", &self.error.len())
            .field("complete", &self.complete.len())
            .finish()
    }
}

impl<T> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&mut self, observer: SuccessObserver<T>) {
        self.success.push(observer);
    }

    pub fn push_error(&mut self, observer: ErrorObserver) {
        self.error.push(observer);
    }

    pub fn push_complete(&mut self, observer: CompleteObserver) {
        self.complete.push(observer);
    }

    /// Taking one outcome's list discards the other: once a promise
    /// succeeds its error observers can never run, and the reverse.
    pub fn take_success(&mut self) -> Vec<SuccessObserver<T>> {
        self.error.clear();
        mem::take(&mut self.success)
    }

    pub fn take_error(&mut self) -> Vec<ErrorObserver> {
        self.success.clear();
        mem::take(&mut self.error)
    }

    pub fn take_complete(&mut self) -> Vec<CompleteObserver> {
        mem::take(&mut self.complete)
    }

    pub fn len(&self) -> usize {
        self.success.len() + self.error.len() + self.complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs one observer, swallowing and logging a panic so the caller can go
/// on with the next one.
pub(crate) fn isolate(kind: &str, observer: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(observer)) {
        warn!("{} observer panicked: {}", kind, panic_message(payload.as_ref()));
    }
}

pub fn deliver_success<T>(observers: Vec<SuccessObserver<T>>, value: &T) {
    trace!("delivering value to {} success observers", observers.len());
    for observer in observers {
        isolate("success", || observer(value));
    }
}

pub fn deliver_error(observers: Vec<ErrorObserver>, error: &Error) {
    trace!("delivering error to {} error observers", observers.len());
    for observer in observers {
        isolate("error", || observer(error));
    }
}

pub fn deliver_complete(observers: Vec<CompleteObserver>) {
    trace!("delivering completion to {} observers", observers.len());
    for observer in observers {
        isolate("complete", observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_delivers_in_registration_order() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut registry = CallbackRegistry::<i32>::new();
        for tag in 0..3 {
            let seen = seen.clone();
            registry.push_success(Box::new(move |value: &i32| seen.lock().unwrap().push(value + tag)));
        }
        assert_eq!(registry.len(), 3);
        deliver_success(registry.take_success(), &10);
        assert!(registry.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![10, 11, 12]);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_delivery() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut registry = CallbackRegistry::<()>::new();
        let first = seen.clone();
        registry.push_complete(Box::new(move || first.lock().unwrap().push("first")));
        registry.push_complete(Box::new(|| panic!("observer failed")));
        let last = seen.clone();
        registry.push_complete(Box::new(move || last.lock().unwrap().push("last")));
        deliver_complete(registry.take_complete());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "last"]);
    }

    #[test]
    fn test_take_error_discards_success() {
        let mut registry = CallbackRegistry::<i32>::new();
        registry.push_success(Box::new(|_: &i32| panic!("must not run")));
        registry.push_error(Box::new(|_: &Error| {}));
        assert_eq!(registry.take_error().len(), 1);
        assert!(registry.take_success().is_empty());
    }
}
