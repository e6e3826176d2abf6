//! A small pull-based flow contract.
//!
//! A [`Publisher`] hands its [`Subscriber`] a [`Subscription`] through
//! `on_subscribe`. The subscriber asks for a number of items with
//! [`Subscription::request`]; the publisher delivers at most that many,
//! then either offers a new subscription for the next batch or signals
//! completion. A negative request is answered with
//! [`Error::NegativeRequest`] through `on_error`.
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::runner::{Executor, Job, ThreadExecutor};
use crate::{lock, Error};

pub trait Subscription {
    /// Asks for `count` more items. Several calls during one
    /// `on_subscribe` add up.
    fn request(&mut self, count: i64);

    /// Ends the exchange; nothing more is delivered.
    fn cancel(&mut self);
}

pub trait Subscriber<T> {
    fn on_subscribe(&mut self, _subscription: &mut dyn Subscription) {}

    fn on_next(&mut self, item: T);

    fn on_error(&mut self, _error: Error) {}

    fn on_complete(&mut self) {}
}

pub trait Publisher<T> {
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<T> + Send + 'static;
}

/// What a subscriber asked for during one `on_subscribe` call.
#[derive(Debug, Default)]
struct Demand {
    requested: Option<i64>,
    cancelled: bool,
}

impl Subscription for Demand {
    fn request(&mut self, count: i64) {
        self.requested = match self.requested {
            Some(previous) if previous < 0 => Some(previous),
            Some(previous) if count >= 0 => Some(previous.saturating_add(count)),
            _ => Some(count),
        };
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// Publishes a fixed list of items, batch by batch, on the subscribing
/// thread.
///
/// # Examples
///
/// ```
/// use promise_chain::{LogSubscriber, Publisher, SamplePublisher};
/// SamplePublisher::new((0..10).collect::<Vec<_>>()).subscribe(LogSubscriber::new(3));
/// ```
#[derive(Debug, Clone)]
pub struct SamplePublisher<T> {
    items: Vec<T>,
}

impl<T: Clone> SamplePublisher<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T: Clone> Publisher<T> for SamplePublisher<T> {
    fn subscribe<S>(&self, mut subscriber: S)
    where
        S: Subscriber<T> + Send + 'static,
    {
        let mut from: usize = 0;
        loop {
            let mut demand = Demand::default();
            subscriber.on_subscribe(&mut demand);
            if demand.cancelled {
                return;
            }
            let Some(count) = demand.requested else {
                return;
            };
            if count < 0 {
                subscriber.on_error(Error::NegativeRequest(count));
                return;
            }

            let batch = usize::try_from(count).unwrap_or(usize::MAX);
            let end = self.items.len().min(from.saturating_add(batch));
            for item in &self.items[from..end] {
                subscriber.on_next(item.clone());
            }
            if end >= self.items.len() {
                subscriber.on_complete();
                return;
            }
            if end == from {
                debug!("empty batch requested, ending the exchange");
                return;
            }
            from = end;
        }
    }
}

/// Runs an action on its executor for every subscriber and pushes the
/// single result: `on_next` or `on_error`, then always `on_complete`.
/// There is no demand to honor, so `on_subscribe` is never called.
///
/// # Examples
///
/// ```
/// use promise_chain::{CallbackPublisher, InlineExecutor, Promise, Publisher, Runner};
/// let promise: Promise<&str> = Runner::new(InlineExecutor).unresolved();
/// CallbackPublisher::new(|| "rice").subscribe(promise.clone());
/// assert_eq!(promise.outcome().unwrap().unwrap(), "rice");
/// ```
pub struct CallbackPublisher<T> {
    action: Arc<dyn Fn() -> Result<T, Error> + Send + Sync>,
    executor: Arc<dyn Executor>,
}

impl<T> Clone for CallbackPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<T> fmt::Debug for CallbackPublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPublisher").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> CallbackPublisher<T> {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::try_new(move || Ok(action()))
    }

    pub fn try_new<F>(action: F) -> Self
    where
        F: Fn() -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            action: Arc::new(action),
            executor: Arc::new(ThreadExecutor::new()),
        }
    }

    pub fn with_executor<E: Executor + 'static>(mut self, executor: E) -> Self {
        self.executor = Arc::new(executor);
        self
    }
}

impl<T: Send + 'static> Publisher<T> for CallbackPublisher<T> {
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<T> + Send + 'static,
    {
        let subscriber = Arc::new(Mutex::new(subscriber));
        let (action, target) = (self.action.clone(), subscriber.clone());
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| action()))
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
            let mut target = lock(&target);
            match outcome {
                Ok(item) => target.on_next(item),
                Err(error) => target.on_error(error),
            }
            target.on_complete();
        });
        if let Err(err) = self.executor.submit(job) {
            warn!("executor rejected publisher task: {}", err);
            let mut subscriber = lock(&subscriber);
            subscriber.on_error(err);
            subscriber.on_complete();
        }
    }
}

/// Requests a fixed batch on every `on_subscribe` and logs what arrives.
#[derive(Debug, Clone, Copy)]
pub struct LogSubscriber {
    batch: i64,
}

impl LogSubscriber {
    pub fn new(batch: i64) -> Self {
        Self { batch }
    }
}

impl<T: Debug> Subscriber<T> for LogSubscriber {
    fn on_subscribe(&mut self, subscription: &mut dyn Subscription) {
        subscription.request(self.batch);
    }

    fn on_next(&mut self, item: T) {
        info!("item: {:?}", item);
    }

    fn on_error(&mut self, error: Error) {
        warn!("error: {}", error);
    }

    fn on_complete(&mut self) {
        info!("complete");
    }
}
