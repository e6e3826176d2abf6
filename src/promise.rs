//! The promise and its combinators.
//!
//! A promise resolves exactly once, to a value or to an [`Error`]. Any
//! number of observers can be attached: observers attached before the
//! promise resolves are queued and run in registration order when it
//! does, observers attached afterwards run right away on the attaching
//! thread. Checking the state and queueing an observer happen under the
//! same lock, so an observer is never lost or run twice; the observers
//! themselves always run outside that lock.
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use log::debug;

use crate::flow::{Publisher, Subscriber, Subscription};
use crate::pair::Tuple2;
use crate::record::CompletionRecord;
use crate::registry::{deliver_complete, deliver_error, deliver_success, CallbackRegistry};
use crate::runner::{dispatch, Eager, Executor, PendingTask, StartPolicy};
use crate::{lock, Error};

/// State shared by every clone of a promise and by the tasks and
/// observers that resolve it.
pub(crate) struct Shared<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    record: CompletionRecord<T>,
    callbacks: CallbackRegistry<T>,
}

impl<T> Shared<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                record: CompletionRecord::new(),
                callbacks: CallbackRegistry::new(),
            }),
        })
    }

    /// Settles with a value. Ignored when already settled.
    pub(crate) fn succeed(&self, value: T) {
        let (observers, value) = {
            let mut inner = lock(&self.inner);
            if inner.record.is_completed() {
                debug!("ignoring value for a promise that already settled");
                return;
            }
            inner.record.set_value(value);
            inner.record.set_completed(true);
            (inner.callbacks.take_success(), inner.record.value().cloned())
        };
        if let Some(value) = value {
            deliver_success(observers, value.as_ref());
        }
    }

    /// Settles with an error. Ignored when already settled.
    pub(crate) fn fail(&self, error: Error) {
        let observers = {
            let mut inner = lock(&self.inner);
            if inner.record.is_completed() {
                debug!("ignoring error for a promise that already settled: {}", error);
                return;
            }
            inner.record.set_error(error.clone());
            inner.record.set_completed(true);
            inner.callbacks.take_error()
        };
        deliver_error(observers, &error);
    }

    /// Runs the completion observers. Only the first call finds any.
    pub(crate) fn complete(&self) {
        let observers = {
            let mut inner = lock(&self.inner);
            inner.record.set_completed(true);
            inner.callbacks.take_complete()
        };
        deliver_complete(observers);
    }

    pub(crate) fn resolve(&self, outcome: Result<T, Error>) {
        match outcome {
            Ok(value) => self.succeed(value),
            Err(error) => self.fail(error),
        }
        self.complete();
    }

    fn on_success(&self, observer: Box<dyn FnOnce(&T) + Send>) {
        let value = {
            let mut inner = lock(&self.inner);
            if inner.record.is_error() {
                return;
            }
            if !inner.record.is_success() {
                inner.callbacks.push_success(observer);
                return;
            }
            inner.record.value().cloned()
        };
        if let Some(value) = value {
            deliver_success(vec![observer], value.as_ref());
        }
    }

    fn on_error(&self, observer: Box<dyn FnOnce(&Error) + Send>) {
        let error = {
            let mut inner = lock(&self.inner);
            if inner.record.is_success() {
                return;
            }
            if !inner.record.is_error() {
                inner.callbacks.push_error(observer);
                return;
            }
            inner.record.error().cloned()
        };
        if let Some(error) = error {
            deliver_error(vec![observer], &error);
        }
    }

    fn on_complete(&self, observer: Box<dyn FnOnce() + Send>) {
        {
            let mut inner = lock(&self.inner);
            if !inner.record.is_completed() {
                inner.callbacks.push_complete(observer);
                return;
            }
        }
        deliver_complete(vec![observer]);
    }

    fn outcome(&self) -> Option<Result<T, Error>>
    where
        T: Clone,
    {
        let inner = lock(&self.inner);
        if let Some(error) = inner.record.error() {
            Some(Err(error.clone()))
        } else if inner.record.is_success() {
            inner.record.value().map(|value| Ok(T::clone(value)))
        } else {
            None
        }
    }
}

/// A value or error that will be available later.
///
/// Clones are handles to the same promise. `P` is the [`StartPolicy`]:
/// with [`Eager`] work starts as soon as it is created, with
/// [`Deferred`](crate::Deferred) nothing runs until [`Promise::start`].
pub struct Promise<T, P = Eager> {
    shared: Arc<Shared<T>>,
    launch: Vec<Arc<PendingTask>>,
    executor: Arc<dyn Executor>,
    policy: PhantomData<fn() -> P>,
}

impl<T, P> Clone for Promise<T, P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            launch: self.launch.clone(),
            executor: self.executor.clone(),
            policy: PhantomData,
        }
    }
}

impl<T, P> fmt::Debug for Promise<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.shared.inner);
        f.debug_struct("Promise")
            .field("completed", &inner.record.is_completed())
            .field("success", &inner.record.is_success())
            .field("error", &inner.record.error())
            .field("observers", &inner.callbacks.len())
            .field("deferred_tasks", &self.launch.len())
            .finish()
    }
}

impl<T, P> Promise<T, P>
where
    T: Send + Sync + 'static,
    P: StartPolicy,
{
    pub(crate) fn from_parts(
        shared: Arc<Shared<T>>,
        launch: Vec<Arc<PendingTask>>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            shared,
            launch,
            executor,
            policy: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn launch(&self) -> &[Arc<PendingTask>] {
        &self.launch
    }

    /// Calls `observer` with the value once this promise succeeds, or
    /// right away if it already has. A panicking observer is logged and
    /// does not affect the promise or the other observers.
    pub fn when_success<F>(&self, observer: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.shared.on_success(Box::new(observer));
        self.clone()
    }

    pub fn when_error<F>(&self, observer: F) -> Self
    where
        F: FnOnce(&Error) + Send + 'static,
    {
        self.shared.on_error(Box::new(observer));
        self.clone()
    }

    /// Calls `observer` once this promise has completed either way. Queued
    /// completion observers run after the success or error observers.
    pub fn when_complete<F>(&self, observer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.on_complete(Box::new(observer));
        self.clone()
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.shared.inner).record.is_completed()
    }

    pub fn is_success(&self) -> bool {
        lock(&self.shared.inner).record.is_success()
    }

    pub fn is_error(&self) -> bool {
        lock(&self.shared.inner).record.is_error()
    }

    /// The settled result, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, Error>>
    where
        T: Clone,
    {
        self.shared.outcome()
    }

    /// Joins two promises. The result succeeds with both values once both
    /// sides have succeeded, and fails with whichever error shows up first
    /// before that. Its completion observers run once both sides have
    /// completed.
    ///
    /// Both values go into one two-slot barrier behind a single lock, so
    /// two sides succeeding at the same moment on different threads still
    /// produce exactly one pair.
    ///
    /// An early error settles the result before the slower side is done.
    /// Completion observers queued by then still wait for both sides, but
    /// ones registered afterwards see a settled promise and run at once.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::invoke;
    /// use futures::executor::block_on;
    /// let joined = invoke(|| "rice").zip(&invoke(|| "veg"));
    /// assert_eq!(block_on(joined.completion()).unwrap().into_inner(), ("rice", "veg"));
    /// ```
    pub fn zip<V>(&self, other: &Promise<V, P>) -> Promise<Tuple2<T, V>, P>
    where
        T: Clone,
        V: Clone + Send + Sync + 'static,
    {
        let joined = Shared::new();
        let join = Arc::new(Mutex::new(Join::new()));

        let (slots, target) = (join.clone(), joined.clone());
        self.when_success(move |value: &T| {
            let pair = lock(&slots).offer_first(value.clone());
            if let Some(pair) = pair {
                target.succeed(pair);
            }
        });
        let (slots, target) = (join.clone(), joined.clone());
        other.when_success(move |value: &V| {
            let pair = lock(&slots).offer_second(value.clone());
            if let Some(pair) = pair {
                target.succeed(pair);
            }
        });

        self.when_error(join_error(&join, &joined));
        other.when_error(join_error(&join, &joined));

        self.when_complete(join_complete(&join, &joined));
        other.when_complete(join_complete(&join, &joined));

        let mut launch = self.launch.clone();
        launch.extend(other.launch.iter().cloned());
        Promise::from_parts(joined, launch, self.executor.clone())
    }

    /// Runs `function` on the value as a new task once this promise
    /// succeeds. A panic in `function` fails the returned promise. When
    /// this promise fails, the error is passed on and `function` never
    /// runs.
    pub fn then_apply_async<V, F>(&self, function: F) -> Promise<V, P>
    where
        T: Clone,
        V: Send + Sync + 'static,
        F: FnOnce(T) -> V + Send + 'static,
    {
        self.then_try_apply_async(move |value| Ok(function(value)))
    }

    /// Like [`then_apply_async`](Self::then_apply_async) for functions
    /// that report failure through a `Result`.
    pub fn then_try_apply_async<V, F>(&self, function: F) -> Promise<V, P>
    where
        T: Clone,
        V: Send + Sync + 'static,
        F: FnOnce(T) -> Result<V, Error> + Send + 'static,
    {
        let chained = Shared::new();

        let (executor, target) = (self.executor.clone(), chained.clone());
        self.when_success(move |value: &T| {
            let value = value.clone();
            debug!("source succeeded, dispatching chained step");
            dispatch(executor.as_ref(), target, move || function(value));
        });
        let target = chained.clone();
        self.when_error(move |error: &Error| target.resolve(Err(error.clone())));

        Promise::from_parts(chained, self.launch.clone(), self.executor.clone())
    }

    /// Submits every deferred task this promise depends on that has not
    /// been submitted yet. Does nothing for eager promises.
    pub fn start(&self) {
        let fired = self
            .launch
            .iter()
            .filter(|task| task.fire(self.executor.as_ref()))
            .count();
        debug!("started {} of {} deferred tasks", fired, self.launch.len());
    }

    /// Forwards the outcome to `subscriber` and then starts the promise.
    pub fn subscribe<S>(&self, subscriber: S)
    where
        T: Clone,
        S: Subscriber<T> + Send + 'static,
    {
        let subscriber = Arc::new(Mutex::new(subscriber));
        let next = subscriber.clone();
        self.when_success(move |value: &T| lock(&next).on_next(value.clone()));
        let error = subscriber.clone();
        self.when_error(move |err: &Error| lock(&error).on_error(err.clone()));
        self.when_complete(move || lock(&subscriber).on_complete());
        self.start();
    }

    /// A future for the outcome, ready once the completion observers of
    /// this promise run.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::invoke;
    /// use futures::executor::block_on;
    /// let promise = invoke(|| String::from("🍓"));
    /// assert_eq!(block_on(promise.completion()).unwrap(), "🍓");
    /// ```
    pub fn completion(&self) -> Completion<T>
    where
        T: Clone,
    {
        let waiting = Arc::new(Mutex::new(Waiting {
            outcome: None,
            waker: None,
        }));
        let notify = waiting.clone();
        let shared = Arc::downgrade(&self.shared);
        self.when_complete(move || {
            let outcome = shared
                .upgrade()
                .and_then(|shared| shared.outcome())
                .unwrap_or_else(|| Err(Error::msg("promise completed without an outcome")));
            let waker = {
                let mut waiting = lock(&notify);
                waiting.outcome = Some(outcome);
                waiting.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake()
            }
        });
        Completion { waiting }
    }
}

impl<T, P> Publisher<T> for Promise<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: StartPolicy,
{
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<T> + Send + 'static,
    {
        Promise::subscribe(self, subscriber)
    }
}

/// A promise can stand at the end of a flow: it asks for one item, settles
/// with it and completes. A publisher that completes without any item
/// fails the promise.
impl<T, P> Subscriber<T> for Promise<T, P>
where
    T: Send + Sync + 'static,
    P: StartPolicy,
{
    fn on_subscribe(&mut self, subscription: &mut dyn Subscription) {
        if self.is_completed() {
            subscription.cancel();
            self.shared.complete();
        } else {
            subscription.request(1);
        }
    }

    fn on_next(&mut self, item: T) {
        self.shared.succeed(item);
    }

    fn on_error(&mut self, error: Error) {
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        if !self.is_completed() {
            self.shared.fail(Error::msg("publisher completed without an item"));
        }
        self.shared.complete();
    }
}

fn join_error<A, B>(
    join: &Arc<Mutex<Join<A, B>>>,
    joined: &Arc<Shared<Tuple2<A, B>>>,
) -> impl FnOnce(&Error) + Send + 'static
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    let (slots, target) = (join.clone(), joined.clone());
    move |error: &Error| {
        if lock(&slots).settle() {
            target.fail(error.clone());
        }
    }
}

fn join_complete<A, B>(
    join: &Arc<Mutex<Join<A, B>>>,
    joined: &Arc<Shared<Tuple2<A, B>>>,
) -> impl FnOnce() + Send + 'static
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    let (slots, target) = (join.clone(), joined.clone());
    move || {
        if lock(&slots).complete_side() {
            target.complete();
        }
    }
}

/// Two-slot barrier behind a [`zip`](Promise::zip).
struct Join<A, B> {
    first: Option<A>,
    second: Option<B>,
    settled: bool,
    completed_sides: u8,
}

impl<A, B> Join<A, B> {
    fn new() -> Self {
        Self {
            first: None,
            second: None,
            settled: false,
            completed_sides: 0,
        }
    }

    fn offer_first(&mut self, value: A) -> Option<Tuple2<A, B>> {
        if self.settled {
            return None;
        }
        self.first = Some(value);
        self.pair()
    }

    fn offer_second(&mut self, value: B) -> Option<Tuple2<A, B>> {
        if self.settled {
            return None;
        }
        self.second = Some(value);
        self.pair()
    }

    fn pair(&mut self) -> Option<Tuple2<A, B>> {
        match (self.first.take(), self.second.take()) {
            (Some(first), Some(second)) => {
                self.settled = true;
                Some(Tuple2::new(first, second))
            }
            (first, second) => {
                self.first = first;
                self.second = second;
                None
            }
        }
    }

    /// `true` for the first caller only; the join is decided from then on.
    fn settle(&mut self) -> bool {
        !std::mem::replace(&mut self.settled, true)
    }

    /// `true` once both sides have completed.
    fn complete_side(&mut self) -> bool {
        self.completed_sides += 1;
        self.completed_sides == 2
    }
}

/// Future returned by [`Promise::completion`].
pub struct Completion<T> {
    waiting: Arc<Mutex<Waiting<T>>>,
}

struct Waiting<T> {
    outcome: Option<Result<T, Error>>,
    waker: Option<Waker>,
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let waiting = lock(&self.waiting);
        f.debug_struct("Completion")
            .field("ready", &waiting.outcome.is_some())
            .finish()
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut waiting = lock(&self.waiting);
        match waiting.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                waiting.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
