//! Where the work behind a promise runs.
//!
//! The promise core only ever talks to an [`Executor`]. [`ThreadExecutor`]
//! gives every job its own OS thread, [`InlineExecutor`] runs it on the
//! submitting thread. A [`Runner`] pairs an executor with a
//! [`StartPolicy`] and is the entry point for new work.
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::promise::{Promise, Shared};
use crate::{lock, Error};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Hands `job` over for execution. An error means the job was dropped
    /// without running.
    fn submit(&self, job: Job) -> Result<TaskHandle, Error>;
}

/// Handle to a submitted job. Dropping it detaches the job.
#[derive(Debug)]
pub struct TaskHandle {
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// A handle for a job that already ran to completion.
    pub fn finished() -> Self {
        Self { thread: None }
    }

    pub fn from_thread(thread: JoinHandle<()>) -> Self {
        Self {
            thread: Some(thread),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Blocks until the job is done.
    pub fn join(self) -> Result<(), Error> {
        match self.thread {
            Some(thread) => thread.join().map_err(Error::from_panic),
            None => Ok(()),
        }
    }
}

/// Spawns one named thread per job. There is no pooling and no cap.
#[derive(Debug, Clone)]
pub struct ThreadExecutor {
    name_prefix: Arc<str>,
    stack_size: Option<usize>,
    spawned: Arc<AtomicUsize>,
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self {
            name_prefix: Arc::from("promise-worker"),
            stack_size: None,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ThreadExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker threads are named `<prefix>-<n>`.
    pub fn with_name_prefix(mut self, prefix: &str) -> Self {
        self.name_prefix = Arc::from(prefix);
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Number of threads this executor (and its clones) has started.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Executor for ThreadExecutor {
    fn submit(&self, job: Job) -> Result<TaskHandle, Error> {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder = thread::Builder::new().name(format!("{}-{}", self.name_prefix, id));
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        let thread = builder
            .spawn(job)
            .map_err(|err| Error::Spawn(Arc::new(err)))?;
        Ok(TaskHandle::from_thread(thread))
    }
}

/// Runs every job immediately on the thread that submits it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn submit(&self, job: Job) -> Result<TaskHandle, Error> {
        job();
        Ok(TaskHandle::finished())
    }
}

/// Decides when the work behind a promise is handed to the executor.
pub trait StartPolicy: Send + Sync + 'static {
    /// `true` when tasks wait for an explicit [`Promise::start`].
    const DEFERRED: bool;
}

/// Every invoke and chained step is submitted as soon as it exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eager;

/// Tasks are recorded and only submitted by [`Promise::start`] or
/// [`Promise::subscribe`], so a whole pipeline can be wired up first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deferred;

impl StartPolicy for Eager {
    const DEFERRED: bool = false;
}

impl StartPolicy for Deferred {
    const DEFERRED: bool = true;
}

type Launch = Box<dyn FnOnce(&dyn Executor) + Send>;

/// A deferred task. Any number of promises may share it, it is submitted
/// at most once.
pub(crate) struct PendingTask {
    launch: Mutex<Option<Launch>>,
}

impl PendingTask {
    fn new(launch: Launch) -> Arc<Self> {
        Arc::new(Self {
            launch: Mutex::new(Some(launch)),
        })
    }

    /// Returns `false` when the task had already been fired.
    pub(crate) fn fire(&self, executor: &dyn Executor) -> bool {
        let launch = lock(&self.launch).take();
        match launch {
            Some(launch) => {
                launch(executor);
                true
            }
            None => false,
        }
    }
}

/// Submits `action` and resolves `target` from its result. Panics in the
/// action become [`Error::Panicked`]. Completion observers always run,
/// even when the executor refuses the job.
pub(crate) fn dispatch<T, F>(executor: &dyn Executor, target: Arc<Shared<T>>, action: F)
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let resolver = target.clone();
    let job: Job = Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(action))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
        resolver.resolve(outcome);
    });
    if let Err(err) = executor.submit(job) {
        warn!("executor rejected task: {}", err);
        target.resolve(Err(err));
    }
}

/// Creates promises whose work runs on one executor under one start
/// policy.
///
/// # Examples
///
/// ```
/// use promise_chain::{Deferred, InlineExecutor, Runner};
/// let runner = Runner::<Deferred>::new(InlineExecutor);
/// let promise = runner.invoke(|| 21).then_apply_async(|x| x * 2);
/// assert!(!promise.is_completed());
/// promise.start();
/// assert_eq!(promise.outcome().unwrap().unwrap(), 42);
/// ```
pub struct Runner<P = Eager> {
    executor: Arc<dyn Executor>,
    policy: PhantomData<fn() -> P>,
}

impl<P> Clone for Runner<P> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            policy: PhantomData,
        }
    }
}

impl<P: StartPolicy> Default for Runner<P> {
    fn default() -> Self {
        Self::new(ThreadExecutor::new())
    }
}

impl<P: StartPolicy> Runner<P> {
    pub fn new<E: Executor + 'static>(executor: E) -> Self {
        Self::from_shared(Arc::new(executor))
    }

    pub fn from_shared(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            policy: PhantomData,
        }
    }

    pub fn invoke<T, F>(&self, action: F) -> Promise<T, P>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.try_invoke(move || Ok(action()))
    }

    /// A promise with no task behind it, settled from outside, e.g. by
    /// subscribing it to a [`Publisher`](crate::Publisher).
    pub fn unresolved<T>(&self) -> Promise<T, P>
    where
        T: Send + Sync + 'static,
    {
        Promise::from_parts(Shared::new(), vec![], self.executor.clone())
    }

    pub fn try_invoke<T, F>(&self, action: F) -> Promise<T, P>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
    {
        let shared = Shared::new();
        if P::DEFERRED {
            let target = shared.clone();
            let task = PendingTask::new(Box::new(move |executor: &dyn Executor| {
                dispatch(executor, target, action)
            }));
            debug!("task recorded, waiting for start");
            Promise::from_parts(shared, vec![task], self.executor.clone())
        } else {
            dispatch(self.executor.as_ref(), shared.clone(), action);
            Promise::from_parts(shared, vec![], self.executor.clone())
        }
    }
}
