//! Executors run the producer closures and callbacks of a future.
//!
//! A future only ever submits work to its executor; it never manages the
//! executor's lifecycle. Submission is fire-and-forget and no ordering is
//! assumed between unrelated jobs.
//!
//! Blocking combinators ([`Future::flat_map`](crate::Future::flat_map) and
//! [`sequence`](crate::sequence)) park an executor thread while they join on
//! another future. On a bounded executor the pool must be larger than the
//! deepest nesting of such joins, otherwise every worker can end up waiting on
//! work that has nowhere to run. [`Future::and_then`](crate::Future::and_then)
//! does not block and is the safer choice inside producers.
use crate::future::COMPLETED_TWICE;
use crate::Error;
use futures::executor::ThreadPool;
use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
    thread,
};
use tracing::error;

const DEFAULT_NAME_PREFIX: &str = "promise-future-";

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Anything that can run a job eventually, possibly on another thread.
pub trait Executor: Send + Sync {
    /// Schedules `job` to run exactly once.
    fn execute(&self, job: Job);
}

impl<X: Executor + ?Sized> Executor for Arc<X> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

/// The executor used when none is given explicitly.
///
/// It is a single [`ThreadPerJob`] created on first use and shared by every
/// caller. Pass an executor to the `_in` constructors to substitute another
/// one, e.g. [`Immediate`] in tests.
pub fn default_executor() -> Arc<dyn Executor> {
    static DEFAULT: OnceLock<Arc<dyn Executor>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(ThreadPerJob::default()))
        .clone()
}

/// Runs a job, catching a panic so the worker survives it.
///
/// Whatever the job captured is dropped while unwinding; a captured
/// [`Promise`](crate::Promise) therefore abandons its future.
///
/// Completing a future twice is a bug in the producer and is never absorbed:
/// that panic is logged and resumed, so it reaches whoever runs the job.
pub(crate) fn run_guarded(job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = panic_message(&*payload);
        if message == COMPLETED_TWICE {
            error!(panic = message, "job completed a future twice");
            panic::resume_unwind(payload);
        }
        error!(panic = message, "job panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Unbounded executor: every job gets its own named OS thread.
///
/// Blocking joins can never starve it, which is why it is the default.
pub struct ThreadPerJob {
    name_prefix: String,
    spawned: AtomicUsize,
}

impl ThreadPerJob {
    pub fn with_name_prefix<S: Into<String>>(name_prefix: S) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            spawned: AtomicUsize::new(0),
        }
    }
}

impl Default for ThreadPerJob {
    fn default() -> Self {
        Self::with_name_prefix(DEFAULT_NAME_PREFIX)
    }
}

impl fmt::Debug for ThreadPerJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPerJob")
            .field("name_prefix", &self.name_prefix)
            .field("spawned", &self.spawned.load(Ordering::Relaxed))
            .finish()
    }
}

impl Executor for ThreadPerJob {
    fn execute(&self, job: Job) {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("{}{}", self.name_prefix, n))
            .spawn(move || run_guarded(job));
        // On failure the job is dropped unrun, which abandons its future.
        if let Err(err) = spawned {
            error!(%err, "failed to spawn job thread");
        }
    }
}

/// Settings for a [`ThreadPoolExecutor`].
///
/// ```
/// use promise_future::{PoolConfig, ThreadPoolExecutor};
/// let pool = ThreadPoolExecutor::new(PoolConfig::new().pool_size(4).name_prefix("io-"))
///     .expect("pool");
/// # drop(pool);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pool_size: Option<usize>,
    name_prefix: String,
    stack_size: Option<usize>,
}

impl PoolConfig {
    /// Defaults: one worker per CPU, `promise-future-` thread names,
    /// platform stack size.
    pub fn new() -> Self {
        Self {
            pool_size: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
            stack_size: None,
        }
    }

    /// Number of worker threads.
    pub fn pool_size(&mut self, size: usize) -> &mut Self {
        self.pool_size = Some(size);
        self
    }

    /// Workers are named `<prefix><index>`.
    pub fn name_prefix<S: Into<String>>(&mut self, name_prefix: S) -> &mut Self {
        self.name_prefix = name_prefix.into();
        self
    }

    /// Stack size in bytes of each worker thread.
    pub fn stack_size(&mut self, stack_size: usize) -> &mut Self {
        self.stack_size = Some(stack_size);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded executor backed by a `futures` thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolExecutor {
    pool: ThreadPool,
}

impl ThreadPoolExecutor {
    pub fn new(config: &PoolConfig) -> Result<Self, Error> {
        let mut builder = ThreadPool::builder();
        if let Some(size) = config.pool_size {
            if size == 0 {
                return Err(Error::InvalidPoolSize);
            }
            builder.pool_size(size);
        }
        if let Some(stack_size) = config.stack_size {
            builder.stack_size(stack_size);
        }
        builder.name_prefix(config.name_prefix.clone());
        let pool = builder.create()?;
        Ok(Self { pool })
    }
}

impl Executor for ThreadPoolExecutor {
    fn execute(&self, job: Job) {
        self.pool.spawn_ok(async move { run_guarded(job) });
    }
}

/// Runs every job on the submitting thread before `execute` returns.
///
/// Deterministic, so handy in tests. Callbacks registered on a pending future
/// then run on whichever thread completes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Executor for Immediate {
    fn execute(&self, job: Job) {
        run_guarded(job)
    }
}
