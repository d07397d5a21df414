//! The single-assignment cell and its combinators.
//!
//! A [`Future`] starts pending and settles exactly once, either by being
//! completed through its [`Promise`] or by being abandoned when the last
//! promise handle goes away without completing it. Settling wakes every
//! thread blocked in [`Future::result`] / [`Future::wait_result`], every task
//! awaiting the future, and schedules the registered callbacks on the
//! future's executor.
use crate::executor::{default_executor, Executor};
use crate::Error;
use std::{
    fmt, mem,
    pin::Pin,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
    time::Duration,
};
use tracing::{debug, trace};

pub(crate) const COMPLETED_TWICE: &str = "future cannot be completed more than once";

type Callback<T, E> = Box<dyn FnOnce(Result<T, E>) + Send + 'static>;

enum State<T, E> {
    Pending {
        callbacks: Vec<Callback<T, E>>,
        wakers: Vec<Waker>,
    },
    Completed(Result<T, E>),
    Abandoned,
}

impl<T, E> State<T, E> {
    fn pending() -> Self {
        State::Pending {
            callbacks: vec![],
            wakers: vec![],
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, State::Pending { .. })
    }
}

struct Inner<T, E> {
    state: Mutex<State<T, E>>,
    ready: Condvar,
    executor: Arc<dyn Executor>,
}

impl<T, E> Inner<T, E> {
    fn new(state: State<T, E>, executor: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new(Inner {
            state: Mutex::new(state),
            ready: Condvar::new(),
            executor,
        })
    }

    // No callback, waker or producer runs under this lock, so a poisoned
    // state is still consistent. `T::clone` and `E::clone` do run under it
    // when a result is read.
    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until settled or `timeout` elapses; the guard may still be pending.
    fn wait(&self, timeout: Option<Duration>) -> MutexGuard<'_, State<T, E>> {
        let state = self.lock();
        match timeout {
            None => self
                .ready
                .wait_while(state, |s| s.is_pending())
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (state, waited) = self
                    .ready
                    .wait_timeout_while(state, timeout, |s| s.is_pending())
                    .unwrap_or_else(PoisonError::into_inner);
                if waited.timed_out() {
                    debug!(?timeout, "wait on future timed out");
                }
                state
            }
        }
    }

    fn abandon(&self) {
        let mut state = self.lock();
        let (callbacks, wakers) = match mem::replace(&mut *state, State::Abandoned) {
            State::Pending { callbacks, wakers } => (callbacks, wakers),
            settled => {
                *state = settled;
                return;
            }
        };
        drop(state);

        debug!(
            callbacks = callbacks.len(),
            "future abandoned before completion"
        );
        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        // Dropping the callbacks releases the promises of derived futures.
        drop(callbacks);
    }
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn complete(&self, result: Result<T, E>) {
        let stored = State::Completed(result.clone());
        let mut state = self.lock();
        let (callbacks, wakers) = match mem::replace(&mut *state, stored) {
            State::Pending { callbacks, wakers } => (callbacks, wakers),
            settled => {
                *state = settled;
                drop(state);
                panic!("{}", COMPLETED_TWICE);
            }
        };
        drop(state);

        trace!(
            success = result.is_ok(),
            callbacks = callbacks.len(),
            "future completed"
        );
        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        for callback in callbacks {
            self.dispatch(callback, result.clone());
        }
    }

    fn register(&self, callback: Callback<T, E>) {
        let result = {
            let mut state = self.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(callback);
                    return;
                }
                State::Completed(result) => result.clone(),
                // Never fires; dropping it cascades the abandonment.
                State::Abandoned => return,
            }
        };
        self.dispatch(callback, result);
    }

    fn dispatch(&self, callback: Callback<T, E>, result: Result<T, E>) {
        self.executor.execute(Box::new(move || callback(result)));
    }
}

/// The producing side of a [`Future`].
///
/// Clones share one completion: the first [`complete`](Promise::complete)
/// wins and any further call panics. When every clone is dropped without
/// completing, the future is abandoned and its observers see
/// [`Error::ProducerDropped`].
pub struct Promise<T, E> {
    producer: Arc<Producer<T, E>>,
}

struct Producer<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Drop for Producer<T, E> {
    /// If this is an uncompleted producer, abandon the future.
    fn drop(&mut self) {
        self.inner.abandon();
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T, E> Promise<T, E> {
    /// A pending future on the default executor, with the promise completing it.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_future::Promise;
    /// use std::thread;
    /// let (promise, future) = Promise::<String, ()>::new();
    ///
    /// let task1 = thread::spawn(move || future.result());
    /// promise.complete(Ok("Hi".into()));
    /// assert_eq!(task1.join().expect("The task1 thread has panicked."), Ok("Hi".into()));
    /// ```
    pub fn new() -> (Self, Future<T, E>) {
        Self::new_in(default_executor())
    }

    /// Like [`Promise::new`], bound to `executor`.
    pub fn new_in(executor: Arc<dyn Executor>) -> (Self, Future<T, E>) {
        let inner = Inner::new(State::pending(), executor);
        let promise = Promise {
            producer: Arc::new(Producer {
                inner: inner.clone(),
            }),
        };
        (promise, Future { inner })
    }

    /// Another handle on the future this promise completes.
    pub fn future(&self) -> Future<T, E> {
        Future {
            inner: self.producer.inner.clone(),
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Settles the future with `result`.
    ///
    /// # Panics
    ///
    /// Panics if the future has already been completed, including by a clone
    /// of this promise on another thread. The stored result is never replaced.
    pub fn complete(&self, result: Result<T, E>) {
        self.producer.inner.complete(result);
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("future", &self.future())
            .finish()
    }
}

/// A value that becomes available at most once.
///
/// Handles are cheap to clone and all observe the same cell. Observation and
/// composition need `T` and `E` to be `Clone` because every observer receives
/// its own copy of the result. Reads clone the stored result while holding the
/// cell's lock, so those `Clone` impls must not read the same future.
pub struct Future<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Future<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Runs `producer` on the default executor and completes the returned
    /// future with its result.
    pub fn spawn<F>(producer: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::spawn_in(producer, default_executor())
    }

    /// Runs `producer` on `executor`. Returns immediately.
    ///
    /// A panicking producer abandons the future.
    pub fn spawn_in<F>(producer: F, executor: Arc<dyn Executor>) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let (promise, future) = Promise::new_in(executor.clone());
        executor.execute(Box::new(move || promise.complete(producer())));
        future
    }

    /// A future that is already completed with `result`.
    pub fn completed(result: Result<T, E>) -> Self {
        Self::completed_in(result, default_executor())
    }

    pub fn completed_in(result: Result<T, E>, executor: Arc<dyn Executor>) -> Self {
        Future {
            inner: Inner::new(State::Completed(result), executor),
        }
    }

    /// Whether a result has been stored. Never blocks.
    ///
    /// An abandoned future is not completed.
    pub fn is_completed(&self) -> bool {
        matches!(*self.inner.lock(), State::Completed(_))
    }

    /// Waits up to `timeout` for the result; `None` if it is not there yet.
    ///
    /// Timing out leaves the future untouched, it can be waited on again.
    ///
    /// # Panics
    ///
    /// Panics if the future was abandoned.
    pub fn wait_result(&self, timeout: Duration) -> Option<Result<T, E>> {
        let settled = match &*self.inner.wait(Some(timeout)) {
            State::Pending { .. } => return None,
            State::Completed(result) => Ok(result.clone()),
            State::Abandoned => Err(Error::ProducerDropped),
        };
        match settled {
            Ok(result) => Some(result),
            Err(err) => panic!("{}", err),
        }
    }

    /// Parks the calling thread until the future is completed.
    ///
    /// # Panics
    ///
    /// Panics if the future was abandoned; use [`Future::try_result`] to get
    /// that as an error instead.
    pub fn result(&self) -> Result<T, E> {
        match self.try_result() {
            Ok(result) => result,
            Err(err) => panic!("{}", err),
        }
    }

    /// Parks the calling thread until the future settles.
    pub fn try_result(&self) -> Result<Result<T, E>, Error> {
        match &*self.inner.wait(None) {
            State::Completed(result) => Ok(result.clone()),
            _ => Err(Error::ProducerDropped),
        }
    }

    /// Runs `f` with the result on the executor once completed, immediately
    /// scheduled if that already happened.
    ///
    /// `f` runs at most once. It never runs if the future is abandoned.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        self.inner.register(Box::new(f));
    }

    /// Like [`Future::on_complete`], only for a success.
    pub fn on_success<F>(&self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_complete(move |result| {
            if let Ok(value) = result {
                f(value)
            }
        });
    }

    /// Like [`Future::on_complete`], only for a failure.
    pub fn on_failure<F>(&self, f: F)
    where
        F: FnOnce(E) + Send + 'static,
    {
        self.on_complete(move |result| {
            if let Err(err) = result {
                f(err)
            }
        });
    }

    /// A future holding `f` applied to this one's success value.
    ///
    /// Failures pass through and `f` is not called. `f` runs on the executor;
    /// if it panics the returned future is abandoned.
    ///
    /// ```
    /// use promise_future::{Future, Immediate};
    /// use std::sync::Arc;
    /// let doubled = Future::<i32, ()>::completed_in(Ok(21), Arc::new(Immediate)).map(|v| v * 2);
    /// assert_eq!(doubled.result(), Ok(42));
    /// ```
    pub fn map<U, F>(&self, f: F) -> Future<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (promise, future) = Promise::new_in(self.inner.executor.clone());
        self.on_complete(move |result| promise.complete(result.map(f)));
        future
    }

    /// A future holding `f` applied to this one's failure. Successes pass
    /// through.
    pub fn map_err<G, F>(&self, f: F) -> Future<T, G>
    where
        G: Clone + Send + 'static,
        F: FnOnce(E) -> G + Send + 'static,
    {
        let (promise, future) = Promise::new_in(self.inner.executor.clone());
        self.on_complete(move |result| promise.complete(result.map_err(f)));
        future
    }

    /// A future forwarding the result of the future `f` returns for this
    /// one's success value.
    ///
    /// The forwarding job blocks an executor thread until the dependent
    /// future settles. See [`Future::and_then`] for a variant that does not.
    pub fn flat_map<U, F>(&self, f: F) -> Future<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U, E> + Send + 'static,
    {
        let (promise, future) = Promise::new_in(self.inner.executor.clone());
        self.on_complete(move |result| match result {
            Ok(value) => {
                // An abandoned dependent leaves `promise` to be dropped here.
                if let Ok(settled) = f(value).try_result() {
                    promise.complete(settled);
                }
            }
            Err(err) => promise.complete(Err(err)),
        });
        future
    }

    /// Same result as [`Future::flat_map`], but the dependent future's result
    /// is forwarded by a callback, so no executor thread waits on it.
    pub fn and_then<U, F>(&self, f: F) -> Future<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U, E> + Send + 'static,
    {
        let (promise, future) = Promise::new_in(self.inner.executor.clone());
        self.on_complete(move |result| match result {
            Ok(value) => f(value).on_complete(move |settled| promise.complete(settled)),
            Err(err) => promise.complete(Err(err)),
        });
        future
    }
}

impl<T, E> Future<T, E> {
    /// The executor callbacks and derived futures run on.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.inner.executor
    }
}

impl<T: Clone, E: Clone> std::future::Future for Future<T, E> {
    type Output = Result<Result<T, E>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.lock();
        match &mut *state {
            State::Completed(result) => Poll::Ready(Ok(result.clone())),
            State::Abandoned => Poll::Ready(Err(Error::ProducerDropped)),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.lock() {
            State::Pending { .. } => "Pending",
            State::Completed(Ok(_)) => "Success",
            State::Completed(Err(_)) => "Failure",
            State::Abandoned => "Abandoned",
        };
        f.debug_struct("Future").field("state", &state).finish()
    }
}
