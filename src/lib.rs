//! A single-assignment future that can be waited on from any thread.
//!
//! A [`Future`] is completed once through its [`Promise`], or by a producer
//! closure run on an [`Executor`]. Consumers block with [`Future::result`],
//! register callbacks with [`Future::on_complete`], `.await` it, or build new
//! futures with [`Future::map`], [`Future::flat_map`] and [`sequence`].
//!
//! # Examples
//!
//! ```
//! use promise_future::{future, sequence, success};
//!
//! let a = future(|| success::<i32, String>(40));
//! let b = a.map(|v| v + 2);
//! assert_eq!(b.result(), Ok(42));
//!
//! let all = sequence(vec![a, b]);
//! assert_eq!(all.result(), Ok(vec![40, 42]));
//! ```
pub mod executor;
pub mod future;
pub mod result;
pub mod sequence;

pub use executor::{
    default_executor, Executor, Immediate, Job, PoolConfig, ThreadPerJob, ThreadPoolExecutor,
};
pub use future::{Future, Promise};
pub use result::{failure, success};
pub use sequence::{sequence, sequence_in};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("producer dropped without completing the future")]
    ProducerDropped,
    #[error("thread pool size must be at least one")]
    InvalidPoolSize,
    #[error("failed to start executor threads: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs `producer` on the default executor; shorthand for [`Future::spawn`].
pub fn future<T, E, F>(producer: F) -> Future<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    Future::spawn(producer)
}
