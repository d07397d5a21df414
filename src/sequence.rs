use crate::executor::{default_executor, Executor};
use crate::{Future, Promise};
use std::sync::Arc;
use tracing::debug;

/// Collects the values of `futures`, in input order, into one future.
///
/// The result is the first failure in input order, not the first failure to
/// happen in time. If an input is abandoned before an earlier failure is
/// found, the returned future is abandoned as well.
///
/// The collecting job joins each input in turn on an executor thread.
pub fn sequence<T, E, I>(futures: I) -> Future<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Future<T, E>>,
{
    sequence_in(futures, default_executor())
}

/// Like [`sequence`], with the collecting job and the returned future bound
/// to `executor`.
pub fn sequence_in<T, E, I>(futures: I, executor: Arc<dyn Executor>) -> Future<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Future<T, E>>,
{
    let futures: Vec<_> = futures.into_iter().collect();
    let (promise, output) = Promise::new_in(executor.clone());
    executor.execute(Box::new(move || {
        let mut values = Vec::with_capacity(futures.len());
        for (index, future) in futures.iter().enumerate() {
            match future.try_result() {
                Ok(Ok(value)) => values.push(value),
                Ok(Err(err)) => return promise.complete(Err(err)),
                Err(err) => {
                    debug!(index, %err, "sequence input never completed");
                    return;
                }
            }
        }
        promise.complete(Ok(values));
    }));
    output
}
