//! Constructors for the value a future settles to.
//!
//! A future holds a plain [`std::result::Result`]. These helpers only exist so
//! producers read as `success(v)` / `failure(e)`; `Result::map`,
//! `Result::and_then` and friends are std's and are independent of
//! [`Future::map`](crate::Future::map).

/// Wraps `value` as a successful outcome.
///
/// ```
/// use promise_future::success;
/// let r: Result<i32, String> = success(42);
/// assert_eq!(r, Ok(42));
/// ```
pub fn success<T, E>(value: T) -> Result<T, E> {
    Ok(value)
}

/// Wraps `error` as a failed outcome.
pub fn failure<T, E>(error: E) -> Result<T, E> {
    Err(error)
}
