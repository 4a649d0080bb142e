//! # Admission filters.
//!
//! Every filter wraps one unit of work (an async action) and either runs it
//! under its policy or rejects it with a [`RestrictionError`]:
//!
//! | filter       | policy                                   | rejection                         |
//! |--------------|------------------------------------------|-----------------------------------|
//! | [`OnOff`]    | cheap enable/disable gate                | never                             |
//! | [`Valve`]    | hard circuit breaker (read/write lock)   | `ValveNotReady`, immediately      |
//! | [`Pause`]    | self-expiring full stop                  | `PauseTimeout`, `PauseInterrupted` |
//! | [`Limit`]    | bounded concurrency (permit pool)        | `NoPermits`, `PermitInterrupted`  |
//!
//! Filters compose by nesting; [`Pipeline`] nests them as
//! `Limit → Pause → Valve → OnOff → action`.
//!
//! ## Rules
//! - An admitted action's `Ok`/`Err` is returned untouched.
//! - Filters never retry; the caller decides what to do with a rejection.
//! - Dropping the returned future cancels any wait in progress.
//! - Each filter owns its lock/permit primitive; nothing is shared across instances.
//!
//! ## Example
//! ```rust
//! use rpcvisor::{Limit, LimitConfig, Restrict, RestrictionError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limit = Limit::new(LimitConfig { enabled: true, limit: 2, ..Default::default() });
//! let out: Result<u32, RestrictionError> = limit.filter(|| async { Ok(7) }).await;
//! assert_eq!(out, Ok(7));
//! # }
//! ```

mod limit;
mod onoff;
mod pause;
mod pipeline;
mod valve;

pub use limit::Limit;
pub use onoff::OnOff;
pub use pause::{Pause, PauseReport, PauseStatus};
pub use pipeline::Pipeline;
pub use valve::Valve;

use std::future::Future;

use crate::error::RestrictionError;

/// Wraps an async action with an admission policy.
///
/// `E` must be able to absorb a [`RestrictionError`] so rejections and the
/// action's own failures travel through the same `Result`.
pub trait Restrict: Send + Sync {
    /// Runs `action` if admitted, otherwise returns the rejection as `E`.
    fn filter<T, E, A, Fut>(&self, action: A) -> impl Future<Output = Result<T, E>> + Send
    where
        A: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<RestrictionError> + Send;
}
