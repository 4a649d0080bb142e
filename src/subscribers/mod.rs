//! # Event subscribers.
//!
//! - [`Subscribe`] extension point for reacting to dispatcher events
//! - [`SubscriberSet`] non-blocking fan-out with per-subscriber queues
//! - [`LogWriter`] built-in `tracing` writer (feature `logging`)
//!
//! ```text
//! Bus ──► subscriber listener ──► SubscriberSet ──► [queue] ──► Subscribe::on_event
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
