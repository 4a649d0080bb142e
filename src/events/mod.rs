//! Dispatcher events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: request completion callbacks, `Dispatcher::request`,
//!   `Dispatcher::deliver`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the dispatcher's subscriber listener (fans out to
//!   `SubscriberSet`) and receivers from `Dispatcher::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
