//! Runtime core: dispatching and response correlation.
//!
//! The public API from this module is [`Dispatcher`] (with its
//! [`DispatcherBuilder`]) and the [`Outbound`] transport seam.
//!
//! Internal modules:
//! - [`dispatcher`]: admission, send, delivery routing and shutdown;
//! - [`builder`]: wires the bus, subscribers, filters and observer;
//! - [`outbound`]: the transport trait implemented by callers;
//! - [`registry`]: routine id → pending request table.

mod builder;
mod dispatcher;
mod outbound;
mod registry;

pub use builder::DispatcherBuilder;
pub use dispatcher::Dispatcher;
pub use outbound::Outbound;
