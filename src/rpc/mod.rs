//! # Request/response correlation.
//!
//! - [`RoutineParameters`] identity and options of one invocation
//! - [`Message`] inbound delivery with its [`Status`] classification
//! - [`TimeoutWatcher`] cancellable inactivity timer
//! - [`PendingRequest`] / [`RequestHandle`] consumer and producer halves of a request
//! - [`RpcResult`] / [`Step`] the folded outcome

mod message;
mod params;
mod request;
mod result;
mod watcher;

pub use message::{Headers, Message, Status, keys};
pub(crate) use message::header_str;
pub use params::{RoutineParameters, SCOPE_INTERNAL};
pub use request::{Completion, PendingRequest, RequestHandle};
pub use result::{RpcResult, Step};
pub use watcher::TimeoutWatcher;
