//! # rpcvisor
//!
//! **Rpcvisor** is the client-side core of an RPC middleware for Rust.
//!
//! It correlates asynchronous responses with the requests that caused them,
//! guards request admission with composable filters, and keeps track of the
//! responders it hears from. Wire transports (message brokers, HTTP) stay
//! outside the crate and plug in through [`Outbound`] and
//! [`Dispatcher::deliver`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     caller                                              transport layer
//!       │ request(signature, body, params)                  (broker, HTTP)
//!       ▼                                                          ▲ │
//! ┌───────────────────────────────────────────────────────────────┐│ │
//! │  Dispatcher                                                   ││ │
//! │  - Pipeline (Limit → Pause → Valve → OnOff)                   ││ │
//! │  - Registry (routine id → RequestHandle)                      ││ │
//! │  - PeerObserver (responder manifests, congestion flags)       ││ │
//! │  - Bus (broadcast events) + SubscriberSet                     ││ │
//! └──────┬─────────────────────────────┬──────────────────────────┘│ │
//!        │ Outbound::send ─────────────┼───────────────────────────┘ │
//!        │                             │◄──── deliver(transport, ────┘
//!        ▼                             ▼        body, headers)
//! ┌──────────────┐              ┌──────────────┐
//! │PendingRequest│◄── queue ────│RequestHandle │──► TimeoutWatcher::check
//! │ next()       │              │ push()       │
//! │ extract_     │              │ raise_       │
//! │  result()    │              │  timeout()   │
//! └──────────────┘              └──────┬───────┘
//!                                      │ completion callback
//!                                      ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Bus (broadcast channel)                    │
//! │                  (capacity: Config::bus_capacity)             │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                ▼
//!                      ┌────────────────────┐
//!                      │subscriber_listener │
//!                      └─────────┬──────────┘
//!                                ▼
//!                          SubscriberSet
//!                       ┌────────┼────────┐
//!                       ▼        ▼        ▼
//!                    worker1  worker2  workerN
//! ```
//!
//! ### Request lifecycle
//! ```text
//! RoutineParameters ──► Dispatcher::request()
//!
//!   ├─► Pipeline::filter (may reject: RestrictionError)
//!   ├─► registry.insert(handle), start TimeoutWatcher(ttl)
//!   ├─► Outbound::send(body, headers, hint)
//!   │
//!   ├─ deliver(...) per response:
//!   │     ├─ started/progress/uncategorized ─► queued, watcher re-armed
//!   │     ├─ completed ─► queued + end, RequestCompleted
//!   │     └─ failed    ─► queued + end, RequestFailed
//!   │
//!   └─ watcher fires ─► abort, RequestTimeout
//!
//! PendingRequest::extract_result() folds the queue into an RpcResult.
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Dispatching**   | Send requests, route responses, shut down cleanly.            | [`Dispatcher`], [`Outbound`]                |
//! | **Correlation**   | Per-request queue with inactivity timeout.                    | [`PendingRequest`], [`TimeoutWatcher`]      |
//! | **Admission**     | Composable filters for load shedding and maintenance.         | [`Restrict`], [`Limit`], [`Pause`], [`Valve`], [`OnOff`] |
//! | **Peers**         | Responder liveness, compatibility and congestion flags.       | [`PeerObserver`], [`Manifest`]              |
//! | **Subscriber API**| Hook into request lifecycle events.                           | [`Subscribe`]                               |
//! | **Errors**        | Typed admission and dispatch errors.                          | [`RestrictionError`], [`DispatchError`]     |
//! | **Configuration** | Centralize runtime settings.                                  | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] that maps events to `tracing` records.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use rpcvisor::{Config, DispatchError, Dispatcher, Headers, Outbound, RoutineParameters, Transport};
//!
//! struct Nowhere;
//!
//! #[async_trait]
//! impl Outbound for Nowhere {
//!     async fn send(&self, _body: Vec<u8>, _headers: Headers, _hint: Option<Transport>) -> Result<(), DispatchError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), DispatchError> {
//!     let dispatcher = Dispatcher::builder(Config::default(), Arc::new(Nowhere)).build();
//!
//!     // Fire-and-forget: nothing is awaited, the request ends at once.
//!     let params = RoutineParameters::new().with_transient(true);
//!     let pending = dispatcher.request("audit", "hello", params).await?;
//!     assert!(pending.extract_result(false).await.is_timeout());
//!
//!     dispatcher.close().await;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod observer;
mod restrictor;
mod rpc;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{Dispatcher, DispatcherBuilder, Outbound};
pub use config::{
    Config, KEEP_ALIVE_BASELINE, LimitConfig, ObserverConfig, OnOffConfig, Options, PauseConfig,
    PauseWait, SEMAPHORE_LIMIT_DEFAULT,
};
pub use error::{DispatchError, RestrictionError};
pub use events::{Bus, Event, EventKind};
pub use observer::{
    INFO_PROTOCOL_VERSION, LEGACY_PROTOCOL_VERSION, Manifest, PeerObserver, PeerStatus, Transport,
};
pub use restrictor::{Limit, OnOff, Pause, PauseReport, PauseStatus, Pipeline, Restrict, Valve};
pub use rpc::{
    Completion, Headers, Message, PendingRequest, RequestHandle, RoutineParameters, RpcResult,
    SCOPE_INTERNAL, Status, Step, TimeoutWatcher, keys,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a built-in `tracing` subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
