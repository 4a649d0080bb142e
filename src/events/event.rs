//! # Dispatcher events.
//!
//! [`EventKind`] classifies what happened to a request or a responder:
//! - **Request lifecycle**: dispatched, then completed, failed or timed out
//! - **Admission**: rejected by a filter or by the transport
//! - **Correlation**: a response nobody waits for
//! - **Peers**: a responder seen for the first time
//! - **Subscribers**: overflow and panic reports from the fan-out workers
//!
//! [`Event`] carries the metadata (routine id, signature, responder, transport...).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore publication order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use rpcvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RequestTimeout)
//!     .with_routine("r-1")
//!     .with_signature("fibonacci")
//!     .with_timeout(Duration::from_millis(500));
//!
//! assert_eq!(ev.kind, EventKind::RequestTimeout);
//! assert_eq!(ev.routine_id.as_deref(), Some("r-1"));
//! assert_eq!(ev.timeout_ms, Some(500));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::observer::Transport;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of dispatcher events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `component` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `component` (subscriber name), `reason` (`"full"` or `"closed"`).
    SubscriberOverflow,

    // === Request lifecycle ===
    /// Request admitted and handed to the outbound transport.
    ///
    /// Sets: `routine_id`, `signature`, `timeout_ms` (if a TTL is set).
    RequestDispatched,

    /// A `completed` message ended the request.
    ///
    /// Sets: `routine_id`, `signature`.
    RequestCompleted,

    /// A `failed` message ended the request.
    ///
    /// Sets: `routine_id`, `signature`.
    RequestFailed,

    /// The TTL elapsed (or the dispatcher closed) before a terminal message.
    ///
    /// Sets: `routine_id`, `signature`, `timeout_ms` (if a TTL is set).
    RequestTimeout,

    /// An admission filter or the transport refused the request.
    ///
    /// Sets: `routine_id`, `signature`, `reason` (error label).
    RequestRejected,

    // === Correlation ===
    /// A response arrived for a routine id nobody is waiting for.
    ///
    /// Sets: `routine_id` (if present), `component` (responder), `transport`.
    ResponseUnmatched,

    // === Peers ===
    /// A responder was heard from for the first time.
    ///
    /// Sets: `component`, `transport`.
    ResponderJoined,
}

impl EventKind {
    /// Stable snake_case label.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
            EventKind::RequestDispatched => "request_dispatched",
            EventKind::RequestCompleted => "request_completed",
            EventKind::RequestFailed => "request_failed",
            EventKind::RequestTimeout => "request_timeout",
            EventKind::RequestRejected => "request_rejected",
            EventKind::ResponseUnmatched => "response_unmatched",
            EventKind::ResponderJoined => "responder_joined",
        }
    }
}

/// Dispatcher event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// Event classification.
    pub kind: EventKind,

    /// Correlation id of the request, if applicable.
    pub routine_id: Option<Arc<str>>,
    /// Logical method name of the request.
    pub signature: Option<Arc<str>>,
    /// Responder component id or subscriber name.
    pub component: Option<Arc<str>>,
    /// Transport the triggering message arrived on.
    pub transport: Option<Transport>,
    /// Human-readable reason (error labels, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Request TTL in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            routine_id: None,
            signature: None,
            component: None,
            transport: None,
            reason: None,
            timeout_ms: None,
        }
    }

    /// Attaches the routine id.
    #[inline]
    pub fn with_routine(mut self, routine_id: impl Into<Arc<str>>) -> Self {
        self.routine_id = Some(routine_id.into());
        self
    }

    /// Attaches the signature, if any.
    #[inline]
    pub fn with_signature(mut self, signature: impl Into<Arc<str>>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Attaches a responder or subscriber name.
    #[inline]
    pub fn with_component(mut self, component: impl Into<Arc<str>>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Attaches the transport.
    #[inline]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(u32::try_from(d.as_millis()).unwrap_or(u32::MAX));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_component(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_component(subscriber)
            .with_reason(info)
    }

    /// True for events emitted by the subscriber workers themselves.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
