//! # LogWriter: events as `tracing` records.
//!
//! Maps every [`Event`] to one `tracing` record. Install any `tracing`
//! subscriber (e.g. `tracing-subscriber` with `EnvFilter`) to see them.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  rpcvisor: dispatched routine_id="3f2a.." signature="fibonacci" timeout_ms=2000
//! INFO  rpcvisor: completed routine_id="3f2a.." signature="fibonacci"
//! WARN  rpcvisor: timeout routine_id="9c1b.." signature="fibonacci" timeout_ms=500
//! WARN  rpcvisor: rejected routine_id="77d0.." reason="valve_not_ready"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber (demo/reference).
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let routine_id = e.routine_id.as_deref().unwrap_or("-");
        let signature = e.signature.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::RequestDispatched => {
                info!(target: "rpcvisor", seq = e.seq, routine_id, signature, timeout_ms = ?e.timeout_ms, "dispatched");
            }
            EventKind::RequestCompleted => {
                info!(target: "rpcvisor", seq = e.seq, routine_id, signature, "completed");
            }
            EventKind::RequestFailed => {
                warn!(target: "rpcvisor", seq = e.seq, routine_id, signature, "failed");
            }
            EventKind::RequestTimeout => {
                warn!(target: "rpcvisor", seq = e.seq, routine_id, signature, timeout_ms = ?e.timeout_ms, "timeout");
            }
            EventKind::RequestRejected => {
                warn!(target: "rpcvisor", seq = e.seq, routine_id, signature, reason = ?e.reason, "rejected");
            }
            EventKind::ResponseUnmatched => {
                debug!(target: "rpcvisor", seq = e.seq, routine_id, responder = ?e.component, transport = ?e.transport, "unmatched response");
            }
            EventKind::ResponderJoined => {
                info!(target: "rpcvisor", seq = e.seq, responder = ?e.component, transport = ?e.transport, "responder joined");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "rpcvisor", seq = e.seq, subscriber = ?e.component, reason = ?e.reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                error!(
                    target: "rpcvisor",
                    seq = e.seq,
                    subscriber = e.component.as_deref().unwrap_or("unknown"),
                    info = e.reason.as_deref().unwrap_or("unknown"),
                    "subscriber panicked"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
