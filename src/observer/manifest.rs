//! # Per-responder manifest.
//!
//! A [`Manifest`] records when a responder was first and last heard of, on
//! which transport, whether it speaks a compatible protocol version and a
//! free-form information map.
//!
//! ## Status
//! Derived from the time since last contact (`lost`) and the keep-alive
//! threshold `t`:
//!
//! | lost          | status   |
//! |---------------|----------|
//! | `≤ t`         | `OK`     |
//! | `≤ 2t`        | `ABSENT` |
//! | `≤ 3t`        | `BROKEN` |
//! | `> 3t`        | `CUTOFF` (evicted on rollup) |

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use super::Transport;

/// Information key holding the protocol version a broker responder advertised.
pub const INFO_PROTOCOL_VERSION: &str = "BROKER_PROTOCOL_VERSION";

/// Version recorded when a responder advertises none (legacy headers).
pub const LEGACY_PROTOCOL_VERSION: &str = "0";

/// Liveness class of a responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeerStatus {
    /// Heard from within the threshold.
    Ok,
    /// Missed one keep-alive window.
    Absent,
    /// Missed two keep-alive windows.
    Broken,
    /// Missed three windows; dropped on the next rollup.
    Cutoff,
}

impl PeerStatus {
    /// Classifies `lost` against the keep-alive `threshold`.
    pub fn classify(lost: Duration, threshold: Duration) -> Self {
        if lost > threshold * 3 {
            PeerStatus::Cutoff
        } else if lost > threshold * 2 {
            PeerStatus::Broken
        } else if lost > threshold {
            PeerStatus::Absent
        } else {
            PeerStatus::Ok
        }
    }

    /// Traffic-light color used by dashboards.
    pub fn color(&self) -> &'static str {
        match self {
            PeerStatus::Ok => "green",
            PeerStatus::Absent => "yellow",
            PeerStatus::Broken => "red",
            PeerStatus::Cutoff => "gray",
        }
    }
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeerStatus::Ok => "OK",
            PeerStatus::Absent => "ABSENT",
            PeerStatus::Broken => "BROKEN",
            PeerStatus::Cutoff => "CUTOFF",
        })
    }
}

/// What the observer knows about one responder.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    /// Responder component id.
    pub component_id: String,
    /// Derived liveness class, as of the last rollup.
    pub status: PeerStatus,
    /// `None` until a protocol version was seen.
    pub compatible: Option<bool>,
    /// Callback address the responder advertised last.
    pub address: Option<String>,
    /// First contact.
    pub first_seen: DateTime<Utc>,
    /// Last contact on any transport.
    pub updated: DateTime<Utc>,
    /// Last contact over the broker.
    pub broker_updated: Option<DateTime<Utc>>,
    /// Last contact over HTTP.
    pub http_updated: Option<DateTime<Utc>>,
    /// Span between first and last contact, as of the last rollup.
    pub keep_in_touch: Duration,
    /// Time since the last contact, as of the last rollup.
    pub losing_touch: Duration,
    /// Out-of-band facts (advertised protocol version and the like).
    pub information: HashMap<String, Value>,

    #[serde(skip)]
    reached: Instant,
    #[serde(skip)]
    touched: Instant,
}

impl Manifest {
    pub(crate) fn new(component_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let reached = Instant::now();
        Self {
            component_id: component_id.into(),
            status: PeerStatus::Ok,
            compatible: None,
            address: None,
            first_seen: now,
            updated: now,
            broker_updated: None,
            http_updated: None,
            keep_in_touch: Duration::ZERO,
            losing_touch: Duration::ZERO,
            information: HashMap::new(),
            reached,
            touched: reached,
        }
    }

    /// Records a contact over `transport`.
    pub(crate) fn touch(&mut self, transport: Transport) {
        let now = Utc::now();
        self.touched = Instant::now();
        self.updated = now;
        match transport {
            Transport::Broker => self.broker_updated = Some(now),
            Transport::Http => self.http_updated = Some(now),
            Transport::Any => {}
        }
    }

    /// Recomputes timers, compatibility and status.
    ///
    /// Compatibility is settled once, from [`INFO_PROTOCOL_VERSION`].
    pub(crate) fn refresh(
        &mut self,
        threshold: Duration,
        protocol_version: &str,
        legacy_header_enabled: bool,
    ) -> PeerStatus {
        self.keep_in_touch = self.touched.duration_since(self.reached);
        self.losing_touch = self.touched.elapsed();

        if self.compatible.is_none() {
            self.compatible = self
                .information
                .get(INFO_PROTOCOL_VERSION)
                .and_then(Value::as_str)
                .map(|version| match version {
                    v if v == protocol_version => true,
                    LEGACY_PROTOCOL_VERSION => legacy_header_enabled,
                    _ => false,
                });
        }

        self.status = PeerStatus::classify(self.losing_touch, threshold);
        self.status
    }

    /// True once the manifest should be evicted.
    pub fn is_expired(&self) -> bool {
        self.status == PeerStatus::Cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let t = Duration::from_secs(40);
        assert_eq!(PeerStatus::classify(Duration::ZERO, t), PeerStatus::Ok);
        assert_eq!(PeerStatus::classify(t, t), PeerStatus::Ok);
        assert_eq!(PeerStatus::classify(t + Duration::from_millis(1), t), PeerStatus::Absent);
        assert_eq!(PeerStatus::classify(t * 2, t), PeerStatus::Absent);
        assert_eq!(PeerStatus::classify(t * 3, t), PeerStatus::Broken);
        assert_eq!(PeerStatus::classify(t * 3 + Duration::from_millis(1), t), PeerStatus::Cutoff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compatibility_is_settled_once() {
        let mut m = Manifest::new("w1");
        m.refresh(Duration::from_secs(40), "1", false);
        assert_eq!(m.compatible, None);

        m.information.insert(INFO_PROTOCOL_VERSION.into(), Value::from("0"));
        m.refresh(Duration::from_secs(40), "1", true);
        assert_eq!(m.compatible, Some(true));

        m.information.insert(INFO_PROTOCOL_VERSION.into(), Value::from("2"));
        m.refresh(Duration::from_secs(40), "1", true);
        assert_eq!(m.compatible, Some(true));

        let mut m = Manifest::new("w2");
        m.information.insert(INFO_PROTOCOL_VERSION.into(), Value::from("2"));
        m.refresh(Duration::from_secs(40), "1", true);
        assert_eq!(m.compatible, Some(false));
    }
}
