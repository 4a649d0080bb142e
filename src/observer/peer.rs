//! # Peer observer.
//!
//! Feeds on the headers of every inbound message and maintains one
//! [`Manifest`] per responder. Routing logic outside this crate reads the
//! manifests and the congestion flags to pick a transport.
//!
//! ## Architecture
//! ```text
//! inbound headers ──► check(transport, headers)
//!                          │  component id = consumerId | workerId
//!                          ▼
//!                   DashMap<id, Manifest>  ◄── update_info / contains_info
//!                          │
//!                   rollup() ──► refresh every manifest, evict CUTOFF
//!                          │
//!                          ▼
//!                   Vec<Manifest> / summary() JSON
//! ```
//!
//! ## Rules
//! - Updates of one manifest are independent from other keys (sharded map).
//! - Eviction happens only during [`PeerObserver::rollup`].
//! - Congestion flags are stored and reported, never decided here.
//! - The latest address is last-write-wins.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use super::manifest::{INFO_PROTOCOL_VERSION, LEGACY_PROTOCOL_VERSION, Manifest, PeerStatus};
use crate::config::{ObserverConfig, keep_alive_threshold};
use crate::rpc::{Headers, header_str, keys};

/// Transport a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Message broker.
    Broker,
    /// Direct HTTP.
    Http,
    /// Transport-agnostic (only meaningful for the congestion flag).
    Any,
}

impl Transport {
    /// Header carrying the responder identity on this transport.
    pub fn component_header(&self) -> Option<&'static str> {
        match self {
            Transport::Broker => Some(keys::BROKER_CONSUMER_ID),
            Transport::Http => Some(keys::HTTP_WORKER_ID),
            Transport::Any => None,
        }
    }

    /// Stable label for logs/events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Broker => "broker",
            Transport::Http => "http",
            Transport::Any => "any",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness and congestion registry of remote responders.
pub struct PeerObserver {
    manifests: DashMap<String, Manifest>,
    threshold: RwLock<Duration>,
    protocol_version: String,
    legacy_header_enabled: bool,
    latest_address: RwLock<Option<String>>,
    congestive: AtomicBool,
    congestive_broker: AtomicBool,
    congestive_http: AtomicBool,
}

impl Default for PeerObserver {
    fn default() -> Self {
        Self::new(ObserverConfig::default())
    }
}

impl PeerObserver {
    /// Creates an empty registry.
    pub fn new(cfg: ObserverConfig) -> Self {
        Self {
            manifests: DashMap::new(),
            threshold: RwLock::new(cfg.keep_alive_threshold()),
            protocol_version: cfg.protocol_version,
            legacy_header_enabled: cfg.legacy_header_enabled,
            latest_address: RwLock::new(None),
            congestive: AtomicBool::new(false),
            congestive_broker: AtomicBool::new(false),
            congestive_http: AtomicBool::new(false),
        }
    }

    /// Records a contact from the responder named in `headers`.
    ///
    /// Returns `true` when the responder was not tracked before. Headers
    /// without a component id are ignored.
    pub fn check(&self, transport: Transport, headers: &Headers) -> bool {
        let Some(component_id) = transport
            .component_header()
            .and_then(|key| header_str(headers, key))
        else {
            return false;
        };

        let mut joined = false;
        let mut manifest = self
            .manifests
            .entry(component_id.to_string())
            .or_insert_with(|| {
                joined = true;
                Manifest::new(component_id)
            });
        manifest.touch(transport);

        if transport == Transport::Broker {
            let version = header_str(headers, keys::BROKER_PROTOCOL_VERSION)
                .unwrap_or(LEGACY_PROTOCOL_VERSION);
            manifest
                .information
                .insert(INFO_PROTOCOL_VERSION.to_string(), Value::from(version));

            let address = header_str(headers, keys::ADDRESS).map(str::to_string);
            manifest.address.clone_from(&address);
            drop(manifest);
            if let Some(address) = address {
                *self
                    .latest_address
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(address);
            }
        }

        if joined {
            debug!(component_id, %transport, "responder joined");
        } else {
            trace!(component_id, %transport, "responder touched");
        }
        joined
    }

    /// Refreshes every manifest, evicts the `CUTOFF` ones and returns the survivors.
    pub fn rollup(&self) -> Vec<Manifest> {
        let threshold = self.keep_alive_threshold();
        self.manifests.retain(|id, manifest| {
            let status = manifest.refresh(
                threshold,
                &self.protocol_version,
                self.legacy_header_enabled,
            );
            if status == PeerStatus::Cutoff {
                debug!(component_id = %id, lost = ?manifest.losing_touch, "responder cut off");
                return false;
            }
            true
        });
        self.manifests.iter().map(|m| m.value().clone()).collect()
    }

    /// Rollup rendered as JSON.
    pub fn summary(&self) -> Value {
        serde_json::to_value(self.rollup()).unwrap_or(Value::Null)
    }

    /// Number of tracked responders (including ones not rolled up yet).
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// True when no responder is tracked.
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Snapshot of one manifest.
    pub fn manifest(&self, component_id: &str) -> Option<Manifest> {
        self.manifests.get(component_id).map(|m| m.value().clone())
    }

    /// Congestion flag of `transport`.
    pub fn is_congestive(&self, transport: Transport) -> bool {
        self.flag(transport).load(Ordering::Acquire)
    }

    /// Sets the congestion flag of `transport`.
    pub fn set_congestive(&self, transport: Transport, congestive: bool) {
        self.flag(transport).store(congestive, Ordering::Release);
    }

    fn flag(&self, transport: Transport) -> &AtomicBool {
        match transport {
            Transport::Broker => &self.congestive_broker,
            Transport::Http => &self.congestive_http,
            Transport::Any => &self.congestive,
        }
    }

    /// Most recently advertised callback address.
    pub fn latest_address(&self) -> Option<String> {
        self.latest_address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True when the responder is tracked and has an information entry `name`.
    pub fn contains_info(&self, component_id: &str, name: &str) -> bool {
        self.manifests
            .get(component_id)
            .is_some_and(|m| m.information.contains_key(name))
    }

    /// Stores an information entry on a tracked responder; unknown ids are ignored.
    pub fn update_info(&self, component_id: &str, name: impl Into<String>, data: Value) {
        if let Some(mut m) = self.manifests.get_mut(component_id) {
            m.information.insert(name.into(), data);
        }
    }

    /// Current keep-alive threshold (already inflated by the baseline).
    pub fn keep_alive_threshold(&self) -> Duration {
        *self.threshold.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the keep-alive timeout; zero keeps the current threshold.
    pub fn set_keep_alive_timeout(&self, timeout: Duration) {
        if timeout.is_zero() {
            return;
        }
        *self.threshold.write().unwrap_or_else(PoisonError::into_inner) =
            keep_alive_threshold(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(v: Value) -> Headers {
        serde_json::from_value(v).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_ages_and_cutoff_is_evicted() {
        let observer = PeerObserver::default();
        assert!(observer.check(Transport::Http, &headers(json!({ "workerId": "w1" }))));
        assert!(!observer.check(Transport::Http, &headers(json!({ "workerId": "w1" }))));

        let status = |o: &PeerObserver| o.rollup().first().map(|m| m.status);
        assert_eq!(status(&observer), Some(PeerStatus::Ok));

        tokio::time::advance(Duration::from_secs(41)).await;
        assert_eq!(status(&observer), Some(PeerStatus::Absent));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(status(&observer), Some(PeerStatus::Broken));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(observer.rollup().is_empty());
        assert!(observer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_keeps_responder_alive() {
        let observer = PeerObserver::default();
        let h = headers(json!({ "consumerId": "c1", "protocolVersion": "1" }));
        for _ in 0..5 {
            observer.check(Transport::Broker, &h);
            tokio::time::advance(Duration::from_secs(30)).await;
        }
        let all = observer.rollup();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PeerStatus::Ok);
        assert_eq!(all[0].compatible, Some(true));
        assert_eq!(all[0].keep_in_touch, Duration::from_secs(120));
        assert!(all[0].broker_updated.is_some());
        assert!(all[0].http_updated.is_none());
    }

    #[test]
    fn test_broker_headers_feed_information() {
        let observer = PeerObserver::default();
        observer.check(
            Transport::Broker,
            &headers(json!({ "consumerId": "c1", "address": "10.0.0.1:8080" })),
        );
        observer.check(Transport::Broker, &headers(json!({ "other": "x" })));

        assert_eq!(observer.len(), 1);
        assert!(observer.contains_info("c1", INFO_PROTOCOL_VERSION));
        assert!(!observer.contains_info("c2", INFO_PROTOCOL_VERSION));
        assert_eq!(observer.latest_address().as_deref(), Some("10.0.0.1:8080"));
        assert_eq!(
            observer.manifest("c1").and_then(|m| m.address),
            Some("10.0.0.1:8080".to_string())
        );

        // legacy responders are incompatible unless explicitly allowed
        assert_eq!(observer.rollup()[0].compatible, Some(false));

        observer.update_info("c1", "region", json!("eu"));
        observer.update_info("ghost", "region", json!("eu"));
        assert!(observer.contains_info("c1", "region"));
        assert!(!observer.contains_info("ghost", "region"));
    }

    #[test]
    fn test_congestion_flags_are_independent() {
        let observer = PeerObserver::default();
        observer.set_congestive(Transport::Broker, true);
        assert!(observer.is_congestive(Transport::Broker));
        assert!(!observer.is_congestive(Transport::Http));
        assert!(!observer.is_congestive(Transport::Any));
        observer.set_congestive(Transport::Any, true);
        observer.set_congestive(Transport::Broker, false);
        assert!(observer.is_congestive(Transport::Any));
        assert!(!observer.is_congestive(Transport::Broker));
    }

    #[test]
    fn test_keep_alive_timeout() {
        let observer = PeerObserver::default();
        assert_eq!(observer.keep_alive_threshold(), Duration::from_secs(40));
        observer.set_keep_alive_timeout(Duration::from_secs(5));
        assert_eq!(observer.keep_alive_threshold(), Duration::from_secs(25));
        observer.set_keep_alive_timeout(Duration::ZERO);
        assert_eq!(observer.keep_alive_threshold(), Duration::from_secs(25));
    }

    #[test]
    fn test_summary_is_json() {
        let observer = PeerObserver::default();
        observer.check(Transport::Http, &headers(json!({ "workerId": "w9" })));
        let summary = observer.summary();
        assert_eq!(summary[0]["component_id"], "w9");
        assert_eq!(summary[0]["status"], "OK");
    }
}
