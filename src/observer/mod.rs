//! # Responder liveness and congestion.
//!
//! - [`PeerObserver`] registry of responders keyed by component id
//! - [`Manifest`] what is known about one responder
//! - [`PeerStatus`] liveness class derived from the keep-alive threshold
//! - [`Transport`] which transport a message arrived on

mod manifest;
mod peer;

pub use manifest::{INFO_PROTOCOL_VERSION, LEGACY_PROTOCOL_VERSION, Manifest, PeerStatus};
pub use peer::{PeerObserver, Transport};
