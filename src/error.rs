//! Error types used by the admission filters and the dispatcher.
//!
//! This module defines two main error enums:
//!
//! - [`RestrictionError`]: admission-control rejections raised by the filters.
//! - [`DispatchError`]: failures of an outbound request as a whole.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//!
//! A request that simply runs out of time is **not** an error: it is an
//! [`RpcResult`](crate::RpcResult) with neither `completed` nor `failed` set.

use std::time::Duration;
use thiserror::Error;

/// # Rejections produced by admission filters.
///
/// Two classes exist and callers may branch on them:
/// - **suspend** ([`is_suspend`](Self::is_suspend)): the valve is locked or the
///   pause lock could not be taken;
/// - **waiting** ([`is_waiting`](Self::is_waiting)): no concurrency permit
///   could be obtained.
///
/// Filters never retry internally; the caller decides what to do.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestrictionError {
    /// The valve is locked; the request was rejected without waiting.
    #[error("the valve restrictor is not ready yet")]
    ValveNotReady,

    /// The pause lock was not released within the configured bound.
    #[error("pause lock is not available (waited {timeout:?})")]
    PauseTimeout {
        /// How long the filter waited before giving up (`0` = fail fast).
        timeout: Duration,
    },

    /// The pause filter was closed while the request was waiting.
    #[error("waiting for the pause lock was interrupted")]
    PauseInterrupted,

    /// No concurrency permit became free within the configured bound.
    #[error("there are no permits available (waited {timeout:?})")]
    NoPermits {
        /// How long the filter waited before giving up.
        timeout: Duration,
    },

    /// The limit filter was closed while the request was waiting for a permit.
    #[error("waiting for a permit was interrupted")]
    PermitInterrupted,
}

impl RestrictionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use rpcvisor::RestrictionError;
    ///
    /// assert_eq!(RestrictionError::ValveNotReady.as_label(), "valve_not_ready");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RestrictionError::ValveNotReady => "valve_not_ready",
            RestrictionError::PauseTimeout { .. } => "pause_timeout",
            RestrictionError::PauseInterrupted => "pause_interrupted",
            RestrictionError::NoPermits { .. } => "no_permits",
            RestrictionError::PermitInterrupted => "permit_interrupted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RestrictionError::ValveNotReady => "valve locked".to_string(),
            RestrictionError::PauseTimeout { timeout } => format!("paused; waited {timeout:?}"),
            RestrictionError::PauseInterrupted => "pause wait interrupted".to_string(),
            RestrictionError::NoPermits { timeout } => {
                format!("no permits; waited {timeout:?}")
            }
            RestrictionError::PermitInterrupted => "permit wait interrupted".to_string(),
        }
    }

    /// True for the suspend class (valve and pause rejections).
    pub fn is_suspend(&self) -> bool {
        matches!(
            self,
            RestrictionError::ValveNotReady
                | RestrictionError::PauseTimeout { .. }
                | RestrictionError::PauseInterrupted
        )
    }

    /// True for the waiting class (limit rejections).
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use rpcvisor::RestrictionError;
    ///
    /// let err = RestrictionError::NoPermits { timeout: Duration::from_millis(50) };
    /// assert!(err.is_waiting());
    /// assert!(!err.is_suspend());
    /// ```
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            RestrictionError::NoPermits { .. } | RestrictionError::PermitInterrupted
        )
    }
}

/// # Errors produced while dispatching a request.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// An admission filter rejected the request before it was sent.
    #[error("request rejected: {0}")]
    Restriction(#[from] RestrictionError),

    /// The outbound transport failed to send the request.
    #[error("transport failed: {error}")]
    Transport {
        /// The underlying error message.
        error: String,
    },

    /// Another unfinished request already uses this routine id.
    #[error("routine id already in flight: {routine_id}")]
    Duplicate {
        /// The contested routine id.
        routine_id: String,
    },

    /// The dispatcher has been closed and accepts no new requests.
    #[error("dispatcher closed")]
    Closed,
}

impl DispatchError {
    /// Shorthand for a [`DispatchError::Transport`] with the given message.
    pub fn transport(error: impl Into<String>) -> Self {
        DispatchError::Transport {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Restriction(inner) => inner.as_label(),
            DispatchError::Transport { .. } => "dispatch_transport",
            DispatchError::Duplicate { .. } => "dispatch_duplicate",
            DispatchError::Closed => "dispatch_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::Restriction(inner) => inner.as_message(),
            DispatchError::Transport { error } => format!("transport: {error}"),
            DispatchError::Duplicate { routine_id } => format!("duplicate routine id: {routine_id}"),
            DispatchError::Closed => "dispatcher closed".to_string(),
        }
    }
}
