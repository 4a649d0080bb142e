//! # Routine parameters.
//!
//! [`RoutineParameters`] identifies one invocation. The routine id and the
//! timestamp are assigned exactly once, at construction, and never change;
//! everything else is set through the builder-style `with_*` methods.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use rpcvisor::RoutineParameters;
//!
//! let params = RoutineParameters::new()
//!     .with_signature("fibonacci")
//!     .with_ttl(Some(Duration::from_secs(5)))
//!     .with_tags(["batch"]);
//!
//! assert_eq!(params.signature(), Some("fibonacci"));
//! assert!(!params.routine_id().is_empty());
//! ```

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::message::{Headers, header_str, keys};

/// Scope value whose request logs may be muted.
pub const SCOPE_INTERNAL: &str = "internal";

/// Identity and options of one routine invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutineParameters {
    routine_id: String,
    timestamp: String,
    signature: Option<String>,
    scope: Option<String>,
    tags: Vec<String>,
    ttl: Option<Duration>,
    transient: bool,
    progress_enabled: Option<bool>,
}

impl Default for RoutineParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutineParameters {
    /// Creates parameters with a fresh routine id and the current timestamp.
    pub fn new() -> Self {
        Self::with_identity(generate_routine_id(), current_timestamp())
    }

    /// Creates parameters with an externally assigned identity.
    pub fn with_identity(routine_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            routine_id: routine_id.into(),
            timestamp: timestamp.into(),
            signature: None,
            scope: None,
            tags: Vec::new(),
            ttl: None,
            transient: false,
            progress_enabled: None,
        }
    }

    /// Rebuilds parameters from routine headers.
    ///
    /// Missing id or timestamp are generated; `mode = "forked"` marks the
    /// routine transient; `timeout` is read as milliseconds.
    pub fn from_headers(headers: &Headers) -> Self {
        let routine_id =
            header_str(headers, keys::ROUTINE_ID).map_or_else(generate_routine_id, str::to_string);
        let timestamp = header_str(headers, keys::ROUTINE_TIMESTAMP)
            .map_or_else(current_timestamp, str::to_string);

        let tags = headers
            .get(keys::ROUTINE_TAGS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let ttl = headers
            .get(keys::TIMEOUT)
            .and_then(Value::as_u64)
            .map(Duration::from_millis);

        Self {
            routine_id,
            timestamp,
            signature: header_str(headers, keys::ROUTINE_SIGNATURE).map(str::to_string),
            scope: header_str(headers, keys::ROUTINE_SCOPE).map(str::to_string),
            tags,
            ttl,
            transient: header_str(headers, keys::MODE) == Some("forked"),
            progress_enabled: headers.get(keys::PROGRESS_ENABLED).and_then(Value::as_bool),
        }
    }

    /// Renders the correlation headers sent along with the request.
    pub fn to_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert(keys::ROUTINE_ID.into(), Value::from(self.routine_id.as_str()));
        headers.insert(
            keys::ROUTINE_TIMESTAMP.into(),
            Value::from(self.timestamp.as_str()),
        );
        if let Some(signature) = &self.signature {
            headers.insert(keys::ROUTINE_SIGNATURE.into(), Value::from(signature.as_str()));
        }
        if let Some(scope) = &self.scope {
            headers.insert(keys::ROUTINE_SCOPE.into(), Value::from(scope.as_str()));
        }
        if !self.tags.is_empty() {
            headers.insert(keys::ROUTINE_TAGS.into(), Value::from(self.tags.clone()));
        }
        if let Some(ttl) = self.effective_ttl() {
            let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            headers.insert(keys::TIMEOUT.into(), Value::from(ms));
        }
        if self.transient {
            headers.insert(keys::MODE.into(), Value::from("forked"));
        }
        if let Some(enabled) = self.progress_enabled {
            headers.insert(keys::PROGRESS_ENABLED.into(), Value::from(enabled));
        }
        headers
    }

    /// Globally unique correlation id.
    pub fn routine_id(&self) -> &str {
        &self.routine_id
    }

    /// Creation time, RFC 3339.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Logical method name.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Caller scope.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Routine tags in insertion order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Configured time-to-live, as given.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Time-to-live with the `0` sentinel folded into `None` (no timeout).
    #[inline]
    pub fn effective_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|d| !d.is_zero())
    }

    /// Fire-and-forget routine (response is not awaited).
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Whether the caller wants progress steps.
    pub fn progress_enabled(&self) -> Option<bool> {
        self.progress_enabled
    }

    /// True when per-request logs of this routine should be muted.
    pub fn is_mute(&self, omit_internal_logs: bool) -> bool {
        omit_internal_logs && self.scope.as_deref() == Some(SCOPE_INTERNAL)
    }

    /// Sets the logical method name.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Sets the caller scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Replaces the tag list.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the time-to-live (`None` or zero = no timeout).
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Marks the routine as fire-and-forget.
    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Enables or disables progress reporting.
    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.progress_enabled = Some(enabled);
        self
    }
}

fn generate_routine_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
