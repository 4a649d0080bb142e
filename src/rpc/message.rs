//! # Inbound messages and header keys.
//!
//! A [`Message`] is what the transport collaborator hands over for every
//! delivery: opaque body bytes, a header map and the tag of the responder
//! that produced it. The `status` header classifies the message:
//!
//! ```text
//! started ─► progress* ─► completed | failed
//! ```
//!
//! Messages without a recognised status are passed through untouched.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// Header map carried by every message (keys are unique).
pub type Headers = HashMap<String, Value>;

/// Transport-agnostic header names.
pub mod keys {
    /// Correlation id of the routine.
    pub const ROUTINE_ID: &str = "routineId";
    /// Logical method name.
    pub const ROUTINE_SIGNATURE: &str = "routineSignature";
    /// Creation time of the routine (string form).
    pub const ROUTINE_TIMESTAMP: &str = "routineTimestamp";
    /// Caller scope (`"internal"` mutes logs).
    pub const ROUTINE_SCOPE: &str = "routineScope";
    /// Ordered list of routine tags.
    pub const ROUTINE_TAGS: &str = "routineTags";
    /// Whether progress messages are wanted.
    pub const PROGRESS_ENABLED: &str = "progressEnabled";
    /// Message classification.
    pub const STATUS: &str = "status";
    /// `"forked"` marks a fire-and-forget routine.
    pub const MODE: &str = "mode";
    /// Routine time-to-live in milliseconds.
    pub const TIMEOUT: &str = "timeout";

    /// Responder identity on the broker transport.
    pub const BROKER_CONSUMER_ID: &str = "consumerId";
    /// Protocol version advertised on the broker transport.
    pub const BROKER_PROTOCOL_VERSION: &str = "protocolVersion";
    /// Responder identity on the HTTP transport.
    pub const HTTP_WORKER_ID: &str = "workerId";
    /// Callback address a responder advertises.
    pub const ADDRESS: &str = "address";
}

/// Value of the `status` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The responder accepted the routine.
    Started,
    /// Intermediate progress report.
    Progress,
    /// Terminal: the routine produced a value.
    Completed,
    /// Terminal: the routine produced an error.
    Failed,
}

impl Status {
    /// Parses a header value; unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Status::Started),
            "progress" => Some(Status::Progress),
            "completed" => Some(Status::Completed),
            "failed" => Some(Status::Failed),
            _ => None,
        }
    }

    /// Header representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Started => "started",
            Status::Progress => "progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// True for `completed` and `failed`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Opaque payload.
    pub body: Vec<u8>,
    /// Message headers.
    pub headers: Headers,
    /// Tag of the responder that produced the message, if the transport knows it.
    pub responder: Option<String>,
}

impl Message {
    /// Creates a message from body and headers.
    pub fn new(body: impl Into<Vec<u8>>, headers: Headers) -> Self {
        Self {
            body: body.into(),
            headers,
            responder: None,
        }
    }

    /// Shorthand for a message carrying only a `status` header.
    pub fn with_status(status: Status, body: impl Into<Vec<u8>>) -> Self {
        let mut headers = Headers::new();
        headers.insert(keys::STATUS.to_string(), Value::from(status.as_str()));
        Self::new(body, headers)
    }

    /// Attaches the responder tag.
    #[inline]
    pub fn with_responder(mut self, responder: impl Into<String>) -> Self {
        self.responder = Some(responder.into());
        self
    }

    /// Classification from the `status` header.
    pub fn status(&self) -> Option<Status> {
        self.header_str(keys::STATUS).and_then(Status::parse)
    }

    /// Routine id the message belongs to.
    pub fn routine_id(&self) -> Option<&str> {
        self.header_str(keys::ROUTINE_ID)
    }

    /// String-valued header, if present and a string.
    pub fn header_str(&self, key: &str) -> Option<&str> {
        header_str(&self.headers, key)
    }

    /// Body decoded as UTF-8 (lossy).
    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Reads a non-empty string header.
pub(crate) fn header_str<'a>(headers: &'a Headers, key: &str) -> Option<&'a str> {
    headers
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
