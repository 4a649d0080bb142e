//! # Folded outcome of a drained request.
//!
//! [`RpcResult`] is a read-only projection built by
//! [`PendingRequest::extract_result`](crate::PendingRequest::extract_result).
//! Exactly one of three shapes is possible:
//!
//! | shape     | `completed` | `failed` | `value` | `error` |
//! |-----------|-------------|----------|---------|---------|
//! | completed | true        | false    | Some    | None    |
//! | failed    | false       | true     | None    | Some    |
//! | timeout   | false       | false    | None    | None    |
//!
//! Timeouts are ordinary results, not errors: check [`RpcResult::is_timeout`].

use serde::Deserialize;
use serde_json::Value;

/// One progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A well-formed report.
    Progress {
        /// Completion percentage, `0..=100`.
        percent: u8,
        /// Optional free-form annotation.
        info: Option<String>,
    },
    /// The progress body could not be decoded.
    Cracked,
}

impl Step {
    /// Decodes a progress body (`{"percent": 42, "info": "..."}`).
    ///
    /// Anything that is not a JSON object with an integer `percent` in
    /// `0..=100` yields [`Step::Cracked`]. A non-string `info` is ignored.
    pub fn decode(body: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct Body {
            percent: i64,
            #[serde(default)]
            info: Option<Value>,
        }

        match serde_json::from_slice::<Body>(body) {
            Ok(Body { percent, info }) => match u8::try_from(percent) {
                Ok(percent) if percent <= 100 => Step::Progress {
                    percent,
                    info: info.as_ref().and_then(Value::as_str).map(str::to_string),
                },
                _ => Step::Cracked,
            },
            Err(_) => Step::Cracked,
        }
    }

    /// Percentage, if the step is well-formed.
    pub fn percent(&self) -> Option<u8> {
        match self {
            Step::Progress { percent, .. } => Some(*percent),
            Step::Cracked => None,
        }
    }

    /// True for undecodable steps.
    pub fn is_cracked(&self) -> bool {
        matches!(self, Step::Cracked)
    }
}

/// Final outcome of one routine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResult {
    /// Correlation id.
    pub routine_id: String,
    /// Logical method name.
    pub signature: Option<String>,
    /// Tag of the responder that sent the terminal message.
    pub responder: Option<String>,
    /// Progress steps in arrival order; `None` when not requested.
    pub progress: Option<Vec<Step>>,
    /// A `failed` message ended the sequence.
    pub failed: bool,
    /// Body of the `failed` message.
    pub error: Option<Vec<u8>>,
    /// A `completed` message ended the sequence.
    pub completed: bool,
    /// Body of the `completed` message.
    pub value: Option<Vec<u8>>,
}

impl RpcResult {
    /// Neither a value nor an error arrived.
    pub fn is_timeout(&self) -> bool {
        self.error.is_none() && self.value.is_none()
    }

    /// Value decoded as UTF-8 (lossy).
    pub fn value_as_string(&self) -> Option<String> {
        self.value
            .as_deref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Error decoded as UTF-8 (lossy).
    pub fn error_as_string(&self) -> Option<String> {
        self.error
            .as_deref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}
