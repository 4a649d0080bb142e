//! # Outbound transport seam.
//!
//! The dispatcher knows nothing about brokers or HTTP clients. It hands the
//! encoded request to an [`Outbound`] implementation together with the
//! correlation headers and a transport hint derived from the congestion flags.

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::observer::Transport;
use crate::rpc::Headers;

/// Sends a request to the responders.
///
/// # Example
/// ```rust
/// use async_trait::async_trait;
/// use rpcvisor::{DispatchError, Headers, Outbound, Transport};
///
/// struct Blackhole;
///
/// #[async_trait]
/// impl Outbound for Blackhole {
///     async fn send(&self, _body: Vec<u8>, _headers: Headers, _hint: Option<Transport>) -> Result<(), DispatchError> {
///         Err(DispatchError::transport("no route"))
///     }
/// }
/// ```
#[async_trait]
pub trait Outbound: Send + Sync + 'static {
    /// Publishes one request.
    ///
    /// `hint` names the transport that is currently not congested, if the
    /// flags single one out; implementations are free to ignore it.
    async fn send(
        &self,
        body: Vec<u8>,
        headers: Headers,
        hint: Option<Transport>,
    ) -> Result<(), DispatchError>;
}
