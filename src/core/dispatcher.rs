//! # Dispatcher: admission, correlation and peer tracking in one place.
//!
//! ## Request path
//! ```text
//! request(signature, body, params)
//!   └─► Pipeline::filter ── Limit → Pause → Valve → OnOff ──┐
//!                                                           ▼
//!                                         registry.insert(handle)
//!                                         outbound.send(body, headers, hint)
//!                                           ├─ Ok  → RequestDispatched, PendingRequest
//!                                           └─ Err → registry rollback, RequestRejected
//! ```
//!
//! ## Delivery path
//! ```text
//! deliver(transport, body, headers)
//!   ├─► PeerObserver::check ──(new responder)──► ResponderJoined
//!   └─► registry.get(routineId)
//!          ├─ Some(handle) → handle.push(message)
//!          │                   └─ terminal/timeout → completion callback:
//!          │                        registry.remove_finished + RequestCompleted|Failed|Timeout
//!          └─ None         → ResponseUnmatched
//! ```
//!
//! ## Rules
//! - A request is registered before it is sent, so a response can never
//!   arrive for an unknown routine id on a fast transport.
//! - Transient (fire-and-forget) requests are never registered; their
//!   [`PendingRequest`] ends immediately.
//! - A routine id owned by an unfinished request is refused with
//!   [`DispatchError::Duplicate`].
//! - Dropping a [`PendingRequest`] ends it as timed out and unregisters it.
//! - `close()` interrupts filter waiters and ends every pending request so
//!   no caller hangs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{builder::DispatcherBuilder, outbound::Outbound, registry::Registry};
use crate::{
    config::Config,
    error::DispatchError,
    events::{Bus, Event, EventKind},
    observer::{PeerObserver, Transport},
    restrictor::{Pipeline, Restrict},
    rpc::{
        Completion, Headers, Message, PendingRequest, RequestHandle, RoutineParameters, header_str,
    },
    subscribers::SubscriberSet,
};

/// Request dispatcher: the entry point of the crate.
pub struct Dispatcher {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    registry: Arc<Registry>,
    observer: PeerObserver,
    pipeline: Pipeline,
    outbound: Arc<dyn Outbound>,
    token: CancellationToken,
    closed: AtomicBool,
}

impl Dispatcher {
    /// Returns a builder for a dispatcher sending through `outbound`.
    pub fn builder(cfg: Config, outbound: Arc<dyn Outbound>) -> DispatcherBuilder {
        DispatcherBuilder::new(cfg, outbound)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        registry: Arc<Registry>,
        observer: PeerObserver,
        pipeline: Pipeline,
        outbound: Arc<dyn Outbound>,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs,
            registry,
            observer,
            pipeline,
            outbound,
            token,
            closed: AtomicBool::new(false),
        }
    }

    /// Forwards bus events to the subscriber set until the dispatcher closes.
    pub(super) fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    /// Sends a request and returns the handle to collect its responses.
    ///
    /// The registration and the outbound send run inside the admission
    /// [`Pipeline`]; a rejection is returned as [`DispatchError::Restriction`].
    pub async fn request(
        &self,
        signature: &str,
        body: impl Into<Vec<u8>>,
        params: RoutineParameters,
    ) -> Result<PendingRequest, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let params = params.with_signature(signature);
        let body = body.into();

        let res = self.pipeline.filter(|| self.dispatch(&params, body)).await;
        if let Err(err) = &res {
            warn!(
                routine_id = params.routine_id(),
                signature,
                error = %err,
                "request rejected"
            );
            self.bus.publish(
                Event::new(EventKind::RequestRejected)
                    .with_routine(params.routine_id())
                    .with_signature(signature)
                    .with_reason(err.as_label()),
            );
        }
        res
    }

    async fn dispatch(
        &self,
        params: &RoutineParameters,
        body: Vec<u8>,
    ) -> Result<PendingRequest, DispatchError> {
        let mute = params.is_mute(self.cfg.omit_internal_logs);
        let headers = params.to_headers();
        let hint = self.preferred_transport();

        if params.is_transient() {
            self.outbound.send(body, headers, hint).await?;
            self.publish_dispatched(params, mute);
            let request = self.new_request(params, mute);
            request.raise_timeout();
            return Ok(request);
        }

        let request = self
            .new_request(params, mute)
            .with_completion(self.completion(params));
        let handle = request.handle();
        if !self.registry.insert(handle.clone()) {
            handle.disarm();
            return Err(DispatchError::Duplicate {
                routine_id: params.routine_id().to_string(),
            });
        }
        // close() may have drained the registry between the entry check and the insert.
        if self.is_closed() {
            self.rollback(&handle);
            return Err(DispatchError::Closed);
        }

        if let Err(err) = self.outbound.send(body, headers, hint).await {
            self.rollback(&handle);
            return Err(err);
        }
        self.publish_dispatched(params, mute);
        Ok(request)
    }

    /// Unregisters a request that was never sent; no outcome event is published.
    fn rollback(&self, handle: &RequestHandle) {
        handle.disarm();
        self.registry.remove_entry(handle);
    }

    fn new_request(&self, params: &RoutineParameters, mute: bool) -> PendingRequest {
        if mute {
            PendingRequest::new_muted(params)
        } else {
            PendingRequest::new(params)
        }
    }

    fn publish_dispatched(&self, params: &RoutineParameters, mute: bool) {
        if !mute {
            info!(
                routine_id = params.routine_id(),
                signature = params.signature(),
                transient = params.is_transient(),
                "request dispatched"
            );
        }
        let mut ev = Event::new(EventKind::RequestDispatched).with_routine(params.routine_id());
        if let Some(signature) = params.signature() {
            ev = ev.with_signature(signature);
        }
        if let Some(ttl) = params.effective_ttl() {
            ev = ev.with_timeout(ttl);
        }
        self.bus.publish(ev);
    }

    /// Completion callback: unregisters the request and reports its outcome.
    fn completion(&self, params: &RoutineParameters) -> impl FnOnce(Completion) + Send + 'static {
        let registry = Arc::clone(&self.registry);
        let bus = self.bus.clone();
        let routine_id = params.routine_id().to_string();
        let signature = params.signature().map(str::to_string);
        let ttl = params.effective_ttl();

        move |completion| {
            registry.remove_finished(&routine_id);
            let kind = match completion {
                Completion::Completed => EventKind::RequestCompleted,
                Completion::Failed => EventKind::RequestFailed,
                Completion::Timeout => EventKind::RequestTimeout,
            };
            let mut ev = Event::new(kind).with_routine(routine_id);
            if let Some(signature) = signature {
                ev = ev.with_signature(signature);
            }
            if let (Completion::Timeout, Some(ttl)) = (completion, ttl) {
                ev = ev.with_timeout(ttl);
            }
            bus.publish(ev);
        }
    }

    /// Inbound delivery callback for the transport layer.
    ///
    /// Feeds the [`PeerObserver`] and routes the message to its pending
    /// request by `routineId`. Returns `true` when a pending request took it.
    pub fn deliver(&self, transport: Transport, body: impl Into<Vec<u8>>, headers: Headers) -> bool {
        let responder = transport
            .component_header()
            .and_then(|key| header_str(&headers, key))
            .map(str::to_string);

        if self.observer.check(transport, &headers) {
            let mut ev = Event::new(EventKind::ResponderJoined).with_transport(transport);
            if let Some(component) = &responder {
                ev = ev.with_component(component.as_str());
            }
            self.bus.publish(ev);
        }

        let mut message = Message::new(body, headers);
        message.responder = responder;

        let handle = message.routine_id().and_then(|id| self.registry.get(id));
        match handle {
            Some(handle) => {
                handle.push(message);
                true
            }
            None => {
                trace!(routine_id = ?message.routine_id(), %transport, "unmatched response");
                let mut ev = Event::new(EventKind::ResponseUnmatched).with_transport(transport);
                if let Some(routine_id) = message.routine_id() {
                    ev = ev.with_routine(routine_id);
                }
                if let Some(component) = &message.responder {
                    ev = ev.with_component(component.as_str());
                }
                self.bus.publish(ev);
                false
            }
        }
    }

    /// Transport that is not flagged congestive while the other one is.
    pub fn preferred_transport(&self) -> Option<Transport> {
        let broker = self.observer.is_congestive(Transport::Broker);
        let http = self.observer.is_congestive(Transport::Http);
        match (broker, http) {
            (true, false) => Some(Transport::Http),
            (false, true) => Some(Transport::Broker),
            _ => None,
        }
    }

    /// Number of requests waiting for a terminal message.
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Peer observer fed by [`deliver`](Self::deliver).
    pub fn observer(&self) -> &PeerObserver {
        &self.observer
    }

    /// Admission pipeline (valve, pause, limit and on/off controls).
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Dispatcher configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Receiver for dispatcher events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops accepting requests, interrupts admission waiters and ends every
    /// pending request as timed out. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pipeline.close().await;
        let pending = self.registry.drain();
        debug!(pending = pending.len(), "dispatcher closing");
        for handle in pending {
            handle.raise_timeout();
        }
        self.token.cancel();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
