use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{dispatcher::Dispatcher, outbound::Outbound, registry::Registry};
use crate::{
    config::Config,
    events::Bus,
    observer::PeerObserver,
    restrictor::Pipeline,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Dispatcher`].
pub struct DispatcherBuilder {
    cfg: Config,
    outbound: Arc<dyn Outbound>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl DispatcherBuilder {
    /// Creates a new builder with the given configuration and transport.
    pub fn new(cfg: Config, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            cfg,
            outbound,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive dispatcher events (request outcomes, rejections,
    /// responders joining) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the dispatcher and starts its subscriber listener.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Arc<Dispatcher> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let pipeline = Pipeline::new(&self.cfg);
        let observer = PeerObserver::new(self.cfg.observer.clone());
        let token = CancellationToken::new();

        let dispatcher = Arc::new(Dispatcher::new_internal(
            self.cfg,
            bus,
            subs,
            Arc::new(Registry::new()),
            observer,
            pipeline,
            self.outbound,
            token,
        ));
        dispatcher.subscriber_listener();
        dispatcher
    }
}
