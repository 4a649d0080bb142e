//! # On/off gate.
//!
//! The cheapest filter: a flag that callers flip to switch extra
//! restrictions on or off. It never rejects.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use super::Restrict;
use crate::config::OnOffConfig;
use crate::error::RestrictionError;

/// Boolean gate around an action.
#[derive(Debug)]
pub struct OnOff {
    active: AtomicBool,
}

impl Default for OnOff {
    fn default() -> Self {
        Self::new(OnOffConfig::default())
    }
}

impl OnOff {
    /// Creates the gate in the configured state.
    pub fn new(cfg: OnOffConfig) -> Self {
        Self {
            active: AtomicBool::new(cfg.active),
        }
    }

    /// Current state.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flips the gate.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    async fn execute<T, E, A, Fut>(&self, action: A) -> Result<T, E>
    where
        A: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        action().await
    }
}

impl Restrict for OnOff {
    async fn filter<T, E, A, Fut>(&self, action: A) -> Result<T, E>
    where
        A: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<RestrictionError> + Send,
    {
        if self.is_active() {
            self.execute(action).await
        } else {
            trace!("on/off gate inactive, running action directly");
            action().await
        }
    }
}
