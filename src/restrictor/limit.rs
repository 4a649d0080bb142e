//! # Limit: bounded concurrency.
//!
//! A counting permit pool sized `semaphoreLimit`. Each admitted action holds
//! one permit for its whole run; the permit is returned whatever the outcome.
//!
//! - `semaphoreTimeout = 0` blocks until a permit frees up;
//! - `semaphoreTimeout > 0` gives up with [`RestrictionError::NoPermits`];
//! - a closed pool fails waiters with [`RestrictionError::PermitInterrupted`].
//!
//! Disabled by default (passthrough).

use std::future::Future;

use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, warn};

use super::Restrict;
use crate::config::{LimitConfig, SEMAPHORE_LIMIT_DEFAULT};
use crate::error::RestrictionError;

/// Permit-pool filter.
#[derive(Debug)]
pub struct Limit {
    cfg: LimitConfig,
    semaphore: Semaphore,
}

impl Default for Limit {
    fn default() -> Self {
        Self::new(LimitConfig::default())
    }
}

impl Limit {
    /// Creates the filter with `cfg.limit` permits.
    ///
    /// A zero limit falls back to [`SEMAPHORE_LIMIT_DEFAULT`].
    pub fn new(cfg: LimitConfig) -> Self {
        let permits = match cfg.limit {
            0 => SEMAPHORE_LIMIT_DEFAULT,
            n => n.min(Semaphore::MAX_PERMITS),
        };
        Self {
            cfg,
            semaphore: Semaphore::new(permits),
        }
    }

    /// Filter settings.
    pub fn config(&self) -> &LimitConfig {
        &self.cfg
    }

    /// True when the filter restricts anything at all.
    pub fn is_enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Closes the pool: current and future waiters fail with
    /// [`RestrictionError::PermitInterrupted`]. Running actions finish normally.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Restrict for Limit {
    async fn filter<T, E, A, Fut>(&self, action: A) -> Result<T, E>
    where
        A: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<RestrictionError> + Send,
    {
        if !self.cfg.enabled {
            return action().await;
        }

        let acquired = match self.cfg.permit_timeout() {
            None => self.semaphore.acquire().await,
            Some(limit) => match time::timeout(limit, self.semaphore.acquire()).await {
                Ok(res) => res,
                Err(_elapsed) => {
                    warn!(?limit, "no permits available");
                    return Err(RestrictionError::NoPermits { timeout: limit }.into());
                }
            },
        };
        let Ok(_permit) = acquired else {
            debug!("permit pool closed");
            return Err(RestrictionError::PermitInterrupted.into());
        };
        action().await
    }
}
