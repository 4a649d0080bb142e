//! # Admission pipeline.
//!
//! Nests the four filters in a fixed order:
//!
//! ```text
//! Limit ──► Pause ──► Valve ──► OnOff ──► action
//! (permit)  (wait?)   (reject?) (gate)
//! ```
//!
//! A permit is taken first, so a request that waits on a pause keeps its
//! concurrency slot for the duration of the wait.

use std::future::Future;

use super::{Limit, OnOff, Pause, Restrict, Valve};
use crate::config::Config;
use crate::error::RestrictionError;

/// The four admission filters, composed.
#[derive(Default)]
pub struct Pipeline {
    limit: Limit,
    pause: Pause,
    valve: Valve,
    onoff: OnOff,
}

impl Pipeline {
    /// Builds every filter from its section of `cfg`.
    pub fn new(cfg: &Config) -> Self {
        Self {
            limit: Limit::new(cfg.limit.clone()),
            pause: Pause::new(cfg.pause.clone()),
            valve: Valve::new(),
            onoff: OnOff::new(cfg.onoff.clone()),
        }
    }

    /// Bounded-concurrency stage.
    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    /// Pause stage.
    pub fn pause(&self) -> &Pause {
        &self.pause
    }

    /// Circuit-breaker stage.
    pub fn valve(&self) -> &Valve {
        &self.valve
    }

    /// On/off stage.
    pub fn onoff(&self) -> &OnOff {
        &self.onoff
    }

    /// Shuts down every waiting stage; waiters fail with an interrupted error.
    pub async fn close(&self) {
        self.pause.close().await;
        self.limit.close();
    }
}

impl Restrict for Pipeline {
    async fn filter<T, E, A, Fut>(&self, action: A) -> Result<T, E>
    where
        A: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<RestrictionError> + Send,
    {
        let (pause, valve, onoff) = (&self.pause, &self.valve, &self.onoff);
        self.limit
            .filter(move || pause.filter(move || valve.filter(move || onoff.filter(action))))
            .await
    }
}
