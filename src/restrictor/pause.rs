//! # Pause: self-expiring full stop.
//!
//! [`Pause::pause`] spawns a hold task that takes the exclusive lock and keeps
//! it for the requested duration, then releases it on its own.
//! [`Pause::unpause`] ends the hold early.
//!
//! ## Hold cycle
//! ```text
//! pause(d) ──► Locking ──(readers drained)──► Locked ──┬─ d elapsed ──► released
//!                 │                                    └─ unpause() ──► released
//!                 └─ unpause() / close() ──► abandoned
//! ```
//!
//! ## Waiting while paused
//! | `pauseTimeout` | [`PauseWait`]  | behavior                                  |
//! |----------------|----------------|-------------------------------------------|
//! | `< 0`          | `Forever`      | wait until released (or filter closed)    |
//! | `0`            | `FailFast`     | reject with `PauseTimeout { 0s }`         |
//! | `> 0`          | `Bounded(d)`   | wait up to `d`, then `PauseTimeout { d }` |
//!
//! With `pauseEnabled = false` the filter is a passthrough.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use super::Restrict;
use crate::config::{PauseConfig, PauseWait};
use crate::error::RestrictionError;

/// Outcome of a [`Pause::pause`] or [`Pause::unpause`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseStatus {
    /// A hold cycle is already running, or the duration was zero.
    Skipped,
    /// The hold task waits for in-flight operations to drain.
    Locking,
    /// The exclusive lock is held.
    Locked,
    /// Nothing to unpause.
    Free,
    /// Early release requested; the lock is still held for a moment.
    Unlocking,
    /// The lock is released.
    Unlocked,
}

/// Report returned by pause/unpause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PauseReport {
    /// Id of the hold cycle the report is about.
    pub pause_id: Option<String>,
    /// What happened.
    pub status: PauseStatus,
    /// Requested hold duration of a newly started cycle.
    pub duration: Option<Duration>,
}

/// Shared between the filter and its hold task.
#[derive(Default)]
struct CycleState {
    locked: AtomicBool,
    finished: AtomicBool,
    /// Nanoseconds the lock was held, published on release.
    held_nanos: AtomicU64,
    locked_at: Mutex<Option<Instant>>,
}

struct Cycle {
    id: String,
    duration: Duration,
    state: Arc<CycleState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timed, self-expiring exclusive lock.
pub struct Pause {
    cfg: PauseConfig,
    rw: Arc<RwLock<()>>,
    cycle: Mutex<Option<Cycle>>,
    closed: CancellationToken,
}

impl Default for Pause {
    fn default() -> Self {
        Self::new(PauseConfig::default())
    }
}

impl Pause {
    /// Creates an unpaused filter.
    pub fn new(cfg: PauseConfig) -> Self {
        Self {
            cfg,
            rw: Arc::new(RwLock::new(())),
            cycle: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Filter settings.
    pub fn config(&self) -> &PauseConfig {
        &self.cfg
    }

    /// Starts a hold cycle of `duration`.
    ///
    /// Skipped when a cycle is already running, the duration is zero, or the
    /// filter is closed. Must be called from within a tokio runtime.
    pub fn pause(&self, duration: Duration) -> PauseReport {
        let mut slot = lock(&self.cycle);
        if let Some(cycle) = slot.as_ref().filter(|c| !c.state.finished.load(Ordering::Acquire)) {
            debug!(pause_id = %cycle.id, "pause already running, skipped");
            return PauseReport {
                pause_id: Some(cycle.id.clone()),
                status: PauseStatus::Skipped,
                duration: None,
            };
        }
        if duration.is_zero() || self.closed.is_cancelled() {
            return PauseReport {
                pause_id: None,
                status: PauseStatus::Skipped,
                duration: None,
            };
        }

        let id = Uuid::new_v4().simple().to_string();
        let state = Arc::new(CycleState::default());
        let cancel = self.closed.child_token();

        // Take the lock right away when nothing is in flight.
        let ready = Arc::clone(&self.rw).try_write_owned().ok();
        let status = if ready.is_some() {
            mark_locked(&state);
            PauseStatus::Locked
        } else {
            PauseStatus::Locking
        };

        let task = tokio::spawn(hold(
            Arc::clone(&self.rw),
            ready,
            Arc::clone(&state),
            cancel.clone(),
            duration,
        ));
        debug!(pause_id = %id, ?duration, ?status, "pause started");

        *slot = Some(Cycle {
            id: id.clone(),
            duration,
            state,
            cancel,
            task: Some(task),
        });
        PauseReport {
            pause_id: Some(id),
            status,
            duration: Some(duration),
        }
    }

    /// Ends the running hold cycle early.
    pub fn unpause(&self) -> PauseReport {
        let slot = lock(&self.cycle);
        let Some(cycle) = slot.as_ref() else {
            return PauseReport {
                pause_id: None,
                status: PauseStatus::Free,
                duration: None,
            };
        };
        cycle.cancel.cancel();
        let status = if cycle.state.locked.load(Ordering::Acquire) {
            PauseStatus::Unlocking
        } else {
            PauseStatus::Unlocked
        };
        debug!(pause_id = %cycle.id, ?status, "unpause requested");
        PauseReport {
            pause_id: Some(cycle.id.clone()),
            status,
            duration: None,
        }
    }

    /// True while a hold cycle owns the exclusive lock.
    pub fn is_paused(&self) -> bool {
        lock(&self.cycle)
            .as_ref()
            .is_some_and(|c| c.state.locked.load(Ordering::Acquire))
    }

    /// Requested duration of the latest cycle (`0s` if none).
    pub fn pause_duration(&self) -> Duration {
        lock(&self.cycle)
            .as_ref()
            .map_or(Duration::ZERO, |c| c.duration)
    }

    /// How long the latest cycle has held (or held) the lock.
    pub fn pause_elapsed(&self) -> Duration {
        let slot = lock(&self.cycle);
        let Some(cycle) = slot.as_ref() else {
            return Duration::ZERO;
        };
        if cycle.state.locked.load(Ordering::Acquire) {
            lock(&cycle.state.locked_at)
                .map_or(Duration::ZERO, |at| at.elapsed().min(cycle.duration))
        } else {
            Duration::from_nanos(cycle.state.held_nanos.load(Ordering::Acquire))
        }
    }

    /// Shuts the filter down: ends the running cycle and interrupts every
    /// waiting operation with [`RestrictionError::PauseInterrupted`].
    ///
    /// Returns once the hold task released the lock.
    pub async fn close(&self) {
        self.closed.cancel();
        let task = lock(&self.cycle).as_mut().and_then(|c| c.task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

fn mark_locked(state: &CycleState) {
    *lock(&state.locked_at) = Some(Instant::now());
    state.locked.store(true, Ordering::Release);
}

async fn hold(
    rw: Arc<RwLock<()>>,
    ready: Option<OwnedRwLockWriteGuard<()>>,
    state: Arc<CycleState>,
    cancel: CancellationToken,
    duration: Duration,
) {
    let guard = match ready {
        Some(guard) => guard,
        None => {
            tokio::select! {
                guard = rw.write_owned() => {
                    mark_locked(&state);
                    guard
                }
                _ = cancel.cancelled() => {
                    state.finished.store(true, Ordering::Release);
                    return;
                }
            }
        }
    };

    tokio::select! {
        _ = time::sleep(duration) => trace!("pause expired"),
        _ = cancel.cancelled() => trace!("pause ended early"),
    }

    let held = lock(&state.locked_at).map_or(Duration::ZERO, |at| at.elapsed().min(duration));
    state
        .held_nanos
        .store(u64::try_from(held.as_nanos()).unwrap_or(u64::MAX), Ordering::Release);
    drop(guard);
    state.locked.store(false, Ordering::Release);
    state.finished.store(true, Ordering::Release);
    debug!(?held, "pause released");
}

impl Restrict for Pause {
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

        let _permit = match self.cfg.wait() {
            PauseWait::Forever => match self.rw.try_read() {
                Ok(permit) => permit,
                Err(_) => {
                    trace!("paused, waiting");
                    tokio::select! {
                        biased;
                        _ = self.closed.cancelled() => {
                            debug!("pause wait interrupted");
                            return Err(RestrictionError::PauseInterrupted.into());
                        }
                        permit = self.rw.read() => permit,
                    }
                }
            },
            PauseWait::FailFast => match self.rw.try_read() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("paused, request rejected");
                    return Err(RestrictionError::PauseTimeout {
                        timeout: Duration::ZERO,
                    }
                    .into());
                }
            },
            PauseWait::Bounded(limit) => match self.rw.try_read() {
                Ok(permit) => permit,
                Err(_) => {
                    trace!(?limit, "paused, waiting");
                    tokio::select! {
                        biased;
                        _ = self.closed.cancelled() => {
                            debug!("pause wait interrupted");
                            return Err(RestrictionError::PauseInterrupted.into());
                        }
                        res = time::timeout(limit, self.rw.read()) => match res {
                            Ok(permit) => permit,
                            Err(_elapsed) => {
                                debug!(?limit, "pause wait timed out");
                                return Err(RestrictionError::PauseTimeout { timeout: limit }.into());
                            }
                        },
                    }
                }
            },
        };
        action().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pause_with(timeout_ms: i64) -> Pause {
        Pause::new(PauseConfig {
            enabled: true,
            timeout_ms,
        })
    }

    async fn ok(pause: &Pause) -> Result<(), RestrictionError> {
        pause.filter(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_while_paused_then_expires() {
        let pause = pause_with(0);
        let report = pause.pause(Duration::from_millis(200));
        assert_eq!(report.status, PauseStatus::Locked);
        assert_eq!(report.duration, Some(Duration::from_millis(200)));
        assert!(pause.is_paused());
        assert_eq!(pause.pause_duration(), Duration::from_millis(200));

        assert_eq!(
            ok(&pause).await,
            Err(RestrictionError::PauseTimeout {
                timeout: Duration::ZERO
            })
        );

        time::sleep(Duration::from_millis(250)).await;
        assert!(!pause.is_paused());
        assert_eq!(pause.pause_elapsed(), Duration::from_millis(200));
        assert_eq!(ok(&pause).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pause_is_skipped() {
        let pause = pause_with(0);
        let first = pause.pause(Duration::from_secs(1));
        let second = pause.pause(Duration::from_secs(5));
        assert_eq!(second.status, PauseStatus::Skipped);
        assert_eq!(second.pause_id, first.pause_id);
        assert_eq!(pause.pause(Duration::ZERO).status, PauseStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait() {
        let pause = pause_with(500);
        pause.pause(Duration::from_millis(200));
        let started = Instant::now();
        assert_eq!(ok(&pause).await, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(200));

        let pause = pause_with(100);
        pause.pause(Duration::from_secs(2));
        assert_eq!(
            ok(&pause).await,
            Err(RestrictionError::PauseTimeout {
                timeout: Duration::from_millis(100)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpause_releases_waiters() {
        let pause = Arc::new(pause_with(-1));
        assert_eq!(pause.unpause().status, PauseStatus::Free);
        pause.pause(Duration::from_secs(3600));

        let p = Arc::clone(&pause);
        let waiter = tokio::spawn(async move { ok(&p).await });
        time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        assert_eq!(pause.unpause().status, PauseStatus::Unlocking);
        assert_eq!(waiter.await.unwrap(), Ok(()));
        assert!(!pause.is_paused());
        assert_eq!(pause.unpause().status, PauseStatus::Unlocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_interrupts_waiters() {
        let pause = Arc::new(pause_with(-1));
        pause.pause(Duration::from_secs(3600));

        let p = Arc::clone(&pause);
        let waiter = tokio::spawn(async move { ok(&p).await });
        time::sleep(Duration::from_millis(10)).await;

        pause.close().await;
        assert!(pause.is_closed());
        assert_eq!(waiter.await.unwrap(), Err(RestrictionError::PauseInterrupted));
        assert_eq!(pause.pause(Duration::from_secs(1)).status, PauseStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_filter_admits_when_free() {
        for timeout_ms in [-1, 0, 100] {
            let pause = pause_with(timeout_ms);
            pause.pause(Duration::from_secs(3600));
            pause.close().await;
            assert!(!pause.is_paused());
            assert_eq!(ok(&pause).await, Ok(()), "timeout_ms = {timeout_ms}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_locking_waits_for_in_flight_operations() {
        let pause = Arc::new(pause_with(0));
        let p = Arc::clone(&pause);
        let reader = tokio::spawn(async move {
            p.filter(|| async {
                time::sleep(Duration::from_millis(100)).await;
                Ok::<_, RestrictionError>(())
            })
            .await
        });
        tokio::task::yield_now().await;

        assert_eq!(pause.pause(Duration::from_secs(1)).status, PauseStatus::Locking);
        assert!(!pause.is_paused());
        assert_eq!(reader.await.unwrap(), Ok(()));
        time::sleep(Duration::from_millis(1)).await;
        assert!(pause.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_is_passthrough() {
        let pause = Pause::new(PauseConfig {
            enabled: false,
            timeout_ms: 0,
        });
        pause.pause(Duration::from_secs(10));
        assert!(pause.is_paused());
        assert_eq!(ok(&pause).await, Ok(()));
    }
}
