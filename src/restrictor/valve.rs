//! # Valve: hard circuit breaker.
//!
//! Normal operations share a read permit and run concurrently. [`Valve::lock`]
//! takes the exclusive permit (after in-flight operations drained); from then
//! on new operations are rejected with [`RestrictionError::ValveNotReady`]
//! instead of queueing. [`Valve::unlock`] reopens it.
//!
//! ```text
//!   open ──lock()──► draining ──(readers gone)──► locked ──unlock()──► open
//!    ▲                  │ filter() rejected           │ filter() rejected
//!    └──────────────────┴─────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedRwLockWriteGuard, RwLock};
use tracing::{info, warn};

use super::Restrict;
use crate::error::RestrictionError;

/// Read/write admission lock that rejects instead of waiting.
#[derive(Default)]
pub struct Valve {
    rw: Arc<RwLock<()>>,
    /// Exclusive permit while locked.
    held: Mutex<Option<OwnedRwLockWriteGuard<()>>>,
    /// Serializes concurrent `lock()` calls.
    switch: AsyncMutex<()>,
    locked: AtomicBool,
}

impl Valve {
    /// Creates an open valve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the valve once every in-flight operation finished.
    ///
    /// New operations are rejected as soon as the call starts waiting.
    /// Locking an already locked valve is a no-op.
    pub async fn lock(&self) {
        let _switch = self.switch.lock().await;
        if self.is_locked() {
            return;
        }
        let guard = Arc::clone(&self.rw).write_owned().await;
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
        self.locked.store(true, Ordering::Release);
        info!("valve locked");
    }

    /// Reopens the valve. No-op when it is not locked.
    pub fn unlock(&self) {
        let guard = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if guard.is_some() {
            self.locked.store(false, Ordering::Release);
            info!("valve unlocked");
        }
    }

    /// True while the exclusive permit is held.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Restrict for Valve {
    async fn filter<T, E, A, Fut>(&self, action: A) -> Result<T, E>
    where
        A: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<RestrictionError> + Send,
    {
        let Ok(_permit) = self.rw.try_read() else {
            warn!("valve is locked, request rejected");
            return Err(RestrictionError::ValveNotReady.into());
        };
        action().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{self, Instant};

    async fn ok(valve: &Valve) -> Result<(), RestrictionError> {
        valve.filter(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_lock_rejects_immediately() {
        let valve = Valve::new();
        assert_eq!(ok(&valve).await, Ok(()));

        valve.lock().await;
        assert!(valve.is_locked());

        let started = Instant::now();
        assert_eq!(ok(&valve).await, Err(RestrictionError::ValveNotReady));
        assert!(started.elapsed() < Duration::from_millis(50));

        valve.lock().await;
        valve.unlock();
        assert!(!valve.is_locked());
        assert_eq!(ok(&valve).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_waits_for_in_flight_operations() {
        let valve = Arc::new(Valve::new());
        let v = Arc::clone(&valve);
        let reader = tokio::spawn(async move {
            v.filter(|| async {
                time::sleep(Duration::from_millis(300)).await;
                Ok::<_, RestrictionError>(())
            })
            .await
        });
        tokio::task::yield_now().await;

        let started = Instant::now();
        valve.lock().await;
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(reader.await.unwrap(), Ok(()));
        assert_eq!(ok(&valve).await, Err(RestrictionError::ValveNotReady));
    }

    #[tokio::test]
    async fn test_action_error_passes_through() {
        #[derive(Debug, PartialEq)]
        enum AppError {
            Rejected(RestrictionError),
            Boom,
        }
        impl From<RestrictionError> for AppError {
            fn from(e: RestrictionError) -> Self {
                AppError::Rejected(e)
            }
        }

        let valve = Valve::new();
        let out: Result<(), AppError> = valve.filter(|| async { Err(AppError::Boom) }).await;
        assert_eq!(out, Err(AppError::Boom));

        valve.lock().await;
        let out: Result<(), AppError> = valve.filter(|| async { Ok(()) }).await;
        assert_eq!(out, Err(AppError::Rejected(RestrictionError::ValveNotReady)));
    }
}
