//! # Cancellable inactivity timer.
//!
//! A [`TimeoutWatcher`] fires its callback once if it is neither reset
//! ([`check`](TimeoutWatcher::check)) nor closed before its deadline.
//!
//! ## State machine
//! ```text
//!            check() ─┐
//!                     ▼
//!   start ──► OPEN ───┴──► deadline elapsed ──► FIRED  (callback runs once)
//!               │
//!               └──► close() ──► CLOSED               (never fires)
//! ```
//!
//! ## Rules
//! - The transition out of `OPEN` is a single compare-and-swap, so a close
//!   racing with the deadline either wins (no callback) or loses (callback ran).
//! - A reset that lands right before the deadline is re-checked after waking:
//!   the watcher goes back to sleep instead of firing.
//! - `close()` is idempotent and may be called after the watcher fired.
//! - Not reusable once closed or fired.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

const OPEN: u8 = 0;
const CLOSED: u8 = 1;
const FIRED: u8 = 2;

struct Inner {
    ttl: Duration,
    started: Instant,
    /// Nanoseconds since `started` of the last `check()`.
    last_check: AtomicU64,
    state: AtomicU8,
    token: CancellationToken,
}

impl Inner {
    fn touched_at(&self) -> Instant {
        self.started + Duration::from_nanos(self.last_check.load(Ordering::Acquire))
    }
}

/// Single-shot inactivity timer driven by a tokio task.
pub struct TimeoutWatcher {
    inner: Arc<Inner>,
}

impl TimeoutWatcher {
    /// Starts the watcher; `on_timeout` runs at most once, on the runtime's worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(ttl: Duration, on_timeout: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = Arc::new(Inner {
            ttl,
            started: Instant::now(),
            last_check: AtomicU64::new(0),
            state: AtomicU8::new(OPEN),
            token: CancellationToken::new(),
        });
        tokio::spawn(watch(Arc::clone(&inner), on_timeout));
        Self { inner }
    }

    /// Resets the inactivity deadline to `now + ttl`.
    pub fn check(&self) {
        let nanos = u64::try_from(self.inner.started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.inner.last_check.fetch_max(nanos, Ordering::AcqRel);
    }

    /// Stops the watcher; it will never fire afterwards. Idempotent.
    pub fn close(&self) {
        let _ = self
            .inner
            .state
            .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire);
        self.inner.token.cancel();
    }

    /// True once `close()` was called before the deadline.
    pub fn is_closed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CLOSED
    }

    /// True once the callback has been triggered.
    pub fn has_fired(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == FIRED
    }

    /// Configured inactivity bound.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }
}

impl Drop for TimeoutWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn watch<F>(inner: Arc<Inner>, on_timeout: F)
where
    F: FnOnce() + Send + 'static,
{
    loop {
        let deadline = inner.touched_at() + inner.ttl;
        tokio::select! {
            _ = inner.token.cancelled() => return,
            _ = time::sleep_until(deadline) => {}
        }
        // A check() may have landed while sleeping.
        if Instant::now() < inner.touched_at() + inner.ttl {
            continue;
        }
        if inner
            .state
            .compare_exchange(OPEN, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            on_timeout();
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_ttl() {
        let (hits, cb) = counter();
        let watcher = TimeoutWatcher::start(Duration::from_millis(500), cb);

        time::sleep(Duration::from_millis(499)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(watcher.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_postpones_deadline() {
        let (hits, cb) = counter();
        let watcher = TimeoutWatcher::start(Duration::from_millis(500), cb);

        for _ in 0..4 {
            time::sleep(Duration::from_millis(300)).await;
            watcher.check();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_never_fires() {
        let (hits, cb) = counter();
        let watcher = TimeoutWatcher::start(Duration::from_millis(100), cb);
        watcher.close();
        watcher.close();
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(watcher.is_closed());
        assert!(!watcher.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_fire_keeps_fired_state() {
        let (hits, cb) = counter();
        let watcher = TimeoutWatcher::start(Duration::from_millis(100), cb);
        time::sleep(Duration::from_millis(150)).await;
        watcher.close();

        assert!(watcher.has_fired());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
