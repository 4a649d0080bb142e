//! # Pending request: correlation of an asynchronous response stream.
//!
//! A [`PendingRequest`] turns the messages pushed by transport callbacks into
//! a pull-based sequence the caller drains until the routine terminates.
//!
//! ## Architecture
//! ```text
//! transport callbacks (many)              caller (one)
//!   RequestHandle::push(msg) ──┐
//!   RequestHandle::push(msg) ──┼──► [unbounded FIFO] ──► PendingRequest::next()
//!   TimeoutWatcher (ttl) ──────┘         │                    │
//!        raise_timeout()                 │                    ▼
//!                                        └──────────► extract_result() ─► RpcResult
//! ```
//!
//! ## Rules
//! - Messages are observed in push order; each is consumed exactly once.
//! - A terminal push (`completed`/`failed`) appends the end-of-stream marker
//!   right behind itself, runs the completion callback and closes the watcher.
//! - A timeout appends the abnormal end-of-stream marker and runs the callback.
//! - Whichever terminal append happens first wins; later pushes are dropped.
//! - The completion callback runs **at most once**.
//! - Once `next()` returned `None` it keeps returning `None`.
//! - With no TTL the caller may wait indefinitely.
//! - Dropping an unfinished [`PendingRequest`] ends it as timed out.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::message::{Message, Status};
use super::params::RoutineParameters;
use super::result::{RpcResult, Step};
use super::watcher::TimeoutWatcher;

/// Why a request stopped accepting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A `completed` message arrived.
    Completed,
    /// A `failed` message arrived.
    Failed,
    /// The TTL elapsed (or the request was aborted) first.
    Timeout,
}

type CompleteFn = Box<dyn FnOnce(Completion) + Send + 'static>;

/// Queue item; the two markers end the sequence.
enum Delivery {
    Message(Message),
    End,
    Abort,
}

/// Producer-side state guarded as one unit so a terminal append and the
/// `finished` flip are atomic with respect to other producers.
struct Gate {
    tx: mpsc::UnboundedSender<Delivery>,
    finished: bool,
}

struct Shared {
    routine_id: String,
    signature: Option<String>,
    timestamp: String,
    ttl: Option<Duration>,
    mute: bool,
    gate: Mutex<Gate>,
    on_complete: Mutex<Option<CompleteFn>>,
    watcher: Option<TimeoutWatcher>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn push(&self, message: Message) {
        let terminal = message.status().filter(Status::is_terminal);
        {
            let mut gate = lock(&self.gate);
            if gate.finished {
                if !self.mute {
                    trace!(routine_id = %self.routine_id, "message after termination dropped");
                }
                return;
            }
            let _ = gate.tx.send(Delivery::Message(message));
            if terminal.is_some() {
                let _ = gate.tx.send(Delivery::End);
                gate.finished = true;
            }
        }

        if let Some(watcher) = &self.watcher {
            watcher.check();
        }

        if let Some(status) = terminal {
            if !self.mute {
                debug!(routine_id = %self.routine_id, %status, "request finished");
            }
            self.complete(match status {
                Status::Completed => Completion::Completed,
                _ => Completion::Failed,
            });
            if let Some(watcher) = &self.watcher {
                watcher.close();
            }
        }
    }

    fn raise_timeout(&self) {
        {
            let mut gate = lock(&self.gate);
            if gate.finished {
                return;
            }
            let _ = gate.tx.send(Delivery::Abort);
            gate.finished = true;
        }
        if !self.mute {
            debug!(routine_id = %self.routine_id, ttl = ?self.ttl, "request timed out");
        }
        self.complete(Completion::Timeout);
    }

    fn complete(&self, completion: Completion) {
        let callback = lock(&self.on_complete).take();
        if let Some(callback) = callback {
            callback(completion);
        }
    }

    fn is_finished(&self) -> bool {
        lock(&self.gate).finished
    }
}

/// Cloneable producer handle of a [`PendingRequest`].
///
/// Transport callbacks hold this to deliver messages from any thread.
#[derive(Clone)]
pub struct RequestHandle {
    shared: Arc<Shared>,
}

impl RequestHandle {
    /// Delivers an inbound message (non-blocking).
    pub fn push(&self, message: Message) {
        self.shared.push(message);
    }

    /// Ends the sequence abnormally, as if the TTL had elapsed.
    pub fn raise_timeout(&self) {
        self.shared.raise_timeout();
    }

    /// Correlation id of the request.
    pub fn routine_id(&self) -> &str {
        &self.shared.routine_id
    }

    /// True once a terminal message or a timeout has been appended.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// True when both handles feed the same request.
    pub(crate) fn same_request(&self, other: &RequestHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Drops the completion callback without running it.
    pub(crate) fn disarm(&self) {
        lock(&self.shared.on_complete).take();
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("routine_id", &self.shared.routine_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Consumer side of one routine invocation.
///
/// Single consumer, non-restartable: drain it with [`next`](Self::next) or
/// fold it with [`extract_result`](Self::extract_result).
pub struct PendingRequest {
    handle: RequestHandle,
    rx: mpsc::UnboundedReceiver<Delivery>,
    exhausted: bool,
}

impl PendingRequest {
    /// Creates a request for `params`.
    ///
    /// A non-zero TTL starts a [`TimeoutWatcher`], which requires a tokio runtime.
    pub fn new(params: &RoutineParameters) -> Self {
        Self::build(params, false)
    }

    /// Same as [`new`](Self::new) with per-request logs muted.
    pub fn new_muted(params: &RoutineParameters) -> Self {
        Self::build(params, true)
    }

    fn build(params: &RoutineParameters, mute: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ttl = params.effective_ttl();

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let watcher = ttl.map(|ttl| {
                let weak = weak.clone();
                TimeoutWatcher::start(ttl, move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.raise_timeout();
                    }
                })
            });
            Shared {
                routine_id: params.routine_id().to_string(),
                signature: params.signature().map(str::to_string),
                timestamp: params.timestamp().to_string(),
                ttl,
                mute,
                gate: Mutex::new(Gate {
                    tx,
                    finished: false,
                }),
                on_complete: Mutex::new(None),
                watcher,
            }
        });

        Self {
            handle: RequestHandle { shared },
            rx,
            exhausted: false,
        }
    }

    /// Installs the completion callback (replaces a previous one).
    ///
    /// If the request already finished, the callback never runs.
    pub fn with_completion<F>(self, on_complete: F) -> Self
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        *lock(&self.handle.shared.on_complete) = Some(Box::new(on_complete));
        self
    }

    /// Producer handle for transport callbacks.
    pub fn handle(&self) -> RequestHandle {
        self.handle.clone()
    }

    /// Delivers an inbound message; see [`RequestHandle::push`].
    pub fn push(&self, message: Message) {
        self.handle.push(message);
    }

    /// Ends the sequence abnormally; see [`RequestHandle::raise_timeout`].
    pub fn raise_timeout(&self) {
        self.handle.raise_timeout();
    }

    /// Correlation id.
    pub fn routine_id(&self) -> &str {
        &self.handle.shared.routine_id
    }

    /// Logical method name.
    pub fn signature(&self) -> Option<&str> {
        self.handle.shared.signature.as_deref()
    }

    /// Creation time of the routine.
    pub fn timestamp(&self) -> &str {
        &self.handle.shared.timestamp
    }

    /// Inactivity bound (`None` = wait indefinitely).
    pub fn timeout(&self) -> Option<Duration> {
        self.handle.shared.ttl
    }

    /// True once an end-of-stream marker has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the sequence ended (normally, by timeout, or
    /// because every producer is gone) and on every call after that.
    pub async fn next(&mut self) -> Option<Message> {
        if self.exhausted {
            return None;
        }
        match self.rx.recv().await {
            Some(Delivery::Message(message)) => Some(message),
            Some(Delivery::End | Delivery::Abort) | None => {
                self.exhausted = true;
                self.rx.close();
                None
            }
        }
    }

    /// Drains the remaining messages in order.
    pub async fn collect_messages(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(message) = self.next().await {
            out.push(message);
        }
        out
    }

    /// Drains the sequence and folds it into an [`RpcResult`].
    ///
    /// - `progress` bodies become [`Step`]s (malformed ones are cracked);
    /// - `completed`/`failed` set the value/error and the responder tag;
    /// - everything else is skipped.
    pub async fn extract_result(mut self, include_progress: bool) -> RpcResult {
        let mute = self.handle.shared.mute;
        if !mute {
            trace!(routine_id = %self.routine_id(), "extracting result");
        }

        let mut result = RpcResult {
            routine_id: self.routine_id().to_string(),
            signature: self.signature().map(str::to_string),
            responder: None,
            progress: None,
            failed: false,
            error: None,
            completed: false,
            value: None,
        };
        let mut steps = Vec::new();

        while let Some(message) = self.next().await {
            let status = message.status();
            if !mute {
                trace!(routine_id = %result.routine_id, ?status, "examine message");
            }
            match status {
                Some(Status::Progress) if include_progress => {
                    steps.push(Step::decode(&message.body));
                }
                Some(Status::Failed) => {
                    result.responder = message.responder;
                    result.failed = true;
                    result.error = Some(message.body);
                }
                Some(Status::Completed) => {
                    result.responder = message.responder;
                    result.completed = true;
                    result.value = Some(message.body);
                }
                _ => {}
            }
        }

        if include_progress {
            result.progress = Some(steps);
        }
        result
    }
}

impl Drop for PendingRequest {
    /// An abandoned request ends as timed out, so its completion callback
    /// still runs exactly once.
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            if !self.handle.shared.mute {
                trace!(routine_id = %self.handle.shared.routine_id, "request dropped before termination");
            }
            self.handle.raise_timeout();
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("routine_id", &self.routine_id())
            .field("signature", &self.signature())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn progress(percent: i64) -> Message {
        Message::with_status(Status::Progress, format!(r#"{{"percent": {percent}}}"#))
    }

    fn params(ttl: Option<Duration>) -> RoutineParameters {
        RoutineParameters::new()
            .with_signature("fibonacci")
            .with_ttl(ttl)
    }

    #[tokio::test]
    async fn test_completed_after_progress() {
        let req = PendingRequest::new(&params(None));
        req.push(Message::with_status(Status::Started, ""));
        req.push(progress(10));
        req.push(Message::with_status(Status::Progress, "garbage"));
        req.push(progress(90));
        req.push(Message::with_status(Status::Completed, "42").with_responder("worker-1"));

        let result = req.extract_result(true).await;
        assert!(result.completed);
        assert!(!result.failed);
        assert!(!result.is_timeout());
        assert_eq!(result.value_as_string().as_deref(), Some("42"));
        assert_eq!(result.responder.as_deref(), Some("worker-1"));
        assert_eq!(result.signature.as_deref(), Some("fibonacci"));

        let steps = result.progress.unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].percent(), Some(10));
        assert!(steps[1].is_cracked());
        assert_eq!(steps[2].percent(), Some(90));
    }

    #[tokio::test]
    async fn test_failed_sets_error() {
        let req = PendingRequest::new(&params(None));
        req.push(progress(50));
        req.push(Message::with_status(Status::Failed, "boom"));

        let result = req.extract_result(false).await;
        assert!(result.failed);
        assert!(!result.completed);
        assert_eq!(result.error_as_string().as_deref(), Some("boom"));
        assert!(result.value.is_none());
        assert!(result.progress.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_yields_timeout_shape() {
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let req = PendingRequest::new(&params(Some(Duration::from_millis(500))))
            .with_completion(move |c| *s.lock().unwrap() = Some(c));
        req.push(progress(5));

        let result = req.extract_result(true).await;
        assert!(!result.completed);
        assert!(!result.failed);
        assert!(result.error.is_none());
        assert!(result.value.is_none());
        assert!(result.is_timeout());
        assert_eq!(result.progress.map(|p| p.len()), Some(1));
        assert_eq!(*seen.lock().unwrap(), Some(Completion::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushes_keep_request_alive() {
        let req = PendingRequest::new(&params(Some(Duration::from_millis(500))));
        let handle = req.handle();
        tokio::spawn(async move {
            for p in [20, 40, 60, 80] {
                tokio::time::sleep(Duration::from_millis(300)).await;
                handle.push(progress(p));
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            handle.push(Message::with_status(Status::Completed, "ok"));
        });

        let result = req.extract_result(true).await;
        assert!(result.completed);
        assert_eq!(result.progress.map(|p| p.len()), Some(4));
    }

    #[tokio::test]
    async fn test_iteration_cannot_resume() {
        let mut req = PendingRequest::new(&params(None));
        req.push(Message::with_status(Status::Completed, "done"));
        req.push(progress(99));

        assert!(req.next().await.is_some());
        assert!(req.next().await.is_none());
        assert!(req.is_exhausted());

        req.push(progress(100));
        req.raise_timeout();
        assert!(req.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_runs_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let req = PendingRequest::new(&params(Some(Duration::from_millis(100))))
            .with_completion(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        req.push(Message::with_status(Status::Completed, "a"));
        req.push(Message::with_status(Status::Failed, "b"));
        req.raise_timeout();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let result = req.extract_result(false).await;
        assert!(result.completed);
        assert!(!result.failed);
    }

    #[tokio::test]
    async fn test_drop_before_termination_completes_as_timeout() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let req = PendingRequest::new(&params(None))
            .with_completion(move |c| s.lock().unwrap().push(c));
        let handle = req.handle();
        req.push(progress(30));

        drop(req);
        assert!(handle.is_finished());
        assert_eq!(*seen.lock().unwrap(), vec![Completion::Timeout]);

        handle.push(Message::with_status(Status::Completed, "late"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_after_completion_is_silent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let req = PendingRequest::new(&params(None)).with_completion(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        req.push(Message::with_status(Status::Completed, "v"));
        drop(req);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disarmed_request_skips_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let req = PendingRequest::new(&params(None)).with_completion(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let handle = req.handle();
        assert!(handle.same_request(&req.handle()));
        assert!(!handle.same_request(&PendingRequest::new(&params(None)).handle()));

        handle.disarm();
        drop(req);
        assert!(handle.is_finished());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uncategorized_messages_pass_through() {
        let mut req = PendingRequest::new(&params(None));
        req.push(Message::new(b"raw".to_vec(), Default::default()));
        req.push(Message::with_status(Status::Completed, "v"));

        let first = req.next().await.unwrap();
        assert_eq!(first.status(), None);
        assert_eq!(first.body, b"raw");

        let result = req.extract_result(true).await;
        assert!(result.completed);
        assert_eq!(result.progress, Some(Vec::new()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_keep_fifo_per_producer() {
        let mut req = PendingRequest::new(&params(None));
        let mut joins = Vec::new();
        for producer in 0..4 {
            let handle = req.handle();
            joins.push(tokio::spawn(async move {
                for n in 0..50 {
                    handle.push(Message::with_status(
                        Status::Progress,
                        format!(r#"{{"percent": {}, "info": "{producer}"}}"#, n),
                    ));
                }
            }));
        }
        for j in joins {
            j.await.unwrap();
        }
        req.push(Message::with_status(Status::Completed, "done"));

        let messages = req.collect_messages().await;
        assert_eq!(messages.len(), 201);

        let mut last = [-1i64; 4];
        for m in &messages[..200] {
            match Step::decode(&m.body) {
                Step::Progress { percent, info } => {
                    let producer: usize = info.unwrap().parse().unwrap();
                    assert!(i64::from(percent) > last[producer]);
                    last[producer] = i64::from(percent);
                }
                Step::Cracked => panic!("unexpected cracked step"),
            }
        }
        assert_eq!(messages[200].status(), Some(Status::Completed));
    }
}
