use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rpcvisor::{
    Config, DispatchError, Dispatcher, Event, EventKind, Headers, LimitConfig, Outbound,
    PeerStatus, RestrictionError, RoutineParameters, Status, Step, Subscribe, Transport, keys,
};
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

/// Queues every request for the test to answer by hand.
struct Channel {
    tx: mpsc::UnboundedSender<Headers>,
}

#[async_trait]
impl Outbound for Channel {
    async fn send(
        &self,
        _body: Vec<u8>,
        headers: Headers,
        _hint: Option<Transport>,
    ) -> Result<(), DispatchError> {
        self.tx
            .send(headers)
            .map_err(|_| DispatchError::transport("closed"))
    }
}

#[derive(Default)]
struct Counter {
    completed: AtomicUsize,
    timeouts: AtomicUsize,
}

#[async_trait]
impl Subscribe for Counter {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::RequestCompleted => {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
            EventKind::RequestTimeout => {
                self.timeouts.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "counter"
    }
}

fn answer(request: &Headers, status: Status, consumer: &str) -> Headers {
    let mut headers = Headers::new();
    headers.insert(
        keys::ROUTINE_ID.into(),
        request.get(keys::ROUTINE_ID).cloned().unwrap_or(Value::Null),
    );
    headers.insert(keys::STATUS.into(), Value::from(status.as_str()));
    headers.insert(keys::BROKER_CONSUMER_ID.into(), Value::from(consumer));
    headers.insert(keys::BROKER_PROTOCOL_VERSION.into(), Value::from("1"));
    headers
}

fn setup(cfg: Config) -> (Arc<Dispatcher>, mpsc::UnboundedReceiver<Headers>, Arc<Counter>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let counter = Arc::new(Counter::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![counter.clone()];
    let dispatcher = Dispatcher::builder(cfg, Arc::new(Channel { tx }))
        .with_subscribers(subs)
        .build();
    (dispatcher, rx, counter)
}

#[tokio::test]
async fn test_progress_then_completion_over_broker() {
    let (d, mut rx, counter) = setup(Config::default());

    let params = RoutineParameters::new().with_progress_enabled(true);
    let pending = d.request("resize", "img.png", params).await.unwrap();
    let sent = rx.recv().await.unwrap();
    assert_eq!(sent.get(keys::PROGRESS_ENABLED), Some(&Value::from(true)));

    d.deliver(Transport::Broker, "", answer(&sent, Status::Started, "c-1"));
    d.deliver(
        Transport::Broker,
        json!({"percent": 40, "info": "scaling"}).to_string(),
        answer(&sent, Status::Progress, "c-1"),
    );
    d.deliver(Transport::Broker, "oops", answer(&sent, Status::Progress, "c-1"));
    d.deliver(Transport::Broker, "img@2x.png", answer(&sent, Status::Completed, "c-1"));

    let result = pending.extract_result(true).await;
    assert!(result.completed);
    assert_eq!(result.responder.as_deref(), Some("c-1"));
    assert_eq!(result.signature.as_deref(), Some("resize"));
    let progress = result.progress.unwrap();
    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0].percent(), Some(40));
    assert_eq!(progress[1], Step::Cracked);

    d.observer().rollup();
    let manifest = d.observer().manifest("c-1").unwrap();
    assert_eq!(manifest.status, PeerStatus::Ok);
    assert_eq!(manifest.compatible, Some(true));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
    d.close().await;
}

#[tokio::test]
async fn test_failed_response_carries_error() {
    let (d, mut rx, _counter) = setup(Config::default());

    let pending = d.request("divide", "1/0", RoutineParameters::new()).await.unwrap();
    let sent = rx.recv().await.unwrap();
    d.deliver(Transport::Broker, "division by zero", answer(&sent, Status::Failed, "c-2"));

    let result = pending.extract_result(false).await;
    assert!(result.failed);
    assert!(!result.completed);
    assert_eq!(result.error_as_string().as_deref(), Some("division by zero"));
    assert!(result.progress.is_none());
    assert_eq!(d.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_responder_times_out() {
    let (d, mut rx, counter) = setup(Config::default());

    let params = RoutineParameters::new().with_ttl(Some(Duration::from_secs(1)));
    let pending = d.request("sleepy", "", params).await.unwrap();
    let sent = rx.recv().await.unwrap();

    // Activity re-arms the watcher.
    tokio::time::sleep(Duration::from_millis(800)).await;
    d.deliver(Transport::Broker, "", answer(&sent, Status::Started, "c-3"));
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(d.pending(), 1);

    let result = pending.extract_result(false).await;
    assert!(result.is_timeout());
    assert_eq!(d.pending(), 0);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(counter.timeouts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_limit_sheds_load_after_timeout() {
    let cfg = Config {
        limit: LimitConfig {
            enabled: true,
            limit: 1,
            timeout: Duration::from_millis(50),
        },
        ..Config::default()
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Mutex::new(()));

    /// Holds the permit while the test keeps the mutex locked.
    struct Slow {
        tx: mpsc::UnboundedSender<Headers>,
        gate: Arc<Mutex<()>>,
    }

    #[async_trait]
    impl Outbound for Slow {
        async fn send(
            &self,
            _body: Vec<u8>,
            headers: Headers,
            _hint: Option<Transport>,
        ) -> Result<(), DispatchError> {
            let _held = self.gate.lock().await;
            self.tx
                .send(headers)
                .map_err(|_| DispatchError::transport("closed"))
        }
    }

    let d = Dispatcher::builder(
        cfg,
        Arc::new(Slow {
            tx,
            gate: gate.clone(),
        }),
    )
    .build();

    let held = gate.lock().await;
    let first = {
        let d = d.clone();
        tokio::spawn(async move { d.request("a", "", RoutineParameters::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(d.pipeline().limit().available_permits(), 0);

    let err = d.request("b", "", RoutineParameters::new()).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Restriction(RestrictionError::NoPermits { .. })
    ));

    drop(held);
    assert!(first.await.unwrap().is_ok());
    assert_eq!(d.pipeline().limit().available_permits(), 1);
}

#[tokio::test]
async fn test_pause_then_unpause_readmits() {
    let (d, mut rx, _counter) = setup(Config::default());

    d.pipeline().pause().pause(Duration::from_secs(60));
    let err = d.request("x", "", RoutineParameters::new()).await.unwrap_err();
    assert!(matches!(&err, DispatchError::Restriction(r) if r.is_suspend()));

    d.pipeline().pause().unpause();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!d.pipeline().pause().is_paused());
    assert!(d.request("x", "", RoutineParameters::new()).await.is_ok());
    assert!(rx.recv().await.is_some());
}
