//! # Example: loopback
//!
//! Wires a [`Dispatcher`] to an in-process "worker" that answers every
//! request over a channel, so the whole request path runs without a broker.
//!
//! Shows how to:
//! - Implement the [`Outbound`] trait.
//! - Feed responses back through [`Dispatcher::deliver`].
//! - Attach the built-in [`LogWriter`] and read events via `tracing`.
//! - Trip the valve and observe the rejection.
//!
//! ## Flow
//! ```text
//! request() ──► Pipeline ──► Loopback::send ──► [channel] ──► worker task
//!                                                                 │
//! extract_result() ◄── PendingRequest ◄── deliver(Http, ...) ◄────┘
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=rpcvisor=debug cargo run --example loopback
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rpcvisor::{
    Config, DispatchError, Dispatcher, Headers, LogWriter, Outbound, RoutineParameters, Status,
    Subscribe, Transport, keys,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Hands every request to the worker task.
struct Loopback {
    tx: mpsc::UnboundedSender<(Vec<u8>, Headers)>,
}

#[async_trait]
impl Outbound for Loopback {
    async fn send(
        &self,
        body: Vec<u8>,
        headers: Headers,
        _hint: Option<Transport>,
    ) -> Result<(), DispatchError> {
        self.tx
            .send((body, headers))
            .map_err(|_| DispatchError::transport("worker gone"))
    }
}

fn reply(request: &Headers, status: Status) -> Headers {
    let mut headers = Headers::new();
    if let Some(id) = request.get(keys::ROUTINE_ID) {
        headers.insert(keys::ROUTINE_ID.into(), id.clone());
    }
    headers.insert(keys::STATUS.into(), Value::from(status.as_str()));
    headers.insert(keys::HTTP_WORKER_ID.into(), Value::from("worker-1"));
    headers.insert(keys::ADDRESS.into(), Value::from("127.0.0.1:7070"));
    headers
}

fn fibonacci(n: u64) -> u64 {
    (0..n).fold((0, 1), |(a, b), _| (b, a + b)).0
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rpcvisor=info")),
        )
        .init();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let dispatcher = Dispatcher::builder(Config::default(), Arc::new(Loopback { tx }))
        .with_subscribers(subs)
        .build();

    let worker = {
        let dispatcher = Arc::downgrade(&dispatcher);
        tokio::spawn(async move {
            while let Some((body, headers)) = rx.recv().await {
                let Some(d) = dispatcher.upgrade() else { break };
                let n: u64 = String::from_utf8_lossy(&body).trim().parse().unwrap_or(0);

                d.deliver(Transport::Http, "", reply(&headers, Status::Started));
                for percent in [25, 50, 75] {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let step = json!({ "percent": percent, "info": "crunching" }).to_string();
                    d.deliver(Transport::Http, step, reply(&headers, Status::Progress));
                }
                let value = fibonacci(n).to_string();
                d.deliver(Transport::Http, value, reply(&headers, Status::Completed));
            }
        })
    };

    let params = RoutineParameters::new()
        .with_ttl(Some(Duration::from_secs(2)))
        .with_progress_enabled(true);
    let pending = dispatcher.request("fibonacci", "20", params).await?;
    let result = pending.extract_result(true).await;
    println!(
        "fibonacci(20) = {} ({} progress steps, responder {})",
        result.value_as_string().unwrap_or_default(),
        result.progress.as_ref().map_or(0, Vec::len),
        result.responder.as_deref().unwrap_or("-"),
    );

    dispatcher.pipeline().valve().lock().await;
    match dispatcher
        .request("fibonacci", "10", RoutineParameters::new())
        .await
    {
        Err(err) => println!("valve closed: {}", err.as_label()),
        Ok(_) => println!("valve closed but request went through"),
    }
    dispatcher.pipeline().valve().unlock();

    println!("peers: {}", dispatcher.observer().summary());

    dispatcher.close().await;
    drop(dispatcher);
    let _ = worker.await;
    Ok(())
}
