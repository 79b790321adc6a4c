//! Shared test utilities: a scripted network and a local price server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use halaltrade::HalalTradeError;
use halaltrade::api::ApiClient;
use halaltrade::clock::ManualClock;
use halaltrade::offline::{CacheStorage, Network, OfflineCacheWorker, Request, Response};
use halaltrade::prefs::PreferenceStore;
use halaltrade::stream::StreamEvent;
use reqwest::{StatusCode, Url};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;

/// Base URL the fake backend pretends to live at.
pub const BASE_URL: &str = "http://localhost:8000";

/// Start time for manual clocks.
pub const T0: u64 = 1_700_000_000_000;

#[derive(Default)]
struct Inner {
    offline: AtomicBool,
    routes: Mutex<HashMap<String, (StatusCode, String)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    requests: Mutex<Vec<Request>>,
}

/// A [`Network`] that answers from a route table keyed by path.
#[derive(Clone, Default)]
pub struct FakeNetwork(Arc<Inner>);

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers requests for `path` with `status` and `body`.
    pub fn route(&self, path: &str, status: StatusCode, body: &str) {
        self.0
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    /// Delays every request whose URL contains `fragment`.
    pub fn delay(&self, fragment: &str, by: Duration) {
        self.0
            .delays
            .lock()
            .unwrap()
            .push((fragment.to_string(), by));
    }

    /// While offline every request fails before producing a response.
    pub fn set_offline(&self, offline: bool) {
        self.0.offline.store(offline, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.0.requests.lock().unwrap().len()
    }

    /// Number of requests whose path is exactly `path`.
    pub fn requests_to(&self, path: &str) -> usize {
        self.0
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.0.requests.lock().unwrap().last().cloned()
    }
}

impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> halaltrade::Result<Response> {
        self.0.requests.lock().unwrap().push(request.clone());

        let delay = self
            .0
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| request.url.as_str().contains(fragment.as_str()))
            .map(|(_, by)| *by);
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }

        if self.0.offline.load(Ordering::SeqCst) {
            return Err(HalalTradeError::Offline("connection refused".into()));
        }

        let (status, body) = self
            .0
            .routes
            .lock()
            .unwrap()
            .get(request.url.path())
            .cloned()
            .unwrap_or((StatusCode::NOT_FOUND, r#"{"detail":"Not Found"}"#.to_string()));

        Ok(Response::json(
            status,
            &serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)),
        ))
    }
}

/// An active worker with in-memory caches in front of `network`.
pub fn worker(network: &FakeNetwork, clock: &Arc<ManualClock>) -> Arc<OfflineCacheWorker<FakeNetwork>> {
    let worker = OfflineCacheWorker::new(
        network.clone(),
        CacheStorage::in_memory(),
        clock.clone(),
        Url::parse(BASE_URL).unwrap(),
    );
    worker.activate();
    Arc::new(worker)
}

/// An API client wired to `network` through an active worker.
pub fn api_client(
    network: &FakeNetwork,
    clock: &Arc<ManualClock>,
    prefs: &Arc<PreferenceStore>,
) -> ApiClient<FakeNetwork> {
    ApiClient::new(
        BASE_URL,
        worker(network, clock),
        clock.clone(),
        prefs.clone(),
    )
}

/// Starts a WebSocket server on a free local port.
///
/// `handler` runs once per accepted connection with the connection's
/// zero-based index. Returns the `ws://` URL and a live connection counter.
pub async fn spawn_price_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize, WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local address");
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let ws = tokio_tungstenite::accept_async(tcp)
                .await
                .expect("websocket handshake failed");
            tokio::spawn(handler(index, ws));
        }
    });

    (format!("ws://{addr}/ws/prices"), connections)
}

/// A `ws://` URL nobody is listening on.
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind probe");
    let addr = listener.local_addr().expect("no local address");
    drop(listener);
    format!("ws://{addr}/ws/prices")
}

/// Receives the next event or panics after five seconds.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for stream event")
        .expect("stream driver stopped")
}

/// Collects events until one matches `done`, returning all of them.
pub async fn events_until(
    events: &mut mpsc::UnboundedReceiver<StreamEvent>,
    done: impl Fn(&StreamEvent) -> bool,
) -> Vec<StreamEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}
