//! Scanner session wiring: scan, stream events and persisted preferences.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FakeNetwork, T0, api_client, spawn_price_server, unused_url};
use futures_util::{SinkExt, StreamExt};
use halaltrade::clock::ManualClock;
use halaltrade::prefs::PreferenceStore;
use halaltrade::session::{SCAN_ERROR_MESSAGE, ScannerSession};
use halaltrade::stream::{
    CONNECTION_ERROR_MESSAGE, ConnectionState, PriceStream, StreamEvent,
};
use reqwest::StatusCode;
use rust_decimal_macros::dec;
use tokio_tungstenite::tungstenite::Message;

const SCAN_JSON: &str = r#"[
    {"symbol":"TCS","name":"Tata Consultancy","price":4250.5,"shariahStatus":"Halal"},
    {"symbol":"INFY","name":"Infosys","price":1500,"shariahStatus":"Pending"}
]"#;

fn session(
    network: &FakeNetwork,
    prefs: &Arc<PreferenceStore>,
    url: String,
) -> ScannerSession<FakeNetwork> {
    let clock = Arc::new(ManualClock::new(T0));
    let api = Arc::new(api_client(network, &clock, prefs));
    let (stream, events) = PriceStream::spawn(url, prefs.live_mode(), Duration::from_millis(100));
    ScannerSession::new(api, stream, events, prefs.clone())
}

async fn wait_for_status(session: &mut ScannerSession<FakeNetwork>, status: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = session.next_event().await {
            if event == StreamEvent::Status(status) {
                return;
            }
        }
        panic!("stream driver stopped");
    })
    .await
    .expect("timed out waiting for status");
}

#[tokio::test]
async fn test_scan_replaces_list_and_connects_stream() {
    let network = FakeNetwork::new();
    network.route("/api/scan", StatusCode::OK, SCAN_JSON);
    let prefs = Arc::new(PreferenceStore::in_memory());
    let (url, _) = spawn_price_server(|_, mut ws| async move {
        ws.send(Message::text(
            r#"{"type":"price_update","timestamp":"2024-01-15T10:30:00","data":[{"symbol":"TCS","price":4300,"change":49.5,"changePercent":1.16}]}"#,
        ))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    })
    .await;
    let mut session = session(&network, &prefs, url);

    let count = session.scan().await.expect("scan failed");
    assert_eq!(count, 2);
    assert!(session.select("TCS"));
    assert_eq!(session.book().selected().unwrap().symbol, "TCS");

    wait_for_status(&mut session, ConnectionState::Connected).await;
    assert_eq!(session.status(), ConnectionState::Connected);

    let prices = tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .expect("timed out waiting for prices")
        .expect("stream driver stopped");
    assert!(matches!(prices, StreamEvent::Prices { .. }));
    assert_eq!(session.book().get("TCS").unwrap().price, dec!(4300));
    assert_eq!(session.book().selected().unwrap().price, dec!(4300));
    assert_eq!(session.book().update_count(), 1);

    // A second scan clears the selection and keeps the open stream.
    session.scan().await.expect("rescan failed");
    assert!(session.book().selected().is_none());
    assert_eq!(session.book().len(), 2);
    assert_eq!(network.requests_to("/api/scan"), 2);

    session.shutdown().await;
}

#[tokio::test]
async fn test_rescan_before_events_are_drained_keeps_one_connection() {
    let network = FakeNetwork::new();
    network.route("/api/scan", StatusCode::OK, SCAN_JSON);
    let prefs = Arc::new(PreferenceStore::in_memory());
    let (url, connections) = spawn_price_server(|_, mut ws| async move {
        while ws.next().await.is_some() {}
    })
    .await;
    let mut session = session(&network, &prefs, url);

    session.scan().await.expect("scan failed");
    tokio::time::timeout(Duration::from_secs(5), async {
        while connections.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stream never connected");
    tokio::time::sleep(Duration::from_millis(100)).await;

    // No events applied yet, so only the stream itself knows it is open.
    assert_eq!(session.status(), ConnectionState::Disconnected);
    session.scan().await.expect("rescan failed");

    wait_for_status(&mut session, ConnectionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    session.shutdown().await;
}

#[tokio::test]
async fn test_failed_scan_sets_error_and_keeps_list() {
    let network = FakeNetwork::new();
    network.route("/api/scan", StatusCode::OK, SCAN_JSON);
    let prefs = Arc::new(PreferenceStore::in_memory());
    let mut session = session(&network, &prefs, unused_url().await);

    session.scan().await.expect("first scan failed");
    network.set_offline(true);

    assert!(session.scan().await.is_err());
    assert_eq!(session.error(), Some(SCAN_ERROR_MESSAGE));
    assert_eq!(session.book().len(), 2);

    session.shutdown().await;
}

#[tokio::test]
async fn test_stream_error_is_reported_then_cleared_on_reconnect() {
    let network = FakeNetwork::new();
    let prefs = Arc::new(PreferenceStore::in_memory());
    prefs.set_live_mode(false);
    let mut session = session(&network, &prefs, unused_url().await);

    session.connect();
    wait_for_status(&mut session, ConnectionState::Disconnected).await;
    assert_eq!(session.error(), Some(CONNECTION_ERROR_MESSAGE));

    session.connect();
    wait_for_status(&mut session, ConnectionState::Connecting).await;
    assert_eq!(session.error(), None);

    session.shutdown().await;
}

#[tokio::test]
async fn test_live_mode_is_persisted_and_connects() {
    let network = FakeNetwork::new();
    let prefs = Arc::new(PreferenceStore::in_memory());
    prefs.set_live_mode(false);
    let (url, connections) = spawn_price_server(|_, mut ws| async move {
        while ws.next().await.is_some() {}
    })
    .await;
    let mut session = session(&network, &prefs, url);
    assert!(!session.live_mode());

    session.set_live_mode(true);
    assert!(prefs.live_mode());
    assert!(session.live_mode());
    wait_for_status(&mut session, ConnectionState::Connected).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);

    session.set_live_mode(false);
    assert!(!prefs.live_mode());
    assert_eq!(session.status(), ConnectionState::Connected);

    session.disconnect();
    wait_for_status(&mut session, ConnectionState::Disconnected).await;
    session.shutdown().await;
}

#[tokio::test]
async fn test_watchlist_survives_new_session() {
    let network = FakeNetwork::new();
    let prefs = Arc::new(PreferenceStore::in_memory());

    let mut first = session(&network, &prefs, unused_url().await);
    assert!(first.watchlist_mut().toggle("TCS"));
    assert!(first.watchlist_mut().toggle("INFY"));
    first.shutdown().await;

    let second = session(&network, &prefs, unused_url().await);
    assert_eq!(second.watchlist().symbols(), ["TCS", "INFY"]);
    second.shutdown().await;
}
