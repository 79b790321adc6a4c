use std::sync::Arc;

use halaltrade::HalalTradeError;
use halaltrade::api::ApiClient;
use halaltrade::cache::LONG_TTL;
use halaltrade::clock::{Clock, SystemClock};
use halaltrade::config::fetch_config;
use halaltrade::offline::{CacheStorage, HttpNetwork, OfflineCacheWorker};
use halaltrade::prefs::PreferenceStore;
use halaltrade::session::ScannerSession;
use halaltrade::stream::{PriceStream, StreamEvent};
use reqwest::Url;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), HalalTradeError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let prefs = Arc::new(PreferenceStore::open(
        app_config.storage.preferences_path(),
    ));
    let live_mode = app_config
        .stream
        .live_mode
        .unwrap_or_else(|| prefs.live_mode());

    let origin = Url::parse(&app_config.backend.api_url).map_err(|e| {
        HalalTradeError::Config(format!(
            "invalid API URL {}: {e}",
            app_config.backend.api_url
        ))
    })?;
    let worker = Arc::new(OfflineCacheWorker::new(
        HttpNetwork::new(app_config.backend.request_timeout)?,
        CacheStorage::open(app_config.storage.caches_dir()),
        clock.clone(),
        origin,
    ));
    if let Err(e) = worker.install().await {
        warn!(error = %e, "app shell not precached, using existing caches");
        worker.activate();
    }

    let api = Arc::new(ApiClient::new(
        &app_config.backend.api_url,
        worker,
        clock,
        prefs.clone(),
    ));
    let _sweeper = api.cache().spawn_sweeper(LONG_TTL);

    let (stream, events) = PriceStream::spawn(
        &app_config.backend.websocket_url,
        live_mode,
        app_config.stream.reconnect_delay,
    );
    let mut session = ScannerSession::new(api.clone(), stream, events, prefs);

    match api.universe_info().await {
        Ok(universe) => info!(
            universe = %universe.data.name,
            count = universe.data.count,
            from_cache = universe.from_cache,
            "scan universe"
        ),
        Err(e) => warn!(error = %e, "could not load scan universe"),
    }

    if let Err(e) = session.scan().await {
        warn!(error = %e, "initial scan failed, waiting for stream snapshot");
        session.connect();
    }

    loop {
        tokio::select! {
            event = session.next_event() => match event {
                Some(StreamEvent::Status(status)) => info!(?status, "price stream status"),
                Some(StreamEvent::Snapshot(_)) => {
                    info!(count = session.book().len(), "received snapshot");
                }
                Some(StreamEvent::Prices { .. }) => {
                    let book = session.book();
                    info!(
                        updates = book.update_count(),
                        last_update = book.last_update().unwrap_or("-"),
                        "prices updated"
                    );
                    for symbol in session.watchlist().symbols() {
                        if let Some(security) = book.get(symbol) {
                            debug!(symbol = %security.symbol, price = %security.price, "watched");
                        }
                    }
                }
                Some(StreamEvent::Error(message)) => warn!(%message, "price stream error"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
