//! One WebSocket connection attempt.
//!
//! A connection task knows only its generation number. It reports what
//! happens on the socket to the driver as [`Input`]s and never decides
//! anything itself; the [`Supervisor`](super::Supervisor) filters out inputs
//! from generations it no longer cares about.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use tungstenite::Message as WsMessage;

use super::state::Input;
use crate::models::StreamMessage;

/// Connects to `url` and forwards socket events until the socket ends or
/// `close` fires (or its sender is dropped).
pub(crate) async fn run(
    url: String,
    generation: u64,
    inputs: mpsc::UnboundedSender<Input>,
    mut close: oneshot::Receiver<()>,
) {
    info!(url = %url, generation, "connecting to price stream");

    let ws = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(generation, error = %e, "price stream connection failed");
                let _ = inputs.send(Input::Failed { generation, error: e.to_string() });
                let _ = inputs.send(Input::Closed { generation });
                return;
            }
        },
        _ = &mut close => {
            debug!(generation, "connection attempt abandoned");
            return;
        }
    };

    if inputs.send(Input::Opened { generation }).is_err() {
        return;
    }

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = &mut close => {
                if let Err(e) = write.send(WsMessage::Close(None)).await {
                    debug!(generation, error = %e, "close frame not sent");
                }
                debug!(generation, "price stream closed locally");
                return;
            }

            msg = read.next() => {
                let input = match msg {
                    Some(Ok(WsMessage::Text(text))) => match StreamMessage::parse(&text) {
                        Ok(message) => Input::Message { generation, message },
                        Err(e) => {
                            warn!(generation, error = %e, "dropping malformed stream frame");
                            continue;
                        }
                    },
                    // Ping/Pong/Binary; the Close frame is followed by end of stream.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(generation, error = %e, "price stream error");
                        let _ = inputs.send(Input::Failed { generation, error: e.to_string() });
                        let _ = inputs.send(Input::Closed { generation });
                        return;
                    }
                    None => {
                        debug!(generation, "price stream ended");
                        let _ = inputs.send(Input::Closed { generation });
                        return;
                    }
                };

                if inputs.send(input).is_err() {
                    return;
                }
            }
        }
    }
}
