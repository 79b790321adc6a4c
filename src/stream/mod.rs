//! Live price stream client.
//!
//! [`PriceStream::spawn`] starts a driver task that owns the connection
//! [`Supervisor`]. The returned handle sends commands to it; events come out
//! of the paired [`mpsc`] receiver and the connection state can be watched
//! through [`PriceStream::status`]. Feed the events into a [`MarketBook`] to
//! keep a live list of securities.
//!
//! - [`state`] - Connection state machine
//! - [`book`] - Security list, selection and tick merging
//! - [`connection`] - One WebSocket connection attempt

pub mod book;
mod connection;
pub mod state;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use book::MarketBook;
pub use state::{
    CONNECTION_ERROR_MESSAGE, ConnectionState, Effect, Input, StreamEvent, Supervisor,
};

/// Commands accepted by the driver.
#[derive(Debug, Clone, Copy)]
enum Command {
    Connect,
    Disconnect,
    SetLiveMode(bool),
}

impl From<Command> for Input {
    fn from(command: Command) -> Self {
        match command {
            Command::Connect => Input::Connect,
            Command::Disconnect => Input::Disconnect,
            Command::SetLiveMode(enabled) => Input::SetLiveMode(enabled),
        }
    }
}

/// Handle to a running price stream driver.
///
/// Dropping every handle shuts the driver down and closes the socket.
#[derive(Debug)]
pub struct PriceStream {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl PriceStream {
    /// Starts the driver. Nothing connects until [`connect`](Self::connect).
    pub fn spawn(
        url: impl Into<String>,
        live_mode: bool,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            url: url.into(),
            supervisor: Supervisor::new(live_mode, reconnect_delay),
            inputs: input_tx,
            events: event_tx,
            status: status_tx,
            connection: None,
            reconnect: None,
        };
        let task = tokio::spawn(driver.run(command_rx, input_rx));

        (
            Self {
                commands: command_tx,
                status: status_rx,
                task,
            },
            event_rx,
        )
    }

    /// Opens the stream unless it is already open or opening.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Closes the stream and cancels any pending reconnect.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Turns automatic reconnection on or off.
    pub fn set_live_mode(&self, enabled: bool) {
        self.send(Command::SetLiveMode(enabled));
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// A receiver that observes every connection state change.
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    /// Stops the driver and waits for it to finish.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            debug!(error = %e, "price stream driver ended abnormally");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(?command, "price stream driver is gone");
        }
    }
}

/// Owns the supervisor and performs its effects.
struct Driver {
    url: String,
    supervisor: Supervisor,
    inputs: mpsc::UnboundedSender<Input>,
    events: mpsc::UnboundedSender<StreamEvent>,
    status: watch::Sender<ConnectionState>,
    connection: Option<(u64, oneshot::Sender<()>)>,
    reconnect: Option<(u64, JoinHandle<()>)>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inputs: mpsc::UnboundedReceiver<Input>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command.into()),
                    None => break,
                },
                Some(input) = inputs.recv() => self.apply(input),
            }
        }

        info!("price stream driver shutting down");
        self.apply(Input::Disconnect);
    }

    fn apply(&mut self, input: Input) {
        for effect in self.supervisor.handle(input) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Open { generation } => {
                let (close_tx, close_rx) = oneshot::channel();
                tokio::spawn(connection::run(
                    self.url.clone(),
                    generation,
                    self.inputs.clone(),
                    close_rx,
                ));
                // Replacing an older handle drops its sender, which also
                // stops that task.
                self.connection = Some((generation, close_tx));
            }
            Effect::Close { generation } => {
                if let Some((current, close_tx)) = self.connection.take() {
                    if current == generation {
                        let _ = close_tx.send(());
                    } else {
                        self.connection = Some((current, close_tx));
                    }
                }
            }
            Effect::ScheduleReconnect { token, delay } => {
                info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                let inputs = self.inputs.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = inputs.send(Input::ReconnectDue { token });
                });
                if let Some((_, old)) = self.reconnect.replace((token, timer)) {
                    old.abort();
                }
            }
            Effect::CancelReconnect { token } => {
                if let Some((current, timer)) = self.reconnect.take() {
                    if current == token {
                        timer.abort();
                    } else {
                        self.reconnect = Some((current, timer));
                    }
                }
            }
            Effect::Emit(event) => {
                if let StreamEvent::Status(state) = &event {
                    self.status.send_replace(*state);
                }
                if self.events.send(event).is_err() {
                    debug!("stream event receiver dropped");
                }
            }
        }
    }
}
