//! Connection state machine for the price stream.
//!
//! [`Supervisor`] is pure: it consumes [`Input`]s and returns the
//! [`Effect`]s the driver must carry out. Every connection attempt gets a
//! fresh generation number and every transport input carries the generation
//! it came from, so events from a superseded socket are dropped here rather
//! than racing with the current one. Reconnect timers carry a token for the
//! same reason.

use std::time::Duration;

use tracing::{debug, info};

use crate::models::{PriceTick, Security, StreamMessage};

/// Message surfaced to the user when the socket reports an error.
pub const CONNECTION_ERROR_MESSAGE: &str = "WebSocket connection failed. Is the backend running?";

/// Lifecycle of the stream connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// `true` while a socket is open or being opened.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// What the consumer sees.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Connection state changed. Entering `Connecting` or `Connected` clears
    /// any previous error.
    Status(ConnectionState),
    /// Full snapshot that replaces the security list.
    Snapshot(Vec<Security>),
    /// Incremental price ticks.
    Prices {
        timestamp: Option<String>,
        ticks: Vec<PriceTick>,
    },
    /// User-facing error message.
    Error(String),
}

/// Everything that can happen to the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Open a connection unless one is active or being opened.
    Connect,
    /// Close everything and stop reconnecting.
    Disconnect,
    /// Enable or disable automatic reconnection.
    SetLiveMode(bool),
    /// The socket of `generation` finished its handshake.
    Opened { generation: u64 },
    /// A well-formed frame arrived on the socket of `generation`.
    Message {
        generation: u64,
        message: StreamMessage,
    },
    /// The socket of `generation` reported an error.
    Failed { generation: u64, error: String },
    /// The socket of `generation` is gone.
    Closed { generation: u64 },
    /// The reconnect timer identified by `token` fired.
    ReconnectDue { token: u64 },
}

/// Side effects requested by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Open { generation: u64 },
    Close { generation: u64 },
    ScheduleReconnect { token: u64, delay: Duration },
    CancelReconnect { token: u64 },
    Emit(StreamEvent),
}

/// Price stream connection supervisor.
#[derive(Debug)]
pub struct Supervisor {
    state: ConnectionState,
    live_mode: bool,
    reconnect_delay: Duration,
    generation: u64,
    pending_reconnect: Option<u64>,
    next_token: u64,
}

impl Supervisor {
    pub fn new(live_mode: bool, reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            live_mode,
            reconnect_delay,
            generation: 0,
            pending_reconnect: None,
            next_token: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn live_mode(&self) -> bool {
        self.live_mode
    }

    /// Generation of the current (or most recent) connection attempt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reconnect_pending(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    /// Applies one input and returns the effects to perform, in order.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();

        match input {
            Input::Connect => self.connect(&mut effects),
            Input::Disconnect => self.disconnect(&mut effects),
            Input::SetLiveMode(enabled) => {
                self.live_mode = enabled;
                if !enabled {
                    self.cancel_reconnect(&mut effects);
                }
            }
            Input::Opened { generation } => {
                if self.is_current(generation) && self.state == ConnectionState::Connecting {
                    info!(generation, "price stream connected");
                    self.transition(ConnectionState::Connected, &mut effects);
                }
            }
            Input::Message {
                generation,
                message,
            } => {
                if self.is_current(generation) && self.state == ConnectionState::Connected {
                    self.route(message, &mut effects);
                }
            }
            Input::Failed { generation, error } => {
                if self.is_current(generation) && self.state.is_active() {
                    debug!(generation, error = %error, "price stream error");
                    effects.push(Effect::Emit(StreamEvent::Error(
                        CONNECTION_ERROR_MESSAGE.to_string(),
                    )));
                }
            }
            Input::Closed { generation } => {
                if self.is_current(generation) && self.state.is_active() {
                    info!(generation, "price stream closed");
                    self.transition(ConnectionState::Disconnected, &mut effects);
                    if self.live_mode {
                        self.schedule_reconnect(&mut effects);
                    }
                }
            }
            Input::ReconnectDue { token } => {
                if self.pending_reconnect == Some(token) {
                    self.pending_reconnect = None;
                    if self.live_mode {
                        debug!(token, "attempting reconnect");
                        self.connect(&mut effects);
                    }
                }
            }
        }

        effects
    }

    fn is_current(&self, generation: u64) -> bool {
        if generation == self.generation {
            true
        } else {
            debug!(
                generation,
                current = self.generation,
                "ignoring event from superseded connection"
            );
            false
        }
    }

    fn connect(&mut self, effects: &mut Vec<Effect>) {
        if self.state.is_active() {
            return;
        }

        self.cancel_reconnect(effects);
        self.generation += 1;
        self.transition(ConnectionState::Connecting, effects);
        effects.push(Effect::Open {
            generation: self.generation,
        });
    }

    fn disconnect(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_reconnect(effects);

        if self.state.is_active() {
            effects.push(Effect::Close {
                generation: self.generation,
            });
            // Anything still in flight from the old socket is now stale.
            self.generation += 1;
            self.transition(ConnectionState::Disconnected, effects);
        }
    }

    fn schedule_reconnect(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_reconnect(effects);
        self.next_token += 1;
        self.pending_reconnect = Some(self.next_token);
        effects.push(Effect::ScheduleReconnect {
            token: self.next_token,
            delay: self.reconnect_delay,
        });
    }

    fn cancel_reconnect(&mut self, effects: &mut Vec<Effect>) {
        if let Some(token) = self.pending_reconnect.take() {
            effects.push(Effect::CancelReconnect { token });
        }
    }

    fn transition(&mut self, state: ConnectionState, effects: &mut Vec<Effect>) {
        if self.state != state {
            self.state = state;
            effects.push(Effect::Emit(StreamEvent::Status(state)));
        }
    }

    fn route(&mut self, message: StreamMessage, effects: &mut Vec<Effect>) {
        match message {
            StreamMessage::Initial { data } => {
                debug!(count = data.len(), "received initial snapshot");
                effects.push(Effect::Emit(StreamEvent::Snapshot(data)));
            }
            StreamMessage::PriceUpdate { timestamp, data } => {
                effects.push(Effect::Emit(StreamEvent::Prices {
                    timestamp,
                    ticks: data,
                }));
            }
            StreamMessage::Unknown => debug!("ignoring stream message of unknown type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(3000);

    fn connected() -> Supervisor {
        let mut sup = Supervisor::new(true, DELAY);
        sup.handle(Input::Connect);
        sup.handle(Input::Opened { generation: 1 });
        assert_eq!(sup.state(), ConnectionState::Connected);
        sup
    }

    fn count_opens(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Open { .. }))
            .count()
    }

    #[test]
    fn connect_is_idempotent() {
        let mut sup = Supervisor::new(true, DELAY);
        let first = sup.handle(Input::Connect);
        assert_eq!(
            first,
            vec![
                Effect::Emit(StreamEvent::Status(ConnectionState::Connecting)),
                Effect::Open { generation: 1 },
            ]
        );

        assert!(sup.handle(Input::Connect).is_empty());
        sup.handle(Input::Opened { generation: 1 });
        assert!(sup.handle(Input::Connect).is_empty());
    }

    #[test]
    fn close_schedules_exactly_one_reconnect() {
        let mut sup = connected();

        let effects = sup.handle(Input::Closed { generation: 1 });
        assert_eq!(
            effects,
            vec![
                Effect::Emit(StreamEvent::Status(ConnectionState::Disconnected)),
                Effect::ScheduleReconnect {
                    token: 1,
                    delay: DELAY
                },
            ]
        );

        // A duplicate close for the same socket changes nothing.
        assert!(sup.handle(Input::Closed { generation: 1 }).is_empty());

        let effects = sup.handle(Input::ReconnectDue { token: 1 });
        assert_eq!(count_opens(&effects), 1);
        assert_eq!(sup.generation(), 2);
        assert!(!sup.reconnect_pending());
    }

    #[test]
    fn no_reconnect_without_live_mode() {
        let mut sup = Supervisor::new(false, DELAY);
        sup.handle(Input::Connect);
        sup.handle(Input::Opened { generation: 1 });

        let effects = sup.handle(Input::Closed { generation: 1 });
        assert_eq!(
            effects,
            vec![Effect::Emit(StreamEvent::Status(
                ConnectionState::Disconnected
            ))]
        );
        assert!(!sup.reconnect_pending());
    }

    #[test]
    fn disconnect_cancels_pending_reconnect() {
        let mut sup = connected();
        sup.handle(Input::Closed { generation: 1 });
        assert!(sup.reconnect_pending());

        let effects = sup.handle(Input::Disconnect);
        assert_eq!(effects, vec![Effect::CancelReconnect { token: 1 }]);

        // The timer fired anyway; nothing happens.
        assert!(sup.handle(Input::ReconnectDue { token: 1 }).is_empty());
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_is_safe_when_idle() {
        let mut sup = Supervisor::new(true, DELAY);
        assert!(sup.handle(Input::Disconnect).is_empty());
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_closes_and_ignores_late_events() {
        let mut sup = connected();
        let effects = sup.handle(Input::Disconnect);
        assert_eq!(
            effects,
            vec![
                Effect::Close { generation: 1 },
                Effect::Emit(StreamEvent::Status(ConnectionState::Disconnected)),
            ]
        );

        // The old socket's close arrives late and must not schedule anything.
        assert!(sup.handle(Input::Closed { generation: 1 }).is_empty());
        assert!(!sup.reconnect_pending());
    }

    #[test]
    fn superseded_connection_events_are_ignored() {
        let mut sup = connected();
        sup.handle(Input::Disconnect);
        sup.handle(Input::Connect);
        let current = sup.generation();
        assert_ne!(current, 1);

        assert!(sup.handle(Input::Opened { generation: 1 }).is_empty());
        assert!(
            sup.handle(Input::Failed {
                generation: 1,
                error: "reset".into()
            })
            .is_empty()
        );
        assert!(
            sup.handle(Input::Message {
                generation: 1,
                message: StreamMessage::Initial { data: Vec::new() },
            })
            .is_empty()
        );
        assert_eq!(sup.state(), ConnectionState::Connecting);

        let effects = sup.handle(Input::Opened {
            generation: current,
        });
        assert_eq!(
            effects,
            vec![Effect::Emit(StreamEvent::Status(ConnectionState::Connected))]
        );
    }

    #[test]
    fn error_emits_message_and_close_drives_reconnect() {
        let mut sup = Supervisor::new(true, DELAY);
        sup.handle(Input::Connect);

        let effects = sup.handle(Input::Failed {
            generation: 1,
            error: "connection refused".into(),
        });
        assert_eq!(
            effects,
            vec![Effect::Emit(StreamEvent::Error(
                CONNECTION_ERROR_MESSAGE.to_string()
            ))]
        );
        assert_eq!(sup.state(), ConnectionState::Connecting);

        let effects = sup.handle(Input::Closed { generation: 1 });
        assert!(effects.contains(&Effect::ScheduleReconnect {
            token: 1,
            delay: DELAY
        }));
    }

    #[test]
    fn connect_during_pending_reconnect_replaces_timer() {
        let mut sup = connected();
        sup.handle(Input::Closed { generation: 1 });

        let effects = sup.handle(Input::Connect);
        assert_eq!(effects[0], Effect::CancelReconnect { token: 1 });
        assert_eq!(count_opens(&effects), 1);

        // The cancelled timer's late firing does not open a second socket.
        assert!(sup.handle(Input::ReconnectDue { token: 1 }).is_empty());
    }

    #[test]
    fn disabling_live_mode_cancels_reconnect() {
        let mut sup = connected();
        sup.handle(Input::Closed { generation: 1 });

        let effects = sup.handle(Input::SetLiveMode(false));
        assert_eq!(effects, vec![Effect::CancelReconnect { token: 1 }]);
        assert!(!sup.live_mode());
    }

    #[test]
    fn messages_are_routed_only_when_connected() {
        let mut sup = Supervisor::new(true, DELAY);
        sup.handle(Input::Connect);
        let early = sup.handle(Input::Message {
            generation: 1,
            message: StreamMessage::Initial { data: Vec::new() },
        });
        assert!(early.is_empty());

        sup.handle(Input::Opened { generation: 1 });
        let effects = sup.handle(Input::Message {
            generation: 1,
            message: StreamMessage::PriceUpdate {
                timestamp: Some("t".into()),
                data: Vec::new(),
            },
        });
        assert_eq!(
            effects,
            vec![Effect::Emit(StreamEvent::Prices {
                timestamp: Some("t".into()),
                ticks: Vec::new()
            })]
        );

        assert!(
            sup.handle(Input::Message {
                generation: 1,
                message: StreamMessage::Unknown,
            })
            .is_empty()
        );
    }
}
