//! RelayConnection - the push channel runtime.
//!
//! One task owns the channel and drives the pure [`ConnectionState`] machine
//! from `clipportal-core`: every input (a frame, a timer, a stop request)
//! becomes an [`Event`], and the resulting [`Action`]s are executed here.
//! Executing an action may produce a follow-up event (the channel opened,
//! the greeting was written), which is fed back before the next input is
//! awaited.
//!
//! ```text
//! stop / frame / keepalive tick / reconnect timer
//!                  ↓
//!          ConnectionState::on_event
//!                  ↓
//!   actions → channel I/O, timers, envelopes out, status
//! ```
//!
//! The keepalive interval and the reconnect timer live inside the task, so
//! they die with it: a superseded or stopped connection leaves no timers
//! behind.

use clipportal_core::{
    Action, ConnectionEvent, ConnectionState, DisconnectReason, Event, ReceivedFrame,
};
use clipportal_types::{Greeting, PushEvent, SendEnvelope, UserId};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

use crate::transport::{PushChannel, PushConnector, TransportError};

/// Observable state of the push channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Most recent human-readable problem. Cleared on authentication.
    pub last_error: Option<String>,
}

/// Owner's handle to a running connection.
///
/// Dropping the handle stops the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    user_id: UserId,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionHandle {
    /// The user id this connection subscribes as.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// A receiver that is notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Stop the connection and wait until its channel and timers are gone.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("connection task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// The connection task's state.
pub struct RelayConnection {
    connector: Arc<dyn PushConnector>,
    user_id: UserId,
    connect_timeout: Duration,
    state: ConnectionState,
    channel: Option<Box<dyn PushChannel>>,
    keepalive: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    last_error: Option<String>,
    status: watch::Sender<ConnectionStatus>,
    envelopes: mpsc::UnboundedSender<SendEnvelope>,
}

impl RelayConnection {
    /// Start a connection for `user_id`.
    ///
    /// Every `new` event's envelope is forwarded to `envelopes`; the
    /// receiver side runs the receive pipeline so that downloads never block
    /// the channel.
    pub fn spawn(
        connector: Arc<dyn PushConnector>,
        user_id: UserId,
        connect_timeout: Duration,
        envelopes: mpsc::UnboundedSender<SendEnvelope>,
    ) -> ConnectionHandle {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (stop_tx, stop_rx) = oneshot::channel();

        let connection = Self {
            connector,
            user_id: user_id.clone(),
            connect_timeout,
            state: ConnectionState::new(),
            channel: None,
            keepalive: None,
            reconnect: None,
            last_error: None,
            status: status_tx,
            envelopes,
        };
        let task = tokio::spawn(connection.run(stop_rx));

        ConnectionHandle {
            user_id,
            stop: Some(stop_tx),
            task: Some(task),
            status: status_rx,
        }
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        tracing::debug!("connection task for {} started", self.user_id);
        self.dispatch(Event::StartRequested).await;

        loop {
            let event = tokio::select! {
                // A dropped handle counts as a stop request too.
                _ = &mut stop => Event::StopRequested,
                frame = next_frame(&mut self.channel) => match frame {
                    Some(Ok(text)) => Event::FrameReceived { frame: interpret(&text) },
                    Some(Err(e)) => Event::ChannelLost {
                        reason: DisconnectReason::Transport(e.to_string()),
                    },
                    None => Event::ChannelLost {
                        reason: DisconnectReason::Closed,
                    },
                },
                _ = tick(&mut self.keepalive) => Event::KeepaliveTick,
                _ = fire(&mut self.reconnect) => {
                    self.reconnect = None;
                    Event::ReconnectTimer
                }
            };

            let stopping = event == Event::StopRequested;
            self.dispatch(event).await;
            if stopping {
                break;
            }
        }
        tracing::debug!("connection task for {} finished", self.user_id);
    }

    /// Feed an event through the state machine, executing actions and any
    /// follow-up events they produce.
    async fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let (next, actions) = self.state.on_event(event);
            if next != self.state {
                tracing::debug!("push channel {} -> {}", self.state, next);
            }
            self.state = next;

            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    queue.push_back(follow_up);
                }
            }
            self.publish();
        }
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::OpenChannel => {
                let opened = tokio::time::timeout(self.connect_timeout, self.connector.open()).await;
                match opened {
                    Ok(Ok(channel)) => {
                        self.channel = Some(channel);
                        Some(Event::ChannelOpened)
                    }
                    Ok(Err(e)) => Some(connect_failed(e)),
                    Err(_) => Some(connect_failed(TransportError::Timeout)),
                }
            }
            Action::SendGreeting => {
                let result = match Greeting::new(self.user_id.clone()).to_json() {
                    Ok(text) => self.send_text(text).await,
                    Err(e) => Err(TransportError::SendFailed(e.to_string())),
                };
                match result {
                    Ok(()) => Some(Event::GreetingSent),
                    Err(e) => Some(Event::ChannelLost {
                        reason: DisconnectReason::Transport(e.to_string()),
                    }),
                }
            }
            Action::StartKeepalive { interval } => {
                let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.keepalive = Some(timer);
                None
            }
            Action::StopKeepalive => {
                self.keepalive = None;
                None
            }
            Action::SendPing => {
                let result = match self.channel.as_mut() {
                    Some(channel) => channel.ping().await,
                    None => Err(TransportError::ConnectionClosed),
                };
                result.err().map(|e| Event::ChannelLost {
                    reason: DisconnectReason::Transport(e.to_string()),
                })
            }
            Action::ProcessEnvelope { envelope } => {
                tracing::debug!("new content announced by {}", envelope.sender_id);
                if self.envelopes.send(envelope).is_err() {
                    tracing::debug!("no receive pipeline attached; envelope dropped");
                }
                None
            }
            Action::CloseChannel => {
                if let Some(mut channel) = self.channel.take() {
                    channel.close().await;
                }
                None
            }
            Action::ScheduleReconnect { delay } => {
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
                None
            }
            Action::CancelReconnect => {
                self.reconnect = None;
                None
            }
            Action::EmitEvent(event) => {
                self.on_connection_event(event);
                None
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        match self.channel.as_mut() {
            Some(channel) => channel.send_text(text).await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Authenticated => {
                tracing::info!("subscribed to relay as {}", self.user_id);
                self.last_error = None;
            }
            ConnectionEvent::Disconnected { reason } => {
                match &reason {
                    DisconnectReason::Rejected => tracing::warn!("relay rejected {}", self.user_id),
                    other => tracing::info!("push channel lost: {}", other),
                }
                self.last_error = Some(reason.to_string());
            }
            ConnectionEvent::ProtocolError { detail } => {
                tracing::warn!("unexpected frame from relay: {}", detail);
                self.last_error = Some(format!(
                    "Unknown message from server. Please update the app. ({})",
                    detail
                ));
            }
            ConnectionEvent::Stopped => tracing::info!("push channel stopped"),
        }
    }

    fn publish(&self) {
        let status = ConnectionStatus {
            state: self.state,
            last_error: self.last_error.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

fn connect_failed(error: TransportError) -> Event {
    Event::ConnectFailed {
        reason: DisconnectReason::Transport(error.to_string()),
    }
}

fn interpret(text: &str) -> ReceivedFrame {
    match PushEvent::parse(text) {
        Ok(PushEvent::New(envelope)) => ReceivedFrame::New(envelope),
        Ok(PushEvent::Forbidden) => ReceivedFrame::Forbidden,
        Err(e) => ReceivedFrame::Malformed {
            detail: e.to_string(),
        },
    }
}

async fn next_frame(
    channel: &mut Option<Box<dyn PushChannel>>,
) -> Option<Result<String, TransportError>> {
    match channel {
        Some(channel) => channel.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn fire(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
