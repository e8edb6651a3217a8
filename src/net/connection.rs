//! SessionConnection: one relay connection and its lifecycle.
//!
//! LIFECYCLE
//! =========
//! `Idle → Connecting → Open → Closed`, or `Connecting → Closed` when the
//! relay cannot be reached. `connect` spawns a link task that owns the socket
//! and talks to the connection over two channels:
//! - commands (frames to write, close) flow into the task
//! - events (opened, frame, closed) flow out, read in order by `next_event`
//!
//! Connect failures are never returned to the caller. They surface as a
//! `Closed(ConnectFailed)` event plus a warning.
//!
//! A connection is single use. Dropping it closes the link.

use std::fmt;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::transport::{Transport, TransportLink};
use crate::config::RelayEndpoint;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Why a connection reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner called `close()`.
    Requested,
    /// The relay could not be reached.
    ConnectFailed(String),
    /// An open connection ended without the owner asking.
    Lost(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("closed by client"),
            Self::ConnectFailed(error) => write!(f, "connect failed: {error}"),
            Self::Lost(error) => write!(f, "connection lost: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Frame(String),
    /// Always the last event.
    Closed(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("relay connection is not open")]
    NotConnected,
}

enum Command {
    Send(String),
    Close,
}

// =============================================================================
// CONNECTION
// =============================================================================

pub struct SessionConnection<T: Transport> {
    transport: Arc<T>,
    state: Arc<watch::Sender<ConnectionState>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    events: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
    close_requested: bool,
    finished: bool,
}

impl<T: Transport> SessionConnection<T> {
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            transport,
            state: Arc::new(state),
            commands: None,
            events: None,
            close_requested: false,
            finished: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start connecting to `endpoint` in the background.
    ///
    /// Only the first call on an instance does anything. Must be called from
    /// within a tokio runtime.
    pub fn connect(&mut self, endpoint: RelayEndpoint) {
        let current = self.state();
        if current != ConnectionState::Idle {
            warn!(%endpoint, state = ?current, "connect ignored: connection already used");
            return;
        }

        self.state.send_replace(ConnectionState::Connecting);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        self.commands = Some(commands);
        self.events = Some(events);

        info!(%endpoint, "connecting to relay");
        tokio::spawn(run_link(
            Arc::clone(&self.transport),
            endpoint,
            Arc::clone(&self.state),
            command_rx,
            event_tx,
        ));
    }

    /// Queue one raw frame for the relay.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] unless the connection is
    /// `Open`; nothing is transmitted in that case.
    pub fn send(&self, raw: &str) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Open {
            return Err(ConnectionError::NotConnected);
        }
        let commands = self.commands.as_ref().ok_or(ConnectionError::NotConnected)?;
        commands
            .send(Command::Send(raw.to_owned()))
            .map_err(|_| ConnectionError::NotConnected)
    }

    /// Next lifecycle event, in arrival order.
    ///
    /// Returns `None` once `Closed` has been delivered, or immediately if the
    /// connection was never started. Cancel safe.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        if self.finished {
            return None;
        }
        if self.close_requested {
            self.finished = true;
            self.events = None;
            return Some(ConnectionEvent::Closed(CloseReason::Requested));
        }

        let event = self.events.as_mut()?.recv().await;
        match event {
            Some(ConnectionEvent::Closed(_)) | None => self.finished = true,
            Some(_) => {}
        }
        event
    }

    /// Feed every inbound frame to `handler` until the connection closes.
    ///
    /// Frames are delivered one at a time in arrival order. Returns the close
    /// reason, or `None` if the connection was never started.
    pub async fn on_message<F>(&mut self, mut handler: F) -> Option<CloseReason>
    where
        F: FnMut(&str),
    {
        while let Some(event) = self.next_event().await {
            match event {
                ConnectionEvent::Opened => {}
                ConnectionEvent::Frame(raw) => handler(&raw),
                ConnectionEvent::Closed(reason) => return Some(reason),
            }
        }
        None
    }

    /// Close the connection. Idempotent.
    ///
    /// Pending inbound frames are discarded; the next event is
    /// `Closed(Requested)` unless the connection had already closed on its own.
    pub fn close(&mut self) {
        let previous = self.state.send_replace(ConnectionState::Closed);
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        if previous != ConnectionState::Closed {
            self.close_requested = true;
            info!(state = ?previous, "relay connection closed by client");
        }
    }
}

impl<T: Transport> Drop for SessionConnection<T> {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        self.state.send_replace(ConnectionState::Closed);
    }
}

// =============================================================================
// LINK TASK
// =============================================================================

async fn run_link<T: Transport>(
    transport: Arc<T>,
    endpoint: RelayEndpoint,
    state: Arc<watch::Sender<ConnectionState>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let opened = tokio::select! {
        opened = transport.open(&endpoint) => opened,
        () = wait_for_close(&mut commands) => {
            debug!(%endpoint, "connect abandoned: closed while connecting");
            return;
        }
    };

    let TransportLink { mut sink, mut stream } = match opened {
        Ok(link) => link,
        Err(error) => {
            warn!(%endpoint, %error, "relay connect failed");
            if mark_closed(&state) {
                let _ = events.send(ConnectionEvent::Closed(CloseReason::ConnectFailed(error.to_string())));
            }
            return;
        }
    };

    let is_open = state.send_if_modified(|s| {
        if *s == ConnectionState::Connecting {
            *s = ConnectionState::Open;
            true
        } else {
            false
        }
    });
    if !is_open {
        let _ = sink.close().await;
        return;
    }
    info!(%endpoint, "relay connection open");
    let _ = events.send(ConnectionEvent::Opened);

    let reason = loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(raw)) => {
                    let _ = events.send(ConnectionEvent::Frame(raw));
                }
                Some(Err(error)) => break error.to_string(),
                None => break "relay closed the connection".to_owned(),
            },
            command = commands.recv() => match command {
                Some(Command::Send(raw)) => {
                    if let Err(error) = sink.send(raw).await {
                        break error.to_string();
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.close().await;
                    debug!(%endpoint, "relay link shut down");
                    return;
                }
            },
        }
    };

    warn!(%endpoint, %reason, "relay connection lost");
    if mark_closed(&state) {
        let _ = events.send(ConnectionEvent::Closed(CloseReason::Lost(reason)));
    }
}

/// Resolves once the owner closes or drops the connection.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, Command::Close) {
            return;
        }
    }
}

/// Move to `Closed`, returning false if something else already did.
fn mark_closed(state: &watch::Sender<ConnectionState>) -> bool {
    state.send_if_modified(|s| {
        if *s == ConnectionState::Closed {
            false
        } else {
            *s = ConnectionState::Closed;
            true
        }
    })
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
