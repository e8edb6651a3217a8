//! RoomSession: room semantics on top of a relay connection.
//!
//! DESIGN
//! ======
//! The session is driven from one task. Connection events and user input are
//! handled one at a time, so the state below has a single writer and needs no
//! locking.
//!
//! STATE MACHINE
//! =============
//! `Unjoined → Joining → Joined → Ended`
//! - `start` moves to `Joining` and sends the join frame, or defers it until
//!   the connection opens (at most one pending join).
//! - The relay never acknowledges a join. With [`OptimisticJoin`] the session
//!   is `Joined` as soon as the join frame is written; other [`JoinHandshake`]s
//!   may wait for a confirming frame instead.
//! - Connection close (requested or not) ends the session. `Ended` is terminal.
//!
//! INBOUND CLASSIFICATION
//! ======================
//! - not a `{ type, payload }` envelope → the raw text is a remote chat line
//! - `userCount` → overwrite the membership count
//! - any type with `payload.message` → remote chat line
//! - anything else → ignored

use std::time::Duration;

use frames::{InboundFrame, OutboundFrame};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::net::connection::{CloseReason, ConnectionEvent, ConnectionState, SessionConnection};
use crate::net::transport::Transport;
use crate::room_code::RoomCode;
use crate::state::chat::{ChatMessage, MessageLog};

// =============================================================================
// PRESENTATION CONTRACT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joining,
    Joined,
    Ended,
}

/// Read-only view of a session for the presentation layer.
///
/// Every callback runs on the session's task, in the order the changes happen.
pub trait SessionObserver: Send {
    /// A room code is known and can be shown or shared.
    fn room_code_ready(&mut self, _code: &RoomCode) {}
    /// The log grew; the newest entry is `log.last()`.
    fn messages_changed(&mut self, _log: &MessageLog) {}
    fn membership_changed(&mut self, _count: u32) {}
    fn state_changed(&mut self, _state: SessionState) {}
    /// A reconnecting wrapper will retry after `delay`.
    fn reconnecting(&mut self, _attempt: u32, _delay: Duration) {}
}

impl SessionObserver for () {}

// =============================================================================
// JOIN HANDSHAKE
// =============================================================================

/// Decides when a sent join counts as accepted.
pub trait JoinHandshake: Send {
    /// True if writing the join frame is enough to be `Joined`.
    fn joined_on_send(&self) -> bool;

    /// True if `frame` confirms a pending join.
    fn confirms_join(&self, _frame: &InboundFrame) -> bool {
        false
    }
}

/// The relay protocol has no join acknowledgment; treat the join as accepted once sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimisticJoin;

impl JoinHandshake for OptimisticJoin {
    fn joined_on_send(&self) -> bool {
        true
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Initial membership: just this client.
pub const INITIAL_MEMBERSHIP: u32 = 1;

pub struct RoomSession<T: Transport> {
    connection: SessionConnection<T>,
    room_code: Option<RoomCode>,
    state: SessionState,
    membership: u32,
    log: MessageLog,
    join_pending: bool,
    announce_room_code: bool,
    close_reason: Option<CloseReason>,
    handshake: Box<dyn JoinHandshake>,
    observer: Box<dyn SessionObserver>,
}

impl<T: Transport> RoomSession<T> {
    #[must_use]
    pub fn new(connection: SessionConnection<T>, observer: Box<dyn SessionObserver>) -> Self {
        Self {
            connection,
            room_code: None,
            state: SessionState::Unjoined,
            membership: INITIAL_MEMBERSHIP,
            log: MessageLog::new(),
            join_pending: false,
            announce_room_code: true,
            close_reason: None,
            handshake: Box::new(OptimisticJoin),
            observer,
        }
    }

    /// Start from an existing log, e.g. one carried over from a previous connection.
    #[must_use]
    pub fn with_log(mut self, log: MessageLog) -> Self {
        self.log = log;
        self
    }

    /// Continue the conversation of an earlier session in the same room.
    ///
    /// Keeps its log and last known membership, and does not announce the
    /// room code again.
    #[must_use]
    pub fn resume(mut self, log: MessageLog, membership: u32) -> Self {
        self.log = log;
        self.membership = membership;
        self.announce_room_code = false;
        self
    }

    #[must_use]
    pub fn with_handshake(mut self, handshake: Box<dyn JoinHandshake>) -> Self {
        self.handshake = handshake;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn room_code(&self) -> Option<&RoomCode> {
        self.room_code.as_ref()
    }

    #[must_use]
    pub fn membership(&self) -> u32 {
        self.membership
    }

    #[must_use]
    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Why the session ended, once it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Hand back the log and observer, consuming the session.
    #[must_use]
    pub fn into_parts(self) -> (MessageLog, Box<dyn SessionObserver>) {
        (self.log, self.observer)
    }

    /// Join `room_code`.
    ///
    /// The join frame is sent now if the connection is open, otherwise when it
    /// opens. A connection that is already closed ends the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyStarted`] unless the session is `Unjoined`.
    pub fn start(&mut self, room_code: RoomCode) -> Result<(), SessionError> {
        if self.state != SessionState::Unjoined {
            return Err(SessionError::AlreadyStarted);
        }

        if self.announce_room_code {
            self.observer.room_code_ready(&room_code);
        }
        info!(room = %room_code, "joining room");
        self.room_code = Some(room_code);
        self.set_state(SessionState::Joining);

        match self.connection.state() {
            ConnectionState::Open => self.send_join(),
            ConnectionState::Idle | ConnectionState::Connecting => {
                debug!("join deferred until relay connection opens");
                self.join_pending = true;
            }
            ConnectionState::Closed => {
                self.end(CloseReason::Lost("connection closed before join".to_owned()));
            }
        }
        Ok(())
    }

    /// Send a chat line to the room.
    ///
    /// Blank text is ignored. Otherwise the line is appended to the log as a
    /// local echo whether or not it was transmitted. Nothing is transmitted
    /// until the join frame has gone out and the session is `Joined`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotJoined`] before `start` (nothing is echoed)
    /// or while a sent join awaits confirmation, and
    /// [`SessionError::NotConnected`] when the connection is not open.
    pub fn submit(&mut self, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let Some(room_code) = &self.room_code else {
            return Err(SessionError::NotJoined);
        };

        let raw = frames::encode_frame(&OutboundFrame::chat(room_code.as_str(), text));

        // The link can report open before the Opened event reaches us.
        if self.join_pending && self.connection.state() == ConnectionState::Open {
            self.join_pending = false;
            self.send_join();
        }

        let sent = match self.state {
            SessionState::Joined => self.connection.send(&raw).map_err(SessionError::from),
            _ if self.connection.state() != ConnectionState::Open => Err(SessionError::NotConnected),
            _ => Err(SessionError::NotJoined),
        };
        self.append(ChatMessage::local(text));

        sent.inspect_err(|error| {
            warn!(%error, state = ?self.state, "chat line not transmitted");
        })
    }

    /// Apply one connection event.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                if self.join_pending {
                    self.join_pending = false;
                    self.send_join();
                }
            }
            ConnectionEvent::Frame(raw) => self.handle_frame(raw),
            ConnectionEvent::Closed(reason) => self.end(reason),
        }
    }

    /// Tear the session down: close the connection and end. Idempotent.
    pub fn close(&mut self) {
        self.connection.close();
        self.end(CloseReason::Requested);
    }

    /// Drive the session until it ends.
    ///
    /// Multiplexes connection events with lines from `input` (each submitted
    /// as a chat line). A closed `input` tears the session down.
    pub async fn run(&mut self, input: &mut mpsc::Receiver<String>) -> CloseReason {
        loop {
            if let Some(reason) = &self.close_reason {
                return reason.clone();
            }

            tokio::select! {
                event = self.connection.next_event() => match event {
                    Some(event) => self.handle_event(event),
                    None => self.end(CloseReason::Lost("connection event stream ended".to_owned())),
                },
                line = input.recv() => match line {
                    Some(line) => {
                        if let Err(error) = self.submit(&line) {
                            debug!(%error, "submit failed");
                        }
                    }
                    None => self.close(),
                },
            }
        }
    }

    fn send_join(&mut self) {
        let Some(room_code) = &self.room_code else {
            return;
        };
        let raw = frames::encode_frame(&OutboundFrame::join(room_code.as_str()));
        if let Err(error) = self.connection.send(&raw) {
            warn!(%error, room = %room_code, "join frame not transmitted");
            return;
        }
        debug!(room = %room_code, "join frame sent");
        if self.handshake.joined_on_send() {
            self.set_state(SessionState::Joined);
        }
    }

    fn handle_frame(&mut self, raw: String) {
        if !matches!(self.state, SessionState::Joining | SessionState::Joined) {
            debug!(state = ?self.state, "inbound frame ignored outside a room");
            return;
        }

        let frame = match frames::decode_frame(&raw) {
            Ok(frame) => frame,
            Err(error) if error.is_malformed() => {
                debug!(%error, "unstructured frame treated as chat text");
                self.append(ChatMessage::remote(raw));
                return;
            }
            Err(error) => {
                warn!(%error, "inbound frame ignored");
                return;
            }
        };

        if self.state == SessionState::Joining && self.handshake.confirms_join(&frame) {
            self.set_state(SessionState::Joined);
            return;
        }

        match frame {
            InboundFrame::UserCount { count } => self.set_membership(count),
            InboundFrame::Chat { message, .. } => self.append(ChatMessage::remote(message)),
            InboundFrame::Other { kind, .. } => debug!(%kind, "unknown frame type ignored"),
        }
    }

    fn append(&mut self, message: ChatMessage) {
        self.log.push(message);
        self.observer.messages_changed(&self.log);
    }

    fn set_membership(&mut self, count: u32) {
        if self.membership == count {
            return;
        }
        debug!(from = self.membership, to = count, "membership changed");
        self.membership = count;
        self.observer.membership_changed(count);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.observer.state_changed(state);
    }

    fn end(&mut self, reason: CloseReason) {
        if self.state == SessionState::Ended {
            return;
        }
        match &reason {
            CloseReason::Requested => info!("session ended"),
            other => warn!(reason = %other, "session ended"),
        }
        self.join_pending = false;
        self.connection.close();
        self.close_reason = Some(reason);
        self.set_state(SessionState::Ended);
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
