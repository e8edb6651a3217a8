//! Reconnecting wrapper around [`RoomSession`].
//!
//! DESIGN
//! ======
//! Each attempt gets a fresh connection and session. The join is replayed for
//! the same room code. The message log, last known membership and observer
//! move from one attempt to the next, so the presentation layer sees one
//! continuous conversation and the room code is announced only once.
//!
//! BACKOFF
//! =======
//! The delay starts at `initial_backoff` and doubles after every retry, capped
//! at `max_backoff`. A connection that opened and was later lost resets the
//! delay and the failure count. `max_attempts` consecutive connect failures
//! end the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::RelayEndpoint;
use crate::net::connection::{CloseReason, SessionConnection};
use crate::net::transport::Transport;
use crate::room_code::RoomCode;
use crate::session::{INITIAL_MEMBERSHIP, RoomSession, SessionObserver};
use crate::state::chat::{ChatMessage, MessageLog};

pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive connect failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to use after `current`.
    #[must_use]
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.checked_mul(2).unwrap_or(self.max_backoff).min(self.max_backoff)
    }
}

pub struct ReconnectingSession<T: Transport> {
    transport: Arc<T>,
    endpoint: RelayEndpoint,
    policy: ReconnectPolicy,
    history_limit: Option<usize>,
}

impl<T: Transport> ReconnectingSession<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, endpoint: RelayEndpoint, policy: ReconnectPolicy) -> Self {
        Self { transport, endpoint, policy, history_limit: None }
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Stay in `room_code` until `input` closes or the retries run out.
    ///
    /// Lines typed while waiting to reconnect are echoed locally but not sent.
    /// Returns the reason the last attempt ended.
    pub async fn run(
        &self,
        room_code: RoomCode,
        observer: Box<dyn SessionObserver>,
        input: &mut mpsc::Receiver<String>,
    ) -> CloseReason {
        let mut log = MessageLog::with_limit(self.history_limit);
        let mut observer = observer;
        let mut backoff = self.policy.initial_backoff;
        let mut membership = INITIAL_MEMBERSHIP;
        let mut failures: u32 = 0;
        let mut retry: u32 = 0;

        loop {
            let mut connection = SessionConnection::new(Arc::clone(&self.transport));
            connection.connect(self.endpoint.clone());
            let session = RoomSession::new(connection, observer);
            let mut session = if retry == 0 { session.with_log(log) } else { session.resume(log, membership) };
            if let Err(error) = session.start(room_code.clone()) {
                warn!(%error, "fresh session refused to start");
            }

            let reason = session.run(input).await;
            membership = session.membership();
            (log, observer) = session.into_parts();

            match &reason {
                CloseReason::Requested => return reason,
                CloseReason::Lost(_) => {
                    failures = 0;
                    backoff = self.policy.initial_backoff;
                }
                CloseReason::ConnectFailed(_) => failures += 1,
            }
            if failures >= self.policy.max_attempts {
                warn!(failures, room = %room_code, "giving up on relay");
                return reason;
            }

            retry += 1;
            info!(retry, delay_ms = backoff.as_millis(), endpoint = %self.endpoint, "reconnecting");
            observer.reconnecting(retry, backoff);

            let sleep = tokio::time::sleep(backoff);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    () = &mut sleep => break,
                    line = input.recv() => match line {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => {
                            log.push(ChatMessage::local(line));
                            observer.messages_changed(&log);
                        }
                        None => return CloseReason::Requested,
                    },
                }
            }
            backoff = self.policy.next_backoff(backoff);
        }
    }
}

#[cfg(test)]
#[path = "reconnect_test.rs"]
mod tests;
