//! Errors surfaced by a room session to its caller.

use crate::net::connection::ConnectionError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("room code must not be empty")]
    EmptyJoinTarget,
    #[error("relay connection is not open")]
    NotConnected,
    #[error("session has not joined a room")]
    NotJoined,
    #[error("session was already started")]
    AlreadyStarted,
}

impl From<ConnectionError> for SessionError {
    fn from(error: ConnectionError) -> Self {
        match error {
            ConnectionError::NotConnected => Self::NotConnected,
        }
    }
}
