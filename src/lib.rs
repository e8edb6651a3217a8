//! Realtime room chat client.
//!
//! ARCHITECTURE
//! ============
//! A [`SessionConnection`] owns one relay socket and turns it into an ordered
//! stream of [`ConnectionEvent`]s. A [`RoomSession`] consumes that stream on a
//! single task, performs the join handshake, classifies inbound frames and
//! keeps the room state (code, occupancy, message log) that a presentation
//! layer observes through [`SessionObserver`].
//!
//! [`ReconnectingSession`] is an optional layer on top that rebuilds the pair
//! after connection loss and replays the join.

pub mod config;
pub mod error;
pub mod net;
pub mod reconnect;
pub mod room_code;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{ClientConfig, RelayEndpoint};
pub use error::SessionError;
pub use net::connection::{CloseReason, ConnectionError, ConnectionEvent, ConnectionState, SessionConnection};
pub use net::transport::{Transport, TransportError, WsTransport};
pub use reconnect::{ReconnectPolicy, ReconnectingSession};
pub use room_code::RoomCode;
pub use session::{JoinHandshake, OptimisticJoin, RoomSession, SessionObserver, SessionState};
pub use state::chat::{ChatMessage, MessageLog, Origin};
