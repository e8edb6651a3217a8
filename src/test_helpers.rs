//! In-memory relay and observers for session tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use futures::channel::mpsc;
use tokio::sync::oneshot;

use crate::config::RelayEndpoint;
use crate::net::transport::{Transport, TransportError, TransportLink};
use crate::session::{SessionObserver, SessionState};
use crate::room_code::RoomCode;
use crate::state::chat::{ChatMessage, MessageLog};

pub fn endpoint() -> RelayEndpoint {
    RelayEndpoint::parse("ws://relay.test").expect("static endpoint")
}

enum Script {
    Accept { gate: Option<oneshot::Receiver<()>>, link: TransportLink },
    Refuse,
}

/// Transport whose `open` calls are answered from a queue of scripted links.
#[derive(Default)]
pub struct MemoryTransport {
    scripts: Mutex<VecDeque<Script>>,
    opened: Mutex<usize>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next `open` succeeds immediately.
    pub fn accept(&self) -> RelayHandle {
        let (handle, link) = RelayHandle::pair();
        self.push(Script::Accept { gate: None, link });
        handle
    }

    /// Next `open` succeeds once the returned sender fires (or is dropped).
    pub fn accept_gated(&self) -> (RelayHandle, oneshot::Sender<()>) {
        let (handle, link) = RelayHandle::pair();
        let (release, gate) = oneshot::channel();
        self.push(Script::Accept { gate: Some(gate), link });
        (handle, release)
    }

    /// Next `open` fails.
    pub fn refuse(&self) {
        self.push(Script::Refuse);
    }

    pub fn open_count(&self) -> usize {
        *self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner).push_back(script);
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, _endpoint: &RelayEndpoint) -> Result<TransportLink, TransportError> {
        *self.opened.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let script = self.scripts.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match script {
            Some(Script::Accept { gate, link }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(link)
            }
            Some(Script::Refuse) | None => Err(TransportError::Closed),
        }
    }
}

/// The relay side of an in-memory link.
pub struct RelayHandle {
    inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl RelayHandle {
    fn pair() -> (Self, TransportLink) {
        let (inbound, inbound_rx) = mpsc::unbounded();
        let (sent_tx, sent) = mpsc::unbounded::<String>();
        let link = TransportLink {
            sink: Box::pin(sent_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(inbound_rx),
        };
        (Self { inbound, sent }, link)
    }

    /// Deliver a raw frame to the client.
    pub fn push(&self, raw: &str) {
        let _ = self.inbound.unbounded_send(Ok(raw.to_owned()));
    }

    /// Deliver a JSON frame to the client.
    pub fn push_json(&self, value: &serde_json::Value) {
        self.push(&value.to_string());
    }

    /// End the inbound stream as if the relay dropped the socket.
    pub fn hang_up(&self) {
        self.inbound.close_channel();
    }

    /// Next frame the client wrote, waiting briefly.
    pub async fn next_sent(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), self.sent.next()).await.ok().flatten()
    }

    /// Next frame the client wrote, parsed as JSON.
    pub async fn next_sent_json(&mut self) -> Option<serde_json::Value> {
        let raw = self.next_sent().await?;
        serde_json::from_str(&raw).ok()
    }

    /// Frame already written by the client, without waiting.
    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.next().now_or_never().flatten()
    }
}

/// Everything a [`SessionObserver`] was told, shared with the test.
#[derive(Debug, Default)]
pub struct Recorded {
    pub room_codes: Vec<RoomCode>,
    pub logs: Vec<Vec<ChatMessage>>,
    pub memberships: Vec<u32>,
    pub states: Vec<SessionState>,
    pub reconnects: Vec<(u32, Duration)>,
}

#[derive(Clone, Default)]
pub struct RecordingObserver {
    pub recorded: Arc<Mutex<Recorded>>,
}

impl RecordingObserver {
    pub fn snapshot<T>(&self, read: impl FnOnce(&Recorded) -> T) -> T {
        read(&self.recorded.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn record(&self, write: impl FnOnce(&mut Recorded)) {
        write(&mut self.recorded.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl SessionObserver for RecordingObserver {
    fn room_code_ready(&mut self, code: &RoomCode) {
        self.record(|r| r.room_codes.push(code.clone()));
    }

    fn messages_changed(&mut self, log: &MessageLog) {
        let entries = log.iter().cloned().collect();
        self.record(|r| r.logs.push(entries));
    }

    fn membership_changed(&mut self, count: u32) {
        self.record(|r| r.memberships.push(count));
    }

    fn state_changed(&mut self, state: SessionState) {
        self.record(|r| r.states.push(state));
    }

    fn reconnecting(&mut self, attempt: u32, delay: Duration) {
        self.record(|r| r.reconnects.push((attempt, delay)));
    }
}
