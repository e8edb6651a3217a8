//! Frame model and JSON codec for the room relay protocol.
//!
//! Every frame on the wire is a JSON object `{ "type": ..., "payload": {...} }`.
//! Outbound frames are a closed set (`join`, `chat`). Inbound frames are
//! open-ended: the relay may send any `type`, so decoding classifies rather
//! than rejects.

use serde::Serialize;
use serde_json::{Map, Value};

/// Inbound frame type carrying the authoritative room occupancy.
pub const USER_COUNT: &str = "userCount";

/// Payload key for chat text, inbound and outbound.
pub const PAYLOAD_MESSAGE: &str = "message";

/// Payload key for the occupancy value of a `userCount` frame.
pub const PAYLOAD_COUNT: &str = "count";

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not JSON at all.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload is JSON but not a `{ type, payload }` envelope.
    #[error("frame envelope is missing `{0}`")]
    MissingEnvelopeField(&'static str),
    /// The envelope is valid but a field the frame type requires is unusable.
    #[error("`{kind}` frame has invalid `{field}`")]
    InvalidField { kind: String, field: &'static str },
}

impl CodecError {
    /// True when the raw payload could not be read as an envelope at all.
    ///
    /// Callers fall back to treating such payloads as plain text.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Json(_) | Self::MissingEnvelopeField(_))
    }
}

/// Frames the client sends to the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OutboundFrame {
    /// Attach this connection to a room.
    Join {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Broadcast one chat line to the room.
    Chat {
        #[serde(rename = "roomId")]
        room_id: String,
        message: String,
    },
}

impl OutboundFrame {
    #[must_use]
    pub fn join(room_id: impl Into<String>) -> Self {
        Self::Join { room_id: room_id.into() }
    }

    #[must_use]
    pub fn chat(room_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Chat { room_id: room_id.into(), message: message.into() }
    }

    /// Wire `type` of this frame.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Chat { .. } => "chat",
        }
    }
}

/// Frames the relay sends to the client, after classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// Current number of participants in the room.
    UserCount { count: u32 },
    /// A chat line from another participant.
    Chat { kind: String, message: String },
    /// A well-formed frame this client does not understand.
    Other { kind: String, payload: Map<String, Value> },
}

impl InboundFrame {
    /// Wire `type` of this frame.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::UserCount { .. } => USER_COUNT,
            Self::Chat { kind, .. } | Self::Other { kind, .. } => kind,
        }
    }
}

/// Encode an outbound frame as JSON text.
#[must_use]
pub fn encode_frame(frame: &OutboundFrame) -> String {
    // Serializing string-only variants cannot fail; the only errors serde_json
    // reports here come from non-string map keys or failing `Serialize` impls.
    serde_json::to_string(frame).unwrap_or_default()
}

/// Decode and classify one inbound JSON frame.
///
/// # Errors
///
/// Returns an error that [`CodecError::is_malformed`] reports for payloads
/// that are not a `{ type: string, payload: object }` envelope, and
/// [`CodecError::InvalidField`] for a `userCount` frame without an integer
/// `count`.
pub fn decode_frame(raw: &str) -> Result<InboundFrame, CodecError> {
    let value = serde_json::from_str::<Value>(raw)?;
    let Value::Object(mut envelope) = value else {
        return Err(CodecError::MissingEnvelopeField("type"));
    };

    let kind = match envelope.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(CodecError::MissingEnvelopeField("type")),
    };
    let payload = match envelope.remove("payload") {
        Some(Value::Object(payload)) => payload,
        _ => return Err(CodecError::MissingEnvelopeField("payload")),
    };

    if kind == USER_COUNT {
        let count = parse_count(payload.get(PAYLOAD_COUNT))
            .ok_or(CodecError::InvalidField { kind, field: PAYLOAD_COUNT })?;
        return Ok(InboundFrame::UserCount { count });
    }

    if let Some(message) = payload.get(PAYLOAD_MESSAGE).and_then(Value::as_str) {
        return Ok(InboundFrame::Chat { message: message.to_owned(), kind });
    }
    Ok(InboundFrame::Other { kind, payload })
}

/// Read an occupancy count, clamping negatives to zero and saturating at `u32::MAX`.
fn parse_count(value: Option<&Value>) -> Option<u32> {
    let value = value?;
    if let Some(n) = value.as_u64() {
        return Some(u32::try_from(n).unwrap_or(u32::MAX));
    }
    let n = value.as_i64()?;
    Some(u32::try_from(n.max(0)).unwrap_or(u32::MAX))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
