use super::*;

#[test]
fn join_frame_matches_wire_shape() {
    let raw = encode_frame(&OutboundFrame::join("ABC123"));
    let value: Value = serde_json::from_str(&raw).expect("encoded frame is JSON");
    assert_eq!(value, serde_json::json!({ "type": "join", "payload": { "roomId": "ABC123" } }));
}

#[test]
fn chat_frame_matches_wire_shape() {
    let raw = encode_frame(&OutboundFrame::chat("r1", "hello there"));
    let value: Value = serde_json::from_str(&raw).expect("encoded frame is JSON");
    assert_eq!(
        value,
        serde_json::json!({ "type": "chat", "payload": { "roomId": "r1", "message": "hello there" } })
    );
}

#[test]
fn outbound_kind_names_wire_type() {
    assert_eq!(OutboundFrame::join("r").kind(), "join");
    assert_eq!(OutboundFrame::chat("r", "m").kind(), "chat");
}

#[test]
fn decode_user_count() {
    let frame = decode_frame(r#"{"type":"userCount","payload":{"count":3}}"#).expect("decode");
    assert_eq!(frame, InboundFrame::UserCount { count: 3 });
    assert_eq!(frame.kind(), USER_COUNT);
}

#[test]
fn decode_user_count_clamps_negative_to_zero() {
    let frame = decode_frame(r#"{"type":"userCount","payload":{"count":-4}}"#).expect("decode");
    assert_eq!(frame, InboundFrame::UserCount { count: 0 });
}

#[test]
fn decode_user_count_saturates_large_values() {
    let frame = decode_frame(r#"{"type":"userCount","payload":{"count":99999999999}}"#).expect("decode");
    assert_eq!(frame, InboundFrame::UserCount { count: u32::MAX });
}

#[test]
fn decode_user_count_without_integer_count_is_invalid_field() {
    for raw in [
        r#"{"type":"userCount","payload":{}}"#,
        r#"{"type":"userCount","payload":{"count":"two"}}"#,
        r#"{"type":"userCount","payload":{"count":1.5}}"#,
    ] {
        let err = decode_frame(raw).expect_err("count should be rejected");
        assert!(matches!(err, CodecError::InvalidField { field: "count", .. }), "{raw}");
        assert!(!err.is_malformed());
    }
}

#[test]
fn decode_chat_bearing_frame_of_any_type() {
    let chat = decode_frame(r#"{"type":"chat","payload":{"message":"hi","roomId":"r1"}}"#).expect("decode");
    assert_eq!(chat, InboundFrame::Chat { kind: "chat".to_owned(), message: "hi".to_owned() });

    let custom = decode_frame(r#"{"type":"broadcast","payload":{"message":"yo"}}"#).expect("decode");
    assert_eq!(custom.kind(), "broadcast");
    assert!(matches!(custom, InboundFrame::Chat { ref message, .. } if message == "yo"));
}

#[test]
fn decode_unknown_type_without_message_is_other() {
    let frame = decode_frame(r#"{"type":"typing","payload":{"who":"ann"}}"#).expect("decode");
    let InboundFrame::Other { kind, payload } = frame else {
        panic!("expected other frame");
    };
    assert_eq!(kind, "typing");
    assert_eq!(payload.get("who"), Some(&Value::String("ann".to_owned())));
}

#[test]
fn decode_rejects_plain_text_as_malformed() {
    let err = decode_frame("hello").expect_err("plain text is not a frame");
    assert!(matches!(err, CodecError::Json(_)));
    assert!(err.is_malformed());
}

#[test]
fn decode_rejects_non_envelope_json_as_malformed() {
    for raw in ["42", r#""quoted""#, "[1,2]", r#"{"payload":{"message":"x"}}"#, r#"{"type":7,"payload":{}}"#] {
        let err = decode_frame(raw).expect_err("not an envelope");
        assert!(matches!(err, CodecError::MissingEnvelopeField("type")), "{raw}");
        assert!(err.is_malformed());
    }
}

#[test]
fn decode_rejects_missing_or_non_object_payload_as_malformed() {
    for raw in [r#"{"type":"chat"}"#, r#"{"type":"chat","payload":"hi"}"#] {
        let err = decode_frame(raw).expect_err("payload must be an object");
        assert!(matches!(err, CodecError::MissingEnvelopeField("payload")), "{raw}");
        assert!(err.is_malformed());
    }
}
