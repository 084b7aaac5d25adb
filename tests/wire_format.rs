// tests/wire_format.rs
// Line framing limits and the JSON shape of call metadata.

use peerlink::error::TransportError;
use peerlink::network::message::{
    encode_frame, read_frame, CallMetadata, PingRequest, RpcCall, RpcRequest, SessionId,
};
use std::time::Duration;
use tokio::io::BufReader;

fn ping_request() -> RpcRequest {
    let mut metadata = CallMetadata::new(Duration::from_millis(3000), 0);
    metadata.local_public_key = Some("abc123".into());
    RpcRequest {
        id: 7,
        metadata,
        call: RpcCall::Ping(PingRequest::default()),
    }
}

#[test]
fn metadata_uses_wire_key_names() {
    let json = serde_json::to_value(ping_request()).unwrap();
    let metadata = &json["metadata"];
    assert_eq!(metadata["retry-count"], 0);
    assert_eq!(metadata["timeout"], 3000);
    assert_eq!(metadata["local-public-key"], "abc123");
    assert_eq!(json["call"]["method"], "Ping");
}

#[test]
fn session_id_travels_as_hex() {
    let id = SessionId::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"deadbeef\"");
    let back: SessionId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
    assert!(serde_json::from_str::<SessionId>("\"not-hex\"").is_err());
}

#[tokio::test]
async fn frame_within_limit_is_read_back() {
    let frame = encode_frame(&ping_request(), 1024).unwrap();
    assert_eq!(frame.last(), Some(&b'\n'));

    let mut reader = BufReader::new(frame.as_slice());
    let request: RpcRequest = read_frame(&mut reader, 1024).await.unwrap();
    assert_eq!(request.id, 7);
    assert_eq!(request.call.method(), "Ping");
}

#[test]
fn oversized_outbound_frame_is_refused() {
    let err = encode_frame(&ping_request(), 16).unwrap_err();
    assert!(matches!(err, TransportError::MessageTooLarge { limit: 16, .. }));
}

#[tokio::test]
async fn oversized_inbound_frame_is_refused_without_buffering_it() {
    let big = format!("{{\"pad\":\"{}\"}}\n", "x".repeat(4096));
    let mut reader = BufReader::new(big.as_bytes());
    let err = read_frame::<_, serde_json::Value>(&mut reader, 64)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::MessageTooLarge {
            size: 65,
            limit: 64
        }
    );
}

#[tokio::test]
async fn closed_truncated_and_malformed_frames() {
    let mut empty = BufReader::new(&b""[..]);
    let err = read_frame::<_, serde_json::Value>(&mut empty, 64).await.unwrap_err();
    assert!(matches!(err, TransportError::Reset(_)));

    let mut truncated = BufReader::new(&b"{\"id\":1"[..]);
    let err = read_frame::<_, serde_json::Value>(&mut truncated, 64).await.unwrap_err();
    assert!(matches!(err, TransportError::Reset(_)));

    let mut garbage = BufReader::new(&b"not json\n"[..]);
    let err = read_frame::<_, serde_json::Value>(&mut garbage, 64).await.unwrap_err();
    assert!(matches!(err, TransportError::Malformed(_)));
}
