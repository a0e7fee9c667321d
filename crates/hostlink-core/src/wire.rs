//! JSON-RPC wire codec
//!
//! Envelope shapes shared by both transports:
//!
//! - request: `{"jsonrpc": "2.0", "id", "method", "params"}`
//! - success reply: `{"id", "result"}`
//! - error reply: `{"id", "error": {"code", "message"}}`
//! - push notification: `{"method", "params"}` (no id)
//!
//! The duplex transport receives an undelimited concatenation of JSON values;
//! [`StreamDecoder`] splits it incrementally.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{TransportError, TransportResult};
use crate::types::RequestId;

pub const JSONRPC_VERSION: &str = "2.0";

// ----------------------------------------------------------------------------
// Outgoing Envelope
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    id: RequestId,
    method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    params: &'a Value,
}

/// Encode a call into its wire bytes
pub fn encode_request(id: RequestId, method: &str, params: &Value) -> TransportResult<Vec<u8>> {
    let envelope = RequestEnvelope {
        jsonrpc: JSONRPC_VERSION,
        id,
        method,
        params,
    };
    serde_json::to_vec(&envelope).map_err(TransportError::from)
}

// ----------------------------------------------------------------------------
// Inbound Messages
// ----------------------------------------------------------------------------

/// Error object carried by an error reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// A decoded inbound JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Response to an outstanding call
    Reply {
        id: RequestId,
        outcome: TransportResult<Value>,
    },
    /// Unsolicited push message
    Notification { method: String, params: Value },
}

/// Classify one decoded JSON value as a reply or a notification
///
/// A value with a non-null `id` is a reply; its outcome is a
/// `ProtocolViolation` when neither `result` nor `error` is present.
pub fn classify(value: Value) -> TransportResult<Inbound> {
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(TransportError::ProtocolViolation(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            )))
        }
    };

    match object.remove("id") {
        Some(Value::Null) | None => {}
        Some(id_value) => {
            let id = id_value.as_u64().map(RequestId).ok_or_else(|| {
                TransportError::ProtocolViolation(format!("unsupported reply id {}", id_value))
            })?;
            return Ok(Inbound::Reply {
                id,
                outcome: reply_outcome(object),
            });
        }
    }

    match object.remove("method") {
        Some(Value::String(method)) => Ok(Inbound::Notification {
            method,
            params: object.remove("params").unwrap_or(Value::Null),
        }),
        _ => Err(TransportError::ProtocolViolation(
            "message has neither a reply id nor a method".into(),
        )),
    }
}

fn reply_outcome(mut object: Map<String, Value>) -> TransportResult<Value> {
    if let Some(result) = object.remove("result") {
        return Ok(result);
    }
    match object.remove("error") {
        Some(error) => {
            let error: RpcErrorObject = serde_json::from_value(error).map_err(|e| {
                TransportError::ProtocolViolation(format!("malformed error object: {}", e))
            })?;
            Err(TransportError::Remote {
                code: error.code,
                message: error.message,
            })
        }
        None => Err(TransportError::ProtocolViolation(
            "reply carries neither result nor error".into(),
        )),
    }
}

/// Decode a complete reply body for a known request id
pub fn decode_reply(body: &[u8], expected: RequestId) -> TransportResult<Value> {
    let value: Value = serde_json::from_slice(body)?;
    match classify(value)? {
        Inbound::Reply { id, outcome } if id == expected => outcome,
        Inbound::Reply { id, .. } => Err(TransportError::ProtocolViolation(format!(
            "reply id {} does not match request id {}",
            id, expected
        ))),
        Inbound::Notification { method, .. } => Err(TransportError::ProtocolViolation(format!(
            "expected a reply, got notification {}",
            method
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ----------------------------------------------------------------------------
// Stream Decoder
// ----------------------------------------------------------------------------

/// Incremental decoder for a stream of concatenated JSON values
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held back waiting for the rest of a value
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete value, or `None` if more bytes are needed
    pub fn next_value(&mut self) -> TransportResult<Option<Value>> {
        let mut values = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                self.buffer.drain(..consumed);
                Ok(Some(value))
            }
            Some(Err(err)) if err.is_eof() => Ok(None),
            Some(Err(err)) => Err(TransportError::ProtocolViolation(format!(
                "malformed JSON stream: {}",
                err
            ))),
            None => {
                // Only whitespace left.
                self.buffer.clear();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_request_shape() {
        let bytes = encode_request(RequestId(7), "Player.GetActivePlayers", &Value::Null).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 7, "method": "Player.GetActivePlayers"})
        );

        let bytes = encode_request(RequestId(8), "Player.GetItem", &json!({"playerid": 1})).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["params"], json!({"playerid": 1}));
    }

    #[test]
    fn test_classify_reply_and_notification() {
        let reply = classify(json!({"id": 3, "jsonrpc": "2.0", "result": "pong"})).unwrap();
        assert_eq!(
            reply,
            Inbound::Reply {
                id: RequestId(3),
                outcome: Ok(json!("pong"))
            }
        );

        let push = classify(json!({"method": "Player.OnPause", "params": {"data": {}}})).unwrap();
        assert!(matches!(push, Inbound::Notification { ref method, .. } if method == "Player.OnPause"));
    }

    #[test]
    fn test_null_result_is_still_a_result() {
        let reply = classify(json!({"id": 1, "result": null})).unwrap();
        assert_eq!(
            reply,
            Inbound::Reply {
                id: RequestId(1),
                outcome: Ok(Value::Null)
            }
        );
    }

    #[test]
    fn test_error_reply_maps_to_remote() {
        let reply = classify(json!({"id": 4, "error": {"code": -32601, "message": "Method not found."}})).unwrap();
        match reply {
            Inbound::Reply { outcome, .. } => assert_eq!(
                outcome,
                Err(TransportError::Remote {
                    code: -32601,
                    message: "Method not found.".into()
                })
            ),
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_without_result_or_error_is_violation() {
        match classify(json!({"id": 5, "jsonrpc": "2.0"})).unwrap() {
            Inbound::Reply { outcome, .. } => {
                assert!(matches!(outcome, Err(TransportError::ProtocolViolation(_))))
            }
            other => panic!("expected reply, got {:?}", other),
        }
        assert!(classify(json!({"jsonrpc": "2.0"})).is_err());
        assert!(classify(json!([1, 2])).is_err());
    }

    #[test]
    fn test_decode_reply_rejects_mismatched_id() {
        let body = br#"{"id": 2, "result": true}"#;
        assert_eq!(decode_reply(body, RequestId(2)), Ok(json!(true)));
        assert!(matches!(
            decode_reply(body, RequestId(9)),
            Err(TransportError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_stream_decoder_handles_split_and_concatenated_values() {
        let mut decoder = StreamDecoder::new();
        decoder.extend(br#"{"id":1,"result":1}{"method":"System.On"#);
        assert_eq!(decoder.next_value().unwrap(), Some(json!({"id": 1, "result": 1})));
        assert_eq!(decoder.next_value().unwrap(), None);
        assert!(decoder.buffered() > 0);

        decoder.extend(br#"Wake","params":{}}  "#);
        assert_eq!(
            decoder.next_value().unwrap(),
            Some(json!({"method": "System.OnWake", "params": {}}))
        );
        assert_eq!(decoder.next_value().unwrap(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_stream_decoder_rejects_garbage() {
        let mut decoder = StreamDecoder::new();
        decoder.extend(b"}{");
        assert!(decoder.next_value().is_err());
    }
}
