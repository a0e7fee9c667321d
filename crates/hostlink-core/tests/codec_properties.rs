//! Property-based tests for the wire codec
//!
//! These tests verify that requests survive the trip through the codec and
//! that replies are matched to their calls by correlation id alone.

use hostlink_core::{
    wire::{classify, decode_reply, encode_request, Inbound, StreamDecoder},
    RequestId, TransportError,
};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Generate arbitrary JSON results a host could send back
fn arb_result() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 .]{0,24}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Generate method names in `Namespace.Method` form
fn arb_method() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{1,10}\\.[A-Z][A-Za-z]{1,16}"
}

proptest! {
    /// Property: a reply built from an encoded call's id decodes to the original result
    #[test]
    fn reply_round_trip_recovers_result(id in any::<u64>(), method in arb_method(), result in arb_result()) {
        let request: Value = serde_json::from_slice(
            &encode_request(RequestId(id), &method, &json!({"x": 1})).unwrap(),
        ).unwrap();
        prop_assert_eq!(&request["method"], &Value::from(method.clone()));

        let reply = json!({"jsonrpc": "2.0", "id": request["id"].clone(), "result": result.clone()});
        let body = serde_json::to_vec(&reply).unwrap();
        prop_assert_eq!(decode_reply(&body, RequestId(id)), Ok(result));
    }

    /// Property: any reply lacking both result and error is a protocol violation
    #[test]
    fn reply_without_payload_is_violation(id in any::<u64>()) {
        match classify(json!({"jsonrpc": "2.0", "id": id})).unwrap() {
            Inbound::Reply { id: got, outcome } => {
                prop_assert_eq!(got, RequestId(id));
                prop_assert!(matches!(outcome, Err(TransportError::ProtocolViolation(_))));
            }
            other => prop_assert!(false, "expected a reply, got {:?}", other),
        }
    }

    /// Property: splitting a concatenated stream at any byte boundary yields the same values
    #[test]
    fn stream_decoder_is_split_agnostic(results in prop::collection::vec(arb_result(), 1..6), split in any::<prop::sample::Index>()) {
        let values: Vec<Value> = results
            .into_iter()
            .enumerate()
            .map(|(i, result)| json!({"id": i, "result": result}))
            .collect();
        let stream: Vec<u8> = values
            .iter()
            .flat_map(|v| serde_json::to_vec(v).unwrap())
            .collect();
        let cut = split.index(stream.len());

        let mut decoder = StreamDecoder::new();
        let mut decoded = Vec::new();
        for chunk in [&stream[..cut], &stream[cut..]] {
            decoder.extend(chunk);
            while let Some(value) = decoder.next_value().unwrap() {
                decoded.push(value);
            }
        }

        prop_assert_eq!(decoded, values);
        prop_assert_eq!(decoder.buffered(), 0);
    }
}
