//! Structural validation of raw wire messages.
//!
//! Runs before dispatch. Checks tuple length and field types only; values
//! are interpreted later by [`crate::messages::Message::from_value`].

use serde_json::Value;

use crate::error::ErrorKind;

/// Check a raw message and return its tag.
///
/// Anything that is not an array with a string tag, or whose fields do not
/// match the tag, is [`ErrorKind::WrongFormat`] carrying the message as
/// JSON text. A well-formed message with an unknown tag is
/// [`ErrorKind::UnknownMessage`].
pub fn validate(value: &Value) -> Result<&str, ErrorKind> {
    let wrong_format = || ErrorKind::WrongFormat(value.to_string());

    let items = value.as_array().ok_or_else(wrong_format)?;
    let tag = items
        .first()
        .and_then(Value::as_str)
        .ok_or_else(wrong_format)?;
    let args = &items[1..];

    let valid = match tag {
        "connect" => connect_args(args, Value::is_number),
        "connected" => connect_args(args, is_time_pair),
        "ping" | "pong" | "synced" => args.len() == 1 && args[0].is_number(),
        "sync" => sync_args(args),
        "error" => (1..=2).contains(&args.len()) && args[0].is_string(),
        "debug" => args.len() == 2 && args[0].as_str() == Some("error") && args[1].is_string(),
        "headers" => args.len() == 1 && args[0].is_object(),
        other => return Err(ErrorKind::UnknownMessage(other.to_string())),
    };

    if valid {
        Ok(tag)
    } else {
        Err(wrong_format())
    }
}

/// `protocol, nodeId, third, options?`
fn connect_args(args: &[Value], third: fn(&Value) -> bool) -> bool {
    match args {
        [protocol, node, value] => protocol.is_number() && node.is_string() && third(value),
        [protocol, node, value, options] => {
            protocol.is_number() && node.is_string() && third(value) && options.is_object()
        }
        _ => false,
    }
}

fn is_time_pair(value: &Value) -> bool {
    matches!(value.as_array().map(Vec::as_slice), Some([a, b]) if a.is_number() && b.is_number())
}

/// `added, (action, meta)*`
fn sync_args(args: &[Value]) -> bool {
    let Some((added, entries)) = args.split_first() else {
        return false;
    };
    if !added.is_number() || entries.len() % 2 != 0 {
        return false;
    }
    entries
        .chunks(2)
        .all(|pair| is_action(&pair[0]) && is_wire_meta(&pair[1]))
}

fn is_action(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|action| action.get("type").is_some_and(Value::is_string))
}

fn is_wire_meta(value: &Value) -> bool {
    let Some(meta) = value.as_object() else {
        return false;
    };
    if !meta.get("time").is_some_and(Value::is_number) {
        return false;
    }
    match meta.get("id") {
        Some(Value::Number(_)) => true,
        Some(Value::Array(parts)) => match parts.as_slice() {
            [time, seq] => time.is_number() && seq.is_number(),
            [time, node, seq] => time.is_number() && node.is_string() && seq.is_number(),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(value: Value) -> bool {
        validate(&value).is_ok()
    }

    #[test]
    fn test_accepts_well_formed() {
        assert!(ok(json!(["connect", 3, "client", 0])));
        assert!(ok(json!(["connect", 3, "client", 0, { "token": "t" }])));
        assert!(ok(json!(["connected", 3, "server", [1, 2]])));
        assert!(ok(json!(["ping", 1])));
        assert!(ok(json!(["pong", 1])));
        assert!(ok(json!(["synced", 1])));
        assert!(ok(json!(["sync", 0])));
        assert!(ok(json!(["sync", 2, { "type": "a" }, { "id": 1, "time": 1 }])));
        assert!(ok(json!(["sync", 2, { "type": "a" }, { "id": [1, 2], "time": 1 }])));
        assert!(ok(json!(["sync", 2, { "type": "a" }, { "id": [1, "n", 2], "time": 1 }])));
        assert!(ok(json!(["error", "wrong-format"])));
        assert!(ok(json!(["error", "timeout", 100])));
        assert!(ok(json!(["debug", "error", "text"])));
        assert!(ok(json!(["headers", { "lang": "en" }])));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        for value in [
            json!({ "connect": 3 }),
            json!([]),
            json!([1, 2]),
            json!(["connect", "3", "client", 0]),
            json!(["connect", 3, "client", 0, "options"]),
            json!(["connected", 3, "server", [1]]),
            json!(["ping"]),
            json!(["ping", "1"]),
            json!(["sync", 1, { "type": "a" }]),
            json!(["sync", 1, { "kind": "a" }, { "id": 1, "time": 1 }]),
            json!(["sync", 1, { "type": "a" }, { "id": "1", "time": 1 }]),
            json!(["sync", 1, { "type": "a" }, { "id": 1 }]),
            json!(["error"]),
            json!(["error", "timeout", 1, 2]),
            json!(["debug", "info", "text"]),
            json!(["headers", []]),
        ] {
            assert_eq!(
                validate(&value),
                Err(ErrorKind::WrongFormat(value.to_string())),
                "{value}"
            );
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            validate(&json!(["abc", 1])),
            Err(ErrorKind::UnknownMessage("abc".into()))
        );
    }

    mod properties {
        use super::*;
        use crate::messages::Message;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::from),
                any::<i64>().prop_map(Value::from),
                "[a-z]{0,4}".prop_map(Value::from),
                Just(json!({ "type": "a" })),
                Just(json!({ "id": 1, "time": 1 })),
                Just(json!([1, 2])),
            ]
        }

        fn raw_message() -> impl Strategy<Value = Value> {
            let tags = vec![
                "connect", "connected", "ping", "pong", "sync", "synced", "error", "debug",
                "headers", "hello",
            ];
            (
                prop::sample::select(tags),
                prop::collection::vec(leaf(), 0..5),
            )
                .prop_map(|(tag, args)| {
                    let mut items = vec![Value::from(tag)];
                    items.extend(args);
                    Value::Array(items)
                })
        }

        proptest! {
            #[test]
            fn parsing_agrees_with_validation(value in raw_message()) {
                let parsed = Message::from_value(&value);
                match validate(&value) {
                    Err(kind) => prop_assert_eq!(parsed.err(), Some(kind)),
                    Ok(_) => {
                        if let Err(kind) = parsed {
                            prop_assert!(matches!(kind, ErrorKind::WrongFormat(_)));
                        }
                    }
                }
            }
        }
    }
}
