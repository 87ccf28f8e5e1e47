//! Sync protocol message types.
//!
//! On the wire every message is a JSON array with the tag first, e.g.
//! `["ping", 12]`. [`Message`] is the typed form the node dispatches on.

use logsync_core::{Action, NodeId};
use serde_json::{json, Map, Value};

use crate::error::{ErrorKind, Result, SyncError};
use crate::validate::validate;

/// Compact wire form of a meta, see [`crate::codec`].
pub type WireMeta = Map<String, Value>;

/// Options of `connect` and `connected`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub token: Option<String>,
    pub subprotocol: Option<String>,
}

impl ConnectOptions {
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.subprotocol.is_none()
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(token) = &self.token {
            map.insert("token".into(), json!(token));
        }
        if let Some(subprotocol) = &self.subprotocol {
            map.insert("subprotocol".into(), json!(subprotocol));
        }
        Value::Object(map)
    }

    fn from_value(value: Option<&Value>) -> Self {
        let field = |key: &str| {
            value
                .and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            token: field("token"),
            subprotocol: field("subprotocol"),
        }
    }
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client handshake.
    Connect {
        protocol: u32,
        node_id: NodeId,
        /// Highest peer `added` the client already has.
        synced: u64,
        options: ConnectOptions,
    },

    /// Server handshake reply.
    Connected {
        protocol: u32,
        node_id: NodeId,
        /// `[authStart, authEnd]` on the server clock.
        time: (i64, i64),
        options: ConnectOptions,
    },

    Ping(u64),
    Pong(u64),

    /// A batch of actions, oldest first.
    Sync {
        /// Highest `added` in the batch.
        added: u64,
        entries: Vec<(Action, WireMeta)>,
    },

    /// Acknowledges a batch by its `added`.
    Synced(u64),

    Error(ErrorKind),

    /// Free-form diagnostics; only `"error"` is defined.
    Debug { kind: String, text: String },

    Headers(Map<String, Value>),
}

impl Message {
    /// Wire tag of the message.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Connect { .. } => "connect",
            Message::Connected { .. } => "connected",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Sync { .. } => "sync",
            Message::Synced(_) => "synced",
            Message::Error(_) => "error",
            Message::Debug { .. } => "debug",
            Message::Headers(_) => "headers",
        }
    }

    /// Tags accepted before authentication. Anything else is buffered.
    pub fn allowed_before_auth(name: &str) -> bool {
        matches!(name, "connect" | "connected" | "error" | "debug" | "headers")
    }

    /// Build the wire tuple.
    pub fn to_value(&self) -> Value {
        let mut items = vec![json!(self.name())];
        match self {
            Message::Connect {
                protocol,
                node_id,
                synced,
                options,
            } => {
                items.extend([json!(protocol), json!(node_id), json!(synced)]);
                if !options.is_empty() {
                    items.push(options.to_value());
                }
            }
            Message::Connected {
                protocol,
                node_id,
                time,
                options,
            } => {
                items.extend([json!(protocol), json!(node_id), json!([time.0, time.1])]);
                if !options.is_empty() {
                    items.push(options.to_value());
                }
            }
            Message::Ping(added) | Message::Pong(added) | Message::Synced(added) => {
                items.push(json!(added));
            }
            Message::Sync { added, entries } => {
                items.push(json!(added));
                for (action, meta) in entries {
                    items.push(action.to_value());
                    items.push(Value::Object(meta.clone()));
                }
            }
            Message::Error(kind) => {
                items.push(json!(kind.name()));
                if let Some(options) = kind.options() {
                    items.push(options);
                }
            }
            Message::Debug { kind, text } => {
                items.extend([json!(kind), json!(text)]);
            }
            Message::Headers(headers) => {
                items.push(Value::Object(headers.clone()));
            }
        }
        Value::Array(items)
    }

    /// Validate and parse a wire tuple.
    pub fn from_value(value: &Value) -> std::result::Result<Self, ErrorKind> {
        let tag = validate(value)?;
        let wrong_format = || ErrorKind::WrongFormat(value.to_string());
        // Shape is checked; only numeric ranges can still fail.
        let args = value
            .as_array()
            .map(|items| &items[1..])
            .ok_or_else(wrong_format)?;

        let message = match tag {
            "connect" => Message::Connect {
                protocol: protocol(&args[0]).ok_or_else(wrong_format)?,
                node_id: node_id(&args[1]).ok_or_else(wrong_format)?,
                synced: count(&args[2]).ok_or_else(wrong_format)?,
                options: ConnectOptions::from_value(args.get(3)),
            },
            "connected" => {
                let time = args[2].as_array().ok_or_else(wrong_format)?;
                Message::Connected {
                    protocol: protocol(&args[0]).ok_or_else(wrong_format)?,
                    node_id: node_id(&args[1]).ok_or_else(wrong_format)?,
                    time: (
                        timestamp(&time[0]).ok_or_else(wrong_format)?,
                        timestamp(&time[1]).ok_or_else(wrong_format)?,
                    ),
                    options: ConnectOptions::from_value(args.get(3)),
                }
            }
            "ping" => Message::Ping(count(&args[0]).ok_or_else(wrong_format)?),
            "pong" => Message::Pong(count(&args[0]).ok_or_else(wrong_format)?),
            "synced" => Message::Synced(count(&args[0]).ok_or_else(wrong_format)?),
            "sync" => {
                let added = count(&args[0]).ok_or_else(wrong_format)?;
                let mut entries = Vec::with_capacity(args.len() / 2);
                for pair in args[1..].chunks(2) {
                    let action =
                        Action::try_from(pair[0].clone()).map_err(|_| wrong_format())?;
                    let meta = pair[1].as_object().cloned().ok_or_else(wrong_format)?;
                    entries.push((action, meta));
                }
                Message::Sync { added, entries }
            }
            "error" => {
                let name = args[0].as_str().ok_or_else(wrong_format)?;
                Message::Error(ErrorKind::from_wire(name, args.get(1)))
            }
            "debug" => Message::Debug {
                kind: args[0].as_str().unwrap_or_default().to_string(),
                text: args[1].as_str().unwrap_or_default().to_string(),
            },
            "headers" => Message::Headers(args[0].as_object().cloned().unwrap_or_default()),
            other => return Err(ErrorKind::UnknownMessage(other.to_string())),
        };
        Ok(message)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Parse JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SyncError::Codec(e.to_string()))?;
        Message::from_value(&value).map_err(SyncError::Protocol)
    }

    /// Serialize to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&self.to_value(), &mut bytes)
            .map_err(|e| SyncError::Codec(e.to_string()))?;
        Ok(bytes)
    }

    /// Parse CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
        Message::from_value(&value).map_err(SyncError::Protocol)
    }
}

fn protocol(value: &Value) -> Option<u32> {
    count(value).and_then(|v| u32::try_from(v).ok())
}

fn node_id(value: &Value) -> Option<NodeId> {
    value.as_str().map(NodeId::from)
}

/// Non-negative integer; integral floats are accepted.
pub(crate) fn count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

pub(crate) fn timestamp(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_tuple() {
        let msg = Message::Connect {
            protocol: 3,
            node_id: NodeId::new("client"),
            synced: 10,
            options: ConnectOptions {
                token: Some("secret".into()),
                subprotocol: None,
            },
        };
        let value = msg.to_value();
        assert_eq!(value, json!(["connect", 3, "client", 10, { "token": "secret" }]));
        assert_eq!(Message::from_value(&value).unwrap(), msg);

        // Options are omitted when empty.
        let bare = Message::Connect {
            protocol: 3,
            node_id: NodeId::new("client"),
            synced: 0,
            options: ConnectOptions::default(),
        };
        assert_eq!(bare.to_value(), json!(["connect", 3, "client", 0]));
    }

    #[test]
    fn test_connected_and_sync_tuples() {
        let value = json!(["connected", 3, "server", [100, 120]]);
        assert_eq!(
            Message::from_value(&value).unwrap(),
            Message::Connected {
                protocol: 3,
                node_id: NodeId::new("server"),
                time: (100, 120),
                options: ConnectOptions::default(),
            }
        );

        let value = json!(["sync", 2, { "type": "a" }, { "id": 1, "time": 1 }]);
        let Message::Sync { added, entries } = Message::from_value(&value).unwrap() else {
            panic!("expected sync");
        };
        assert_eq!(added, 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.action_type(), "a");
        assert_eq!(Message::Sync { added, entries }.to_value(), value);
    }

    #[test]
    fn test_error_tuple() {
        let msg = Message::Error(ErrorKind::Timeout { ms: 100 });
        assert_eq!(msg.to_value(), json!(["error", "timeout", 100]));

        let msg = Message::Error(ErrorKind::WrongCredentials);
        assert_eq!(msg.to_value(), json!(["error", "wrong-credentials"]));
        assert_eq!(Message::from_value(&msg.to_value()).unwrap(), msg);
    }

    #[test]
    fn test_negative_counts_are_wrong_format() {
        let value = json!(["ping", -1]);
        assert_eq!(
            Message::from_value(&value),
            Err(ErrorKind::WrongFormat(value.to_string()))
        );
    }

    #[test]
    fn test_json_and_cbor() {
        let msg = Message::Headers(Map::from_iter([("lang".to_string(), json!("en"))]));
        assert_eq!(msg.to_json(), r#"["headers",{"lang":"en"}]"#);
        assert_eq!(Message::from_json(&msg.to_json()).unwrap(), msg);

        let bytes = msg.to_cbor().unwrap();
        assert_eq!(Message::from_cbor(&bytes).unwrap(), msg);

        assert!(matches!(
            Message::from_json("[\"nope\"]"),
            Err(SyncError::Protocol(ErrorKind::UnknownMessage(_)))
        ));
        assert!(matches!(Message::from_json("{"), Err(SyncError::Codec(_))));
    }

    #[test]
    fn test_before_auth_set() {
        for tag in ["connect", "connected", "error", "debug", "headers"] {
            assert!(Message::allowed_before_auth(tag));
        }
        for tag in ["ping", "pong", "sync", "synced"] {
            assert!(!Message::allowed_before_auth(tag));
        }
    }
}
