//! Compact wire encoding of action metadata.
//!
//! Times travel relative to the connection's `baseTime`, and ids created
//! by the sending node drop the node part:
//!
//! | id                         | wire form          |
//! |----------------------------|--------------------|
//! | `(t, local, 0)`            | `t - base`         |
//! | `(t, local, s)`            | `[t - base, s]`    |
//! | `(t, other, s)`            | `[t - base, other, s]` |
//!
//! `added` is store-local and never sent. Received times that do not fit
//! an `i64` once shifted back are rejected as `wrong-format`.

use logsync_core::{ActionId, Meta, NodeId};
use serde_json::{json, Map, Value};

use crate::error::ErrorKind;
use crate::messages::{count, timestamp, WireMeta};

/// Meta keys with a typed representation. Everything else is extra.
const KNOWN_KEYS: [&str; 7] = [
    "id",
    "time",
    "added",
    "reasons",
    "indexes",
    "subprotocol",
    "keepLast",
];

/// Per-connection metadata codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaCodec {
    /// Time origin shared by both sides of the connection.
    pub base_time: i64,
    /// Local clock minus peer clock; 0 when clock fixing is off.
    pub time_fix: i64,
    /// Ids from this node are elided when encoding.
    pub local: NodeId,
    /// Elided ids are attributed to this node when decoding.
    pub peer: NodeId,
}

impl MetaCodec {
    pub fn new(local: NodeId, peer: NodeId) -> Self {
        Self {
            base_time: 0,
            time_fix: 0,
            local,
            peer,
        }
    }

    pub fn with_base_time(mut self, base_time: i64) -> Self {
        self.base_time = base_time;
        self
    }

    pub fn with_time_fix(mut self, time_fix: i64) -> Self {
        self.time_fix = time_fix;
        self
    }

    /// The codec the peer uses for the same connection.
    pub fn mirror(&self) -> Self {
        Self {
            base_time: self.base_time,
            time_fix: self.time_fix,
            local: self.peer.clone(),
            peer: self.local.clone(),
        }
    }

    /// Encode a meta for sending.
    pub fn encode(&self, meta: &Meta) -> WireMeta {
        let mut wire = Map::new();
        wire.insert("id".into(), self.encode_id(&meta.id));
        wire.insert(
            "time".into(),
            json!(meta
                .time
                .saturating_sub(self.base_time)
                .saturating_sub(self.time_fix)),
        );
        if !meta.reasons.is_empty() {
            wire.insert("reasons".into(), json!(meta.reasons));
        }
        if !meta.indexes.is_empty() {
            wire.insert("indexes".into(), json!(meta.indexes));
        }
        if let Some(subprotocol) = &meta.subprotocol {
            wire.insert("subprotocol".into(), json!(subprotocol));
        }
        if let Some(keep_last) = &meta.keep_last {
            wire.insert("keepLast".into(), json!(keep_last));
        }
        for (key, value) in &meta.extra {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                wire.insert(key.clone(), value.clone());
            }
        }
        wire
    }

    fn encode_id(&self, id: &ActionId) -> Value {
        let delta = id.time.saturating_sub(self.base_time);
        if id.node == self.local {
            if id.seq == 0 {
                json!(delta)
            } else {
                json!([delta, id.seq])
            }
        } else {
            json!([delta, id.node, id.seq])
        }
    }

    /// Decode a received meta. `added` is left at 0.
    pub fn decode(&self, wire: &WireMeta) -> Result<Meta, ErrorKind> {
        let wrong_format = || ErrorKind::WrongFormat(Value::Object(wire.clone()).to_string());

        let id = wire
            .get("id")
            .and_then(|id| self.decode_id(id))
            .ok_or_else(wrong_format)?;
        let time = wire
            .get("time")
            .and_then(timestamp)
            .ok_or_else(wrong_format)?;

        let mut meta = Meta::new(id);
        meta.time = time
            .checked_add(self.base_time)
            .and_then(|time| time.checked_add(self.time_fix))
            .ok_or_else(wrong_format)?;
        if let Some(value) = wire.get("reasons") {
            meta.reasons = string_list(value).ok_or_else(wrong_format)?;
        }
        if let Some(value) = wire.get("indexes") {
            meta.indexes = string_list(value).ok_or_else(wrong_format)?;
        }
        if let Some(value) = wire.get("subprotocol") {
            meta.subprotocol = Some(value.as_str().ok_or_else(wrong_format)?.to_string());
        }
        if let Some(value) = wire.get("keepLast") {
            meta.keep_last = Some(value.as_str().ok_or_else(wrong_format)?.to_string());
        }
        for (key, value) in wire {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                meta.extra.insert(key.clone(), value.clone());
            }
        }
        Ok(meta)
    }

    fn decode_id(&self, value: &Value) -> Option<ActionId> {
        let (delta, node, seq) = match value {
            Value::Array(parts) => match parts.as_slice() {
                [delta, seq] => (timestamp(delta)?, self.peer.clone(), count(seq)?),
                [delta, node, seq] => (
                    timestamp(delta)?,
                    NodeId::new(node.as_str()?),
                    count(seq)?,
                ),
                _ => return None,
            },
            other => (timestamp(other)?, self.peer.clone(), 0),
        };
        Some(ActionId::new(delta.checked_add(self.base_time)?, node, seq))
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
