//! Meta: the metadata envelope around an action.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::types::ActionId;

/// Meta fields that can never be changed after an action is logged.
pub const READ_ONLY_FIELDS: [&str; 5] = ["id", "added", "time", "subprotocol", "indexes"];

/// Metadata of a logged action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Causal id. Assigned once.
    pub id: ActionId,
    /// Logical creation time; defaults to `id.time`.
    pub time: i64,
    /// Store-local insertion sequence. 0 until a store assigns it.
    pub added: u64,
    /// Why the action is retained. Empty means deleted.
    pub reasons: Vec<String>,
    /// Secondary index keys.
    pub indexes: Vec<String>,
    /// Application subprotocol the action was created under.
    pub subprotocol: Option<String>,
    /// Keep only the newest action holding this reason.
    pub keep_last: Option<String>,
    /// Application-defined fields.
    pub extra: Map<String, Value>,
}

impl Meta {
    /// Create meta for an id, with `time` taken from the id.
    pub fn new(id: ActionId) -> Self {
        Self {
            time: id.time,
            id,
            added: 0,
            reasons: Vec::new(),
            indexes: Vec::new(),
            subprotocol: None,
            keep_last: None,
            extra: Map::new(),
        }
    }

    /// Check whether the action is held by a reason.
    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }

    /// Add a reason, keeping the set free of duplicates.
    pub fn add_reason(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.has_reason(&reason) {
            self.reasons.push(reason);
        }
    }

    /// Remove a reason. Returns true if it was present.
    pub fn remove_reason(&mut self, reason: &str) -> bool {
        let before = self.reasons.len();
        self.reasons.retain(|r| r != reason);
        before != self.reasons.len()
    }

    /// Check whether the action carries an index key.
    pub fn has_index(&self, index: &str) -> bool {
        self.indexes.iter().any(|i| i == index)
    }

    /// Apply a diff of mutable fields.
    ///
    /// Fails without touching `self` if the diff names a read-only field or
    /// carries a value of the wrong shape.
    pub fn apply_diff(&mut self, diff: &MetaDiff) -> Result<()> {
        if let Some(field) = diff.read_only_field() {
            return Err(CoreError::ReadOnlyField(field.to_string()));
        }
        let mut next = self.clone();
        for (key, value) in diff.fields() {
            match key.as_str() {
                "reasons" => next.reasons = string_list(key, value)?,
                "keepLast" => {
                    next.keep_last = match value {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        _ => return Err(invalid(key, "expected a string")),
                    }
                }
                _ if value.is_null() => {
                    next.extra.remove(key);
                }
                _ => {
                    next.extra.insert(key.clone(), value.clone());
                }
            }
        }
        *self = next;
        Ok(())
    }
}

/// Partial meta supplied to `Log::add`.
///
/// Anything left unset is filled in by the log: a fresh causal id, and a
/// `time` equal to the id time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMeta {
    pub id: Option<ActionId>,
    pub time: Option<i64>,
    pub reasons: Vec<String>,
    pub indexes: Vec<String>,
    pub subprotocol: Option<String>,
    pub keep_last: Option<String>,
    pub extra: Map<String, Value>,
}

impl NewMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: ActionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
        self
    }

    pub fn reasons<I, R>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        for reason in reasons {
            self = self.reason(reason);
        }
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.indexes.push(index.into());
        self
    }

    pub fn subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = Some(subprotocol.into());
        self
    }

    pub fn keep_last(mut self, reason: impl Into<String>) -> Self {
        self.keep_last = Some(reason.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Complete the meta with the id chosen by the log.
    pub fn into_meta(self, id: ActionId) -> Meta {
        Meta {
            time: self.time.unwrap_or(id.time),
            id,
            added: 0,
            reasons: self.reasons,
            indexes: self.indexes,
            subprotocol: self.subprotocol,
            keep_last: self.keep_last,
            extra: self.extra,
        }
    }
}

impl From<Meta> for NewMeta {
    fn from(meta: Meta) -> Self {
        Self {
            id: Some(meta.id),
            time: Some(meta.time),
            reasons: meta.reasons,
            indexes: meta.indexes,
            subprotocol: meta.subprotocol,
            keep_last: meta.keep_last,
            extra: meta.extra,
        }
    }
}

/// A set of meta changes keyed by wire field name.
///
/// `reasons` and `keepLast` map onto the typed fields, a `null` value
/// removes an extra field, and anything else is stored as an extra field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaDiff(Map<String, Value>);

impl MetaDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the reasons.
    pub fn reasons<I, R>(self, reasons: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let list: Vec<Value> = reasons
            .into_iter()
            .map(|r| Value::String(r.into()))
            .collect();
        self.set("reasons", Value::Array(list))
    }

    /// Set an arbitrary field.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The first read-only field named by this diff, if any.
    pub fn read_only_field(&self) -> Option<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .find(|key| READ_ONLY_FIELDS.contains(key))
    }

    /// New reasons, if this diff replaces them.
    pub fn new_reasons(&self) -> Option<Result<Vec<String>>> {
        self.0.get("reasons").map(|v| string_list("reasons", v))
    }
}

fn string_list(field: &str, value: &Value) -> Result<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(field, "expected an array of strings"))?;
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .ok_or_else(|| invalid(field, "expected an array of strings"))?;
        if !out.iter().any(|r| r == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn invalid(field: &str, reason: &str) -> CoreError {
    CoreError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> Meta {
        Meta::new(ActionId::new(10, "a", 0))
    }

    #[test]
    fn test_new_meta_defaults_time_from_id() {
        let m = NewMeta::new().reason("x").into_meta(ActionId::new(42, "n", 1));
        assert_eq!(m.time, 42);
        assert_eq!(m.reasons, vec!["x"]);
        assert_eq!(m.added, 0);

        let m = NewMeta::new().time(7).into_meta(ActionId::new(42, "n", 1));
        assert_eq!(m.time, 7);
    }

    #[test]
    fn test_reasons_are_a_set() {
        let mut m = meta();
        m.add_reason("a");
        m.add_reason("a");
        m.add_reason("b");
        assert_eq!(m.reasons, vec!["a", "b"]);
        assert!(m.remove_reason("a"));
        assert!(!m.remove_reason("a"));
        assert_eq!(m.reasons, vec!["b"]);

        let n = NewMeta::new().reasons(["x", "x", "y"]);
        assert_eq!(n.reasons, vec!["x", "y"]);
    }

    #[test]
    fn test_apply_diff_rejects_read_only() {
        let mut m = meta();
        for field in READ_ONLY_FIELDS {
            let diff = MetaDiff::new().set(field, 1);
            assert_eq!(
                m.apply_diff(&diff),
                Err(CoreError::ReadOnlyField(field.to_string()))
            );
        }
        assert_eq!(m, meta());
    }

    #[test]
    fn test_apply_diff_updates_fields() {
        let mut m = meta();
        let diff = MetaDiff::new()
            .reasons(["r1"])
            .set("keepLast", "r1")
            .set("tab", "t1");
        m.apply_diff(&diff).unwrap();
        assert_eq!(m.reasons, vec!["r1"]);
        assert_eq!(m.keep_last.as_deref(), Some("r1"));
        assert_eq!(m.extra.get("tab"), Some(&json!("t1")));

        m.apply_diff(&MetaDiff::new().set("tab", Value::Null)).unwrap();
        assert!(m.extra.is_empty());
    }

    #[test]
    fn test_apply_diff_is_atomic_on_bad_shape() {
        let mut m = meta();
        let diff = MetaDiff::new().set("tab", "t1").set("reasons", json!([1]));
        assert!(matches!(
            m.apply_diff(&diff),
            Err(CoreError::InvalidField { .. })
        ));
        assert_eq!(m, meta());
    }
}
