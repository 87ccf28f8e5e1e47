//! Action: an opaque, typed record of application data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// An application action.
///
/// An open JSON object with one required field, `type`, holding a string.
/// The invariant is enforced by every constructor, so [`Action::action_type`]
/// never fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Action(Map<String, Value>);

impl Action {
    /// Create an action with only a type.
    pub fn new(action_type: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(action_type.into()));
        Self(fields)
    }

    /// Add a field. Setting `type` to a non-string value is ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == "type" && !value.is_string() {
            return self;
        }
        self.0.insert(key, value);
        self
    }

    /// The action type.
    pub fn action_type(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    /// The action's own `id` field, used to scope per-type listeners.
    ///
    /// This is application data, unrelated to the causal meta id.
    pub fn entity_id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Get a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert to a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Map<String, Value>> for Action {
    type Error = CoreError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get("type") {
            Some(Value::String(_)) => Ok(Self(fields)),
            _ => Err(CoreError::MissingType),
        }
    }
}

impl TryFrom<Value> for Action {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Self::try_from(fields),
            _ => Err(CoreError::MissingType),
        }
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        Value::Object(action.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_requires_type() {
        assert_eq!(
            Action::try_from(json!({ "name": "x" })),
            Err(CoreError::MissingType)
        );
        assert_eq!(Action::try_from(json!({ "type": 1 })), Err(CoreError::MissingType));
        assert_eq!(Action::try_from(json!([1, 2])), Err(CoreError::MissingType));

        let action = Action::try_from(json!({ "type": "user/rename", "id": "u1" })).unwrap();
        assert_eq!(action.action_type(), "user/rename");
        assert_eq!(action.entity_id(), Some("u1"));
    }

    #[test]
    fn test_with_cannot_break_type() {
        let action = Action::new("a").with("type", 5).with("count", 2);
        assert_eq!(action.action_type(), "a");
        assert_eq!(action.get("count"), Some(&json!(2)));
    }

    #[test]
    fn test_serde_validates() {
        let parsed: Result<Action, _> = serde_json::from_str(r#"{"name":"no type"}"#);
        assert!(parsed.is_err());
        let action: Action = serde_json::from_str(r#"{"type":"ok"}"#).unwrap();
        assert_eq!(serde_json::to_value(&action).unwrap(), json!({ "type": "ok" }));
    }
}
