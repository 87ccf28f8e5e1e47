//! Strong type definitions for logsync.
//!
//! Identifiers are newtypes so a node id can never be passed where an
//! action id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Stable identifier of one log owner (a process, a tab, a server).
///
/// Node ids must not contain spaces: they are embedded in the textual
/// form of [`ActionId`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random 10-character alphanumeric node ID.
    pub fn random() -> Self {
        use rand::distributions::Alphanumeric;
        use rand::Rng;
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Causal identifier of an action: (logical time, origin node, sequence).
///
/// The sequence disambiguates actions created by one node within the same
/// millisecond. Textual form is `"<time> <node> <seq>"`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId {
    /// Creation time in milliseconds on the origin node.
    pub time: i64,
    /// Node that created the action.
    pub node: NodeId,
    /// Per-millisecond sequence on the origin node.
    pub seq: u64,
}

impl ActionId {
    /// Create an action id.
    pub fn new(time: i64, node: impl Into<NodeId>, seq: u64) -> Self {
        Self {
            time,
            node: node.into(),
            seq,
        }
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({})", self)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.time, self.node, self.seq)
    }
}

impl FromStr for ActionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidId(s.to_string());
        let (time, rest) = s.split_once(' ').ok_or_else(invalid)?;
        let (node, seq) = rest.rsplit_once(' ').ok_or_else(invalid)?;
        if node.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            time: time.parse().map_err(|_| invalid())?,
            node: NodeId::new(node),
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_id_display_roundtrip() {
        let id = ActionId::new(1_000, "client:a", 3);
        let text = id.to_string();
        assert_eq!(text, "1000 client:a 3");
        assert_eq!(text.parse::<ActionId>().unwrap(), id);
    }

    #[test]
    fn test_action_id_rejects_garbage() {
        assert!("".parse::<ActionId>().is_err());
        assert!("12 node".parse::<ActionId>().is_err());
        assert!("x node 1".parse::<ActionId>().is_err());
        assert!("1  1".parse::<ActionId>().is_err());
    }

    #[test]
    fn test_random_node_ids_differ() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_eq!(a.as_str().len(), 10);
        assert_ne!(a, b);
    }
}
