//! Key-path addressed engine state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A state path and its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBag {
    /// Slash separated path, e.g. `eyeTracking/state`
    pub state_path: String,
    /// Value at the path
    #[serde(default)]
    pub data: Value,
}

impl StateBag {
    /// Create a state bag
    pub fn new(state_path: impl Into<String>, data: Value) -> Self {
        Self {
            state_path: state_path.into(),
            data,
        }
    }

    /// Whether a change to this bag's path affects `subscribed_path`.
    ///
    /// A change reported for a path is relevant to every subscription at or
    /// below it.
    pub fn affects(&self, subscribed_path: &str) -> bool {
        subscribed_path.starts_with(self.state_path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parent_changes_affect_children() {
        assert!(StateBag::new("a/b", json!(1)).affects("a/b/c"));
        assert!(StateBag::new("a/b/c", json!(1)).affects("a/b/c"));
        assert!(!StateBag::new("a/b/c/d", json!(1)).affects("a/b/c"));
    }

    #[test]
    fn wire_shape() {
        let bag: StateBag =
            serde_json::from_value(json!({"statePath": "x/y", "data": {"v": 2}})).unwrap();
        assert_eq!(bag, StateBag::new("x/y", json!({"v": 2})));
    }
}
