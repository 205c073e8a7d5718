//! Idempotent present / absent state functions
//!
//! Each function compares the desired resource with what the manager
//! reports, acts only when they differ, and returns a [`StateResult`].

pub mod manager;
pub mod policy;
pub mod transport_node;

use crate::diff::is_truthy;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};

/// Run-wide switches for state functions
#[derive(Debug, Clone, Copy, Default)]
pub struct StateContext {
    /// Report what would change without changing it
    pub test: bool,
}

/// Normalized outcome of a state function
#[derive(Debug, Clone, Serialize)]
pub struct StateResult {
    pub name: String,
    /// `None` when a dry run would have changed something
    pub result: Option<bool>,
    pub comment: String,
    pub changes: Map<String, Value>,
    #[serde(skip)]
    pub start_time: DateTime<Local>,
}

impl StateResult {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: Some(true),
            comment: String::new(),
            changes: Map::new(),
            start_time: Local::now(),
        }
    }

    pub fn succeed(mut self, comment: impl Into<String>) -> Self {
        self.result = Some(true);
        self.comment = comment.into();
        self
    }

    pub fn fail(mut self, comment: impl Into<String>) -> Self {
        tracing::warn!("state {} failed", self.name);
        self.result = Some(false);
        self.comment = comment.into();
        self
    }

    pub fn pending(mut self, comment: impl Into<String>) -> Self {
        self.result = None;
        self.comment = comment.into();
        self
    }

    /// Record old/new, skipped when both are empty
    pub fn with_changes(mut self, old: Value, new: Value) -> Self {
        if is_truthy(&old) || is_truthy(&new) {
            self.changes.insert("old".to_string(), old);
            self.changes.insert("new".to_string(), new);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == Some(true)
    }

    /// Time since the state function started
    pub fn elapsed(&self) -> chrono::Duration {
        Local::now() - self.start_time
    }
}

/// The only entry of a `{"results": [...]}` lookup; `Err` carries the count when ambiguous
pub(crate) fn unique_result(page: &Value) -> Result<Option<Value>, usize> {
    let results = page
        .get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    match results {
        [] => Ok(None),
        [only] => Ok(Some(only.clone())),
        many => Err(many.len()),
    }
}

/// The display name in `spec`, falling back to the state name
pub(crate) fn display_name<'a>(spec: &'a Value, name: &'a str) -> &'a str {
    spec.get("display_name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(name)
}

/// `spec` with `display_name` filled in
pub(crate) fn with_display_name(spec: &Value, display_name: &str) -> Value {
    let mut spec = spec.clone();
    if let Value::Object(map) = &mut spec {
        map.entry("display_name".to_string())
            .or_insert_with(|| Value::String(display_name.to_string()));
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_changes_skips_empty() {
        let result = StateResult::new("t0").with_changes(json!({}), json!({}));
        assert!(result.changes.is_empty());

        let result = StateResult::new("t0").with_changes(json!({}), json!({"id": "t0"}));
        assert_eq!(result.changes["new"], json!({"id": "t0"}));
        assert_eq!(result.changes["old"], json!({}));
    }

    #[test]
    fn test_serializes_only_outcome_fields() {
        let result = StateResult::new("t0")
            .succeed("Created Tier-0 gateway t0 successfully")
            .with_changes(json!({}), json!({"id": "t0"}));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "name": "t0",
                "result": true,
                "comment": "Created Tier-0 gateway t0 successfully",
                "changes": {"old": {}, "new": {"id": "t0"}}
            })
        );
        assert!(result.elapsed().num_milliseconds() >= 0);
    }

    #[test]
    fn test_result_states() {
        assert_eq!(StateResult::new("x").pending("later").result, None);
        assert_eq!(StateResult::new("x").fail("no").result, Some(false));
        assert!(StateResult::new("x").succeed("ok").is_success());
    }

    #[test]
    fn test_unique_result() {
        assert_eq!(unique_result(&json!({"results": []})), Ok(None));
        assert_eq!(
            unique_result(&json!({"results": [{"id": "a"}]})),
            Ok(Some(json!({"id": "a"})))
        );
        assert_eq!(unique_result(&json!({"results": [{"id": "a"}, {"id": "b"}]})), Err(2));
        assert_eq!(unique_result(&json!({})), Ok(None));
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(display_name(&json!({"display_name": "gw"}), "state-id"), "gw");
        assert_eq!(display_name(&json!({}), "state-id"), "state-id");
        assert_eq!(
            with_display_name(&json!({"ha_mode": "ACTIVE_ACTIVE"}), "gw"),
            json!({"ha_mode": "ACTIVE_ACTIVE", "display_name": "gw"})
        );
    }
}
