//! Execution log of a resource walk

use serde::Serialize;
use serde_json::Value;

/// Outcome of one call in a walk
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Results(Value),
    Error(String),
}

/// `{"resourceType": .., "results": ..}` or `{"resourceType": .., "error": ..}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl LogEntry {
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error(message) => Some(message),
            Outcome::Results(_) => None,
        }
    }

    pub fn results(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Results(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }
}

/// Entries in call order; only the last one decides success
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_results(&mut self, resource_type: &str, results: Value) {
        self.entries.push(LogEntry {
            resource_type: resource_type.to_string(),
            outcome: Outcome::Results(results),
        });
    }

    pub fn push_error(&mut self, resource_type: &str, message: impl Into<String>) {
        self.entries.push(LogEntry {
            resource_type: resource_type.to_string(),
            outcome: Outcome::Error(message.into()),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Error message of the last entry, if the walk failed
    pub fn last_error(&self) -> Option<&str> {
        self.entries.last().and_then(LogEntry::error)
    }

    /// Results of the first entry with the given resource type
    pub fn find(&self, resource_type: &str) -> Option<&Value> {
        self.entries
            .iter()
            .filter(|entry| entry.resource_type == resource_type)
            .find_map(LogEntry::results)
    }

    pub fn resource_types(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.resource_type.as_str())
            .collect()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
