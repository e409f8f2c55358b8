//! Plan and import types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::REDACTED;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if deleting or not yet known).
    pub after: Option<Value>,
    /// Whether this change forces a new project.
    #[serde(default)]
    pub requires_replace: bool,
    /// Whether the values are masked.
    #[serde(default)]
    pub sensitive: bool,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
            requires_replace: false,
            sensitive: false,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }

    /// Mark the change as forcing replacement.
    pub fn replacing(mut self) -> Self {
        self.requires_replace = true;
        self
    }

    /// Mask both values. Null and empty strings stay as they are.
    pub fn masked(mut self) -> Self {
        fn mask(value: Option<Value>) -> Option<Value> {
            value.map(|v| match v {
                Value::Null => Value::Null,
                Value::String(s) if s.is_empty() => Value::String(s),
                _ => Value::String(REDACTED.to_string()),
            })
        }

        self.before = mask(self.before);
        self.after = mask(self.after);
        self.sensitive = true;
        self
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
    /// Whether the old project has to be deleted before its replacement is
    /// created.
    #[serde(default)]
    pub delete_before_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
            delete_before_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
            delete_before_replace: false,
        }
    }

    /// Require the old project to be deleted first.
    pub fn deleting_first(mut self, delete_before_replace: bool) -> Self {
        self.delete_before_replace = delete_before_replace;
        self
    }

    /// Whether the plan changes anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
}
