//! Validation of JSON configuration against a [`Schema`].
//!
//! # Example
//!
//! ```
//! use neon_provider::schema::project_schema;
//! use neon_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = project_schema();
//!
//! let diagnostics = validate(&schema, &json!({"name": "shop"}));
//! assert!(diagnostics.is_empty());
//!
//! // Wrong type, and an output that cannot be configured
//! let diagnostics = validate(&schema, &json!({"name": 7, "connection_uri": "postgres://"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use serde_json::Value;

use crate::schema::{Attribute, Diagnostic, Schema};

/// Validate a configuration object against a schema.
///
/// An empty list means the value is valid. Rules:
///
/// - the value must be an object (null counts as an empty one)
/// - attributes not in the schema are rejected
/// - computed-only attributes cannot be set
/// - values must match the attribute type
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return vec![],
        _ => {
            return vec![Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)))]
        },
    };

    let mut diagnostics = Vec::new();
    for (name, v) in obj {
        match schema.attribute(name) {
            None => diagnostics.push(
                Diagnostic::error(format!("Unknown attribute '{}'", name))
                    .with_detail("This attribute is not part of the schema")
                    .with_attribute(name.as_str()),
            ),
            Some(attr) => validate_attribute(attr, v, name, &mut diagnostics),
        }
    }

    diagnostics
}

/// Like [`validate`], as a `Result`.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if value.is_null() {
        return;
    }

    if !attr.flags.settable() {
        diagnostics.push(
            Diagnostic::error(format!("Cannot set computed attribute '{}'", path))
                .with_detail("This attribute is set by the provider")
                .with_attribute(path),
        );
        return;
    }

    if !attr.attr_type.accepts(value) {
        diagnostics.push(
            Diagnostic::error(format!("Invalid type for attribute '{}'", path))
                .with_detail(format!(
                    "Expected {}, got {}",
                    attr.attr_type.name(),
                    value_type_name(value)
                ))
                .with_attribute(path),
        );
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
