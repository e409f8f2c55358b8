//! Attribute schemas of the provider configuration and the `neon_project`
//! resource, plus the diagnostics reported against them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::ProjectState;

/// The type of an attribute value.
///
/// Every attribute of a Neon project is a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A UTF-8 string.
    String,
}

impl AttributeType {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
        }
    }

    /// Whether `value` has this type.
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
        }
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// May be set in configuration.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Set by the provider only.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Can be set; when left out the provider fills it in.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Whether a configuration may set the attribute.
    pub fn settable(&self) -> bool {
        self.optional
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Usage flags.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// If set, changing this attribute forces resource replacement.
    #[serde(default)]
    pub force_new: bool,
}

impl Attribute {
    /// An attribute of the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
        }
    }

    /// An optional string.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// A computed string.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// A string that can be set and is otherwise computed.
    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the attribute as forcing replacement.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// Schema of a resource or of the provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    #[serde(default)]
    pub version: u64,
    /// Attributes by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Schema {
    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// Schemas of everything the provider exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema of the provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Resource schemas by type name.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// An empty schema set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

/// Schema of the provider configuration block.
pub fn provider_config_schema() -> Schema {
    Schema::v0().with_attribute(
        "api_key",
        Attribute::optional_string()
            .sensitive()
            .with_description("Neon API key. Falls back to the NEON_API_KEY environment variable."),
    )
}

/// Schema of the `neon_project` resource.
pub fn project_schema() -> Schema {
    let mut schema = Schema::v0()
        .with_description(
            "A Neon serverless Postgres project with its default branch, database, role and endpoint.",
        )
        .with_attribute(
            "name",
            Attribute::optional_computed_string()
                .with_description("Project name. Neon generates one when left out."),
        )
        .with_attribute(
            "org_id",
            Attribute::optional_string()
                .with_force_new()
                .with_description("Organization owning the project."),
        )
        .with_attribute(
            "branch_name",
            Attribute::optional_string()
                .with_force_new()
                .with_description("Name of the default branch, applied at creation."),
        )
        .with_attribute(
            "role_name",
            Attribute::optional_string()
                .with_force_new()
                .with_description("Name of the default role, applied at creation."),
        )
        .with_attribute(
            "database_name",
            Attribute::optional_string()
                .with_force_new()
                .with_description("Name of the default database, applied at creation."),
        )
        .with_attribute("id", Attribute::computed_string());

    for output in [
        "default_branch_name",
        "default_database_name",
        "default_role_name",
        "default_role_password",
        "default_endpoint_host",
        "default_endpoint_host_pooler",
        "connection_uri",
        "connection_uri_pooler",
    ] {
        let attr = Attribute::computed_string();
        let attr = if ProjectState::is_sensitive(output) {
            attr.sensitive()
        } else {
            attr
        };
        schema = schema.with_attribute(output, attr);
    }
    schema
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// How serious the diagnostic is.
    pub severity: DiagnosticSeverity,
    /// Short description of the issue.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// An error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// A warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Attach a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_flags() {
        let computed = AttributeFlags::computed();
        assert!(!computed.settable());

        let optional_computed = AttributeFlags::optional_computed();
        assert!(optional_computed.settable());
        assert!(optional_computed.computed);
    }

    #[test]
    fn test_project_schema_inputs_and_outputs() {
        let schema = project_schema();

        let name = schema.attribute("name").unwrap();
        assert!(name.flags.optional && name.flags.computed);
        assert!(!name.force_new);

        for hint in ["org_id", "branch_name", "role_name", "database_name"] {
            let attr = schema.attribute(hint).unwrap();
            assert!(attr.force_new, "{} should force replacement", hint);
            assert!(attr.flags.optional);
        }

        for secret in ProjectState::SENSITIVE_ATTRIBUTES {
            let attr = schema.attribute(secret).unwrap();
            assert!(attr.flags.sensitive && attr.flags.computed);
        }
        assert!(!schema.attribute("default_endpoint_host").unwrap().flags.sensitive);
    }

    #[test]
    fn test_provider_config_schema_hides_key() {
        let schema = provider_config_schema();
        let key = schema.attribute("api_key").unwrap();
        assert!(key.flags.optional);
        assert!(key.flags.sensitive);
    }

    #[test]
    fn test_schema_serializes_type_tag() {
        let value = serde_json::to_value(Attribute::optional_string()).unwrap();
        assert_eq!(value["type"], "string");
        assert_eq!(value["optional"], true);
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("Expected a string")
            .with_attribute("name");

        assert!(err.is_error());
        assert_eq!(err.detail.as_deref(), Some("Expected a string"));
        assert_eq!(err.attribute.as_deref(), Some("name"));
        assert!(!Diagnostic::warning("deprecated").is_error());
    }
}
