//! Contract of the Neon API client consumed by the provider.
//!
//! The provider does not talk HTTP itself. It drives an implementation of
//! [`NeonApi`] built by a [`ClientFactory`] from the provider configuration,
//! and only relies on the request/response models defined here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClientConfig;

/// Errors reported by a [`NeonApi`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service declined the request.
    #[error("rejected with HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code returned by the service.
        status: u16,
        /// Message returned by the service, verbatim.
        message: String,
    },

    /// The API key was refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request never got a response (DNS, TLS, timeout, ...).
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A Neon project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project id, e.g. `odd-leaf-12345678`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Organization owning the project; absent for personal accounts.
    #[serde(default)]
    pub org_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A branch of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch id.
    pub id: String,
    /// Id of the project the branch belongs to.
    pub project_id: String,
    /// Branch name.
    pub name: String,
    /// Set on the project's default branch.
    #[serde(default)]
    pub default: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A database on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    /// Id of the branch holding the database.
    pub branch_id: String,
    /// Database name.
    pub name: String,
    /// Name of the role owning the database.
    pub owner_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A Postgres role on a branch.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Id of the branch holding the role.
    pub branch_id: String,
    /// Role name.
    pub name: String,
    /// Only returned right after the role (or its project) is created.
    #[serde(default)]
    pub password: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Role")
            .field("branch_id", &self.branch_id)
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| crate::state::REDACTED))
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// A compute endpoint serving a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint id.
    pub id: String,
    /// Id of the branch the endpoint serves.
    pub branch_id: String,
    /// Direct host name.
    pub host: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// What a connection URI returned at creation points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Database name.
    pub database: String,
    /// Role name.
    pub role: String,
    /// Host name.
    pub host: String,
}

/// A connection URI returned alongside a newly created project.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    /// The URI, password included.
    pub connection_uri: String,
    /// Database, role and host the URI points at.
    pub connection_parameters: ConnectionParameters,
}

impl std::fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("connection_uri", &crate::state::REDACTED)
            .field("connection_parameters", &self.connection_parameters)
            .finish()
    }
}

/// Everything the service returns when a project is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedProject {
    /// The new project.
    pub project: Project,
    /// Its default branch.
    pub branch: Branch,
    /// Databases created on the default branch.
    #[serde(default)]
    pub databases: Vec<Database>,
    /// Roles created on the default branch, with passwords.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Compute endpoints of the default branch.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// One URI per database and role pair.
    #[serde(default)]
    pub connection_uris: Vec<ConnectionDetails>,
}

/// Settings for the branch created together with a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSettings {
    /// Branch name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name of the role owning the database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    /// Database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

impl BranchSettings {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.role_name.is_none() && self.database_name.is_none()
    }
}

/// Body of the project creation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreateRequest {
    /// Project name; Neon generates one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Organization to create the project in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Names for the default branch, role and database.
    #[serde(default, skip_serializing_if = "BranchSettings::is_empty")]
    pub branch: BranchSettings,
}

/// Body of the project update call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUpdateRequest {
    /// New project name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Parameters of a connection URI lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionUriRequest {
    /// Project id.
    pub project_id: String,
    /// Branch id.
    pub branch_id: String,
    /// Endpoint id.
    pub endpoint_id: String,
    /// Database to connect to.
    pub database_name: String,
    /// Role to connect as.
    pub role_name: String,
    /// Whether to connect through the connection pooler.
    pub pooled: bool,
}

/// Neon API operations the provider relies on.
///
/// Implementations own transport concerns: timeouts, retries, rate limits and
/// request headers. Calls are issued one at a time per resource.
#[async_trait]
pub trait NeonApi: Send + Sync {
    /// Create a project together with its default branch, database, role and endpoint.
    async fn create_project(
        &self,
        request: &ProjectCreateRequest,
    ) -> Result<CreatedProject, ApiError>;

    /// Fetch a project by id.
    async fn get_project(&self, project_id: &str) -> Result<Project, ApiError>;

    /// Update the mutable settings of a project.
    async fn update_project(
        &self,
        project_id: &str,
        request: &ProjectUpdateRequest,
    ) -> Result<Project, ApiError>;

    /// Delete a project and everything in it.
    async fn delete_project(&self, project_id: &str) -> Result<(), ApiError>;

    /// List the branches of a project.
    async fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>, ApiError>;

    /// List the databases on a branch.
    async fn list_databases(
        &self,
        project_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Database>, ApiError>;

    /// Reveal the password of a role.
    async fn get_role_password(
        &self,
        project_id: &str,
        branch_id: &str,
        role_name: &str,
    ) -> Result<String, ApiError>;

    /// List the compute endpoints of a branch.
    async fn list_endpoints(
        &self,
        project_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Endpoint>, ApiError>;

    /// Build the connection URI for a database/role pair on an endpoint.
    async fn get_connection_uri(&self, request: &ConnectionUriRequest)
        -> Result<String, ApiError>;
}

/// Builds API clients once the provider has been configured.
pub trait ClientFactory: Send + Sync + 'static {
    /// The client type produced by this factory.
    type Client: NeonApi + 'static;

    /// Build a client for the given settings.
    fn connect(&self, config: &ClientConfig) -> Result<Self::Client, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_skips_empty_branch_settings() {
        let request = ProjectCreateRequest {
            name: Some("analytics".to_string()),
            ..Default::default()
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, json!({"name": "analytics"}));

        let request = ProjectCreateRequest {
            name: None,
            org_id: Some("org-1".to_string()),
            branch: BranchSettings {
                role_name: Some("app".to_string()),
                ..Default::default()
            },
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, json!({"org_id": "org-1", "branch": {"role_name": "app"}}));
    }

    #[test]
    fn test_branch_default_flag_defaults_to_false() {
        let branch: Branch = serde_json::from_value(json!({
            "id": "br-1",
            "project_id": "p-1",
            "name": "dev",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(!branch.default);
    }

    #[test]
    fn test_role_debug_hides_password() {
        let role = Role {
            branch_id: "br-1".to_string(),
            name: "owner".to_string(),
            password: Some("hunter2".to_string()),
            created_at: DateTime::<Utc>::default(),
        };
        let rendered = format!("{:?}", role);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("owner"));
    }
}
