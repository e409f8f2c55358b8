//! Testing utilities for the Neon provider.
//!
//! - [`FakeNeon`]: an in-memory [`NeonApi`] with per-method call counters,
//!   failure injection, stalled calls and helpers to change projects behind
//!   the provider's back (drift).
//! - [`FakeClientFactory`]: hands out a shared [`FakeNeon`] on `configure`.
//! - [`ProviderTester`]: drives a [`ProviderService`] without a host.
//! - Plan assertion helpers.
//!
//! # Example
//!
//! ```ignore
//! use neon_provider::testing::{FakeClientFactory, ProviderTester};
//! use neon_provider::{NeonProvider, ProviderInfo};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_project() {
//!     let factory = FakeClientFactory::new();
//!     let tester = ProviderTester::new(NeonProvider::new(ProviderInfo::from_package(), factory));
//!     tester.configure(json!({"api_key": "test"})).await.unwrap();
//!
//!     let state = tester.create("neon_project", json!({"name": "shop"})).await.unwrap();
//!     assert_eq!(state["name"], "shop");
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::api::{
    ApiError, Branch, ClientFactory, ConnectionDetails, ConnectionParameters,
    ConnectionUriRequest, CreatedProject, Database, Endpoint, NeonApi, Project,
    ProjectCreateRequest, ProjectUpdateRequest, Role,
};
use crate::config::ClientConfig;
use crate::error::ProviderError;
use crate::pooler::pooler_host;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

// =========================================================================
// Fake Neon API
// =========================================================================

/// The [`NeonApi`] methods, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// `create_project`
    CreateProject,
    /// `get_project`
    GetProject,
    /// `update_project`
    UpdateProject,
    /// `delete_project`
    DeleteProject,
    /// `list_branches`
    ListBranches,
    /// `list_databases`
    ListDatabases,
    /// `get_role_password`
    GetRolePassword,
    /// `list_endpoints`
    ListEndpoints,
    /// `get_connection_uri`
    GetConnectionUri,
}

/// Everything the fake stores about one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeProject {
    /// The project itself.
    pub project: Project,
    /// Its branches.
    pub branches: Vec<Branch>,
    /// Databases on all branches.
    pub databases: Vec<Database>,
    /// Roles on all branches, with passwords.
    pub roles: Vec<Role>,
    /// Compute endpoints.
    pub endpoints: Vec<Endpoint>,
}

#[derive(Default)]
struct FakeState {
    projects: BTreeMap<String, FakeProject>,
    calls: HashMap<Method, usize>,
    failures: HashMap<Method, ApiError>,
    stalled: HashSet<Method>,
    creation_edit: Option<CreationEdit>,
    sequence: i64,
}

type CreationEdit = Box<dyn FnOnce(&mut CreatedProject) + Send>;

impl FakeState {
    fn next(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    fn timestamp(&mut self) -> DateTime<Utc> {
        let seq = self.next();
        DateTime::<Utc>::default() + Duration::days(19_723) + Duration::seconds(seq)
    }

    fn project(&self, project_id: &str) -> Result<&FakeProject, ApiError> {
        self.projects
            .get(project_id)
            .ok_or_else(|| ApiError::NotFound(format!("project {} not found", project_id)))
    }

    fn new_endpoint(&mut self, branch_id: &str) -> Endpoint {
        let seq = self.next();
        let id = format!("ep-fake-{}", seq);
        Endpoint {
            host: format!("{}.us-east-2.aws.neon.tech", id),
            id,
            branch_id: branch_id.to_string(),
            created_at: self.timestamp(),
        }
    }
}

/// In-memory stand-in for the Neon API.
///
/// A failure registered with [`FakeNeon::fail_next`] is returned by the next
/// call of that method, which is still counted. A stalled method never
/// completes.
#[derive(Default)]
pub struct FakeNeon {
    state: Mutex<FakeState>,
}

impl FakeNeon {
    /// A fake with no projects.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: Method) -> usize {
        self.lock().calls.get(&method).copied().unwrap_or(0)
    }

    /// Number of calls made to any method.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Make the next call of `method` fail with `error`.
    pub fn fail_next(&self, method: Method, error: ApiError) {
        self.lock().failures.insert(method, error);
    }

    /// Make every call of `method` hang.
    pub fn stall(&self, method: Method) {
        self.lock().stalled.insert(method);
    }

    /// Change the response of the next `create_project` call.
    ///
    /// The stored project is left as created; only what the caller sees is
    /// edited.
    pub fn edit_next_creation(&self, edit: impl FnOnce(&mut CreatedProject) + Send + 'static) {
        self.lock().creation_edit = Some(Box::new(edit));
    }

    /// Snapshot of a stored project.
    pub fn project(&self, project_id: &str) -> Option<FakeProject> {
        self.lock().projects.get(project_id).cloned()
    }

    /// Number of stored projects.
    pub fn project_count(&self) -> usize {
        self.lock().projects.len()
    }

    /// Mutate a stored project, as someone using the console would.
    ///
    /// # Panics
    ///
    /// Panics if the project does not exist.
    pub fn with_project<R>(&self, project_id: &str, f: impl FnOnce(&mut FakeProject) -> R) -> R {
        let mut state = self.lock();
        let project = state
            .projects
            .get_mut(project_id)
            .unwrap_or_else(|| panic!("fake project {} does not exist", project_id));
        f(project)
    }

    /// Add a database owned by a new role on the default branch.
    pub fn add_database(&self, project_id: &str, name: &str, owner: &str) {
        let mut state = self.lock();
        let created_at = state.timestamp();
        let project = state
            .projects
            .get_mut(project_id)
            .unwrap_or_else(|| panic!("fake project {} does not exist", project_id));
        let branch_id = default_branch_id(project);
        project.roles.push(Role {
            branch_id: branch_id.clone(),
            name: owner.to_string(),
            password: Some(format!("{}-password", owner)),
            created_at,
        });
        project.databases.push(Database {
            branch_id,
            name: name.to_string(),
            owner_name: owner.to_string(),
            created_at,
        });
    }

    /// Add a compute endpoint to the default branch.
    pub fn add_endpoint(&self, project_id: &str) {
        let mut state = self.lock();
        let branch_id = state
            .projects
            .get(project_id)
            .map(default_branch_id)
            .unwrap_or_else(|| panic!("fake project {} does not exist", project_id));
        let endpoint = state.new_endpoint(&branch_id);
        if let Some(project) = state.projects.get_mut(project_id) {
            project.endpoints.push(endpoint);
        }
    }

    /// Count the call and apply injected behaviour.
    async fn enter(&self, method: Method) -> Result<(), ApiError> {
        let (stalled, failure) = {
            let mut state = self.lock();
            *state.calls.entry(method).or_insert(0) += 1;
            (
                state.stalled.contains(&method),
                state.failures.remove(&method),
            )
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn default_branch_id(project: &FakeProject) -> String {
    project
        .branches
        .iter()
        .find(|b| b.default)
        .map(|b| b.id.clone())
        .unwrap_or_default()
}

fn connection_uri(role: &str, password: &str, host: &str, database: &str) -> String {
    format!(
        "postgresql://{}:{}@{}/{}?sslmode=require",
        role, password, host, database
    )
}

#[async_trait]
impl NeonApi for FakeNeon {
    async fn create_project(
        &self,
        request: &ProjectCreateRequest,
    ) -> Result<CreatedProject, ApiError> {
        self.enter(Method::CreateProject).await?;
        let mut state = self.lock();

        let seq = state.next();
        let project_id = format!("fake-project-{}", seq);
        let branch_id = format!("br-fake-{}", seq);
        let created_at = state.timestamp();

        let project = Project {
            id: project_id.clone(),
            name: request
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| project_id.clone()),
            org_id: request.org_id.clone(),
            created_at,
        };
        let branch = Branch {
            id: branch_id.clone(),
            project_id: project_id.clone(),
            name: request
                .branch
                .name
                .clone()
                .unwrap_or_else(|| "main".to_string()),
            default: true,
            created_at,
        };
        let role_name = request
            .branch
            .role_name
            .clone()
            .unwrap_or_else(|| "neondb_owner".to_string());
        let database_name = request
            .branch
            .database_name
            .clone()
            .unwrap_or_else(|| "neondb".to_string());
        let password = format!("pw-{}", seq);
        let role = Role {
            branch_id: branch_id.clone(),
            name: role_name.clone(),
            password: Some(password.clone()),
            created_at,
        };
        let database = Database {
            branch_id: branch_id.clone(),
            name: database_name.clone(),
            owner_name: role_name.clone(),
            created_at,
        };
        let endpoint = state.new_endpoint(&branch_id);
        let uri = connection_uri(&role_name, &password, &endpoint.host, &database_name);

        let stored = FakeProject {
            project: project.clone(),
            branches: vec![branch.clone()],
            databases: vec![database.clone()],
            roles: vec![role.clone()],
            endpoints: vec![endpoint.clone()],
        };
        state.projects.insert(project_id, stored);

        let mut created = CreatedProject {
            project,
            branch,
            databases: vec![database],
            roles: vec![role],
            connection_uris: vec![ConnectionDetails {
                connection_uri: uri,
                connection_parameters: ConnectionParameters {
                    database: database_name,
                    role: role_name,
                    host: endpoint.host.clone(),
                },
            }],
            endpoints: vec![endpoint],
        };
        if let Some(edit) = state.creation_edit.take() {
            edit(&mut created);
        }
        Ok(created)
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, ApiError> {
        self.enter(Method::GetProject).await?;
        Ok(self.lock().project(project_id)?.project.clone())
    }

    async fn update_project(
        &self,
        project_id: &str,
        request: &ProjectUpdateRequest,
    ) -> Result<Project, ApiError> {
        self.enter(Method::UpdateProject).await?;
        let mut state = self.lock();
        let stored = state
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ApiError::NotFound(format!("project {} not found", project_id)))?;
        if let Some(name) = &request.name {
            stored.project.name = name.clone();
        }
        Ok(stored.project.clone())
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), ApiError> {
        self.enter(Method::DeleteProject).await?;
        self.lock()
            .projects
            .remove(project_id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("project {} not found", project_id)))
    }

    async fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>, ApiError> {
        self.enter(Method::ListBranches).await?;
        Ok(self.lock().project(project_id)?.branches.clone())
    }

    async fn list_databases(
        &self,
        project_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Database>, ApiError> {
        self.enter(Method::ListDatabases).await?;
        let state = self.lock();
        let project = state.project(project_id)?;
        Ok(project
            .databases
            .iter()
            .filter(|db| db.branch_id == branch_id)
            .cloned()
            .collect())
    }

    async fn get_role_password(
        &self,
        project_id: &str,
        branch_id: &str,
        role_name: &str,
    ) -> Result<String, ApiError> {
        self.enter(Method::GetRolePassword).await?;
        let state = self.lock();
        state
            .project(project_id)?
            .roles
            .iter()
            .find(|role| role.branch_id == branch_id && role.name == role_name)
            .and_then(|role| role.password.clone())
            .ok_or_else(|| ApiError::NotFound(format!("role {} not found", role_name)))
    }

    async fn list_endpoints(
        &self,
        project_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Endpoint>, ApiError> {
        self.enter(Method::ListEndpoints).await?;
        let state = self.lock();
        Ok(state
            .project(project_id)?
            .endpoints
            .iter()
            .filter(|ep| ep.branch_id == branch_id)
            .cloned()
            .collect())
    }

    async fn get_connection_uri(
        &self,
        request: &ConnectionUriRequest,
    ) -> Result<String, ApiError> {
        self.enter(Method::GetConnectionUri).await?;
        let state = self.lock();
        let project = state.project(&request.project_id)?;
        let endpoint = project
            .endpoints
            .iter()
            .find(|ep| ep.id == request.endpoint_id && ep.branch_id == request.branch_id)
            .ok_or_else(|| {
                ApiError::NotFound(format!("endpoint {} not found", request.endpoint_id))
            })?;
        let password = project
            .roles
            .iter()
            .find(|role| role.branch_id == request.branch_id && role.name == request.role_name)
            .and_then(|role| role.password.clone())
            .ok_or_else(|| ApiError::NotFound(format!("role {} not found", request.role_name)))?;
        let host = if request.pooled {
            pooler_host(&endpoint.host).map_err(|e| ApiError::Rejected {
                status: 400,
                message: e.to_string(),
            })?
        } else {
            endpoint.host.clone()
        };
        Ok(connection_uri(
            &request.role_name,
            &password,
            &host,
            &request.database_name,
        ))
    }
}

/// Factory handing out one shared [`FakeNeon`].
///
/// Keeps the last [`ClientConfig`] it was asked for, so tests can check what
/// `configure` resolved. The API key `invalid` is refused as unauthorized.
#[derive(Clone, Default)]
pub struct FakeClientFactory {
    fake: Arc<FakeNeon>,
    last_config: Arc<Mutex<Option<ClientConfig>>>,
}

impl FakeClientFactory {
    /// A factory around a fresh fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fake behind every client this factory builds.
    pub fn fake(&self) -> Arc<FakeNeon> {
        Arc::clone(&self.fake)
    }

    /// The settings of the last `connect` call.
    pub fn last_config(&self) -> Option<ClientConfig> {
        self.last_config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Client handle produced by [`FakeClientFactory`].
pub struct SharedFake(Arc<FakeNeon>);

#[async_trait]
impl NeonApi for SharedFake {
    async fn create_project(
        &self,
        request: &ProjectCreateRequest,
    ) -> Result<CreatedProject, ApiError> {
        self.0.create_project(request).await
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, ApiError> {
        self.0.get_project(project_id).await
    }

    async fn update_project(
        &self,
        project_id: &str,
        request: &ProjectUpdateRequest,
    ) -> Result<Project, ApiError> {
        self.0.update_project(project_id, request).await
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), ApiError> {
        self.0.delete_project(project_id).await
    }

    async fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>, ApiError> {
        self.0.list_branches(project_id).await
    }

    async fn list_databases(
        &self,
        project_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Database>, ApiError> {
        self.0.list_databases(project_id, branch_id).await
    }

    async fn get_role_password(
        &self,
        project_id: &str,
        branch_id: &str,
        role_name: &str,
    ) -> Result<String, ApiError> {
        self.0
            .get_role_password(project_id, branch_id, role_name)
            .await
    }

    async fn list_endpoints(
        &self,
        project_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Endpoint>, ApiError> {
        self.0.list_endpoints(project_id, branch_id).await
    }

    async fn get_connection_uri(
        &self,
        request: &ConnectionUriRequest,
    ) -> Result<String, ApiError> {
        self.0.get_connection_uri(request).await
    }
}

impl ClientFactory for FakeClientFactory {
    type Client = SharedFake;

    fn connect(&self, config: &ClientConfig) -> Result<Self::Client, ApiError> {
        if config.api_key == "invalid" {
            return Err(ApiError::Unauthorized("API key rejected".to_string()));
        }
        *self
            .last_config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config.clone());
        Ok(SharedFake(self.fake()))
    }
}

// =========================================================================
// Provider tester
// =========================================================================

/// A test harness for [`ProviderService`] implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed.clone(), proposed)
            .await
    }

    /// Plan a change to an existing resource.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed.clone(), proposed)
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned).await
    }

    /// Read the current state of a resource.
    pub async fn read(&self, resource_type: &str, current: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan updates the project in place.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "Expected changes, but got none");
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan replaces the project.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan has a change for a specific attribute.
///
/// # Panics
///
/// Panics if the plan does not change `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let found = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        found,
        "Expected an error containing '{}'. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
