//! Lifecycle of a Neon project: Create, Read, Update, Delete and Diff.
//!
//! [`ProjectResource`] drives a [`NeonApi`] client through the sequence of
//! calls each operation needs and projects the responses into a
//! [`ProjectState`]. Calls are issued one after another; the first failure
//! aborts the operation and whatever was gathered so far is dropped.
//!
//! Every call is raced against a [`CancellationToken`]. Once the token is
//! cancelled the running operation returns [`ProviderError::Cancelled`] and
//! issues no further calls.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::{
    ApiError, BranchSettings, ConnectionUriRequest, CreatedProject, NeonApi, ProjectCreateRequest,
    ProjectUpdateRequest,
};
use crate::defaults::{default_branch, default_database, default_endpoint};
use crate::diff::{self, DiffResult};
use crate::error::ProviderError;
use crate::pooler::{pooler_host, pooler_uri};
use crate::state::{ProjectArgs, ProjectState};

/// Result of reading a project back from Neon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Canonical project id.
    pub id: String,
    /// The inputs Neon can confirm: name, org and the resolved default names.
    pub inputs: ProjectArgs,
    /// The live state, with `inputs` set to the confirmed inputs.
    pub state: ProjectState,
}

/// Reconciles one Neon project.
pub struct ProjectResource<C: ?Sized> {
    client: Arc<C>,
    cancel: CancellationToken,
}

impl<C: NeonApi + ?Sized> ProjectResource<C> {
    /// Create a resource driving `client`, stopped by `cancel`.
    pub fn new(client: Arc<C>, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// Run one remote call unless the operation has been cancelled.
    async fn remote<T, F>(&self, step: String, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        debug!(step = %step, "Calling Neon API");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled(step)),
            result = call => result.map_err(|err| ProviderError::from_api(&step, err)),
        }
    }

    /// Create a project.
    ///
    /// With `dry_run` nothing is sent and a placeholder state is returned.
    #[instrument(skip(self, inputs), fields(name = ?inputs.name))]
    pub async fn create(
        &self,
        inputs: &ProjectArgs,
        dry_run: bool,
    ) -> Result<(String, ProjectState), ProviderError> {
        if dry_run {
            debug!("Previewing project creation");
            return Ok((String::new(), ProjectState::preview(inputs)));
        }

        let request = ProjectCreateRequest {
            name: inputs.name.clone(),
            org_id: inputs.org_id.clone(),
            branch: BranchSettings {
                name: inputs.branch_name.clone(),
                role_name: inputs.role_name.clone(),
                database_name: inputs.database_name.clone(),
            },
        };
        let created = self
            .remote(
                "create project".to_string(),
                self.client.create_project(&request),
            )
            .await?;

        let state = state_from_created(created, inputs)?;
        info!(project_id = %state.id, "Project created");
        Ok((state.id.clone(), state))
    }

    /// Rebuild the state of a project from Neon alone.
    #[instrument(skip(self))]
    pub async fn read(&self, project_id: &str) -> Result<ReadOutcome, ProviderError> {
        let project = self
            .remote(
                format!("get project '{}'", project_id),
                self.client.get_project(project_id),
            )
            .await?;
        let id = project.id;

        let branches = self
            .remote(
                format!("list branches of project '{}'", id),
                self.client.list_branches(&id),
            )
            .await?;
        let branch = default_branch(&branches).ok_or_else(|| {
            ProviderError::Inconsistency(format!(
                "project '{}' has no branch flagged as default",
                id
            ))
        })?;

        let databases = self
            .remote(
                format!(
                    "list databases on branch '{}' of project '{}'",
                    branch.id, id
                ),
                self.client.list_databases(&id, &branch.id),
            )
            .await?;
        let database = default_database(&databases).ok_or_else(|| {
            ProviderError::Inconsistency(format!(
                "branch '{}' of project '{}' has no databases",
                branch.id, id
            ))
        })?;

        let password = self
            .remote(
                format!(
                    "reveal password of role '{}' on branch '{}' of project '{}'",
                    database.owner_name, branch.id, id
                ),
                self.client
                    .get_role_password(&id, &branch.id, &database.owner_name),
            )
            .await?;

        let endpoints = self
            .remote(
                format!(
                    "list endpoints on branch '{}' of project '{}'",
                    branch.id, id
                ),
                self.client.list_endpoints(&id, &branch.id),
            )
            .await?;
        let endpoint = default_endpoint(&endpoints).ok_or_else(|| {
            ProviderError::Inconsistency(format!(
                "branch '{}' of project '{}' has no endpoints",
                branch.id, id
            ))
        })?;
        let host_pooler = pooler_host(&endpoint.host)?;

        let uri_request = ConnectionUriRequest {
            project_id: id.clone(),
            branch_id: branch.id.clone(),
            endpoint_id: endpoint.id.clone(),
            database_name: database.name.clone(),
            role_name: database.owner_name.clone(),
            pooled: false,
        };
        let connection_uri = self
            .remote(
                format!(
                    "get connection URI for database '{}' on endpoint '{}' of project '{}'",
                    database.name, endpoint.id, id
                ),
                self.client.get_connection_uri(&uri_request),
            )
            .await?;
        let connection_uri_pooler = pooler_uri(&connection_uri)?;

        let inputs = ProjectArgs {
            name: Some(project.name.clone()),
            org_id: project.org_id.clone(),
            branch_name: Some(branch.name.clone()),
            role_name: Some(database.owner_name.clone()),
            database_name: Some(database.name.clone()),
        };
        let state = ProjectState {
            id: id.clone(),
            name: Some(project.name),
            org_id: project.org_id,
            default_branch_name: branch.name.clone(),
            default_database_name: database.name.clone(),
            default_role_name: database.owner_name.clone(),
            default_role_password: password,
            default_endpoint_host: endpoint.host.clone(),
            default_endpoint_host_pooler: host_pooler,
            connection_uri,
            connection_uri_pooler,
            inputs: inputs.clone(),
        };
        debug!(project_id = %id, "Project read");

        Ok(ReadOutcome { id, inputs, state })
    }

    /// Apply `news` to a project whose current state is `olds`.
    ///
    /// Only the name can change in place. Inputs that only take effect at
    /// creation are rejected; the diff reports them as replacements. The
    /// name is compared against `olds` as given, so a state recorded before
    /// drift goes through [`ProjectResource::apply`] instead.
    #[instrument(skip(self, olds, news))]
    pub async fn update(
        &self,
        project_id: &str,
        olds: &ProjectState,
        news: &ProjectArgs,
        dry_run: bool,
    ) -> Result<ProjectState, ProviderError> {
        reject_create_only(project_id, olds, news)?;

        if !diff::is_changed(olds, news) {
            debug!(project_id = %project_id, "Nothing to update");
            return Ok(olds.clone().with_inputs(news.clone()));
        }

        if dry_run {
            let outcome = self.read(project_id).await?;
            return Ok(ProjectState {
                name: news.name.clone(),
                ..outcome.state.with_inputs(news.clone())
            });
        }

        let request = ProjectUpdateRequest {
            name: news.name.clone(),
        };
        let project = self
            .remote(
                format!("update project '{}'", project_id),
                self.client.update_project(project_id, &request),
            )
            .await?;
        info!(project_id = %project_id, "Project updated");

        Ok(ProjectState {
            name: Some(project.name),
            org_id: project.org_id,
            ..olds.clone().with_inputs(news.clone())
        })
    }

    /// The live state of a recorded project, keeping the recorded inputs.
    pub async fn refresh(&self, olds: &ProjectState) -> Result<ProjectState, ProviderError> {
        let outcome = self.read(&olds.id).await?;
        Ok(outcome.state.with_inputs(olds.inputs.clone()))
    }

    /// Bring a recorded project in line with `news`.
    ///
    /// Update runs against the live state rather than the recorded one: a
    /// name changed outside the provider is set back, and other drift is
    /// taken over into the returned state.
    #[instrument(skip(self, olds, news), fields(project_id = %olds.id))]
    pub async fn apply(
        &self,
        olds: &ProjectState,
        news: &ProjectArgs,
    ) -> Result<ProjectState, ProviderError> {
        reject_create_only(&olds.id, olds, news)?;
        let live = self.refresh(olds).await?;
        self.update(&olds.id, &live, news, false).await
    }

    /// Delete a project.
    #[instrument(skip(self))]
    pub async fn delete(&self, project_id: &str) -> Result<(), ProviderError> {
        self.remote(
            format!("delete project '{}'", project_id),
            self.client.delete_project(project_id),
        )
        .await?;
        info!(project_id = %project_id, "Project deleted");
        Ok(())
    }

    /// Read the live state and classify what has to change.
    #[instrument(skip(self, olds, news))]
    pub async fn diff(
        &self,
        project_id: &str,
        olds: &ProjectState,
        news: &ProjectArgs,
    ) -> Result<DiffResult, ProviderError> {
        let live = self.read(project_id).await?;
        let result = diff::compute(&live.state, olds, news);
        debug!(
            project_id = %project_id,
            has_changes = result.has_changes,
            delete_before_replace = result.delete_before_replace,
            "Diff computed"
        );
        Ok(result)
    }
}

fn reject_create_only(
    project_id: &str,
    olds: &ProjectState,
    news: &ProjectArgs,
) -> Result<(), ProviderError> {
    let create_only = diff::create_only_changes(olds, news);
    if create_only.is_empty() {
        return Ok(());
    }
    Err(ProviderError::UnsupportedChange(format!(
        "project '{}': {} can only be set when the project is created",
        project_id,
        create_only.join(", ")
    )))
}

/// Project the creation response into a state.
fn state_from_created(
    created: CreatedProject,
    inputs: &ProjectArgs,
) -> Result<ProjectState, ProviderError> {
    let id = created.project.id;

    let database = default_database(&created.databases).ok_or_else(|| {
        ProviderError::Inconsistency(format!(
            "creation response of project '{}' lists no databases",
            id
        ))
    })?;
    let endpoint = default_endpoint(&created.endpoints).ok_or_else(|| {
        ProviderError::Inconsistency(format!(
            "creation response of project '{}' lists no endpoints",
            id
        ))
    })?;

    let password = created
        .roles
        .iter()
        .find(|role| role.name == database.owner_name)
        .and_then(|role| role.password.clone());
    if password.is_none() {
        warn!(
            project_id = %id,
            role = %database.owner_name,
            "Creation response carries no password for the default role"
        );
    }

    let connection_uri = created
        .connection_uris
        .iter()
        .find(|details| {
            details.connection_parameters.database == database.name
                && details.connection_parameters.role == database.owner_name
        })
        .map(|details| details.connection_uri.clone())
        .ok_or_else(|| {
            ProviderError::Inconsistency(format!(
                "creation response of project '{}' has no connection URI for database '{}'",
                id, database.name
            ))
        })?;

    Ok(ProjectState {
        name: Some(created.project.name),
        org_id: created.project.org_id,
        default_branch_name: created.branch.name,
        default_database_name: database.name.clone(),
        default_role_name: database.owner_name.clone(),
        default_role_password: password.unwrap_or_default(),
        default_endpoint_host_pooler: pooler_host(&endpoint.host)?,
        default_endpoint_host: endpoint.host.clone(),
        connection_uri_pooler: pooler_uri(&connection_uri)?,
        connection_uri,
        inputs: inputs.clone(),
        id,
    })
}
