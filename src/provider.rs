//! [`NeonProvider`]: the `neon_project` resource behind [`ProviderService`].
//!
//! The adapter parses host JSON into [`ProjectArgs`] / [`ProjectState`],
//! hands them to a [`ProjectResource`] built around the configured client and
//! turns the results back into JSON, plans and diagnostics.
//!
//! Desired input is taken from the `inputs` object of a state when there is
//! one (planned states carry it), otherwise from the top-level attributes of
//! the configuration.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::api::ClientFactory;
use crate::config::{ProviderConfig, ProviderInfo, API_KEY_ENV};
use crate::diff::{self, DiffKind, DiffResult};
use crate::error::ProviderError;
use crate::project::ProjectResource;
use crate::schema::{project_schema, provider_config_schema, Diagnostic, ProviderSchema};
use crate::service::{error_diagnostic, ProviderService};
use crate::state::{ProjectArgs, ProjectState};
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use crate::validation;

/// Resource type name of a Neon project.
pub const PROJECT_RESOURCE: &str = "neon_project";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Provider managing Neon projects through clients built by `F`.
pub struct NeonProvider<F: ClientFactory> {
    info: ProviderInfo,
    factory: F,
    env: EnvLookup,
    client: RwLock<Option<Arc<F::Client>>>,
    cancel: CancellationToken,
}

impl<F: ClientFactory> NeonProvider<F> {
    /// Create an unconfigured provider.
    pub fn new(info: ProviderInfo, factory: F) -> Self {
        Self {
            info,
            factory,
            env: Arc::new(|name| std::env::var(name).ok()),
            client: RwLock::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the environment lookup used to resolve the API key.
    pub fn with_env_lookup<L>(mut self, lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Name and version this provider reports.
    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn resource(
        &self,
        resource_type: &str,
    ) -> Result<ProjectResource<F::Client>, ProviderError> {
        if resource_type != PROJECT_RESOURCE {
            return Err(ProviderError::UnknownResource(resource_type.to_string()));
        }
        let client = self.client.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration(
                "provider is not configured: call configure before managing resources".to_string(),
            )
        })?;
        Ok(ProjectResource::new(client, self.cancel.clone()))
    }

    async fn plan_project(
        &self,
        resource: &ProjectResource<F::Client>,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        let prior_state = match prior_state {
            Some(prior) if !prior.is_null() => prior,
            _ => {
                if proposed_state.is_null() {
                    return Ok(PlanResult::no_change(Value::Null));
                }
                let args = parse_args(&proposed_state)?;
                let (_, preview) = resource.create(&args, true).await?;
                let planned = serde_json::to_value(&preview)?;
                let changes = added_changes(&planned);
                return Ok(PlanResult::with_changes(planned, changes, false));
            },
        };

        if proposed_state.is_null() {
            let changes = removed_changes(&prior_state);
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let olds = parse_state(&prior_state)?;
        let news = parse_args(&proposed_state)?;
        let live = resource.refresh(&olds).await?;
        let diff = diff::compute(&live, &olds, &news);

        if !diff.has_changes {
            let planned = serde_json::to_value(olds.with_inputs(news))?;
            return Ok(PlanResult::no_change(planned));
        }

        let replace = diff.requires_replace();
        let planned = if replace {
            ProjectState::preview(&news)
        } else {
            resource.update(&olds.id, &live, &news, true).await?
        };
        let planned = serde_json::to_value(&planned)?;
        let live = serde_json::to_value(&live)?;
        let changes = diff_changes(&diff, &prior_state, &live, &planned);

        Ok(PlanResult::with_changes(planned, changes, replace)
            .deleting_first(diff.delete_before_replace))
    }
}

/// Desired input: the `inputs` object of a state, or the configuration itself.
fn parse_args(value: &Value) -> Result<ProjectArgs, ProviderError> {
    let source = match value.get("inputs") {
        Some(inputs) if inputs.is_object() => inputs,
        _ => value,
    };
    Ok(serde_json::from_value(source.clone())?)
}

/// A recorded state; it must name the project it belongs to.
fn parse_state(value: &Value) -> Result<ProjectState, ProviderError> {
    let state: ProjectState = serde_json::from_value(value.clone())?;
    if state.id.is_empty() {
        return Err(ProviderError::Validation(
            "state does not carry a project id".to_string(),
        ));
    }
    Ok(state)
}

/// Value of a state attribute, looking into `inputs` for creation hints.
/// Empty strings stand for values not known yet.
fn attribute_value(state: &Value, key: &str) -> Value {
    let value = state
        .get(key)
        .or_else(|| state.get("inputs").and_then(|inputs| inputs.get(key)))
        .cloned()
        .unwrap_or(Value::Null);
    match value {
        Value::String(s) if s.is_empty() => Value::Null,
        other => other,
    }
}

fn state_keys(state: &Value) -> Vec<String> {
    state
        .as_object()
        .map(|obj| obj.keys().filter(|k| *k != "inputs").cloned().collect())
        .unwrap_or_default()
}

fn masked_if_sensitive(change: AttributeChange) -> AttributeChange {
    if ProjectState::is_sensitive(&change.path) {
        change.masked()
    } else {
        change
    }
}

fn added_changes(planned: &Value) -> Vec<AttributeChange> {
    state_keys(planned)
        .into_iter()
        .map(|key| {
            let value = attribute_value(planned, &key);
            masked_if_sensitive(AttributeChange::added(key, value))
        })
        .collect()
}

fn removed_changes(prior: &Value) -> Vec<AttributeChange> {
    state_keys(prior)
        .into_iter()
        .filter_map(|key| {
            let value = attribute_value(prior, &key);
            (!value.is_null()).then(|| masked_if_sensitive(AttributeChange::removed(key, value)))
        })
        .collect()
}

/// Drift that the plan sets back starts from the live value; drift that the
/// plan takes over starts from the recorded one.
fn diff_changes(
    diff: &DiffResult,
    prior: &Value,
    live: &Value,
    planned: &Value,
) -> Vec<AttributeChange> {
    diff.detailed_diff
        .iter()
        .map(|(key, property)| {
            let after = attribute_value(planned, key);
            let current = attribute_value(live, key);
            let before = if current == after {
                attribute_value(prior, key)
            } else {
                current
            };
            let change = AttributeChange::modified(key.as_str(), before, after);
            let change = if property.kind == DiffKind::Update {
                change
            } else {
                change.replacing()
            };
            masked_if_sensitive(change)
        })
        .collect()
}

#[async_trait::async_trait]
impl<F: ClientFactory> ProviderService for NeonProvider<F> {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(provider_config_schema())
            .with_resource(PROJECT_RESOURCE, project_schema())
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validation::validate(&provider_config_schema(), &config);
        if !diagnostics.is_empty() {
            return Ok(diagnostics);
        }

        let parsed = match ProviderConfig::from_value(config) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(vec![error_diagnostic(&e)]),
        };
        match parsed.resolve_api_key(self.env.as_ref()) {
            Err(e) => diagnostics.push(error_diagnostic(&e)),
            Ok(_) if !parsed.has_api_key() => diagnostics.push(
                Diagnostic::warning(format!("Using the API key from {}", API_KEY_ENV))
                    .with_detail("Set `api_key` to pin the key in the provider configuration")
                    .with_attribute("api_key"),
            ),
            Ok(_) => {},
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let parsed = ProviderConfig::from_value(config)?;
        let client_config = parsed.client_config(&self.info, self.env.as_ref())?;

        let client = self.factory.connect(&client_config).map_err(|e| {
            error!(error = %e, "Failed to build Neon API client");
            ProviderError::Configuration(format!("failed to build Neon API client: {}", e))
        })?;

        *self.client.write().await = Some(Arc::new(client));
        info!(user_agent = %client_config.user_agent, "Provider configured");
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stopping provider, in-flight operations are abandoned");
        self.cancel.cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        if resource_type != PROJECT_RESOURCE {
            return Err(ProviderError::UnknownResource(resource_type.to_string()));
        }
        Ok(validation::validate(&project_schema(), &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let plan = self
            .plan_project(&resource, prior_state, proposed_state)
            .await
            .inspect_err(|e| error!(error = %e, "Plan failed"))?;
        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            delete_before_replace = plan.delete_before_replace,
            "Plan completed"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state))]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let args = parse_args(&planned_state)?;
        let (_, state) = resource
            .create(&args, false)
            .await
            .inspect_err(|e| error!(error = %e, "Create failed"))?;
        Ok(serde_json::to_value(state)?)
    }

    #[instrument(skip(self, current_state))]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let olds = parse_state(&current_state)?;
        let outcome = resource.read(&olds.id).await.inspect_err(|e| {
            if !e.is_not_found() {
                error!(error = %e, "Read failed");
            }
        })?;
        Ok(serde_json::to_value(outcome.state.with_inputs(olds.inputs))?)
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let olds = parse_state(&prior_state)?;
        let news = parse_args(&planned_state)?;
        let state = resource
            .apply(&olds, &news)
            .await
            .inspect_err(|e| error!(error = %e, "Update failed"))?;
        Ok(serde_json::to_value(state)?)
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type).await?;
        let olds = parse_state(&current_state)?;
        resource
            .delete(&olds.id)
            .await
            .inspect_err(|e| error!(error = %e, "Delete failed"))
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let outcome = resource
            .read(id)
            .await
            .inspect_err(|e| error!(error = %e, "Import failed"))?;
        info!(project_id = %outcome.id, "Project imported");
        Ok(vec![ImportedResource::new(
            PROJECT_RESOURCE,
            serde_json::to_value(outcome.state)?,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClientFactory, Method};
    use serde_json::json;

    fn provider() -> (NeonProvider<FakeClientFactory>, FakeClientFactory) {
        let factory = FakeClientFactory::new();
        let provider = NeonProvider::new(ProviderInfo::new("neon", "0.9.0"), factory.clone())
            .with_env_lookup(|_| None);
        (provider, factory)
    }

    #[tokio::test]
    async fn test_configure_builds_client_with_user_agent() {
        let (provider, factory) = provider();
        provider.configure(json!({"api_key": "k"})).await.unwrap();

        let config = factory.last_config().unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.user_agent, "neon/0.9.0");
    }

    #[tokio::test]
    async fn test_configure_uses_env_key() {
        let factory = FakeClientFactory::new();
        let provider = NeonProvider::new(ProviderInfo::new("neon", "0.9.0"), factory.clone())
            .with_env_lookup(|name| (name == "NEON_API_KEY").then(|| "env-key".to_string()));
        provider.configure(Value::Null).await.unwrap();
        assert_eq!(factory.last_config().unwrap().api_key, "env-key");
    }

    #[tokio::test]
    async fn test_configure_without_key_fails() {
        let (provider, factory) = provider();
        let err = provider.configure(json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(factory.last_config().is_none());

        let diagnostics = provider.validate_provider_config(json!({})).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("NEON_API_KEY"));
    }

    #[tokio::test]
    async fn test_validate_provider_config_warns_on_env_key() {
        let (provider, _) = provider();
        let provider = provider
            .with_env_lookup(|name| (name == "NEON_API_KEY").then(|| "env-key".to_string()));

        let diagnostics = provider.validate_provider_config(json!({})).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
        assert!(diagnostics[0].summary.contains("NEON_API_KEY"));
        assert!(!diagnostics[0].summary.contains("env-key"));

        let diagnostics = provider
            .validate_provider_config(json!({"api_key": "k"}))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_configure_rejected_key() {
        let (provider, _) = provider();
        let err = provider
            .configure(json!({"api_key": "invalid"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.message().contains("API key rejected"));
    }

    #[tokio::test]
    async fn test_operations_require_configure() {
        let (provider, factory) = provider();
        let err = provider
            .create(PROJECT_RESOURCE, json!({"name": "shop"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert_eq!(factory.fake().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (provider, _) = provider();
        provider.configure(json!({"api_key": "k"})).await.unwrap();
        let err = provider
            .read("neon_branch", json!({"id": "br-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));

        let err = provider
            .validate_resource_config("neon_branch", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_plan_create_makes_no_calls() {
        let (provider, factory) = provider();
        provider.configure(json!({"api_key": "k"})).await.unwrap();

        let plan = provider
            .plan(PROJECT_RESOURCE, None, json!({"name": "shop"}), json!({"name": "shop"}))
            .await
            .unwrap();
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["name"], "shop");
        assert_eq!(plan.planned_state["inputs"], json!({"name": "shop"}));
        let uri = plan
            .changes
            .iter()
            .find(|c| c.path == "connection_uri")
            .unwrap();
        assert!(uri.sensitive);
        assert_eq!(uri.after, Some(Value::Null));
        assert_eq!(factory.fake().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_keeps_recorded_inputs() {
        let (provider, factory) = provider();
        provider.configure(json!({"api_key": "k"})).await.unwrap();
        let created = provider
            .create(PROJECT_RESOURCE, json!({"name": "shop"}))
            .await
            .unwrap();

        let read = provider.read(PROJECT_RESOURCE, created.clone()).await.unwrap();
        assert_eq!(read, created);
        assert_eq!(read["inputs"], json!({"name": "shop"}));
        assert_eq!(factory.fake().calls(Method::GetProject), 1);
    }

    #[tokio::test]
    async fn test_read_without_id_is_validation_error() {
        let (provider, _) = provider();
        provider.configure(json!({"api_key": "k"})).await.unwrap();
        let err = provider
            .read(PROJECT_RESOURCE, json!({"name": "shop"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_import_uses_normalized_inputs() {
        let (provider, _) = provider();
        provider.configure(json!({"api_key": "k"})).await.unwrap();
        let created = provider
            .create(PROJECT_RESOURCE, json!({"name": "shop"}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let imported = provider.import_resource(PROJECT_RESOURCE, id).await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, PROJECT_RESOURCE);
        let inputs = &imported[0].state["inputs"];
        assert_eq!(inputs["name"], "shop");
        assert_eq!(inputs["branch_name"], "main");
        assert_eq!(inputs["database_name"], created["default_database_name"]);
    }

    #[tokio::test]
    async fn test_stop_cancels_operations() {
        let (provider, factory) = provider();
        provider.configure(json!({"api_key": "k"})).await.unwrap();
        provider.stop().await.unwrap();
        assert!(provider.is_stopped());

        let err = provider
            .create(PROJECT_RESOURCE, json!({"name": "shop"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
        assert_eq!(factory.fake().project_count(), 0);
    }

    #[test]
    fn test_parse_args_prefers_inputs() {
        let state = json!({"id": "p-1", "name": "generated", "inputs": {}});
        assert_eq!(parse_args(&state).unwrap(), ProjectArgs::default());

        let config = json!({"name": "shop", "org_id": "org-1"});
        let args = parse_args(&config).unwrap();
        assert_eq!(args.name.as_deref(), Some("shop"));
        assert_eq!(args.org_id.as_deref(), Some("org-1"));
    }

    #[test]
    fn test_attribute_value_reads_hints_from_inputs() {
        let state = json!({"name": "", "inputs": {"role_name": "app"}});
        assert_eq!(attribute_value(&state, "name"), Value::Null);
        assert_eq!(attribute_value(&state, "role_name"), json!("app"));
        assert_eq!(attribute_value(&state, "database_name"), Value::Null);
    }
}
