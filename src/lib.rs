//! Neon project provider
//!
//! A declarative resource provider for [Neon](https://neon.tech) serverless
//! Postgres projects. Given a desired configuration it reconciles that desire
//! against the live project: it plans and applies create, update and delete
//! actions and reports drift.
//!
//! # Overview
//!
//! - **Lifecycle** ([`project`]): Create, Read, Update, Delete and Diff of a
//!   project, driving a [`NeonApi`] client one call at a time
//! - **Diff** ([`diff`]): pure comparison of recorded state, live state and
//!   new input
//! - **Pooler derivation** ([`pooler`]): pooled host and connection URI from
//!   the unpooled ones
//! - **Provider adapter** ([`NeonProvider`]): the `neon_project` resource
//!   behind the host-facing [`ProviderService`] trait
//! - **Test tooling** ([`testing`]): an in-memory Neon API and a provider
//!   tester
//!
//! The HTTP client is not part of this crate: the host supplies a
//! [`ClientFactory`] that builds a [`NeonApi`] implementation from the API
//! key and user agent resolved by `configure`.
//!
//! # Quick Start
//!
//! ```ignore
//! use neon_provider::{init_logging, NeonProvider, ProviderInfo, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = NeonProvider::new(ProviderInfo::from_package(), MyHttpClientFactory::new());
//!     provider.configure(json!({})).await?; // key from NEON_API_KEY
//!
//!     let plan = provider
//!         .plan("neon_project", None, json!({"name": "shop"}), json!({"name": "shop"}))
//!         .await?;
//!     let state = provider.create("neon_project", plan.planned_state).await?;
//!     println!("{}", state["connection_uri_pooler"]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod defaults;
pub mod diff;
pub mod error;
pub mod logging;
pub mod pooler;
pub mod project;
pub mod provider;
pub mod schema;
pub mod service;
pub mod state;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use api::{ApiError, ClientFactory, NeonApi};
pub use config::{ClientConfig, ProviderConfig, ProviderInfo, API_KEY_ENV};
pub use diff::{DiffKind, DiffResult, PropertyDiff};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use pooler::{pooler_host, pooler_uri};
pub use project::{ProjectResource, ReadOutcome};
pub use provider::{NeonProvider, PROJECT_RESOURCE};
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use state::{ProjectArgs, ProjectState};
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
