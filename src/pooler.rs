//! Derivation of pooled connection targets.
//!
//! Neon exposes a connection pooler for every compute endpoint. Its host is
//! the endpoint host with `-pooler` appended to the first DNS label:
//!
//! ```
//! use neon_provider::pooler::{pooler_host, pooler_uri};
//!
//! assert_eq!(
//!     pooler_host("ep-abc-123.us-east-2.aws.neon.tech").unwrap(),
//!     "ep-abc-123-pooler.us-east-2.aws.neon.tech"
//! );
//! assert_eq!(
//!     pooler_uri("postgres://u:p@ep-abc-123.region.tech/db?sslmode=require").unwrap(),
//!     "postgres://u:p@ep-abc-123-pooler.region.tech/db?sslmode=require"
//! );
//! ```
//!
//! The transform is not idempotent: feeding a pooled host back in appends a
//! second suffix.

use thiserror::Error;

use crate::error::ProviderError;

/// Suffix appended to the first label of an endpoint host.
pub const POOLER_SUFFIX: &str = "-pooler";

/// Input that cannot be turned into a pooled target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolerError {
    /// The host has no domain part after its first label.
    #[error("host '{0}' has no domain after its first label")]
    InvalidHost(String),

    /// The URI lacks a credentials/host separator or a path.
    #[error("connection URI is malformed: {0}")]
    InvalidUri(&'static str),
}

impl From<PoolerError> for ProviderError {
    fn from(err: PoolerError) -> Self {
        ProviderError::Inconsistency(err.to_string())
    }
}

/// Derive the pooled host from an endpoint host.
pub fn pooler_host(host: &str) -> Result<String, PoolerError> {
    match host.split_once('.') {
        Some((label, domain)) if !label.is_empty() && !domain.is_empty() => {
            Ok(format!("{}{}.{}", label, POOLER_SUFFIX, domain))
        },
        _ => Err(PoolerError::InvalidHost(host.to_string())),
    }
}

/// Derive the pooled connection URI from a direct one.
///
/// Only the host segment changes; scheme, credentials, path and query are
/// kept as they are. The URI itself is never part of the error since it
/// carries the role password.
pub fn pooler_uri(uri: &str) -> Result<String, PoolerError> {
    let (credentials, target) = uri
        .split_once('@')
        .ok_or(PoolerError::InvalidUri("missing '@' before the host"))?;
    let (host, path) = target
        .split_once('/')
        .ok_or(PoolerError::InvalidUri("missing '/' after the host"))?;
    let host = pooler_host(host)
        .map_err(|_| PoolerError::InvalidUri("host has no domain after its first label"))?;
    Ok(format!("{}@{}/{}", credentials, host, path))
}
