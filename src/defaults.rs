//! Resolution of a project's default branch, database and endpoint.
//!
//! Branches carry an explicit default flag. Databases and endpoints do not,
//! so the earliest created one on the default branch is taken as the
//! default. Both the creation response and the list calls go through the
//! functions below, which keeps Create and Read in agreement.

use chrono::{DateTime, Utc};

use crate::api::{Branch, Database, Endpoint};

/// Something with a creation timestamp.
pub trait Chronological {
    /// When the item was created.
    fn created_at(&self) -> DateTime<Utc>;
}

impl Chronological for Database {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Chronological for Endpoint {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// The earliest created item. Ties keep the order of `items`.
pub fn earliest_created<T: Chronological>(items: &[T]) -> Option<&T> {
    items.iter().min_by_key(|item| item.created_at())
}

/// The branch flagged as default, if any.
pub fn default_branch(branches: &[Branch]) -> Option<&Branch> {
    branches.iter().find(|branch| branch.default)
}

/// The default database of a branch.
// The API has no default flag for databases yet.
pub fn default_database(databases: &[Database]) -> Option<&Database> {
    earliest_created(databases)
}

/// The default endpoint of a branch.
pub fn default_endpoint(endpoints: &[Endpoint]) -> Option<&Endpoint> {
    earliest_created(endpoints)
}
