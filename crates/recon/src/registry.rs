//! The registry boundary.
//!
//! The engine only needs four capabilities from the research-information
//! system: project lookup by key or identifier, DOI lookup, reading the relation list
//! of a project and appending one relation to it. Transport and auth live in
//! the implementing crate (`purelink-pure-client`) or in
//! [`crate::memory::MemoryRegistry`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry-internal record key (a Pure UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One classified identifier carried by a project record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentifier {
    pub type_uri: String,
    pub value: String,
}

/// A project as returned by a lookup. Lookups may over-return (free-text
/// search hits); the resolvers filter for exact matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub identifiers: Vec<ProjectIdentifier>,
}

/// A publication (research output) as returned by a DOI lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    /// Raw DOIs of the record's DOI-bearing electronic versions.
    #[serde(default)]
    pub dois: Vec<String>,
}

/// An identifier type the registry allows on projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierType {
    pub uri: String,
    pub label: String,
}

/// Failure of a single registry call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Transport failure (DNS, connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),
    /// Credentials rejected (401/403).
    #[error("permission denied (HTTP {status}): {message}")]
    Permission { status: u16, message: String },
    /// The registry refused the request or mutation (400/409/422).
    #[error("rejected by registry (HTTP {status}): {message}")]
    Validation { status: u16, message: String },
    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// Response body did not have the expected shape.
    #[error("malformed registry response: {0}")]
    Parse(String),
}

impl RegistryError {
    /// Whether the failure says nothing about the request itself, only that
    /// the registry could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Abstract registry operations with synchronous results.
///
/// Implementations must be shareable across worker threads.
pub trait Registry: Send + Sync {
    /// Fetch one project by its record key. `None` when no such record.
    fn find_project_by_key(&self, key: &str) -> Result<Option<ProjectRecord>, RegistryError>;

    /// Candidate projects carrying `value` under any identifier type. May
    /// over-match; callers filter by type and exact value.
    fn find_projects(&self, value: &str) -> Result<Vec<ProjectRecord>, RegistryError>;

    /// Candidate publications for a normalized DOI.
    fn find_publications(&self, doi: &str) -> Result<Vec<PublicationRecord>, RegistryError>;

    /// Publication ids currently related to `project`.
    fn fetch_relations(&self, project: &RecordId) -> Result<Vec<RecordId>, RegistryError>;

    /// Ensure `publication` is related to `project`, keeping every existing
    /// relation. Must not create a duplicate edge when one already exists.
    fn append_relation(&self, project: &RecordId, publication: &RecordId) -> Result<(), RegistryError>;

    /// Cheap connectivity check, run once before a batch.
    fn probe(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    /// Identifier types configured on the registry, in registry order.
    fn allowed_identifier_types(&self) -> Result<Vec<IdentifierType>, RegistryError> {
        Ok(Vec::new())
    }
}
