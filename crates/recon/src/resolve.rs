//! Identifier and DOI resolution.
//!
//! Project lookup runs every configured scheme and pools the results; the
//! first scheme to hit a record names it. Nothing here mutates the registry.

use tracing::debug;

use crate::doi::normalize_doi;
use crate::model::{IdentifierScheme, ProjectMatch, PublicationMatch, SchemeField};
use crate::registry::{ProjectRecord, Registry, RegistryError};

// ---------------------------------------------------------------------------
// Scheme matchers
// ---------------------------------------------------------------------------

/// Registry answers for one project value, shared by every matcher of a
/// single resolution. The identifier search is type-agnostic, so one search
/// serves all identifier schemes.
pub struct ProjectLookup<'a> {
    registry: &'a dyn Registry,
    value: &'a str,
    by_key: Option<Option<ProjectRecord>>,
    by_identifier: Option<Vec<ProjectRecord>>,
}

impl<'a> ProjectLookup<'a> {
    pub fn new(registry: &'a dyn Registry, value: &'a str) -> Self {
        Self { registry, value, by_key: None, by_identifier: None }
    }

    pub fn value(&self) -> &'a str {
        self.value
    }

    /// The record whose key is the value, fetched at most once.
    pub fn by_key(&mut self) -> Result<Option<&ProjectRecord>, RegistryError> {
        if self.by_key.is_none() {
            self.by_key = Some(self.registry.find_project_by_key(self.value)?);
        }
        Ok(self.by_key.as_ref().and_then(|r| r.as_ref()))
    }

    /// Identifier search results for the value, searched at most once.
    pub fn by_identifier(&mut self) -> Result<&[ProjectRecord], RegistryError> {
        if self.by_identifier.is_none() {
            self.by_identifier = Some(self.registry.find_projects(self.value)?);
        }
        Ok(self.by_identifier.as_deref().unwrap_or_default())
    }
}

/// Uniform "match this value under my scheme" capability.
pub trait SchemeMatcher: Send + Sync {
    fn scheme(&self) -> &IdentifierScheme;

    /// Records that carry the lookup's value exactly under this scheme.
    fn candidates(&self, lookup: &mut ProjectLookup<'_>) -> Result<Vec<ProjectRecord>, RegistryError>;
}

/// Matches the value as the registry's own record key.
pub struct NativeKeyMatcher {
    scheme: IdentifierScheme,
}

impl NativeKeyMatcher {
    pub fn new(scheme: IdentifierScheme) -> Self {
        Self { scheme }
    }
}

impl SchemeMatcher for NativeKeyMatcher {
    fn scheme(&self) -> &IdentifierScheme {
        &self.scheme
    }

    fn candidates(&self, lookup: &mut ProjectLookup<'_>) -> Result<Vec<ProjectRecord>, RegistryError> {
        // Only UUID-shaped values can be record keys; don't ask otherwise.
        if uuid::Uuid::parse_str(lookup.value()).is_err() {
            return Ok(Vec::new());
        }
        let value = lookup.value();
        Ok(lookup
            .by_key()?
            .filter(|r| r.id.as_str().eq_ignore_ascii_case(value))
            .cloned()
            .into_iter()
            .collect())
    }
}

/// Matches the value against one classified identifier type.
pub struct IdentifierFieldMatcher {
    scheme: IdentifierScheme,
    type_uri: String,
}

impl IdentifierFieldMatcher {
    pub fn new(scheme: IdentifierScheme, type_uri: impl Into<String>) -> Self {
        Self { scheme, type_uri: type_uri.into() }
    }
}

impl SchemeMatcher for IdentifierFieldMatcher {
    fn scheme(&self) -> &IdentifierScheme {
        &self.scheme
    }

    fn candidates(&self, lookup: &mut ProjectLookup<'_>) -> Result<Vec<ProjectRecord>, RegistryError> {
        let value = lookup.value();
        Ok(lookup
            .by_identifier()?
            .iter()
            .filter(|r| {
                r.identifiers
                    .iter()
                    .any(|id| id.type_uri == self.type_uri && id.value.trim() == value)
            })
            .cloned()
            .collect())
    }
}

/// Build the matcher list for a scheme configuration, preserving order.
pub fn matchers_for(schemes: &[IdentifierScheme]) -> Vec<Box<dyn SchemeMatcher>> {
    schemes
        .iter()
        .map(|scheme| -> Box<dyn SchemeMatcher> {
            match &scheme.field {
                SchemeField::NativeKey => Box::new(NativeKeyMatcher::new(scheme.clone())),
                SchemeField::Identifier { type_uri } => {
                    Box::new(IdentifierFieldMatcher::new(scheme.clone(), type_uri.clone()))
                }
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// IdentifierResolver
// ---------------------------------------------------------------------------

pub struct IdentifierResolver<'a> {
    registry: &'a dyn Registry,
    matchers: Vec<Box<dyn SchemeMatcher>>,
}

impl<'a> IdentifierResolver<'a> {
    pub fn new(registry: &'a dyn Registry, schemes: &[IdentifierScheme]) -> Self {
        Self { registry, matchers: matchers_for(schemes) }
    }

    pub fn schemes(&self) -> impl Iterator<Item = &IdentifierScheme> {
        self.matchers.iter().map(|m| m.scheme())
    }

    /// Distinct project records carrying `project_id` under any scheme.
    ///
    /// A failing scheme fails the whole resolution; a partial pool could
    /// hide an ambiguity.
    pub fn resolve(&self, project_id: &str) -> Result<Vec<ProjectMatch>, RegistryError> {
        let value = project_id.trim();
        if value.is_empty() {
            return Ok(Vec::new());
        }

        let mut lookup = ProjectLookup::new(self.registry, value);
        let mut pooled: Vec<ProjectMatch> = Vec::new();
        for matcher in &self.matchers {
            let hits = matcher.candidates(&mut lookup)?;
            debug!(scheme = %matcher.scheme().label, value, hits = hits.len(), "scheme lookup");
            for record in hits {
                if pooled.iter().any(|m| m.record_id == record.id) {
                    continue;
                }
                pooled.push(ProjectMatch {
                    record_id: record.id,
                    matched_scheme: matcher.scheme().clone(),
                    raw_value: value.to_string(),
                    title: record.title,
                });
            }
        }
        Ok(pooled)
    }
}

// ---------------------------------------------------------------------------
// PublicationResolver
// ---------------------------------------------------------------------------

pub struct PublicationResolver<'a> {
    registry: &'a dyn Registry,
}

impl<'a> PublicationResolver<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Distinct publication records whose DOI equals the normalized input.
    pub fn resolve(&self, doi: &str) -> Result<Vec<PublicationMatch>, RegistryError> {
        let wanted = normalize_doi(doi);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<PublicationMatch> = Vec::new();
        for record in self.registry.find_publications(&wanted)? {
            let exact = record.dois.iter().any(|d| normalize_doi(d) == wanted);
            if !exact || matches.iter().any(|m| m.record_id == record.id) {
                continue;
            }
            matches.push(PublicationMatch {
                record_id: record.id,
                doi: wanted.clone(),
                title: record.title,
            });
        }
        debug!(doi = %wanted, hits = matches.len(), "DOI lookup");
        Ok(matches)
    }
}
