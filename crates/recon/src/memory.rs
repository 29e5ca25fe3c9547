//! In-memory registry.
//!
//! Behaves like the Pure search endpoints: project and DOI lookups are
//! substring searches, so callers still have to filter for exact matches.
//! Supports fault injection (offline mode, rejected writes) for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::registry::{
    IdentifierType, ProjectIdentifier, ProjectRecord, PublicationRecord, RecordId, Registry,
    RegistryError,
};

#[derive(Default)]
struct State {
    projects: Vec<ProjectRecord>,
    publications: Vec<PublicationRecord>,
    relations: BTreeMap<RecordId, Vec<RecordId>>,
    identifier_types: Vec<IdentifierType>,
    rejected_writes: HashMap<RecordId, RegistryError>,
    offline: bool,
    reads: usize,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, id: &str, title: &str, identifiers: &[(&str, &str)]) -> Self {
        self.lock().projects.push(ProjectRecord {
            id: RecordId::from(id),
            title: title.to_string(),
            identifiers: identifiers
                .iter()
                .map(|(type_uri, value)| ProjectIdentifier {
                    type_uri: type_uri.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn with_publication(self, id: &str, title: &str, dois: &[&str]) -> Self {
        self.lock().publications.push(PublicationRecord {
            id: RecordId::from(id),
            title: title.to_string(),
            dois: dois.iter().map(|d| d.to_string()).collect(),
        });
        self
    }

    pub fn with_relation(self, project: &str, publication: &str) -> Self {
        self.lock()
            .relations
            .entry(RecordId::from(project))
            .or_default()
            .push(RecordId::from(publication));
        self
    }

    pub fn with_identifier_type(self, uri: &str, label: &str) -> Self {
        self.lock().identifier_types.push(IdentifierType {
            uri: uri.to_string(),
            label: label.to_string(),
        });
        self
    }

    /// Make every write to `project` fail with `error`.
    pub fn reject_writes_to(&self, project: &str, error: RegistryError) {
        self.lock().rejected_writes.insert(RecordId::from(project), error);
    }

    /// Simulate losing connectivity: every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Add a relation behind the engine's back, as another actor would.
    pub fn add_relation_externally(&self, project: &str, publication: &str) {
        self.lock()
            .relations
            .entry(RecordId::from(project))
            .or_default()
            .push(RecordId::from(publication));
    }

    pub fn relations_of(&self, project: &str) -> Vec<RecordId> {
        self.lock()
            .relations
            .get(&RecordId::from(project))
            .cloned()
            .unwrap_or_default()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Number of successful relation writes.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_read(&self) -> Result<MutexGuard<'_, State>, RegistryError> {
        let mut state = self.lock();
        if state.offline {
            return Err(RegistryError::Network("registry offline".into()));
        }
        state.reads += 1;
        Ok(state)
    }
}

impl Registry for MemoryRegistry {
    fn find_project_by_key(&self, key: &str) -> Result<Option<ProjectRecord>, RegistryError> {
        let state = self.begin_read()?;
        Ok(state.projects.iter().find(|p| p.id.as_str() == key).cloned())
    }

    fn find_projects(&self, value: &str) -> Result<Vec<ProjectRecord>, RegistryError> {
        let state = self.begin_read()?;
        Ok(state
            .projects
            .iter()
            .filter(|p| p.identifiers.iter().any(|id| id.value.contains(value)))
            .cloned()
            .collect())
    }

    fn find_publications(&self, doi: &str) -> Result<Vec<PublicationRecord>, RegistryError> {
        let state = self.begin_read()?;
        let needle = doi.to_lowercase();
        Ok(state
            .publications
            .iter()
            .filter(|p| p.dois.iter().any(|d| d.to_lowercase().contains(&needle)))
            .cloned()
            .collect())
    }

    fn fetch_relations(&self, project: &RecordId) -> Result<Vec<RecordId>, RegistryError> {
        let state = self.begin_read()?;
        Ok(state.relations.get(project).cloned().unwrap_or_default())
    }

    fn append_relation(&self, project: &RecordId, publication: &RecordId) -> Result<(), RegistryError> {
        let mut state = self.lock();
        if state.offline {
            return Err(RegistryError::Network("registry offline".into()));
        }
        if let Some(err) = state.rejected_writes.get(project) {
            return Err(err.clone());
        }
        let inserted = {
            let current = state.relations.entry(project.clone()).or_default();
            if current.contains(publication) {
                false
            } else {
                current.push(publication.clone());
                true
            }
        };
        if inserted {
            state.writes += 1;
        }
        Ok(())
    }

    fn probe(&self) -> Result<(), RegistryError> {
        if self.lock().offline {
            return Err(RegistryError::Network("registry offline".into()));
        }
        Ok(())
    }

    fn allowed_identifier_types(&self) -> Result<Vec<IdentifierType>, RegistryError> {
        Ok(self.begin_read()?.identifier_types.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_ensure_present() {
        let reg = MemoryRegistry::new().with_relation("p1", "r0");
        let p1 = RecordId::from("p1");
        let r1 = RecordId::from("r1");
        reg.append_relation(&p1, &r1).unwrap();
        reg.append_relation(&p1, &r1).unwrap();
        assert_eq!(reg.relations_of("p1"), vec![RecordId::from("r0"), r1]);
        assert_eq!(reg.write_count(), 1);
    }

    #[test]
    fn offline_fails_every_call() {
        let reg = MemoryRegistry::new();
        reg.set_offline(true);
        assert!(reg.probe().is_err());
        assert!(reg.find_publications("10.1/x").is_err());
        assert!(reg.append_relation(&"p".into(), &"r".into()).is_err());
    }
}
