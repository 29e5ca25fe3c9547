//! Additive relation writes.
//!
//! Each write is a read-modify-write: the current relation list is read
//! again right before the append, and the append itself is "ensure
//! present". Writes from this process are serialized so two rows touching
//! the same project cannot clobber each other. Writers outside this process
//! can still race the window between our read and the registry's write;
//! closing it needs registry-side locking.

use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};

use crate::audit::AuditSink;
use crate::model::{WritebackAction, WritebackLogEntry};
use crate::registry::{RecordId, Registry, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Relation created and logged.
    Applied,
    /// Relation created, but the audit entry could not be written.
    AppliedUnlogged(String),
    /// Relation was already present at write time; nothing written.
    AlreadyPresent,
}

pub struct WritebackExecutor<'a> {
    registry: &'a dyn Registry,
    audit: &'a dyn AuditSink,
    write_lock: Mutex<()>,
}

impl<'a> WritebackExecutor<'a> {
    pub fn new(registry: &'a dyn Registry, audit: &'a dyn AuditSink) -> Self {
        Self { registry, audit, write_lock: Mutex::new(()) }
    }

    pub fn apply(&self, project: &RecordId, publication: &RecordId) -> Result<WriteOutcome, RegistryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.registry.fetch_relations(project)?;
        if current.contains(publication) {
            debug!(%project, %publication, "relation present at write time");
            return Ok(WriteOutcome::AlreadyPresent);
        }

        self.registry.append_relation(project, publication)?;

        let entry = WritebackLogEntry {
            timestamp: Utc::now(),
            project_record_id: project.clone(),
            publication_record_id: publication.clone(),
            action: WritebackAction::AddRelation,
            dry_run: false,
        };
        match self.audit.append(&entry) {
            Ok(()) => Ok(WriteOutcome::Applied),
            Err(e) => {
                warn!(%project, %publication, error = %e, "relation created but not logged");
                Ok(WriteOutcome::AppliedUnlogged(e.to_string()))
            }
        }
    }
}
