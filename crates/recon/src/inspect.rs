use crate::model::RelationState;
use crate::registry::{RecordId, Registry, RegistryError};

/// Reads the current relation list of a project and classifies a target
/// publication against it. Identity only; metadata is never compared.
pub struct RelationInspector<'a> {
    registry: &'a dyn Registry,
}

impl<'a> RelationInspector<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    pub fn inspect(&self, project: &RecordId, publication: &RecordId) -> Result<RelationState, RegistryError> {
        let current = self.registry.fetch_relations(project)?;
        Ok(classify_relations(&current, publication))
    }
}

pub fn classify_relations(current: &[RecordId], target: &RecordId) -> RelationState {
    if current.contains(target) {
        RelationState::AlreadyLinked
    } else if current.is_empty() {
        RelationState::Absent
    } else {
        RelationState::LinkedToOtherUnrelatedEntity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;

    #[test]
    fn states() {
        let reg = MemoryRegistry::new()
            .with_relation("p1", "r1")
            .with_relation("p2", "r9");
        let inspector = RelationInspector::new(&reg);
        let r1 = RecordId::from("r1");

        assert_eq!(inspector.inspect(&"p1".into(), &r1).unwrap(), RelationState::AlreadyLinked);
        assert_eq!(
            inspector.inspect(&"p2".into(), &r1).unwrap(),
            RelationState::LinkedToOtherUnrelatedEntity
        );
        assert_eq!(inspector.inspect(&"p3".into(), &r1).unwrap(), RelationState::Absent);
    }

    #[test]
    fn fetch_failure_propagates() {
        let reg = MemoryRegistry::new();
        reg.set_offline(true);
        let inspector = RelationInspector::new(&reg);
        assert!(inspector.inspect(&"p1".into(), &"r1".into()).is_err());
    }
}
