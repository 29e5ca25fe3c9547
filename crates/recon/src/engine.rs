use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use tracing::{debug, info, warn};

use crate::audit::AuditSink;
use crate::config::MAX_JOBS;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::inspect::RelationInspector;
use crate::model::{
    BatchReport, Decision, IdentifierScheme, InputRow, Outcome, ProjectMatch, RelationState, RunMeta,
};
use crate::registry::{RecordId, Registry, RegistryError};
use crate::resolve::{IdentifierResolver, PublicationResolver};
use crate::writeback::{WriteOutcome, WritebackExecutor};

/// Raised from outside to stop a batch after the in-flight rows finish.
pub type StopFlag = Arc<AtomicBool>;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub dry_run: bool,
    /// Worker threads; 0 and 1 both mean sequential.
    pub jobs: usize,
    pub stop: Option<StopFlag>,
}

pub struct ReconciliationEngine<'a> {
    registry: &'a dyn Registry,
    projects: IdentifierResolver<'a>,
    publications: PublicationResolver<'a>,
    inspector: RelationInspector<'a>,
    writer: WritebackExecutor<'a>,
    inspect_ambiguous: bool,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(registry: &'a dyn Registry, schemes: &[IdentifierScheme], audit: &'a dyn AuditSink) -> Self {
        Self {
            registry,
            projects: IdentifierResolver::new(registry, schemes),
            publications: PublicationResolver::new(registry),
            inspector: RelationInspector::new(registry),
            writer: WritebackExecutor::new(registry, audit),
            inspect_ambiguous: false,
        }
    }

    /// Report which candidates of an ambiguous project already hold the relation.
    pub fn with_ambiguous_inspection(mut self, enabled: bool) -> Self {
        self.inspect_ambiguous = enabled;
        self
    }

    /// Decide (and in live mode, apply) one row. Never fails: every
    /// registry error becomes a Skipped-Error decision for this row.
    pub fn reconcile(&self, row: &InputRow, dry_run: bool) -> Decision {
        let decision = self.decide(row, dry_run);
        match decision.outcome {
            Outcome::SkippedError => warn!(line = row.line, notes = %decision.notes, "row skipped"),
            outcome => debug!(line = row.line, %outcome, "row reconciled"),
        }
        decision
    }

    fn decide(&self, row: &InputRow, dry_run: bool) -> Decision {
        // 1. Project
        let candidates = match self.projects.resolve(&row.project_id) {
            Ok(c) => c,
            Err(e) => {
                return Decision::new(row, Outcome::SkippedError, format!("project lookup failed: {e}"));
            }
        };

        let project = match candidates.as_slice() {
            [] => {
                let notes = if row.project_id.trim().is_empty() {
                    "no ProjectID or GrantID provided"
                } else {
                    "no project carries this identifier"
                };
                return Decision::new(row, Outcome::UnresolvedProject, notes);
            }
            [single] => single.clone(),
            many => return self.ambiguous_project(row, many),
        };

        // 2. Publication
        let publications = match self.publications.resolve(&row.doi) {
            Ok(p) => p,
            Err(e) => {
                return with_project(
                    Decision::new(row, Outcome::SkippedError, format!("DOI lookup failed: {e}")),
                    &project,
                );
            }
        };

        let publication = match publications.as_slice() {
            [] => {
                let notes = if row.doi.trim().is_empty() {
                    "no DOI provided"
                } else {
                    "DOI not found in registry"
                };
                return with_project(Decision::new(row, Outcome::UnresolvedPublication, notes), &project);
            }
            [single] => single.clone(),
            many => {
                let notes = format!("matched {} publication records: {}", many.len(), join_ids(many.iter().map(|p| &p.record_id)));
                return with_project(Decision::new(row, Outcome::AmbiguousPublication, notes), &project);
            }
        };

        // 3. Relation
        let state = match self.inspector.inspect(&project.record_id, &publication.record_id) {
            Ok(s) => s,
            Err(e) => {
                let mut d = Decision::new(row, Outcome::SkippedError, format!("relation check failed: {e}"));
                d.publication = Some(publication);
                return with_project(d, &project);
            }
        };

        let (outcome, notes) = match state {
            RelationState::AlreadyLinked => (Outcome::AlreadyLinked, "publication already linked to project".to_string()),
            // 4. Dry run
            RelationState::Absent | RelationState::LinkedToOtherUnrelatedEntity if dry_run => {
                (Outcome::MatchedDryRun, "dry run: relation would be created".to_string())
            }
            // 5. Write
            RelationState::Absent | RelationState::LinkedToOtherUnrelatedEntity => {
                match self.writer.apply(&project.record_id, &publication.record_id) {
                    Ok(WriteOutcome::Applied) => (Outcome::MatchedApplied, "relation created".to_string()),
                    Ok(WriteOutcome::AppliedUnlogged(err)) => (
                        Outcome::MatchedApplied,
                        format!("relation created; audit log write failed: {err}"),
                    ),
                    Ok(WriteOutcome::AlreadyPresent) => (
                        Outcome::AlreadyLinked,
                        "relation appeared before write; nothing changed".to_string(),
                    ),
                    Err(e) => (Outcome::SkippedError, format!("writeback failed: {e}")),
                }
            }
        };

        let mut d = Decision::new(row, outcome, notes);
        d.publication = Some(publication);
        with_project(d, &project)
    }

    fn ambiguous_project(&self, row: &InputRow, candidates: &[ProjectMatch]) -> Decision {
        let mut notes = format!(
            "matched {} project records: {}",
            candidates.len(),
            join_ids(candidates.iter().map(|c| &c.record_id))
        );
        let mut linked = Vec::new();

        if self.inspect_ambiguous {
            match self.linked_candidates(row, candidates) {
                Ok(Some(ids)) if !ids.is_empty() => {
                    notes.push_str(&format!("; candidates already linked: {}", join_ids(ids.iter())));
                    linked = ids;
                }
                Ok(_) => {}
                Err(e) => notes.push_str(&format!("; candidate inspection failed: {e}")),
            }
        }

        let mut d = Decision::new(row, Outcome::AmbiguousProject, notes);
        d.project_candidates = candidates.len();
        d.candidate_relations = linked;
        d
    }

    /// `None` when the publication does not resolve to exactly one record.
    fn linked_candidates(
        &self,
        row: &InputRow,
        candidates: &[ProjectMatch],
    ) -> Result<Option<Vec<RecordId>>, RegistryError> {
        let publications = self.publications.resolve(&row.doi)?;
        let [publication] = publications.as_slice() else {
            return Ok(None);
        };
        let mut linked = Vec::new();
        for c in candidates {
            if self.inspector.inspect(&c.record_id, &publication.record_id)? == RelationState::AlreadyLinked {
                linked.push(c.record_id.clone());
            }
        }
        Ok(Some(linked))
    }

    /// Reconcile a whole batch. Decisions come back in input order.
    ///
    /// The registry is probed once up front; failing that is the only way
    /// this returns an error.
    pub fn run_batch(&self, rows: &[InputRow], options: &BatchOptions) -> Result<BatchReport, ReconError> {
        self.registry.probe().map_err(ReconError::RegistryUnavailable)?;

        let jobs = options.jobs.clamp(1, MAX_JOBS).min(rows.len().max(1));
        info!(rows = rows.len(), jobs, dry_run = options.dry_run, "batch started");

        let mut decisions = if jobs == 1 {
            rows.iter().map(|row| self.reconcile_unless_stopped(row, options)).collect()
        } else {
            self.run_pool(rows, options, jobs)
        };
        if options.dry_run {
            mark_repeated_pairs(&mut decisions);
        }

        let summary = compute_summary(&decisions);
        info!(
            applied = summary.applied,
            dry_run_matched = summary.dry_run_matched,
            already_linked = summary.already_linked,
            ambiguous = summary.ambiguous,
            unresolved = summary.unresolved,
            skipped = summary.skipped_errors,
            "batch finished"
        );

        Ok(BatchReport {
            meta: RunMeta {
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
                dry_run: options.dry_run,
                jobs,
                schemes: self.projects.schemes().map(|s| s.label.clone()).collect(),
                input_blake3: None,
            },
            summary,
            decisions,
        })
    }

    fn run_pool(&self, rows: &[InputRow], options: &BatchOptions, jobs: usize) -> Vec<Decision> {
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, Decision)>();

        std::thread::scope(|scope| {
            for _ in 0..jobs {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(row) = rows.get(i) else { break };
                    let decision = self.reconcile_unless_stopped(row, options);
                    if tx.send((i, decision)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<Decision>> = vec![None; rows.len()];
        for (i, decision) in rx {
            slots[i] = Some(decision);
        }
        slots
            .into_iter()
            .zip(rows)
            .map(|(slot, row)| {
                slot.unwrap_or_else(|| Decision::new(row, Outcome::SkippedError, "row was not processed"))
            })
            .collect()
    }

    fn reconcile_unless_stopped(&self, row: &InputRow, options: &BatchOptions) -> Decision {
        if options.stop.as_ref().is_some_and(|s| s.load(Ordering::Relaxed)) {
            return Decision::new(row, Outcome::SkippedError, "batch stopped before row was attempted");
        }
        self.reconcile(row, options.dry_run)
    }
}

fn with_project(mut d: Decision, project: &ProjectMatch) -> Decision {
    d.matched_scheme = Some(project.matched_scheme.label.clone());
    d.project_candidates = 1;
    d.project = Some(project.clone());
    d
}

/// In a live run only the first of several rows naming the same pair writes;
/// the later ones come back AlreadyLinked. Say so in the dry-run notes.
fn mark_repeated_pairs(decisions: &mut [Decision]) {
    let mut planned: HashMap<(RecordId, RecordId), usize> = HashMap::new();
    for d in decisions.iter_mut().filter(|d| d.outcome == Outcome::MatchedDryRun) {
        let (Some(project), Some(publication)) = (&d.project, &d.publication) else {
            continue;
        };
        let key = (project.record_id.clone(), publication.record_id.clone());
        match planned.get(&key) {
            Some(line) => d
                .notes
                .push_str(&format!("; same pair as line {line}, would be already linked when applied")),
            None => {
                planned.insert(key, d.row.line);
            }
        }
    }
}

fn join_ids<'i>(ids: impl Iterator<Item = &'i RecordId>) -> String {
    ids.map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}
