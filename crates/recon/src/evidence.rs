use std::collections::BTreeMap;

use crate::model::{BatchSummary, Decision, Outcome};

/// Compute summary statistics from row decisions.
pub fn compute_summary(decisions: &[Decision]) -> BatchSummary {
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut summary = BatchSummary {
        total_rows: decisions.len(),
        ..BatchSummary::default()
    };

    for d in decisions {
        *outcome_counts.entry(d.outcome.to_string()).or_insert(0) += 1;

        match d.outcome {
            Outcome::MatchedApplied => summary.applied += 1,
            Outcome::MatchedDryRun => summary.dry_run_matched += 1,
            Outcome::AlreadyLinked => summary.already_linked += 1,
            Outcome::AmbiguousProject | Outcome::AmbiguousPublication => summary.ambiguous += 1,
            Outcome::UnresolvedProject | Outcome::UnresolvedPublication => summary.unresolved += 1,
            Outcome::SkippedError => summary.skipped_errors += 1,
        }
    }

    summary.outcome_counts = outcome_counts;
    summary
}
