use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use proptest::prelude::*;

use purelink_recon::export::write_decisions_csv;
use purelink_recon::{
    load_csv_rows, BatchOptions, BatchReport, InputRow, JsonlAuditLog, MemoryAuditLog,
    MemoryRegistry, Outcome, ReconConfig, ReconciliationEngine, RecordId, RegistryError,
    WritebackLogEntry,
};

const EXT: &str = "/dk/atira/pure/upm/classifiedidentifier/externalprojectid";
const HORIZON: &str = "/dk/atira/pure/upm/classifiedidentifier/horizonid";
const GRANT: &str = "/dk/atira/pure/upm/classifiedidentifier/grantid";

const MUSIC_UUID: &str = "0c5cbb52-7d1e-4f63-9a2f-3b0cfa1a8f11";
const TWIN_A: &str = "6f1d0e4a-2b3c-4d5e-8f90-a1b2c3d4e5f6";
const TWIN_B: &str = "7a2e1f5b-3c4d-4e6f-9a01-b2c3d4e5f6a7";
const CELL_PROJECT: &str = "8b3f2a6c-4d5e-4f70-8b12-c3d4e5f6a7b8";

const MUSIC_PAPER: &str = "c1a0b9e8-1111-4222-8333-944455566677";
const CHI_PAPER: &str = "c2b1cae9-2222-4333-8444-a55566677788";
const CELL_PAPER: &str = "c3c2dbfa-3333-4444-8555-b66677788899";

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn config() -> ReconConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join("aau.purelink.toml")).unwrap();
    ReconConfig::from_toml(&toml).unwrap()
}

fn registry() -> MemoryRegistry {
    MemoryRegistry::new()
        .with_project(MUSIC_UUID, "Music in motion", &[(EXT, "101137074")])
        .with_project(TWIN_A, "Interactive systems A", &[(EXT, "H2020-ICT-2018-2")])
        .with_project(TWIN_B, "Interactive systems B", &[(HORIZON, "H2020-ICT-2018-2")])
        .with_project(CELL_PROJECT, "Cell biology", &[(GRANT, "876543")])
        .with_publication(MUSIC_PAPER, "Tuning systems", &["10.1080/17459737.2017.1406012"])
        .with_publication(CHI_PAPER, "CHI paper", &["10.1145/3290605.3300233"])
        .with_publication(CELL_PAPER, "Cell paper", &["10.1016/j.cell.2020.01.001"])
}

fn run_fixture(reg: &MemoryRegistry, audit: &MemoryAuditLog, dry_run: bool) -> BatchReport {
    let csv = std::fs::read_to_string(fixtures_dir().join("relations.csv")).unwrap();
    let batch = load_csv_rows(&csv).unwrap();
    let config = config();
    let schemes = config.identifier_schemes().unwrap();
    let engine = ReconciliationEngine::new(reg, &schemes, audit);
    let options = BatchOptions { dry_run, jobs: config.batch.jobs, stop: None };
    engine.run_batch(&batch.rows, &options).unwrap()
}

fn outcomes(report: &BatchReport) -> Vec<Outcome> {
    report.decisions.iter().map(|d| d.outcome).collect()
}

// -------------------------------------------------------------------------
// Fixture batch
// -------------------------------------------------------------------------

#[test]
fn fixture_dry_run_outcomes() {
    let reg = registry();
    let audit = MemoryAuditLog::new();
    let report = run_fixture(&reg, &audit, true);

    assert_eq!(
        outcomes(&report),
        vec![
            Outcome::MatchedDryRun,
            Outcome::AmbiguousProject,
            Outcome::MatchedDryRun,
            Outcome::UnresolvedProject,
            Outcome::UnresolvedPublication,
        ]
    );
    assert_eq!(report.decisions[0].matched_scheme.as_deref(), Some("External Project ID"));
    assert_eq!(report.decisions[2].matched_scheme.as_deref(), Some("Grant ID"));
    assert_eq!(report.decisions[1].project_candidates, 2);

    assert_eq!(report.summary.total_rows, 5);
    assert_eq!(report.summary.dry_run_matched, 2);
    assert_eq!(report.summary.ambiguous, 1);
    assert_eq!(report.summary.unresolved, 2);
    assert!(report.summary.needs_review());
    assert!(report.meta.dry_run);
    assert_eq!(report.meta.jobs, 2);

    assert_eq!(reg.write_count(), 0);
    assert!(audit.entries().is_empty());
}

#[test]
fn fixture_live_run_then_rerun_is_idempotent() {
    let reg = registry();
    let audit = MemoryAuditLog::new();

    let first = run_fixture(&reg, &audit, false);
    assert_eq!(first.decisions[0].outcome, Outcome::MatchedApplied);
    assert_eq!(first.decisions[2].outcome, Outcome::MatchedApplied);
    assert_eq!(first.summary.applied, 2);
    assert_eq!(reg.write_count(), 2);
    assert_eq!(audit.entries().len(), 2);
    assert_eq!(reg.relations_of(MUSIC_UUID), vec![RecordId::from(MUSIC_PAPER)]);
    assert_eq!(reg.relations_of(CELL_PROJECT), vec![RecordId::from(CELL_PAPER)]);

    let second = run_fixture(&reg, &audit, false);
    assert_eq!(second.decisions[0].outcome, Outcome::AlreadyLinked);
    assert_eq!(second.decisions[2].outcome, Outcome::AlreadyLinked);
    assert_eq!(second.summary.applied, 0);
    assert_eq!(second.summary.already_linked, 2);
    assert_eq!(reg.write_count(), 2);
    assert_eq!(audit.entries().len(), 2);
}

#[test]
fn ambiguous_project_is_never_written() {
    let reg = registry();
    let audit = MemoryAuditLog::new();
    let report = run_fixture(&reg, &audit, false);

    let ambiguous = &report.decisions[1];
    assert_eq!(ambiguous.outcome, Outcome::AmbiguousProject);
    assert!(ambiguous.notes.contains(TWIN_A));
    assert!(ambiguous.notes.contains(TWIN_B));
    assert!(reg.relations_of(TWIN_A).is_empty());
    assert!(reg.relations_of(TWIN_B).is_empty());
    assert!(audit
        .entries()
        .iter()
        .all(|e| e.project_record_id.as_str() != TWIN_A && e.project_record_id.as_str() != TWIN_B));
}

#[test]
fn dry_run_is_repeatable() {
    let reg = registry();
    let audit = MemoryAuditLog::new();
    let a = run_fixture(&reg, &audit, true);
    let b = run_fixture(&reg, &audit, true);
    assert_eq!(outcomes(&a), outcomes(&b));
    assert_eq!(reg.write_count(), 0);
}

#[test]
fn existing_relation_from_other_actor_is_respected() {
    let reg = registry().with_relation(MUSIC_UUID, MUSIC_PAPER);
    let audit = MemoryAuditLog::new();
    let report = run_fixture(&reg, &audit, false);

    assert_eq!(report.decisions[0].outcome, Outcome::AlreadyLinked);
    assert_eq!(reg.relations_of(MUSIC_UUID).len(), 1);
}

#[test]
fn other_relations_are_preserved() {
    let reg = registry().with_relation(MUSIC_UUID, CHI_PAPER);
    let audit = MemoryAuditLog::new();
    let report = run_fixture(&reg, &audit, false);

    assert_eq!(report.decisions[0].outcome, Outcome::MatchedApplied);
    assert_eq!(
        reg.relations_of(MUSIC_UUID),
        vec![RecordId::from(CHI_PAPER), RecordId::from(MUSIC_PAPER)]
    );
}

#[test]
fn rejected_write_only_affects_its_row() {
    let reg = registry();
    reg.reject_writes_to(
        MUSIC_UUID,
        RegistryError::Validation { status: 409, message: "version conflict".into() },
    );
    let audit = MemoryAuditLog::new();
    let report = run_fixture(&reg, &audit, false);

    assert_eq!(report.decisions[0].outcome, Outcome::SkippedError);
    assert!(report.decisions[0].notes.starts_with("writeback failed:"));
    assert_eq!(report.decisions[2].outcome, Outcome::MatchedApplied);
    assert!(report.summary.has_errors());
    assert_eq!(audit.entries().len(), 1);
}

#[test]
fn native_uuid_resolves_directly() {
    let reg = registry();
    let audit = MemoryAuditLog::new();
    let schemes = config().identifier_schemes().unwrap();
    let engine = ReconciliationEngine::new(&reg, &schemes, &audit);

    let d = engine.reconcile(&InputRow::new(1, MUSIC_UUID, "10.1080/17459737.2017.1406012"), true);
    assert_eq!(d.outcome, Outcome::MatchedDryRun);
    assert_eq!(d.matched_scheme.as_deref(), Some("Pure UUID"));
}

#[test]
fn offline_registry_fails_the_batch() {
    let reg = registry();
    reg.set_offline(true);
    let audit = MemoryAuditLog::new();
    let schemes = config().identifier_schemes().unwrap();
    let engine = ReconciliationEngine::new(&reg, &schemes, &audit);

    let rows = vec![InputRow::new(1, "101137074", "10.1080/17459737.2017.1406012")];
    let err = engine.run_batch(&rows, &BatchOptions::default()).unwrap_err();
    assert!(err.to_string().contains("registry unavailable"));
}

#[test]
fn raised_stop_flag_leaves_rows_unattempted() {
    let reg = registry();
    let audit = MemoryAuditLog::new();
    let schemes = config().identifier_schemes().unwrap();
    let engine = ReconciliationEngine::new(&reg, &schemes, &audit);

    let rows = vec![
        InputRow::new(1, "101137074", "10.1080/17459737.2017.1406012"),
        InputRow::new(2, "876543", "10.1016/j.cell.2020.01.001"),
    ];
    let stop = Arc::new(AtomicBool::new(true));
    let report = engine
        .run_batch(&rows, &BatchOptions { dry_run: false, jobs: 1, stop: Some(stop) })
        .unwrap();

    assert_eq!(report.decisions.len(), 2);
    assert!(report.decisions.iter().all(|d| d.outcome == Outcome::SkippedError));
    assert_eq!(reg.write_count(), 0);
}

// -------------------------------------------------------------------------
// Audit log + export
// -------------------------------------------------------------------------

#[test]
fn jsonl_audit_log_accumulates_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("writeback.jsonl");
    let reg = registry();
    let schemes = config().identifier_schemes().unwrap();
    let rows = vec![InputRow::new(1, "101137074", "10.1080/17459737.2017.1406012")];

    {
        let log = JsonlAuditLog::open(&path).unwrap();
        let engine = ReconciliationEngine::new(&reg, &schemes, &log);
        engine.run_batch(&rows, &BatchOptions::default()).unwrap();
    }
    {
        let log = JsonlAuditLog::open(&path).unwrap();
        let engine = ReconciliationEngine::new(&reg, &schemes, &log);
        let rows = vec![InputRow::new(1, "876543", "10.1016/j.cell.2020.01.001")];
        engine.run_batch(&rows, &BatchOptions::default()).unwrap();
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let entries: Vec<WritebackLogEntry> =
        text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].project_record_id.as_str(), MUSIC_UUID);
    assert_eq!(entries[1].publication_record_id.as_str(), CELL_PAPER);
    assert!(entries.iter().all(|e| !e.dry_run));
}

#[test]
fn export_echoes_input_and_annotates() {
    let csv = std::fs::read_to_string(fixtures_dir().join("relations.csv")).unwrap();
    let batch = load_csv_rows(&csv).unwrap();
    let reg = registry();
    let audit = MemoryAuditLog::new();
    let report = run_fixture(&reg, &audit, true);

    let mut out = Vec::new();
    write_decisions_csv(&mut out, &batch.headers, batch.separator, &report.decisions).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("ProjectID;GrantID;DOI;Comment;outcome;matched_scheme;notes"));
    assert!(lines[1].starts_with("101137074;;10.1080/17459737.2017.1406012;music twin;Matched-DryRun;External Project ID;"));
    assert!(lines[3].contains(";Matched-DryRun;Grant ID;"));
    assert!(lines[3].ends_with(";GrantID"));
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

fn arb_row() -> impl Strategy<Value = (String, String)> {
    let projects = prop::sample::select(vec![
        "101137074",
        "H2020-ICT-2018-2",
        "876543",
        "",
        "999",
        MUSIC_UUID,
    ]);
    let dois = prop::sample::select(vec![
        "10.1080/17459737.2017.1406012",
        "https://doi.org/10.1145/3290605.3300233",
        "10.1016/J.CELL.2020.01.001",
        "",
        "10.9999/none",
    ]);
    (projects, dois).prop_map(|(p, d)| (p.to_string(), d.to_string()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_row_gets_one_decision_in_order(
        rows in prop::collection::vec(arb_row(), 0..24),
        jobs in 1usize..5,
        dry_run in any::<bool>(),
    ) {
        let reg = registry();
        let audit = MemoryAuditLog::new();
        let schemes = config().identifier_schemes().unwrap();
        let engine = ReconciliationEngine::new(&reg, &schemes, &audit);

        let input: Vec<InputRow> = rows
            .iter()
            .enumerate()
            .map(|(i, (p, d))| InputRow::new(i + 1, p.clone(), d.clone()))
            .collect();
        let report = engine
            .run_batch(&input, &BatchOptions { dry_run, jobs, stop: None })
            .unwrap();

        prop_assert_eq!(report.decisions.len(), input.len());
        for (d, row) in report.decisions.iter().zip(&input) {
            prop_assert_eq!(&d.row, row);
        }
        prop_assert_eq!(report.summary.total_rows, input.len());

        let writes: usize = report.summary.applied;
        prop_assert_eq!(audit.entries().len(), writes);
        if dry_run {
            prop_assert_eq!(reg.write_count(), 0);
        }
        // Ambiguous projects stay untouched whatever the mix.
        prop_assert!(reg.relations_of(TWIN_A).is_empty());
        prop_assert!(reg.relations_of(TWIN_B).is_empty());
    }
}
