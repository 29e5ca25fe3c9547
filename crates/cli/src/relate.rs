//! `purelink run` and `purelink validate`.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Args;
use purelink_recon::config::{discovered_schemes, MAX_JOBS};
use purelink_recon::export::write_decisions_csv;
use purelink_recon::{
    load_csv_rows, AuditSink, BatchOptions, BatchReport, IdentifierScheme, InputBatch,
    JsonlAuditLog, MemoryAuditLog, ReconConfig, ReconciliationEngine, Registry, StopFlag,
};
use tracing::info;

use crate::connection::{self, Connection, RegistryArgs};
use crate::exit_codes::{EXIT_CONFIG, EXIT_INPUT, EXIT_REVIEW, EXIT_ROW_ERRORS};
use crate::CliError;

#[derive(Args)]
pub struct RunArgs {
    /// Input CSV with ProjectID (or GrantID) and DOI columns
    pub input: PathBuf,

    /// TOML config (schemes, registry, batch settings)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub registry: RegistryArgs,

    /// Write relations to Pure (default is a dry run)
    #[arg(long)]
    pub apply: bool,

    /// Annotated CSV output [default: <input>-result.csv]
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Write the JSON report to a file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the JSON report to stdout
    #[arg(long)]
    pub json: bool,

    /// Worker threads (overrides [batch].jobs)
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Append-only writeback log [default: <input>-writeback.jsonl]
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Report which candidates of an ambiguous project already hold the relation
    #[arg(long)]
    pub inspect_ambiguous: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input CSV to check for required columns
    pub input: Option<PathBuf>,

    /// TOML config to parse and validate
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let batch = load_input(&args.input)?;

    let jobs = args.jobs.unwrap_or(config.batch.jobs);
    if jobs == 0 || jobs > MAX_JOBS {
        return Err(CliError::usage(format!("--jobs must be between 1 and {MAX_JOBS}, got {jobs}")));
    }

    let conn = connection::resolve(&args.registry, &config.registry)?;
    let client = connection::client(&conn, &config.registry)?;
    let schemes = resolve_schemes(&config, &client, &conn)?;

    let dry_run = !args.apply;
    let audit: Box<dyn AuditSink> = if dry_run {
        Box::new(MemoryAuditLog::new())
    } else {
        let path = args
            .audit_log
            .clone()
            .unwrap_or_else(|| sibling_path(&args.input, "writeback", "jsonl"));
        let log = JsonlAuditLog::open(&path).map_err(|e| CliError::general(e.to_string()))?;
        info!(path = %log.path().display(), "writeback log opened");
        Box::new(log)
    };

    let engine = ReconciliationEngine::new(&client, &schemes, audit.as_ref())
        .with_ambiguous_inspection(config.inspect_ambiguous || args.inspect_ambiguous);
    let options = BatchOptions { dry_run, jobs, stop: Some(install_stop_handler()) };

    let mut report = engine
        .run_batch(&batch.rows, &options)
        .map_err(|e| match e {
            purelink_recon::ReconError::RegistryUnavailable(err) => connection::registry_error(&conn, err),
            other => CliError::from(other),
        })?;
    report.meta.input_blake3 = Some(batch.fingerprint.clone());

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| sibling_path(&args.input, "result", "csv"));
    write_result_csv(&output, &batch, &report)?;
    eprintln!("wrote {}", output.display());

    if args.report.is_some() || args.json {
        let json_str = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        if let Some(ref path) = args.report {
            std::fs::write(path, &json_str)
                .map_err(|e| CliError::general(format!("cannot write report: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        if args.json {
            println!("{json_str}");
        }
    }

    print_summary(&report);
    batch_exit(&report)
}

pub fn cmd_validate(args: ValidateArgs) -> Result<(), CliError> {
    if args.config.is_none() && args.input.is_none() {
        return Err(CliError::usage("nothing to validate").with_hint("pass an input CSV and/or --config"));
    }

    if let Some(ref path) = args.config {
        let config = load_config(Some(path))?;
        if config.schemes.is_empty() {
            eprintln!("{}: ok (schemes discovered from Pure at run time)", path.display());
        } else {
            let labels: Vec<&str> = config.schemes.iter().map(|s| s.label.as_str()).collect();
            eprintln!("{}: ok ({} schemes: {})", path.display(), labels.len(), labels.join(", "));
        }
    }

    if let Some(ref path) = args.input {
        let batch = load_input(path)?;
        let grant_fallbacks = batch
            .rows
            .iter()
            .filter(|r| r.id_source == Some(purelink_recon::model::IdSource::GrantId))
            .count();
        let missing = batch.rows.iter().filter(|r| r.id_source.is_none()).count();
        eprintln!(
            "{}: ok ({} rows, separator '{}', {} via GrantID, {} without identifier)",
            path.display(),
            batch.rows.len(),
            batch.separator as char,
            grant_fallbacks,
            missing,
        );
    }

    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<ReconConfig, CliError> {
    let Some(path) = path else {
        return Ok(ReconConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_CONFIG, format!("cannot read config {}: {e}", path.display()))
    })?;
    ReconConfig::from_toml(&text).map_err(CliError::from)
}

fn load_input(path: &Path) -> Result<InputBatch, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_INPUT, format!("cannot read input {}: {e}", path.display()))
    })?;
    load_csv_rows(&text).map_err(|e| {
        CliError::from(e).with_hint("the CSV needs a DOI column and a ProjectID or GrantID column")
    })
}

fn resolve_schemes(
    config: &ReconConfig,
    client: &dyn Registry,
    conn: &Connection,
) -> Result<Vec<IdentifierScheme>, CliError> {
    let configured = config.identifier_schemes()?;
    if !configured.is_empty() {
        return Ok(configured);
    }
    let types = client
        .allowed_identifier_types()
        .map_err(|e| connection::registry_error(conn, e))?;
    let schemes = discovered_schemes(&types);
    info!(count = schemes.len(), "schemes discovered from registry");
    Ok(schemes)
}

/// `dir/links.csv` + ("result", "csv") -> `dir/links-result.csv`
fn sibling_path(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "purelink".to_string());
    input.with_file_name(format!("{stem}-{suffix}.{ext}"))
}

fn write_result_csv(path: &Path, batch: &InputBatch, report: &BatchReport) -> Result<(), CliError> {
    let file = File::create(path)
        .map_err(|e| CliError::general(format!("cannot write {}: {e}", path.display())))?;
    write_decisions_csv(BufWriter::new(file), &batch.headers, batch.separator, &report.decisions)
        .map_err(|e| CliError::general(format!("cannot write {}: {e}", path.display())))
}

fn print_summary(report: &BatchReport) {
    let s = &report.summary;
    let matched = if report.meta.dry_run {
        format!("{} would be linked", s.dry_run_matched)
    } else {
        format!("{} linked", s.applied)
    };
    eprintln!(
        "{} rows: {}, {} already linked, {} ambiguous, {} unresolved, {} errors",
        s.total_rows, matched, s.already_linked, s.ambiguous, s.unresolved, s.skipped_errors,
    );
    if report.meta.dry_run {
        eprintln!("dry run: no changes were made (use --apply to write)");
    }
}

fn batch_exit(report: &BatchReport) -> Result<(), CliError> {
    let s = &report.summary;
    if s.has_errors() {
        return Err(CliError::new(
            EXIT_ROW_ERRORS,
            format!("{} rows skipped with registry errors", s.skipped_errors),
        )
        .with_hint("see the notes column; re-running retries them"));
    }
    if s.needs_review() {
        return Err(CliError::new(
            EXIT_REVIEW,
            format!("{} rows need review", s.ambiguous + s.unresolved),
        ));
    }
    Ok(())
}

// ── Interrupt handling ──────────────────────────────────────────────

static STOP: std::sync::OnceLock<StopFlag> = std::sync::OnceLock::new();

/// First Ctrl-C stops new rows from starting; a second one kills the process.
fn install_stop_handler() -> StopFlag {
    let flag = STOP.get_or_init(|| Arc::new(AtomicBool::new(false))).clone();

    #[cfg(unix)]
    {
        extern "C" fn on_sigint(_: libc::c_int) {
            if let Some(flag) = STOP.get() {
                flag.store(true, std::sync::atomic::Ordering::Relaxed);
            }
            unsafe {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
            }
        }
        unsafe {
            libc::signal(libc::SIGINT, on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t);
        }
    }

    flag
}
