// purelink CLI - link Pure projects to publications from a CSV of ProjectID/DOI pairs

mod account;
mod connection;
mod exit_codes;
mod relate;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "purelink")]
#[command(about = "Link Pure projects to research outputs from a ProjectID/DOI CSV")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Increase log detail on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a CSV against Pure (dry run unless --apply)
    #[command(after_help = "\
Examples:
  purelink run links.csv --base-url https://vbn.aau.dk
  purelink run links.csv --config purelink.toml --jobs 4
  purelink run links.csv --config purelink.toml --apply
  purelink run links.csv --apply --json > report.json")]
    Run(relate::RunArgs),

    /// Check a config file and/or an input CSV without contacting Pure
    #[command(after_help = "\
Examples:
  purelink validate --config purelink.toml
  purelink validate links.csv
  purelink validate links.csv --config purelink.toml")]
    Validate(relate::ValidateArgs),

    /// List the project identifier schemes Pure allows
    #[command(after_help = "\
Examples:
  purelink schemes --base-url https://vbn.aau.dk
  purelink schemes --toml >> purelink.toml")]
    Schemes(account::SchemesArgs),

    /// Save a Pure base URL and API key for later runs
    Login(account::LoginArgs),

    /// Remove saved credentials
    Logout,

    /// Show which Pure instance and key would be used, and check them
    Whoami(connection::RegistryArgs),
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  purelink-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

/// `RUST_LOG` when set, else the level picked by `-v`.
fn log_directive(verbose: u8, rust_log: Option<String>) -> String {
    if let Some(directive) = rust_log.filter(|d| !d.trim().is_empty()) {
        return directive;
    }
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
    .to_string()
}

fn init_logging(verbose: u8) {
    let directive = log_directive(verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => relate::cmd_run(args),
        Commands::Validate(args) => relate::cmd_validate(args),
        Commands::Schemes(args) => account::cmd_schemes(args),
        Commands::Login(args) => account::cmd_login(args),
        Commands::Logout => account::cmd_logout(),
        Commands::Whoami(args) => account::cmd_whoami(args),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<purelink_recon::ReconError> for CliError {
    fn from(err: purelink_recon::ReconError) -> Self {
        Self::new(exit_codes::recon_exit_code(&err), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins_at_every_verbosity() {
        for verbose in 0..3 {
            assert_eq!(log_directive(verbose, Some("purelink_recon=trace".into())), "purelink_recon=trace");
        }
    }

    #[test]
    fn test_verbosity_levels_without_rust_log() {
        assert_eq!(log_directive(0, None), "warn");
        assert_eq!(log_directive(1, None), "info");
        assert_eq!(log_directive(2, Some("  ".into())), "debug");
    }
}
