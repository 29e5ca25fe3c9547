//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | run              | Config, input and batch result codes     |
//! | 40-49   | registry         | API key and Pure connectivity codes      |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use purelink_recon::{ReconError, RegistryError};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - every row linked, dry-run matched or already linked.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure (e.g. cannot write output file).
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (3-9)
// =============================================================================

/// Config file unreadable, unparseable or invalid.
pub const EXIT_CONFIG: u8 = 3;

/// Input CSV unreadable or missing a required column.
pub const EXIT_INPUT: u8 = 4;

/// Batch finished; some rows are ambiguous or unresolved and need review.
pub const EXIT_REVIEW: u8 = 5;

/// Batch finished; some rows were skipped because a registry call failed.
/// Takes precedence over [`EXIT_REVIEW`].
pub const EXIT_ROW_ERRORS: u8 = 6;

// =============================================================================
// Registry (40-49)
// =============================================================================

/// No API key from --api-key, the environment or saved credentials.
pub const EXIT_NO_API_KEY: u8 = 40;

/// Pure did not answer the connectivity probe.
pub const EXIT_UNREACHABLE: u8 = 42;

/// Pure rejected the API key (401/403).
pub const EXIT_CREDENTIALS: u8 = 43;

/// Map a registry failure that stops the whole command.
pub fn registry_exit_code(err: &RegistryError) -> u8 {
    match err {
        RegistryError::Permission { .. } => EXIT_CREDENTIALS,
        _ => EXIT_UNREACHABLE,
    }
}

/// Map a batch-level engine failure.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_CONFIG,
        ReconError::MissingColumn { .. } | ReconError::InputParse(_) => EXIT_INPUT,
        ReconError::RegistryUnavailable(e) => registry_exit_code(e),
        ReconError::Io(_) => EXIT_ERROR,
    }
}
