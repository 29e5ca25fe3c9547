//! Saved Pure credentials.
//!
//! Reads/writes ~/.config/purelink/auth.json (0600 on Unix).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base URL and API key stored by `purelink login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PureCredentials {
    /// Pure instance, e.g. "https://vbn.aau.dk"
    pub base_url: String,
    pub api_key: String,
}

impl PureCredentials {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: api_key.into() }
    }

    /// The key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let n = self.api_key.chars().count();
        if n <= 4 {
            return "*".repeat(n);
        }
        let tail: String = self.api_key.chars().skip(n - 4).collect();
        format!("{}{}", "*".repeat(n - 4), tail)
    }
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize credentials: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Returns the path to the credentials file.
pub fn credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|c| c.join("purelink").join("auth.json"))
}

/// Load saved credentials. `None` if nothing is saved or the file is invalid.
pub fn load_credentials() -> Option<PureCredentials> {
    load_credentials_from(&credentials_path()?)
}

pub fn load_credentials_from(path: &Path) -> Option<PureCredentials> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Save credentials, returning the file written.
pub fn save_credentials(creds: &PureCredentials) -> Result<PathBuf, CredentialsError> {
    let path = credentials_path().ok_or(CredentialsError::NoConfigDir)?;
    save_credentials_to(&path, creds)?;
    Ok(path)
}

/// Creates the parent directory if needed. Sets 0600 permissions on Unix.
pub fn save_credentials_to(path: &Path, creds: &PureCredentials) -> Result<(), CredentialsError> {
    let io_err = |source| CredentialsError::Io { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let contents = serde_json::to_string_pretty(creds)?;
    std::fs::write(path, contents).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    Ok(())
}

/// Delete saved credentials. Returns whether a file was removed.
pub fn delete_credentials() -> Result<bool, CredentialsError> {
    let Some(path) = credentials_path() else {
        return Ok(false);
    };
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path).map_err(|source| CredentialsError::Io { path, source })?;
    Ok(true)
}
