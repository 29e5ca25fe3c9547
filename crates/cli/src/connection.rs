//! Which Pure instance and API key a command talks to.
//!
//! Base URL: `--base-url` > `[registry].base_url` > saved credentials.
//! API key: `--api-key` > environment variable > saved credentials > error.

use std::fmt;
use std::time::Duration;

use clap::Args;
use purelink_pure_client::{load_credentials, PureClient, PureCredentials};
use purelink_recon::config::RegistryConfig;
use purelink_recon::RegistryError;

use crate::exit_codes::{registry_exit_code, EXIT_NO_API_KEY};
use crate::CliError;

#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Pure base URL, e.g. https://vbn.aau.dk
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Pure API key (prefer the environment variable; flags end up in shell history)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Flag,
    Env(String),
    Saved,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Flag => write!(f, "--api-key"),
            KeySource::Env(name) => write!(f, "${name}"),
            KeySource::Saved => write!(f, "saved credentials"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub base_url: String,
    pub api_key: String,
    pub key_source: KeySource,
}

impl Connection {
    pub fn masked_key(&self) -> String {
        PureCredentials::new(&self.base_url, &self.api_key).masked_key()
    }
}

/// First non-blank key in precedence order.
fn pick_api_key(
    flag: Option<&str>,
    env: Option<(&str, String)>,
    saved: Option<&str>,
) -> Option<(String, KeySource)> {
    let non_blank = |s: &str| !s.trim().is_empty();

    if let Some(key) = flag.filter(|k| non_blank(k)) {
        return Some((key.trim().to_string(), KeySource::Flag));
    }
    if let Some((name, value)) = env.filter(|(_, v)| non_blank(v)) {
        return Some((value.trim().to_string(), KeySource::Env(name.to_string())));
    }
    saved
        .filter(|k| non_blank(k))
        .map(|key| (key.trim().to_string(), KeySource::Saved))
}

pub fn resolve(args: &RegistryArgs, registry: &RegistryConfig) -> Result<Connection, CliError> {
    let saved = load_credentials();

    let base_url = args
        .base_url
        .clone()
        .or_else(|| registry.base_url.clone())
        .or_else(|| saved.as_ref().map(|c| c.base_url.clone()))
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            CliError::usage("no Pure base URL").with_hint(
                "pass --base-url, set [registry].base_url in the config, or run `purelink login`",
            )
        })?;

    let env_name = registry.api_key_env.as_str();
    let env_value = std::env::var(env_name).ok().map(|v| (env_name, v));

    let (api_key, key_source) = pick_api_key(
        args.api_key.as_deref(),
        env_value,
        saved.as_ref().map(|c| c.api_key.as_str()),
    )
    .ok_or_else(|| {
        CliError::new(EXIT_NO_API_KEY, "no Pure API key").with_hint(format!(
            "pass --api-key, set {env_name}, or run `purelink login`"
        ))
    })?;

    Ok(Connection { base_url: base_url.trim().to_string(), api_key, key_source })
}

pub fn client(conn: &Connection, registry: &RegistryConfig) -> Result<PureClient, CliError> {
    PureClient::with_options(
        &conn.base_url,
        &conn.api_key,
        Duration::from_secs(registry.timeout_secs),
        registry.page_size,
    )
    .map_err(|e| CliError::general(e.to_string()))
}

/// A registry failure that ends the command.
pub fn registry_error(conn: &Connection, err: RegistryError) -> CliError {
    let hint = match &err {
        RegistryError::Permission { .. } => {
            format!("Pure rejected the API key from {}", conn.key_source)
        }
        RegistryError::Network(_) => format!("is {} reachable?", conn.base_url),
        _ => format!("request to {} failed", conn.base_url),
    };
    CliError::new(registry_exit_code(&err), err.to_string()).with_hint(hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins() {
        let picked = pick_api_key(Some("flag"), Some(("PURE_API_KEY", "env".into())), Some("saved"));
        assert_eq!(picked, Some(("flag".into(), KeySource::Flag)));
    }

    #[test]
    fn test_env_before_saved() {
        let picked = pick_api_key(None, Some(("AAU_KEY", " env ".into())), Some("saved"));
        assert_eq!(picked, Some(("env".into(), KeySource::Env("AAU_KEY".into()))));
    }

    #[test]
    fn test_blank_values_fall_through() {
        let picked = pick_api_key(Some(""), Some(("PURE_API_KEY", "  ".into())), Some("saved"));
        assert_eq!(picked, Some(("saved".into(), KeySource::Saved)));
        assert_eq!(pick_api_key(None, None, None), None);
    }

    #[test]
    fn test_key_source_display() {
        assert_eq!(KeySource::Env("PURE_API_KEY".into()).to_string(), "$PURE_API_KEY");
        assert_eq!(KeySource::Flag.to_string(), "--api-key");
    }
}
