//! `purelink login`, `logout`, `whoami` and `schemes`.

use std::io::BufRead;
use std::path::PathBuf;

use clap::Args;
use purelink_pure_client::{
    credentials_path, delete_credentials, save_credentials, PureClient, PureCredentials,
};
use purelink_recon::config::{discovered_schemes, RegistryConfig};
use purelink_recon::model::SchemeField;
use purelink_recon::{IdentifierScheme, ReconConfig, Registry};
use serde::Serialize;

use crate::connection::{self, RegistryArgs};
use crate::exit_codes::{registry_exit_code, EXIT_CONFIG};
use crate::CliError;

#[derive(Args)]
pub struct LoginArgs {
    /// Pure base URL, e.g. https://vbn.aau.dk
    #[arg(long, value_name = "URL")]
    pub base_url: String,

    /// API key (read from stdin when omitted)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Save without checking the key against Pure
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Args)]
pub struct SchemesArgs {
    #[command(flatten)]
    pub registry: RegistryArgs,

    /// Config supplying registry settings (api_key_env, timeout)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Print as [[schemes]] TOML ready to paste into a config
    #[arg(long)]
    pub toml: bool,
}

pub fn cmd_login(args: LoginArgs) -> Result<(), CliError> {
    let api_key = match args.api_key {
        Some(key) => key,
        None => {
            eprintln!("Pure API key:");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| CliError::general(format!("cannot read API key: {e}")))?;
            line
        }
    };
    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        return Err(CliError::usage("empty API key"));
    }

    let creds = PureCredentials::new(args.base_url.trim().trim_end_matches('/'), api_key);

    if !args.no_verify {
        let client = PureClient::from_credentials(&creds).map_err(|e| CliError::general(e.to_string()))?;
        client.probe().map_err(|e| {
            CliError::new(registry_exit_code(&e), e.to_string())
                .with_hint("credentials were not saved; use --no-verify to save anyway")
        })?;
    }

    let path = save_credentials(&creds).map_err(|e| CliError::general(e.to_string()))?;
    eprintln!("saved credentials for {} to {}", creds.base_url, path.display());
    Ok(())
}

pub fn cmd_logout() -> Result<(), CliError> {
    let removed = delete_credentials().map_err(|e| CliError::general(e.to_string()))?;
    match (removed, credentials_path()) {
        (true, Some(path)) => eprintln!("removed {}", path.display()),
        _ => eprintln!("no saved credentials"),
    }
    Ok(())
}

pub fn cmd_whoami(args: RegistryArgs) -> Result<(), CliError> {
    let registry = RegistryConfig::default();
    let conn = connection::resolve(&args, &registry)?;
    println!("base_url: {}", conn.base_url);
    println!("api_key:  {} (from {})", conn.masked_key(), conn.key_source);

    let client = connection::client(&conn, &registry)?;
    client.probe().map_err(|e| connection::registry_error(&conn, e))?;
    println!("status:   ok");
    Ok(())
}

#[derive(Serialize)]
struct SchemeEntry<'a> {
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    type_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    native: bool,
}

#[derive(Serialize)]
struct SchemesDoc<'a> {
    schemes: Vec<SchemeEntry<'a>>,
}

fn schemes_toml(schemes: &[IdentifierScheme]) -> Result<String, toml::ser::Error> {
    let doc = SchemesDoc {
        schemes: schemes
            .iter()
            .map(|s| match &s.field {
                SchemeField::NativeKey => SchemeEntry { label: &s.label, type_uri: None, native: true },
                SchemeField::Identifier { type_uri } => {
                    SchemeEntry { label: &s.label, type_uri: Some(type_uri.as_str()), native: false }
                }
            })
            .collect(),
    };
    toml::to_string(&doc)
}

pub fn cmd_schemes(args: SchemesArgs) -> Result<(), CliError> {
    let config = match args.config {
        Some(ref path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::new(EXIT_CONFIG, format!("cannot read config {}: {e}", path.display()))
            })?;
            ReconConfig::from_toml(&text)?
        }
        None => ReconConfig::default(),
    };

    let conn = connection::resolve(&args.registry, &config.registry)?;
    let client = connection::client(&conn, &config.registry)?;
    let types = client
        .allowed_identifier_types()
        .map_err(|e| connection::registry_error(&conn, e))?;
    let schemes = discovered_schemes(&types);

    if args.toml {
        let text = schemes_toml(&schemes)
            .map_err(|e| CliError::general(format!("TOML serialization error: {e}")))?;
        print!("{text}");
    } else {
        for (i, s) in schemes.iter().enumerate() {
            match &s.field {
                SchemeField::NativeKey => println!("{:>2}. {} (record UUID)", i + 1, s.label),
                SchemeField::Identifier { type_uri } => println!("{:>2}. {} ({})", i + 1, s.label, type_uri),
            }
        }
    }
    eprintln!("{} schemes from {}", schemes.len(), conn.base_url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemes_toml_parses_back_as_config() {
        let schemes = vec![
            IdentifierScheme::identifier("External Project ID", "/dk/atira/pure/upm/classifiedidentifier/externalprojectid"),
            IdentifierScheme::native("Pure UUID"),
        ];
        let text = schemes_toml(&schemes).unwrap();
        assert!(text.contains("[[schemes]]"));

        let config = ReconConfig::from_toml(&text).unwrap();
        assert_eq!(config.identifier_schemes().unwrap(), schemes);
    }
}
