use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::IdentifierScheme;
use crate::registry::IdentifierType;

/// Label of the record-key scheme appended to discovered scheme lists.
pub const NATIVE_SCHEME_LABEL: &str = "Pure UUID";
pub const DEFAULT_API_KEY_ENV: &str = "PURE_API_KEY";
pub const MAX_JOBS: usize = 16;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default)]
    pub name: String,
    /// Inspect each candidate of an ambiguous project for an existing
    /// relation and report which ones hold it. Never writes.
    #[serde(default)]
    pub inspect_ambiguous: bool,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Precedence-ordered schemes. Empty means "discover from the registry".
    #[serde(default)]
    pub schemes: Vec<SchemeConfig>,
}

// ---------------------------------------------------------------------------
// Registry + Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_page_size() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { jobs: default_jobs() }
    }
}

fn default_jobs() -> usize {
    1
}

// ---------------------------------------------------------------------------
// Schemes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemeConfig {
    pub label: String,
    #[serde(default)]
    pub type_uri: Option<String>,
    #[serde(default)]
    pub native: bool,
}

impl SchemeConfig {
    pub fn to_scheme(&self) -> Result<IdentifierScheme, ReconError> {
        match (&self.type_uri, self.native) {
            (Some(uri), false) if !uri.trim().is_empty() => {
                Ok(IdentifierScheme::identifier(self.label.clone(), uri.trim()))
            }
            (None, true) => Ok(IdentifierScheme::native(self.label.clone())),
            (Some(_), true) => Err(ReconError::ConfigValidation(format!(
                "scheme '{}': set either type_uri or native = true, not both",
                self.label
            ))),
            _ => Err(ReconError::ConfigValidation(format!(
                "scheme '{}': needs a type_uri or native = true",
                self.label
            ))),
        }
    }
}

/// Scheme list mirroring what the registry allows, native key last.
pub fn discovered_schemes(types: &[IdentifierType]) -> Vec<IdentifierScheme> {
    let mut schemes: Vec<IdentifierScheme> = types
        .iter()
        .map(|t| IdentifierScheme::identifier(t.label.clone(), t.uri.clone()))
        .collect();
    schemes.push(IdentifierScheme::native(NATIVE_SCHEME_LABEL));
    schemes
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.batch.jobs == 0 || self.batch.jobs > MAX_JOBS {
            return Err(ReconError::ConfigValidation(format!(
                "batch.jobs must be between 1 and {MAX_JOBS}, got {}",
                self.batch.jobs
            )));
        }

        if self.registry.timeout_secs == 0 {
            return Err(ReconError::ConfigValidation(
                "registry.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.registry.page_size == 0 || self.registry.page_size > 1000 {
            return Err(ReconError::ConfigValidation(format!(
                "registry.page_size must be between 1 and 1000, got {}",
                self.registry.page_size
            )));
        }

        if self.registry.api_key_env.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "registry.api_key_env must name an environment variable".into(),
            ));
        }

        let mut labels = HashSet::new();
        let mut uris = HashSet::new();
        for scheme in &self.schemes {
            if scheme.label.trim().is_empty() {
                return Err(ReconError::ConfigValidation("scheme label must not be empty".into()));
            }
            scheme.to_scheme()?;
            if !labels.insert(scheme.label.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "duplicate scheme label '{}'",
                    scheme.label
                )));
            }
            if let Some(uri) = &scheme.type_uri {
                if !uris.insert(uri.trim()) {
                    return Err(ReconError::ConfigValidation(format!(
                        "duplicate scheme type_uri '{uri}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Configured schemes in precedence order (empty when discovery is wanted).
    pub fn identifier_schemes(&self) -> Result<Vec<IdentifierScheme>, ReconError> {
        self.schemes.iter().map(SchemeConfig::to_scheme).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
