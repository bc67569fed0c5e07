//! Application configuration: extra dataset schemas, credentials and default
//! control values. Loaded from a JSON file; `.env` may point at it.

use crate::error::{ClaimsError, Result};
use crate::pipeline::{DEFAULT_HISTOGRAM_BINS, DEFAULT_TOP_N, HISTOGRAM_BINS_RANGE, TOP_N_RANGE};
use crate::schema::DatasetSchema;
use crate::security::{CredentialEntry, StaticCredentials};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "CLAIMS_LENS_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Schemas added to (or replacing, by name) the built-in presets.
    #[serde(default)]
    pub schemas: Vec<DatasetSchema>,
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,
    #[serde(default = "default_histogram_bins")]
    pub default_histogram_bins: usize,
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_histogram_bins() -> usize {
    DEFAULT_HISTOGRAM_BINS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schemas: Vec::new(),
            credentials: Vec::new(),
            default_top_n: DEFAULT_TOP_N,
            default_histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClaimsError::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        info!(
            "Loaded config from {}: {} schemas, {} users",
            path.display(),
            config.schemas.len(),
            config.credentials.len()
        );
        Ok(config)
    }

    /// Explicit path first, then `CLAIMS_LENS_CONFIG`; defaults when neither is set.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let path = explicit.or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));
        match path {
            Some(p) => Self::load(p),
            None => {
                info!("No config file given, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !TOP_N_RANGE.contains(&self.default_top_n) {
            return Err(ClaimsError::Config(format!(
                "default_top_n {} outside {:?}",
                self.default_top_n, TOP_N_RANGE
            )));
        }
        if !HISTOGRAM_BINS_RANGE.contains(&self.default_histogram_bins) {
            return Err(ClaimsError::Config(format!(
                "default_histogram_bins {} outside {:?}",
                self.default_histogram_bins, HISTOGRAM_BINS_RANGE
            )));
        }
        for schema in &self.schemas {
            schema.validate()?;
        }
        Ok(())
    }

    /// Presets plus configured schemas; a configured schema replaces a preset
    /// of the same name.
    pub fn all_schemas(&self) -> Vec<DatasetSchema> {
        let mut schemas = vec![DatasetSchema::life(), DatasetSchema::property()];
        for configured in &self.schemas {
            match schemas.iter_mut().find(|s| s.name == configured.name) {
                Some(existing) => *existing = configured.clone(),
                None => schemas.push(configured.clone()),
            }
        }
        schemas
    }

    pub fn schema(&self, name: &str) -> Option<DatasetSchema> {
        self.all_schemas().into_iter().find(|s| s.name == name)
    }

    pub fn verifier(&self) -> StaticCredentials {
        StaticCredentials::new(&self.credentials)
    }
}
