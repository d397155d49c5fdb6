//! Configuration for link-check.
//!
//! Everything is read from the environment once at startup; a bad value
//! stops the run before any request is processed.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use domain::adapters::memory::Fixtures;
use domain::PipelineConfig;
use serde::de::DeserializeOwned;

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Configuration error for {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

fn is_truthy(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn read_json<T: DeserializeOwned>(field: &'static str, path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError {
        field,
        message: format!("cannot read '{}': {}", path.display(), e),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError {
        field,
        message: format!("invalid JSON in '{}': {}", path.display(), e),
    })
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_format: LogFormat,
    /// Where the pipeline config came from, if not the built-in default.
    pub pipeline_path: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    /// Seed data for the in-memory store.
    pub fixtures: Fixtures,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_format =
            LogFormat::from_str(&env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()));

        let pipeline_path = env::var("LINK_PIPELINE_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let mut pipeline: PipelineConfig = match &pipeline_path {
            Some(path) => read_json("LINK_PIPELINE_CONFIG", path)?,
            None => PipelineConfig::default(),
        };

        let fixtures = match env::var("LINK_FIXTURES").ok().filter(|s| !s.is_empty()) {
            Some(path) => read_json("LINK_FIXTURES", Path::new(&path))?,
            None => Fixtures::default(),
        };

        if let Ok(flag) = env::var("STORAGE_ENABLED") {
            pipeline.storage_enabled = is_truthy(&flag);
        }

        if let Some(domain) = env::var("DEFAULT_DOMAIN").ok().map(|s| s.trim().to_lowercase()) {
            if domain.is_empty() || domain.contains(char::is_whitespace) {
                return Err(ConfigError {
                    field: "DEFAULT_DOMAIN",
                    message: format!("'{}' is not a domain", domain),
                });
            }
            pipeline.default_domain = domain;
        }

        Ok(Self {
            log_format,
            pipeline_path,
            pipeline,
            fixtures,
        })
    }

    /// Log warnings about capabilities that are switched off.
    pub fn warn_if_degraded(&self) {
        if !self.pipeline.storage_enabled {
            tracing::warn!(
                "STORAGE_ENABLED is off: links with custom preview images (proxy) will be \
                 rejected."
            );
        }
        if self.pipeline_path.is_none() {
            tracing::info!("LINK_PIPELINE_CONFIG not set: using built-in platform domains.");
        }
    }
}
