//! TOML configuration parsing and validation.
//!
//! Every section is optional; missing values fall back to the documented
//! defaults. See [`load_config`] for the validation rules.
//!
//! ```toml
//! [engine]
//! max_bytes_per_call = 60000
//! max_concurrent_calls = 3
//! chunk_overhead_bytes = 2000
//! min_chunk_bytes = 10000
//! cache_max_age_secs = 3600
//!
//! [schema]
//! text_collection = "documents"
//! media_collection = "media"
//! id_field = "id"
//! content_field = "content"
//! timestamp_fields = ["timestamp", "created_at"]
//!
//! [backend]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```

use anyhow::{Context, Result};
use casecheck_core::models::DocumentSchema;
use casecheck_core::plan::{
    DEFAULT_MAX_BYTES_PER_CALL, DEFAULT_MIN_CHUNK_BYTES, DEFAULT_OVERHEAD_BYTES,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upper bound for `engine.max_concurrent_calls`.
pub const MAX_CONCURRENT_CALLS_LIMIT: usize = 32;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub schema: DocumentSchema,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_max_bytes_per_call")]
    pub max_bytes_per_call: usize,
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    #[serde(default = "default_chunk_overhead_bytes")]
    pub chunk_overhead_bytes: usize,
    #[serde(default = "default_min_chunk_bytes")]
    pub min_chunk_bytes: usize,
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
}

fn default_max_bytes_per_call() -> usize {
    DEFAULT_MAX_BYTES_PER_CALL
}
fn default_max_concurrent_calls() -> usize {
    3
}
fn default_chunk_overhead_bytes() -> usize {
    DEFAULT_OVERHEAD_BYTES
}
fn default_min_chunk_bytes() -> usize {
    DEFAULT_MIN_CHUNK_BYTES
}
fn default_cache_max_age_secs() -> u64 {
    3600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_bytes_per_call: default_max_bytes_per_call(),
            max_concurrent_calls: default_max_concurrent_calls(),
            chunk_overhead_bytes: default_chunk_overhead_bytes(),
            min_chunk_bytes: default_min_chunk_bytes(),
            cache_max_age_secs: default_cache_max_age_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries per call. Zero unless the caller opts in.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Canned response text for the `file` provider.
    #[serde(default)]
    pub response_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            temperature: default_temperature(),
            response_path: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.0
}

impl BackendConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Validation shared by file-loaded and default configurations.
pub fn validate(config: &Config) -> Result<()> {
    let engine = &config.engine;
    if engine.max_bytes_per_call == 0 {
        anyhow::bail!("engine.max_bytes_per_call must be > 0");
    }
    if engine.min_chunk_bytes == 0 {
        anyhow::bail!("engine.min_chunk_bytes must be > 0");
    }
    if !(1..=MAX_CONCURRENT_CALLS_LIMIT).contains(&engine.max_concurrent_calls) {
        anyhow::bail!(
            "engine.max_concurrent_calls must be in [1, {}]",
            MAX_CONCURRENT_CALLS_LIMIT
        );
    }

    let schema = &config.schema;
    if schema.text_collection.is_empty() || schema.media_collection.is_empty() {
        anyhow::bail!("schema collection names must not be empty");
    }
    if schema.text_collection == schema.media_collection {
        anyhow::bail!("schema.text_collection and schema.media_collection must differ");
    }
    if schema.id_field.is_empty() || schema.content_field.is_empty() {
        anyhow::bail!("schema.id_field and schema.content_field must not be empty");
    }

    let backend = &config.backend;
    match backend.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if backend.model.is_none() {
                anyhow::bail!("backend.model must be specified when provider is 'openai'");
            }
        }
        "file" => {
            if backend.response_path.is_none() {
                anyhow::bail!("backend.response_path must be specified when provider is 'file'");
            }
        }
        other => anyhow::bail!(
            "Unknown backend provider: '{}'. Must be disabled, openai, or file.",
            other
        ),
    }
    if backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    Ok(())
}
