//! Application configuration for policytag.
//!
//! User config lives at `~/.policytag/policytag.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PolicyTagError, Result};
use crate::labels::{LabelSet, LlmPolicy};
use crate::products::{ProductEntry, ProductTable, default_products};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "policytag.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".policytag";

/// Env var that overrides `tagging.cache_max`.
pub const CACHE_MAX_ENV: &str = "TAGGING_RESULT_CACHE_MAX";

// ---------------------------------------------------------------------------
// Config structs (matching policytag.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Upstage service settings.
    #[serde(default)]
    pub upstage: UpstageConfig,

    /// Tagger settings.
    #[serde(default)]
    pub tagging: TaggingConfig,

    /// Registered (insurer, product) → name rows.
    #[serde(default = "default_products")]
    pub products: Vec<ProductEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            upstage: UpstageConfig::default(),
            tagging: TaggingConfig::default(),
            products: default_products(),
        }
    }
}

impl AppConfig {
    pub fn product_table(&self) -> ProductTable {
        ProductTable::new(self.products.clone())
    }
}

/// Output format for per-page files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFormat {
    #[default]
    Html,
    Text,
    Markdown,
}

impl PageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for page/chunk outputs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Embedding model recorded on every tagged chunk.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Format of per-page files.
    #[serde(default)]
    pub page_format: PageFormat,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            embedding_model: default_embedding_model(),
            page_format: PageFormat::default(),
        }
    }
}

fn default_output_dir() -> String {
    "var/terms".into()
}
fn default_embedding_model() -> String {
    "solar-embedding-1-large".into()
}

/// `[upstage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstageConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model used for classification.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Document-parse model.
    #[serde(default = "default_parse_model")]
    pub parse_model: String,

    /// Per-request timeout for classifier calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for the document-parse upload.
    #[serde(default = "default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,

    /// Interval between "still parsing" log lines.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for UpstageConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            parse_model: default_parse_model(),
            timeout_secs: default_timeout_secs(),
            parse_timeout_secs: default_parse_timeout_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl UpstageConfig {
    /// Resolve `base_url` joined with a relative endpoint path.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| {
            PolicyTagError::config(format!("invalid upstage.base_url '{}': {e}", self.base_url))
        })?;
        base.join(path)
            .map_err(|e| PolicyTagError::config(format!("invalid endpoint '{path}': {e}")))
    }
}

fn default_api_key_env() -> String {
    "UPSTAGE_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.upstage.ai/v1".into()
}
fn default_chat_model() -> String {
    "solar-pro2".into()
}
fn default_parse_model() -> String {
    "document-parse".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_parse_timeout_secs() -> u64 {
    600
}
fn default_heartbeat_secs() -> u64 {
    10
}

/// `[tagging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    /// When to escalate to the LLM classifier.
    #[serde(default)]
    pub llm_policy: LlmPolicy,

    /// Rule confidence below this escalates under `unknown_or_low_conf`.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Maximum number of cached tags.
    #[serde(default = "default_cache_max")]
    pub cache_max: usize,

    /// Active clause-type vocabulary.
    #[serde(default)]
    pub label_set: LabelSet,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            llm_policy: LlmPolicy::default(),
            confidence_threshold: default_confidence_threshold(),
            cache_max: default_cache_max(),
            label_set: LabelSet::default(),
        }
    }
}

impl TaggingConfig {
    /// `cache_max`, unless overridden by `TAGGING_RESULT_CACHE_MAX`.
    pub fn effective_cache_max(&self) -> usize {
        std::env::var(CACHE_MAX_ENV)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.cache_max)
    }
}

fn default_confidence_threshold() -> f64 {
    0.55
}
fn default_cache_max() -> usize {
    5000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.policytag/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PolicyTagError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.policytag/policytag.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PolicyTagError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PolicyTagError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PolicyTagError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PolicyTagError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PolicyTagError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let threshold = config.tagging.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(PolicyTagError::config(format!(
            "tagging.confidence_threshold must be within [0, 1], got {threshold}"
        )));
    }
    if config.upstage.timeout_secs == 0 {
        return Err(PolicyTagError::config("upstage.timeout_secs must be non-zero"));
    }
    config.upstage.endpoint("chat/completions")?;
    Ok(())
}

/// Read the Upstage API key from the configured env var. Empty counts as unset.
pub fn resolve_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.upstage.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Like [`resolve_api_key`], but a missing key is a [`PolicyTagError::MissingCredential`].
pub fn require_api_key(config: &AppConfig) -> Result<String> {
    resolve_api_key(config).ok_or_else(|| PolicyTagError::MissingCredential {
        env_var: config.upstage.api_key_env.clone(),
    })
}
