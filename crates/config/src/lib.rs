//! Configuration management for agentry
//!
//! Loads and saves runtime parameters (model tiers, budgets, HITL policy,
//! storage locations) from a JSON file under the data directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{agents_dir, cache_dir, config_path, data_dir, llm_calls_dir, workspace_path};

/// Errors raised while reading or writing configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Credentials and pricing for one OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// USD per million prompt tokens
    #[serde(default)]
    pub input_cost_per_mtok: f64,
    /// USD per million completion tokens
    #[serde(default)]
    pub output_cost_per_mtok: f64,
}

/// All configured LLM endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openrouter: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
}

/// Default model ids for each task-complexity tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmDefaults {
    #[serde(default = "default_easy_model")]
    pub easy: String,
    #[serde(default = "default_medium_model")]
    pub medium: String,
    #[serde(default = "default_hard_model")]
    pub hard: String,
    #[serde(default = "default_hard_model")]
    pub xhard: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmDefaults {
    fn default() -> Self {
        Self {
            easy: default_easy_model(),
            medium: default_medium_model(),
            hard: default_hard_model(),
            xhard: default_hard_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_easy_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_medium_model() -> String {
    "anthropic/claude-3.5-haiku".to_string()
}

fn default_hard_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

/// How the human-in-the-loop gate waits for confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HitlMode {
    /// Block the loop until a confirmation handler answers
    Blocking,
    /// Persist `hitl_threshold` and return; resumed later by an explicit call
    #[default]
    Suspend,
}

impl std::str::FromStr for HitlMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "suspend" => Ok(Self::Suspend),
            other => Err(ConfigError::Invalid {
                field: "hitlMode".to_string(),
                reason: format!("unknown mode '{}', expected blocking or suspend", other),
            }),
        }
    }
}

/// Defaults applied to newly started agents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_budget")]
    pub budget: f64,
    #[serde(default = "default_hil_budget")]
    pub hil_budget: f64,
    #[serde(default = "default_hil_count")]
    pub hil_count: u32,
    #[serde(default)]
    pub hitl_mode: HitlMode,
    #[serde(default = "default_functions")]
    pub functions: Vec<String>,
    /// Wall-clock limit for one execution; `None` disables the check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_run_seconds: Option<u64>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            budget: default_budget(),
            hil_budget: default_hil_budget(),
            hil_count: default_hil_count(),
            hitl_mode: HitlMode::default(),
            functions: default_functions(),
            max_run_seconds: None,
        }
    }
}

fn default_workspace() -> String {
    "~/.agentry/workspace".to_string()
}

fn default_budget() -> f64 {
    2.0
}

fn default_hil_budget() -> f64 {
    1.0
}

fn default_hil_count() -> u32 {
    5
}

fn default_functions() -> Vec<String> {
    vec!["Agent".to_string(), "FileSystem".to_string()]
}

/// Storage locations; empty values fall back to the data directory layout
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_calls_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
}

/// REST server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18790
}

/// Function result cache retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub llm: LlmDefaults,
    #[serde(default)]
    pub agent: AgentDefaults,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location, falling back to defaults when absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("reading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject values the runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.agent.budget < 0.0 {
            return Err(ConfigError::Invalid {
                field: "agent.budget".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        if self.agent.hil_budget < 0.0 {
            return Err(ConfigError::Invalid {
                field: "agent.hilBudget".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(())
    }

    /// Agent working directory root with `~` expanded
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agent.workspace)
    }

    /// Directory holding persisted agent contexts
    pub fn agents_dir(&self) -> PathBuf {
        self.store
            .agents_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(agents_dir)
    }

    /// Directory holding persisted LLM call records
    pub fn llm_calls_dir(&self) -> PathBuf {
        self.store
            .llm_calls_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(llm_calls_dir)
    }

    /// Directory holding persisted function cache entries
    pub fn cache_dir(&self) -> PathBuf {
        self.store
            .cache_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(cache_dir)
    }

    /// First configured API key, OpenRouter preferred
    pub fn api_key(&self) -> Option<String> {
        [&self.providers.openrouter, &self.providers.openai]
            .into_iter()
            .map(|p| p.api_key.clone())
            .find(|k| !k.is_empty())
    }

    /// Endpoint matching the selected API key
    pub fn api_base(&self) -> Option<String> {
        if !self.providers.openrouter.api_key.is_empty() {
            return self
                .providers
                .openrouter
                .api_base
                .clone()
                .or_else(|| Some("https://openrouter.ai/api/v1".to_string()));
        }

        self.providers
            .openai
            .api_base
            .clone()
            .filter(|b| !b.is_empty())
    }

    /// Provider entry matching the selected API key
    pub fn active_provider(&self) -> &ProviderConfig {
        if !self.providers.openrouter.api_key.is_empty() {
            &self.providers.openrouter
        } else {
            &self.providers.openai
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Write default config (if missing) and create the data directories
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("config already present at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("wrote default config to {:?}", config_path);
    }

    let config = Config::load().await?;
    for dir in [
        config.workspace_path(),
        config.agents_dir(),
        config.llm_calls_dir(),
        config.cache_dir(),
    ] {
        tokio::fs::create_dir_all(&dir).await?;
        debug!("ensured directory {:?}", dir);
    }

    Ok(config)
}
