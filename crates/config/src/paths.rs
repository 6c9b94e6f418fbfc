//! Data directory layout

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "AGENTRY_HOME";

/// Root data directory (`$AGENTRY_HOME` or `~/.agentry`)
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentry")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Default root for agent working directories
pub fn workspace_path() -> PathBuf {
    data_dir().join("workspace")
}

/// Persisted execution contexts
pub fn agents_dir() -> PathBuf {
    data_dir().join("agents")
}

/// Persisted LLM call records
pub fn llm_calls_dir() -> PathBuf {
    data_dir().join("llm-calls")
}

/// Persisted function cache entries
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Replace characters that are unsafe in file names
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}
