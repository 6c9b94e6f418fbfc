//! Tests for Config serialization, defaults and persistence

use agentry_config::{Config, ConfigError, HitlMode, ProviderConfig};
use tempfile::TempDir;

/// Helper to create a temporary directory for tests
fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.llm.hard, "anthropic/claude-sonnet-4");
    assert_eq!(config.llm.xhard, config.llm.hard);
    assert_eq!(config.llm.max_tokens, 8192);

    assert_eq!(config.agent.budget, 2.0);
    assert_eq!(config.agent.hil_budget, 1.0);
    assert_eq!(config.agent.hil_count, 5);
    assert_eq!(config.agent.hitl_mode, HitlMode::Suspend);
    assert_eq!(config.agent.functions, vec!["Agent", "FileSystem"]);
    assert!(config.agent.max_run_seconds.is_none());

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 18790);
    assert_eq!(config.cache.retries, 3);

    assert!(config.providers.openrouter.api_key.is_empty());
    assert!(!config.has_api_key());
}

#[test]
fn test_partial_json_uses_defaults() {
    let json = r#"{ "agent": { "budget": 10.5, "hitlMode": "blocking" } }"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.agent.budget, 10.5);
    assert_eq!(config.agent.hitl_mode, HitlMode::Blocking);
    assert_eq!(config.agent.hil_count, 5);
    assert_eq!(config.server.port, 18790);
}

#[test]
fn test_camel_case_serialization() {
    let config = Config::default();
    let json = serde_json::to_string(&config).unwrap();

    assert!(json.contains("\"hilBudget\""));
    assert!(json.contains("\"maxTokens\""));
    assert!(json.contains("\"retryBackoffMs\""));
    assert!(!json.contains("maxRunSeconds"));
}

#[test]
fn test_api_key_prefers_openrouter() {
    let mut config = Config::default();
    config.providers.openai = ProviderConfig {
        api_key: "sk-openai".to_string(),
        ..Default::default()
    };
    assert_eq!(config.api_key().as_deref(), Some("sk-openai"));
    assert_eq!(config.api_base(), None);

    config.providers.openrouter.api_key = "sk-or-1".to_string();
    assert_eq!(config.api_key().as_deref(), Some("sk-or-1"));
    assert_eq!(
        config.api_base().as_deref(),
        Some("https://openrouter.ai/api/v1")
    );
    assert_eq!(config.active_provider().api_key, "sk-or-1");
}

#[test]
fn test_store_dirs_override() {
    let mut config = Config::default();
    config.store.agents_dir = Some("/var/lib/agentry/agents".to_string());

    assert_eq!(
        config.agents_dir(),
        std::path::PathBuf::from("/var/lib/agentry/agents")
    );
}

#[tokio::test]
async fn test_save_and_load_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.agent.hil_count = 9;
    config.llm.easy = "test/easy".to_string();
    config.save_to(&path).await.unwrap();

    let loaded = Config::load_from(&path).await.unwrap();
    assert_eq!(loaded.agent.hil_count, 9);
    assert_eq!(loaded.llm.easy, "test/easy");
}

#[tokio::test]
async fn test_load_missing_file_returns_defaults() {
    let dir = temp_dir();
    let config = Config::load_from(&dir.path().join("absent.json"))
        .await
        .unwrap();
    assert_eq!(config.agent.hil_count, 5);
}

#[tokio::test]
async fn test_load_rejects_invalid_budget() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, r#"{ "agent": { "hilBudget": -2 } }"#)
        .await
        .unwrap();

    let result = Config::load_from(&path).await;
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[tokio::test]
async fn test_load_malformed_json() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let result = Config::load_from(&path).await;
    assert!(matches!(result, Err(ConfigError::Json(_))));
}
