//! Memoized function results with bounded retry

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use super::schema::CacheScope;
use crate::FunctionError;

/// Scope key used for globally cached entries
pub const GLOBAL_SCOPE: &str = "global";

/// Retry of transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

/// Run `op`, retrying [`FunctionError::Transient`] failures
pub async fn with_retry<F, Fut>(policy: RetryPolicy, mut op: F) -> Result<Value, FunctionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, FunctionError>>,
{
    let mut delay = policy.backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(FunctionError::Transient(reason)) if attempt < policy.attempts => {
                warn!(attempt, "transient failure, retrying in {:?}: {}", delay, reason);
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Cache of function results keyed by scope, function and arguments
pub struct FunctionCache {
    entries: Mutex<HashMap<String, Value>>,
    loaded_scopes: Mutex<HashSet<String>>,
    persist_dir: Option<PathBuf>,
    retry: RetryPolicy,
}

impl FunctionCache {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            loaded_scopes: Mutex::new(HashSet::new()),
            persist_dir: None,
            retry,
        }
    }

    /// Cache that writes each scope through to `<dir>/<scope>.json`
    pub fn with_persistence(dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            persist_dir: Some(dir.into()),
            ..Self::new(retry)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// `<scope-key>|<Class.method>|<canonical args>`
    pub fn key(scope_key: &str, function: &str, args: &[Value]) -> String {
        // serde_json maps keep keys sorted, so this is canonical
        let args = serde_json::to_string(args).unwrap_or_default();
        format!("{}|{}|{}", scope_key, function, args)
    }

    /// Scope key for `scope` given the ambient agent, if any
    pub fn scope_key(scope: CacheScope, agent_id: Option<&str>) -> Option<String> {
        match scope {
            CacheScope::Global => Some(GLOBAL_SCOPE.to_string()),
            CacheScope::Agent => agent_id.map(str::to_string),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value or compute it with retry, storing only
    /// successful results
    pub async fn get_or_compute<F, Fut>(
        &self,
        scope_key: &str,
        function: &str,
        args: &[Value],
        compute: F,
    ) -> Result<Value, FunctionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, FunctionError>>,
    {
        self.load_scope(scope_key).await;

        let key = Self::key(scope_key, function, args);
        if let Some(value) = self.get(&key) {
            debug!("cache hit {}", function);
            return Ok(value);
        }

        let value = with_retry(self.retry, compute).await?;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value.clone());
        self.persist_scope(scope_key).await;
        Ok(value)
    }

    fn scope_path(&self, scope_key: &str) -> Option<PathBuf> {
        let safe = scope_key.replace([':', '/', '\\'], "_");
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", safe)))
    }

    async fn load_scope(&self, scope_key: &str) {
        let Some(path) = self.scope_path(scope_key) else {
            return;
        };
        if !self
            .loaded_scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(scope_key.to_string())
        {
            return;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Failed to read cache {}: {}", path.display(), e);
                return;
            }
        };
        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(stored) => {
                debug!("loaded {} cache entries for {}", stored.len(), scope_key);
                self.entries
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend(stored);
            }
            Err(e) => warn!("Failed to parse cache {}: {}", path.display(), e),
        }
    }

    async fn persist_scope(&self, scope_key: &str) {
        let Some(path) = self.scope_path(scope_key) else {
            return;
        };
        let prefix = format!("{}|", scope_key);
        let snapshot: Map<String, Value> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let content = match serde_json::to_string_pretty(&snapshot) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to serialize cache {}: {}", scope_key, e);
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Failed to create cache dir {}: {}", parent.display(), e);
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&path, content).await {
            warn!("Failed to write cache {}: {}", path.display(), e);
        }
    }
}

impl Default for FunctionCache {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
