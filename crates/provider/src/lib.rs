//! LLM capability
//!
//! A single `Llm` trait covers every model the runtime talks to. Concrete
//! endpoints implement it; the agent crate binds them to complexity tiers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, trace};

pub mod call;
pub mod openrouter;

pub use call::LlmCall;
pub use openrouter::OpenRouterLlm;

/// Model invocation errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider rejected request: {0}")]
    Api(String),

    #[error("no api key configured")]
    NoApiKey,

    #[error("malformed provider response")]
    InvalidResponse,

    #[error("rate limited")]
    RateLimited,

    #[error("no JSON found in model output: {0}")]
    NoJson(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Token consumption of one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Per-million-token prices in USD
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Pricing {
    pub fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    pub fn cost(&self, usage: &Usage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_mtok
            + usage.completion_tokens as f64 * self.output_per_mtok)
            / 1_000_000.0
    }
}

/// Conversation entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub stop_sequences: Vec<String>,
    pub max_tokens: Option<u32>,
}

/// One text generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.options.stop_sequences.push(stop.into());
        self
    }

    /// Messages sent to chat-style endpoints
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.prompt.clone()));
        messages
    }
}

/// Model output plus what it cost
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub usage: Usage,
    pub cost: f64,
    pub duration_ms: u64,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// A language model
#[async_trait]
pub trait Llm: Send + Sync {
    async fn generate_text(&self, request: GenerateRequest) -> Result<Generation>;

    /// Generate and parse the first JSON value in the output
    async fn generate_json(&self, request: GenerateRequest) -> Result<(Value, Generation)> {
        let generation = self.generate_text(request).await?;
        let value = extract_json(&generation.text)?;
        Ok((value, generation))
    }

    /// Stable identifier, e.g. `openrouter:anthropic/claude-sonnet-4`
    fn model_id(&self) -> String;

    fn is_configured(&self) -> bool;
}

/// Pull a JSON object or array out of free-form model output.
///
/// Accepts a fenced ```json block, a bare document, or the outermost
/// `{...}`/`[...]` span embedded in prose.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Ok(value);
            }
        }
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    let preview: String = trimmed.chars().take(80).collect();
    Err(ProviderError::NoJson(preview))
}

/// Builds an `Llm` for a model id the registry has not seen yet
pub type LlmFactory = Arc<dyn Fn(&str) -> Arc<dyn Llm> + Send + Sync>;

/// Resolves model ids to bound `Llm` instances
#[derive(Default)]
pub struct LlmRegistry {
    models: RwLock<HashMap<String, Arc<dyn Llm>>>,
    factory: Option<LlmFactory>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that creates unknown ids on demand
    pub fn with_factory(factory: LlmFactory) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            factory: Some(factory),
        }
    }

    pub fn register(&self, id: impl Into<String>, llm: Arc<dyn Llm>) {
        let id = id.into();
        debug!("registering model {}", id);
        self.models
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, llm);
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Llm>> {
        if let Some(llm) = self
            .models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return Ok(Arc::clone(llm));
        }

        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| ProviderError::UnknownModel(id.to_string()))?;
        trace!("creating model {} from factory", id);
        let llm = factory(id);
        self.register(id, Arc::clone(&llm));
        Ok(llm)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
