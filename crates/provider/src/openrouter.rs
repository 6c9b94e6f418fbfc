//! OpenRouter / OpenAI-compatible chat completions endpoint

use crate::*;
use reqwest::Client;
use serde_json::json;
use std::time::Instant;

/// `Llm` backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenRouterLlm {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    pricing: Pricing,
    max_tokens: u32,
    temperature: f32,
    is_openrouter: bool,
}

impl OpenRouterLlm {
    pub fn new(api_key: impl Into<String>, api_base: Option<String>, model: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let is_openrouter = api_key.starts_with("sk-or-")
            || api_base
                .as_ref()
                .map(|b| b.contains("openrouter"))
                .unwrap_or(false);

        let api_base = api_base.unwrap_or_else(|| {
            if is_openrouter {
                "https://openrouter.ai/api/v1".to_string()
            } else {
                "https://api.openai.com/v1".to_string()
            }
        });

        Self {
            client: Client::new(),
            api_key,
            api_base,
            model: model.into(),
            pricing: Pricing::default(),
            max_tokens: 8192,
            temperature: 0.7,
            is_openrouter,
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_defaults(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn build_request(&self, request: &GenerateRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages()
            .iter()
            .map(|m| json!({ "role": &m.role, "content": &m.content }))
            .collect();

        let mut body = json!({
            "model": &self.model,
            "messages": messages,
            "max_tokens": request.options.max_tokens.unwrap_or(self.max_tokens),
            "temperature": request.options.temperature.unwrap_or(self.temperature),
        });

        if !request.options.stop_sequences.is_empty() {
            body["stop"] = json!(request.options.stop_sequences);
        }
        if self.is_openrouter {
            body["usage"] = json!({ "include": true });
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value, duration_ms: u64) -> Result<Generation> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let text = choice["message"]["content"]
            .as_str()
            .ok_or(ProviderError::InvalidResponse)?
            .to_string();

        let usage = if let Some(usage) = json["usage"].as_object() {
            let field = |name: &str| usage.get(name).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            Usage {
                prompt_tokens: field("prompt_tokens"),
                completion_tokens: field("completion_tokens"),
                total_tokens: field("total_tokens"),
            }
        } else {
            Usage::default()
        };

        // OpenRouter reports the billed amount directly when asked to
        let cost = json["usage"]["cost"]
            .as_f64()
            .unwrap_or_else(|| self.pricing.cost(&usage));

        Ok(Generation {
            text,
            model: json["model"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| self.model.clone()),
            usage,
            cost,
            duration_ms,
        })
    }
}

#[async_trait::async_trait]
impl Llm for OpenRouterLlm {
    async fn generate_text(&self, request: GenerateRequest) -> Result<Generation> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }
        trace!("calling {} with model {}", self.api_base, self.model);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&request);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }
            let error = json["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(ProviderError::Api(error));
        }

        let generation = self.parse_response(json, started.elapsed().as_millis() as u64)?;
        debug!(
            model = %generation.model,
            tokens = generation.usage.total_tokens,
            cost = generation.cost,
            "generation complete"
        );
        Ok(generation)
    }

    fn model_id(&self) -> String {
        let prefix = if self.is_openrouter { "openrouter" } else { "openai" };
        format!("{}:{}", prefix, self.model)
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
