//! Shared fixtures: a scripted model and a fully wired runner

#![allow(dead_code)]

use agentry_agent::functions::{AgentFunctions, FileSystemFunctions, TestFunctions};
use agentry_agent::{
    AgentRunner, CancellationSignal, ControlLoop, Dispatcher, FunctionCache, FunctionRegistry,
    HitlGate, LaunchMode, ModelClient, RetryPolicy,
};
use agentry_context::{AgentParams, LlmTiers};
use agentry_provider::{GenerateRequest, Generation, Llm, LlmRegistry, ProviderError};
use agentry_store::{MemoryAgentStore, MemoryLlmCallStore};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const MODEL: &str = "mock:planner";

type Responder = Box<dyn Fn(&GenerateRequest) -> String + Send + Sync>;

/// Replies from a queue, then from an optional responder
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    cost: f64,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[String], cost: f64) -> Self {
        Self {
            replies: Mutex::new(replies.iter().cloned().collect()),
            responder: None,
            cost,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn responding(
        cost: f64,
        responder: impl Fn(&GenerateRequest) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            cost,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: String) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn generate_text(&self, request: GenerateRequest) -> Result<Generation, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let queued = self.replies.lock().unwrap().pop_front();
        let text = match (queued, &self.responder) {
            (Some(text), _) => text,
            (None, Some(responder)) => responder(&request),
            (None, None) => return Err(ProviderError::Api("no scripted reply left".to_string())),
        };
        Ok(Generation::text(text).with_cost(self.cost))
    }

    fn model_id(&self) -> String {
        MODEL.to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// A planning reply carrying `body` as its script
pub fn plan(body: &str) -> String {
    format!("Next step.\n<script>\n{}\n</script>", body)
}

pub struct Harness {
    pub llm: Arc<ScriptedLlm>,
    pub functions: Arc<TestFunctions>,
    pub store: Arc<MemoryAgentStore>,
    pub calls: Arc<MemoryLlmCallStore>,
    pub cancel: CancellationSignal,
    pub control: Arc<ControlLoop>,
    pub runner: AgentRunner,
    pub workspace: TempDir,
}

impl Harness {
    pub fn new(llm: ScriptedLlm) -> Self {
        Self::build(llm, HitlGate::suspending(), None, LaunchMode::Foreground)
    }

    pub fn with_gate(llm: ScriptedLlm, gate: HitlGate) -> Self {
        Self::build(llm, gate, None, LaunchMode::Foreground)
    }

    pub fn build(
        llm: ScriptedLlm,
        gate: HitlGate,
        max_run: Option<Duration>,
        mode: LaunchMode,
    ) -> Self {
        let llm = Arc::new(llm);
        let functions = Arc::new(TestFunctions::new());

        let mut registry = FunctionRegistry::new();
        registry.register(Arc::new(AgentFunctions::new())).unwrap();
        registry.register(Arc::new(FileSystemFunctions::new())).unwrap();
        registry.register(functions.clone()).unwrap();

        let cache = FunctionCache::new(RetryPolicy::new(3, Duration::from_millis(1)));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), Arc::new(cache)));

        let llms = LlmRegistry::new();
        llms.register(MODEL, llm.clone());
        let calls = Arc::new(MemoryLlmCallStore::new());
        let models = Arc::new(ModelClient::new(Arc::new(llms), calls.clone()));

        let store = Arc::new(MemoryAgentStore::new());
        let cancel = CancellationSignal::new();
        let control = Arc::new(
            ControlLoop::new(dispatcher, models, store.clone(), gate, cancel.clone())
                .with_max_run(max_run),
        );
        let runner = AgentRunner::new(control.clone(), calls.clone())
            .with_mode(mode)
            .with_stop_polling(Duration::from_millis(20), Duration::from_secs(5));

        Self {
            llm,
            functions,
            store,
            calls,
            cancel,
            control,
            runner,
            workspace: TempDir::new().unwrap(),
        }
    }

    pub fn params(&self, prompt: &str) -> AgentParams {
        AgentParams {
            name: "test-agent".to_string(),
            user_prompt: prompt.to_string(),
            llms: LlmTiers {
                easy: MODEL.to_string(),
                medium: MODEL.to_string(),
                hard: MODEL.to_string(),
                xhard: MODEL.to_string(),
            },
            functions: vec!["Agent".to_string(), "TestFunctions".to_string()],
            workspace: self.workspace.path().to_path_buf(),
            ..Default::default()
        }
    }

    /// Model calls recorded with `description`
    pub async fn calls_described(&self, description: &str) -> usize {
        self.calls
            .all()
            .await
            .iter()
            .filter(|call| call.description == description)
            .count()
    }
}
