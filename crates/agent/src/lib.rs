//! Agent execution engine
//!
//! Function dispatch, the sandboxed script runner, the HITL gate,
//! cooperative cancellation and the control loop that ties them together.

use agentry_context::{ContextError, RunningState};
use agentry_provider::ProviderError;
use agentry_store::StoreError;
use thiserror::Error;

pub mod cancel;
pub mod functions;
pub mod hitl;
pub mod llm;
pub mod loop_agent;
pub mod prompt;
pub mod runner;
pub mod sandbox;

pub use cancel::CancellationSignal;
pub use functions::{
    CacheScope, Dispatcher, FunctionCache, FunctionCall, FunctionClass, FunctionRegistry,
    FunctionSchema, RetryPolicy,
};
pub use hitl::{AutoApprove, AutoDecline, Confirmation, GateOutcome, HitlGate, HitlRequest};
pub use llm::ModelClient;
pub use loop_agent::ControlLoop;
pub use prompt::PromptBuilder;
pub use runner::{AgentRunner, LaunchMode};
pub use sandbox::{SandboxLimits, ScriptOutcome, ScriptRunner};

/// Failure raised by a function class method
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("{0}")]
    Failed(String),

    /// Worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{class} has no method {method}")]
    UnknownMethod { class: String, method: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Failure resolving or validating a call
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("function '{name}' not found; available: {}", available.join(", "))]
    FunctionNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("{function}: invalid parameter '{name}'; valid parameters: {}", valid.join(", "))]
    InvalidParameter {
        function: String,
        name: String,
        valid: Vec<String>,
    },

    #[error("{function}: missing required parameter '{name}'")]
    MissingParameter { function: String, name: String },

    /// Raised by the method itself, unchanged
    #[error(transparent)]
    Function(#[from] FunctionError),
}

/// Failure building the function registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no metadata for {0}")]
    MissingMetadata(String),

    #[error("invalid metadata for {class}: {source}")]
    InvalidMetadata {
        class: String,
        source: serde_json::Error,
    },

    #[error("metadata for {class} names undeclared method {method}")]
    UndeclaredMethod { class: String, method: String },

    #[error("class {0} registered twice")]
    Duplicate(String),
}

/// Failure running a sandbox script
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("script error: {0}")]
    Runtime(String),

    #[error("script repair failed: {0}")]
    Repair(String),
}

impl SandboxError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, SandboxError::Syntax { .. })
    }
}

/// Agent engine errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("model error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("no script found in plan")]
    NoScript,

    #[error("agent force stopped")]
    ForceStopped,

    #[error("agent {agent_id} is {actual}, expected {expected}")]
    InvalidState {
        agent_id: String,
        expected: String,
        actual: RunningState,
    },

    #[error("agent {0} is already executing")]
    AlreadyExecuting(String),

    #[error("agent {0} is still executing")]
    StillExecuting(String),

    #[error("execution {given} does not match current execution {current}")]
    ExecutionMismatch { given: String, current: String },

    #[error("user {user} may not control agent {agent_id}")]
    Unauthorized { agent_id: String, user: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
