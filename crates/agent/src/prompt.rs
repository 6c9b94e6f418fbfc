//! Prompt assembly for planning and script repair

use agentry_context::{ExecutionContext, FunctionCallResult};
use chrono::Local;
use std::path::Path;
use tracing::debug;

use crate::functions::FunctionSchema;

/// Longest stdout/stderr excerpt shown per history entry
const MAX_OUTPUT_CHARS: usize = 2000;

/// Builds the planning and repair prompts
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    /// Files in the agent's workspace appended to the system prompt
    const BOOTSTRAP_FILES: &'static [&'static str] = &["AGENT.md", "PERSONA.md"];

    pub fn new() -> Self {
        Self
    }

    /// System prompt: identity, callable functions, any bootstrap files
    pub async fn build_system_prompt(
        &self,
        ctx: &ExecutionContext,
        schemas: &[FunctionSchema],
    ) -> String {
        let mut parts = vec![self.identity(ctx), Self::functions_section(schemas)];

        let bootstrap = Self::load_bootstrap_files(&ctx.file_system.base_path).await;
        if !bootstrap.is_empty() {
            parts.push(bootstrap);
        }
        if !ctx.system_prompt.is_empty() {
            parts.push(ctx.system_prompt.clone());
        }

        parts.join("\n\n---\n\n")
    }

    fn identity(&self, ctx: &ExecutionContext) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        format!(
            r#"# agentry

You are an autonomous agent. Each step you write one script that calls the
functions listed below, and you see its results in the next step.

## Current Time
{}

## Working Directory
{}

## Script Format
Reply with a short plan followed by a script inside <script></script> tags.
Scripts use Rhai syntax. Call functions by name, e.g. `Agent_saveMemory("k", "v")`.
Modules json, math, text and time may be imported with `import "json" as json;`.
Call `Agent_completed(note)` when the task is finished, or
`Agent_requestFeedback(question)` to ask the human, as the last call of the script."#,
            now,
            ctx.file_system.working_directory.display()
        )
    }

    fn functions_section(schemas: &[FunctionSchema]) -> String {
        let mut section = String::from("## Functions");
        for schema in schemas {
            section.push_str("\n- ");
            section.push_str(&schema.signature());
            if !schema.description.is_empty() {
                section.push_str(": ");
                section.push_str(&schema.description);
            }
        }
        section
    }

    async fn load_bootstrap_files(workspace: &Path) -> String {
        let mut parts = Vec::new();
        for filename in Self::BOOTSTRAP_FILES {
            let path = workspace.join(filename);
            if !path.is_file() {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => parts.push(format!("## {}\n\n{}", filename, content)),
                Err(e) => debug!("Failed to read {}: {}", filename, e),
            }
        }
        parts.join("\n\n")
    }

    /// The prompt for one planning step
    pub fn build_prompt(&self, ctx: &ExecutionContext) -> String {
        let mut sections = vec![format!("# Task\n{}", ctx.user_prompt)];

        if !ctx.memory.is_empty() {
            let entries: Vec<String> = ctx
                .memory
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, truncate(v, MAX_OUTPUT_CHARS)))
                .collect();
            sections.push(format!("# Memory\n{}", entries.join("\n")));
        }

        let history = ctx.history_view();
        if !history.is_empty() {
            let entries: Vec<String> = history.iter().map(render_call).collect();
            sections.push(format!("# History\n{}", entries.join("\n")));
        }

        if let Some(pending) = ctx.pending_feedback() {
            let question = pending
                .parameters
                .values()
                .next()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            sections.push(format!(
                "# Result\nYou asked: {}\nThe human answered: {}",
                question, ctx.input_prompt
            ));
        } else if !ctx.input_prompt.is_empty() && ctx.input_prompt != ctx.user_prompt {
            sections.push(format!("# Next\n{}", ctx.input_prompt));
        }

        sections.join("\n\n")
    }

    /// Ask for a corrected script after a syntax error
    pub fn repair_prompt(&self, script: &str, error: &str) -> String {
        format!(
            "The following script failed to parse.\n\n<script>\n{}\n</script>\n\nError: {}\n\n\
             Reply with the corrected script inside <script></script> tags. \
             Keep its behaviour unchanged.",
            script, error
        )
    }

    /// `inputPrompt` carried into the next step
    pub fn next_input(&self, output: &[String]) -> String {
        if output.is_empty() {
            "Continue with the task.".to_string()
        } else {
            format!(
                "Continue with the task. Script output:\n{}",
                truncate(&output.join("\n"), MAX_OUTPUT_CHARS)
            )
        }
    }
}

fn render_call(call: &FunctionCallResult) -> String {
    let params = serde_json::to_string(&call.parameters).unwrap_or_default();
    match (&call.stdout, &call.stderr) {
        (_, Some(err)) => format!(
            "- {}({}) failed: {}",
            call.function_name,
            params,
            truncate(err, MAX_OUTPUT_CHARS)
        ),
        (Some(out), None) => format!(
            "- {}({}) -> {}",
            call.function_name,
            params,
            truncate(out, MAX_OUTPUT_CHARS)
        ),
        (None, None) => format!("- {}({})", call.function_name, params),
    }
}

/// Cut `text` to at most `max` characters
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
