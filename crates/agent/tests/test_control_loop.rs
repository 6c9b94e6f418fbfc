//! Tests for the control loop state machine

mod common;

use agentry_agent::{AutoApprove, HitlGate, LaunchMode};
use agentry_context::{names, ExecutionContext, RunningState};
use agentry_store::AgentStateStore;
use common::{plan, Harness, ScriptedLlm};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completes_on_reserved_call() {
    let h = Harness::new(ScriptedLlm::new(
        &[plan("let s = TestFunctions_sum(2, 3);\nAgent_completed(`sum is ${s}`);")],
        0.1,
    ));

    let ctx = h.runner.start(h.params("add two numbers")).await.unwrap();

    assert_eq!(ctx.state, RunningState::Completed);
    assert_eq!(ctx.iterations, 0);
    let history = &ctx.function_call_history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].function_name, "TestFunctions.sum");
    assert_eq!(history[0].stdout.as_deref(), Some("5"));
    assert_eq!(history[0].parameters["a"], 2);
    assert_eq!(history[1].function_name, names::AGENT_COMPLETED);
    assert_eq!(history[1].stdout.as_deref(), Some("sum is 5"));

    let saved = h.store.load(&ctx.agent_id).await.unwrap();
    assert_eq!(saved.state, RunningState::Completed);
    assert!((saved.cost - 0.1).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_continues_until_completed() {
    let h = Harness::new(ScriptedLlm::new(
        &[
            plan("print(TestFunctions_echo(\"first\"));"),
            plan("Agent_completed(\"done\");"),
        ],
        0.0,
    ));

    let ctx = h.runner.start(h.params("two steps")).await.unwrap();

    assert_eq!(ctx.state, RunningState::Completed);
    assert_eq!(ctx.iterations, 1);
    assert_eq!(ctx.count_since_hil, 1);

    // Printed output is carried into the next prompt
    let prompts = h.llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Script output:\nfirst"));
    assert!(prompts[1].contains("TestFunctions.echo"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_throwing_function_ends_in_error() {
    let h = Harness::new(ScriptedLlm::new(
        &[plan("TestFunctions_throwError(\"disk on fire\");\nAgent_completed(\"never\");")],
        0.0,
    ));

    let ctx = h.runner.start(h.params("fail please")).await.unwrap();

    assert_eq!(ctx.state, RunningState::Error);
    assert!(ctx.error.as_deref().unwrap().contains("disk on fire"));
    let last = ctx.last_call().unwrap();
    assert_eq!(last.function_name, "TestFunctions.throwError");
    assert_eq!(last.stderr.as_deref(), Some("disk on fire"));

    let saved = h.store.load(&ctx.agent_id).await.unwrap();
    assert_eq!(saved.state, RunningState::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_caught_error_continues() {
    let h = Harness::new(ScriptedLlm::new(
        &[
            plan("try { TestFunctions_throwError(\"flaky disk\"); } catch (err) { print(`caught: ${err}`); }"),
            plan("Agent_completed(\"recovered\");"),
        ],
        0.0,
    ));

    let ctx = h.runner.start(h.params("recover")).await.unwrap();

    assert_eq!(ctx.state, RunningState::Completed);
    assert!(ctx.function_call_history[0].is_error());
    assert!(h.llm.prompts()[1].contains("failed: flaky disk"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plan_without_script_is_an_error() {
    let h = Harness::new(ScriptedLlm::new(&["I would rather not.".to_string()], 0.0));

    let ctx = h.runner.start(h.params("anything")).await.unwrap();

    assert_eq!(ctx.state, RunningState::Error);
    assert_eq!(ctx.error.as_deref(), Some("no script found in plan"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminal_context_is_not_touched() {
    let h = Harness::new(ScriptedLlm::new(&[plan("Agent_completed(\"done\");")], 0.0));
    let done = h.runner.start(h.params("finish")).await.unwrap();
    let prompts_before = h.llm.prompts().len();

    for state in [RunningState::Completed, RunningState::Error, RunningState::Shutdown] {
        let mut ctx: ExecutionContext = done.clone();
        ctx.state = state;

        let replayed = h.control.run(ctx.clone()).await.unwrap();
        assert_eq!(replayed, ctx);
    }

    assert_eq!(h.llm.prompts().len(), prompts_before);
    assert_eq!(h.store.load(&done.agent_id).await.unwrap(), done);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_feedback_round_trip() {
    let h = Harness::new(ScriptedLlm::new(
        &[
            plan("Agent_requestFeedback(\"Which branch?\");"),
            plan("Agent_completed(\"merged\");"),
        ],
        0.0,
    ));

    let paused = h.runner.start(h.params("merge it")).await.unwrap();
    assert_eq!(paused.state, RunningState::HitlFeedback);
    assert!(paused.pending_feedback().is_some());

    let done = h
        .runner
        .provide_feedback(&paused.agent_id, &paused.execution_id, "use main")
        .await
        .unwrap();
    assert_eq!(done.state, RunningState::Completed);

    let second_prompt = &h.llm.prompts()[1];
    assert!(second_prompt.contains("You asked: Which branch?"));
    assert!(second_prompt.contains("The human answered: use main"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_iteration_threshold_suspends_and_resumes() {
    let h = Harness::new(ScriptedLlm::new(
        &[
            plan("TestFunctions_echo(1);"),
            plan("TestFunctions_echo(2);"),
            plan("Agent_completed(\"ok\");"),
        ],
        0.0,
    ));
    let mut params = h.params("count");
    params.hil_count = 2;

    let halted = h.runner.start(params).await.unwrap();
    assert_eq!(halted.state, RunningState::HitlThreshold);
    assert_eq!(halted.iterations, 2);
    assert_eq!(h.llm.prompts().len(), 2);

    let done = h
        .runner
        .resume_hil(&halted.agent_id, &halted.execution_id, "")
        .await
        .unwrap();
    assert_eq!(done.state, RunningState::Completed);
    assert_eq!(done.count_since_hil, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_budget_threshold_raises_budget_on_resume() {
    let h = Harness::new(ScriptedLlm::new(
        &[plan("TestFunctions_echo(1);"), plan("Agent_completed(\"ok\");")],
        1.0,
    ));
    let mut params = h.params("spend");
    params.budget = 1.0;
    params.hil_budget = 0.5;

    let halted = h.runner.start(params).await.unwrap();
    assert_eq!(halted.state, RunningState::HitlThreshold);
    assert_eq!(halted.budget_remaining, 0.0);

    let done = h
        .runner
        .resume_hil(&halted.agent_id, &halted.execution_id, "")
        .await
        .unwrap();
    assert_eq!(done.state, RunningState::Completed);
    assert!((done.budget - 1.5).abs() < 1e-9);
    // The second plan cost 1.0 against a 0.5 raise
    assert_eq!(done.budget_remaining, 0.0);
    assert!((done.cost - 2.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_gate_approves_inline() {
    let h = Harness::with_gate(
        ScriptedLlm::new(
            &[plan("TestFunctions_echo(1);"), plan("Agent_completed(\"ok\");")],
            0.0,
        ),
        HitlGate::blocking(Arc::new(AutoApprove)),
    );
    let mut params = h.params("approve");
    params.hil_count = 1;

    let ctx = h.runner.start(params).await.unwrap();
    assert_eq!(ctx.state, RunningState::Completed);
    assert_eq!(ctx.iterations, 1);
    assert_eq!(ctx.count_since_hil, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_max_run_times_out() {
    let h = Harness::build(
        ScriptedLlm::new(&[], 0.0),
        HitlGate::suspending(),
        Some(Duration::ZERO),
        LaunchMode::Foreground,
    );

    let ctx = h.runner.start(h.params("slow")).await.unwrap();
    assert_eq!(ctx.state, RunningState::Timeout);
    assert!(h.llm.prompts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_request_is_seen_at_checkpoint() {
    let h = Harness::new(ScriptedLlm::new(&[plan("Agent_completed(\"x\");")], 0.0));
    let ctx = h.runner.create(h.params("stop me")).await.unwrap();
    h.cancel.request(&ctx.agent_id);

    let stopped = h.control.run(ctx).await.unwrap();
    assert_eq!(stopped.state, RunningState::Error);
    assert_eq!(stopped.error.as_deref(), Some("agent force stopped"));
    assert!(h.llm.prompts().is_empty());
    assert!(!h.cancel.is_requested(&stopped.agent_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_model_failure_ends_in_error() {
    // No replies queued: the model call itself fails
    let h = Harness::new(ScriptedLlm::new(&[], 0.0));

    let ctx = h.runner.start(h.params("no model")).await.unwrap();
    assert_eq!(ctx.state, RunningState::Error);
    assert!(ctx.error.as_deref().unwrap().contains("no scripted reply left"));
    assert_eq!(h.calls_described("plan").await, 1);
}
