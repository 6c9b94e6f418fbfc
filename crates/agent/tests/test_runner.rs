//! Tests for agent lifecycle operations

mod common;

use agentry_agent::{AgentError, DispatchError, HitlGate, LaunchMode};
use agentry_context::{ambient, names, RunningState};
use agentry_store::{AgentStateStore, StoreError};
use common::{plan, Harness, ScriptedLlm};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_rejects_unknown_class() {
    let h = Harness::new(ScriptedLlm::new(&[], 0.0));
    let mut params = h.params("bad functions");
    params.functions.push("Nope".to_string());

    let err = h.runner.start(params).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::Dispatch(DispatchError::FunctionNotFound { .. })
    ));
    assert!(h.runner.list().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_list_details_and_llm_calls() {
    let h = Harness::new(ScriptedLlm::new(
        &[
            plan("Agent_requestFeedback(\"more?\");"),
            plan("Agent_completed(\"done\");"),
        ],
        0.0,
    ));
    let waiting = h.runner.start(h.params("first")).await.unwrap();
    let done = h.runner.start(h.params("second")).await.unwrap();

    let all = h.runner.list().await.unwrap();
    assert_eq!(all.len(), 2);

    let running = h.runner.list_running().await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].agent_id, waiting.agent_id);

    let details = h.runner.details(&done.agent_id).await.unwrap();
    assert_eq!(details.state, RunningState::Completed);

    let calls = h.runner.llm_calls(&done.agent_id).await.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].description, "plan");
    assert_eq!(calls[0].execution_id.as_deref(), Some(done.execution_id.as_str()));

    assert!(matches!(
        h.runner.details("missing").await,
        Err(AgentError::Store(StoreError::NotFound(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_checks_state_and_execution() {
    let h = Harness::new(ScriptedLlm::new(&[plan("Agent_completed(\"done\");")], 0.0));
    let done = h.runner.start(h.params("finish")).await.unwrap();

    let wrong_state = h
        .runner
        .resume_error(&done.agent_id, &done.execution_id, "again")
        .await
        .unwrap_err();
    assert!(matches!(
        wrong_state,
        AgentError::InvalidState { actual: RunningState::Completed, .. }
    ));

    let mismatch = h
        .runner
        .resume_completed(&done.agent_id, "stale-execution", "again")
        .await
        .unwrap_err();
    assert!(matches!(mismatch, AgentError::ExecutionMismatch { .. }));

    let feedback = h
        .runner
        .provide_feedback(&done.agent_id, &done.execution_id, "  ")
        .await
        .unwrap_err();
    assert!(matches!(feedback, AgentError::InvalidRequest(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_completed_starts_new_execution() {
    let h = Harness::new(ScriptedLlm::new(
        &[plan("Agent_completed(\"v1\");"), plan("Agent_completed(\"v2\");")],
        0.0,
    ));
    let first = h.runner.start(h.params("write v1")).await.unwrap();

    let second = h
        .runner
        .resume_completed(&first.agent_id, &first.execution_id, "now write v2")
        .await
        .unwrap();

    assert_eq!(second.state, RunningState::Completed);
    assert_eq!(second.agent_id, first.agent_id);
    assert_ne!(second.execution_id, first.execution_id);
    assert_eq!(second.function_call_history.len(), 2);
    assert!(h.llm.prompts()[1].contains("# Next\nnow write v2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_hil_starts_new_execution() {
    let h = Harness::new(ScriptedLlm::new(
        &[plan("TestFunctions_echo(\"a\");"), plan("TestFunctions_echo(\"b\");")],
        0.0,
    ));
    let mut params = h.params("pause every step");
    params.hil_count = 1;
    let first = h.runner.start(params).await.unwrap();
    assert_eq!(first.state, RunningState::HitlThreshold);

    let second = h
        .runner
        .resume_hil(&first.agent_id, &first.execution_id, "")
        .await
        .unwrap();
    assert_eq!(second.state, RunningState::HitlThreshold);
    assert_ne!(second.execution_id, first.execution_id);

    let stale = h
        .runner
        .resume_hil(&first.agent_id, &first.execution_id, "")
        .await
        .unwrap_err();
    assert!(matches!(stale, AgentError::ExecutionMismatch { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_feedback_starts_new_execution() {
    let h = Harness::new(ScriptedLlm::new(
        &[
            plan("Agent_requestFeedback(\"which?\");"),
            plan("Agent_requestFeedback(\"and then?\");"),
        ],
        0.0,
    ));
    let first = h.runner.start(h.params("ask twice")).await.unwrap();
    assert_eq!(first.state, RunningState::HitlFeedback);

    let second = h
        .runner
        .provide_feedback(&first.agent_id, &first.execution_id, "the left one")
        .await
        .unwrap();
    assert_eq!(second.state, RunningState::HitlFeedback);
    assert_ne!(second.execution_id, first.execution_id);

    let stale = h
        .runner
        .provide_feedback(&first.agent_id, &first.execution_id, "the right one")
        .await
        .unwrap_err();
    assert!(matches!(stale, AgentError::ExecutionMismatch { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leftover_stop_request_does_not_end_next_run() {
    let h = Harness::new(ScriptedLlm::new(
        &[plan("Agent_completed(\"v1\");"), plan("Agent_completed(\"v2\");")],
        0.0,
    ));
    let first = h.runner.start(h.params("write v1")).await.unwrap();
    assert_eq!(first.state, RunningState::Completed);

    // Stop arrived after the run had already finished
    h.cancel.request(&first.agent_id);

    let second = h
        .runner
        .resume_completed(&first.agent_id, &first.execution_id, "now write v2")
        .await
        .unwrap();
    assert_eq!(second.state, RunningState::Completed);
    assert!(second.error.is_none());
    assert!(!h.cancel.is_requested(&first.agent_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_request_cleared_when_run_ends() {
    let h = Harness::build(
        ScriptedLlm::new(
            &[plan("Agent_completed(\"v1\");\nlet i = 0;\nwhile i < 150000 { i += 1; }")],
            0.0,
        ),
        HitlGate::suspending(),
        None,
        LaunchMode::Background,
    );
    let started = h.runner.start(h.params("finish slowly")).await.unwrap();
    h.cancel.request(&started.agent_id);

    for _ in 0..500 {
        if !h.runner.is_executing(&started.agent_id) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(!h.runner.is_executing(&started.agent_id));
    assert!(!h.cancel.is_requested(&started.agent_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_error_clears_error() {
    let h = Harness::new(ScriptedLlm::new(
        &[plan("TestFunctions_throwError(\"boom\");"), plan("Agent_completed(\"fixed\");")],
        0.0,
    ));
    let failed = h.runner.start(h.params("try")).await.unwrap();
    assert_eq!(failed.state, RunningState::Error);

    let fixed = h
        .runner
        .resume_error(&failed.agent_id, &failed.execution_id, "skip that step")
        .await
        .unwrap();
    assert_eq!(fixed.state, RunningState::Completed);
    assert!(fixed.error.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_marks_completed_with_reason() {
    let h = Harness::new(ScriptedLlm::new(&[plan("Agent_requestFeedback(\"ok?\");")], 0.0));
    let waiting = h.runner.start(h.params("wait")).await.unwrap();

    let cancelled = h
        .runner
        .cancel_agent(&waiting.agent_id, &waiting.execution_id, "no longer needed", "default")
        .await
        .unwrap();

    assert_eq!(cancelled.state, RunningState::Completed);
    let last = cancelled.last_call().unwrap();
    assert_eq!(last.function_name, names::AGENT_COMPLETED);
    assert_eq!(last.parameters["note"], "no longer needed");
    assert_eq!(
        h.store.load(&waiting.agent_id).await.unwrap().state,
        RunningState::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_by_other_user_rejected() {
    let h = Harness::new(ScriptedLlm::new(&[plan("Agent_requestFeedback(\"ok?\");")], 0.0));
    let waiting = h.runner.start(h.params("wait")).await.unwrap();

    let err = h
        .runner
        .cancel_agent(&waiting.agent_id, "", "mine now", "mallory")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Unauthorized { .. }));
    assert_eq!(
        h.store.load(&waiting.agent_id).await.unwrap().state,
        RunningState::HitlFeedback
    );
    assert!(!h.cancel.is_requested(&waiting.agent_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_force_stop_running_agent() {
    let h = Harness::build(
        ScriptedLlm::new(&[plan("loop { TestFunctions_echo(\"tick\"); }")], 0.0),
        HitlGate::suspending(),
        None,
        LaunchMode::Background,
    );
    let started = h.runner.start(h.params("spin")).await.unwrap();
    assert!(h.runner.is_executing(&started.agent_id));

    let busy = h
        .runner
        .resume_error(&started.agent_id, &started.execution_id, "")
        .await
        .unwrap_err();
    assert!(matches!(busy, AgentError::AlreadyExecuting(_)));

    let stopped = h
        .runner
        .force_stop(&started.agent_id, "default")
        .await
        .unwrap();
    assert_eq!(stopped.state, RunningState::Error);
    assert_eq!(stopped.error.as_deref(), Some("agent force stopped"));
    assert!(!h.runner.is_executing(&started.agent_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_force_stop_idle_agent_is_noop() {
    let h = Harness::new(ScriptedLlm::new(&[plan("Agent_completed(\"done\");")], 0.0));
    let done = h.runner.start(h.params("quick")).await.unwrap();

    let ctx = h.runner.force_stop(&done.agent_id, "default").await.unwrap();
    assert_eq!(ctx.state, RunningState::Completed);
    assert!(!h.cancel.is_requested(&done.agent_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_functions() {
    let h = Harness::new(ScriptedLlm::new(&[], 0.0));
    let ctx = h.runner.create(h.params("idle")).await.unwrap();

    let updated = h
        .runner
        .update_functions(&ctx.agent_id, vec!["Agent".to_string(), "FileSystem".to_string()])
        .await
        .unwrap();
    assert_eq!(updated.functions, vec!["Agent", "FileSystem"]);
    assert_eq!(
        h.store.load(&ctx.agent_id).await.unwrap().functions,
        vec!["Agent", "FileSystem"]
    );

    assert!(h
        .runner
        .update_functions(&ctx.agent_id, vec!["Shell".to_string()])
        .await
        .is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_workflow_runs_with_ambient_context() {
    let h = Harness::new(ScriptedLlm::new(&[], 0.0));

    let ctx = h
        .runner
        .run_workflow(h.params("batch"), || async {
            ambient::with_current(|ctx| {
                ctx.memory.insert("rows".to_string(), "42".to_string());
            })?;
            ambient::add_cost(0.3)?;
            Ok::<(), AgentError>(())
        })
        .await
        .unwrap();
    assert_eq!(ctx.state, RunningState::Completed);
    assert_eq!(ctx.memory["rows"], "42");
    assert!((ctx.cost - 0.3).abs() < 1e-9);

    let failed = h
        .runner
        .run_workflow(h.params("batch"), || async {
            Err::<(), _>(AgentError::InvalidRequest("bad row".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(failed.state, RunningState::Error);
    assert_eq!(failed.error.as_deref(), Some("invalid request: bad row"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_child_agent() {
    let h = Harness::new(ScriptedLlm::new(
        &[
            plan("Agent_saveMemory(\"k\", \"parent only\");\nAgent_requestFeedback(\"wait\");"),
            plan("Agent_completed(\"child done\");"),
        ],
        0.1,
    ));
    let parent = h.runner.start(h.params("parent")).await.unwrap();

    let child = h
        .runner
        .start_child(&parent.agent_id, "helper", "sub task", 0.5)
        .await
        .unwrap();
    assert_eq!(child.parent_agent_id.as_deref(), Some(parent.agent_id.as_str()));
    assert_eq!(child.state, RunningState::Completed);
    assert!(child.memory.is_empty());
    assert!((child.cost - 0.1).abs() < 1e-9);
    assert_eq!(child.budget, 0.5);
}
