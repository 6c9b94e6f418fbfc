//! Human-in-the-loop gate
//!
//! Checked once per iteration before planning. When the iteration count or
//! the budget crosses its threshold the gate either asks a [`Confirmation`]
//! handler and blocks (interactive use), or parks the agent in
//! `hitl_threshold` for a later explicit resume.

use agentry_config::HitlMode;
use agentry_context::{ambient, ExecutionContext, RunningState, SharedContext};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Why the gate wants a human
#[derive(Debug, Clone, PartialEq)]
pub enum HitlRequest {
    Iterations { count: u32 },
    Budget { spent: f64, raise_by: f64 },
}

impl fmt::Display for HitlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitlRequest::Iterations { count } => {
                write!(f, "{} iterations elapsed, continue?", count)
            }
            HitlRequest::Budget { spent, raise_by } => write!(
                f,
                "budget exhausted (${:.4} spent), raise it by ${:.4}?",
                spent, raise_by
            ),
        }
    }
}

impl HitlRequest {
    /// First threshold `ctx` has crossed, iterations before budget
    pub fn pending(ctx: &ExecutionContext) -> Option<HitlRequest> {
        if ctx.hil_count > 0 && ctx.count_since_hil >= ctx.hil_count {
            return Some(HitlRequest::Iterations {
                count: ctx.count_since_hil,
            });
        }
        if ctx.hil_budget > 0.0 && ctx.budget_remaining <= 0.0 {
            return Some(HitlRequest::Budget {
                spent: ctx.cost,
                raise_by: ctx.hil_budget,
            });
        }
        None
    }

    /// Record a human's approval on the context
    pub fn apply(&self, ctx: &mut ExecutionContext) {
        match self {
            HitlRequest::Iterations { .. } => ctx.count_since_hil = 0,
            HitlRequest::Budget { raise_by, .. } => ctx.raise_budget(*raise_by),
        }
        ctx.touch();
    }
}

/// Approve every pending threshold on `ctx`; used when resuming from
/// `hitl_threshold`
pub fn approve_all(ctx: &mut ExecutionContext) {
    while let Some(request) = HitlRequest::pending(ctx) {
        request.apply(ctx);
    }
}

/// Answers gate requests synchronously
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, ctx: &ExecutionContext, request: &HitlRequest) -> bool;
}

pub struct AutoApprove;

#[async_trait]
impl Confirmation for AutoApprove {
    async fn confirm(&self, _ctx: &ExecutionContext, _request: &HitlRequest) -> bool {
        true
    }
}

pub struct AutoDecline;

#[async_trait]
impl Confirmation for AutoDecline {
    async fn confirm(&self, _ctx: &ExecutionContext, _request: &HitlRequest) -> bool {
        false
    }
}

/// Gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Continue,
    /// State is now `hitl_threshold`
    Halt,
}

pub struct HitlGate {
    mode: HitlMode,
    confirmation: Arc<dyn Confirmation>,
}

impl HitlGate {
    pub fn new(mode: HitlMode, confirmation: Arc<dyn Confirmation>) -> Self {
        Self { mode, confirmation }
    }

    /// Suspend mode: every threshold parks the agent
    pub fn suspending() -> Self {
        Self::new(HitlMode::Suspend, Arc::new(AutoDecline))
    }

    pub fn blocking(confirmation: Arc<dyn Confirmation>) -> Self {
        Self::new(HitlMode::Blocking, confirmation)
    }

    pub fn mode(&self) -> HitlMode {
        self.mode
    }

    pub async fn check(&self, shared: &SharedContext) -> GateOutcome {
        loop {
            let (snapshot, request) = {
                let ctx = ambient::lock(shared);
                match HitlRequest::pending(&ctx) {
                    Some(request) => (ctx.clone(), request),
                    None => return GateOutcome::Continue,
                }
            };

            let approved = match self.mode {
                HitlMode::Suspend => false,
                HitlMode::Blocking => self.confirmation.confirm(&snapshot, &request).await,
            };

            let mut ctx = ambient::lock(shared);
            if approved {
                info!(agent_id = %ctx.agent_id, "{}: approved", request);
                request.apply(&mut ctx);
            } else {
                warn!(agent_id = %ctx.agent_id, "{}: halting", request);
                ctx.set_state(RunningState::HitlThreshold);
                return GateOutcome::Halt;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_context::{shared, AgentParams};

    fn ctx(hil_count: u32, budget: f64, hil_budget: f64) -> ExecutionContext {
        ExecutionContext::new(AgentParams {
            hil_count,
            budget,
            hil_budget,
            ..Default::default()
        })
    }

    #[test]
    fn test_pending_iterations() {
        let mut c = ctx(3, 1.0, 1.0);
        c.count_since_hil = 2;
        assert_eq!(HitlRequest::pending(&c), None);
        c.count_since_hil = 3;
        assert_eq!(
            HitlRequest::pending(&c),
            Some(HitlRequest::Iterations { count: 3 })
        );
    }

    #[test]
    fn test_pending_budget() {
        let mut c = ctx(0, 1.0, 0.5);
        c.add_cost(1.2);
        assert!(matches!(
            HitlRequest::pending(&c),
            Some(HitlRequest::Budget { raise_by, .. }) if raise_by == 0.5
        ));

        let mut no_raise = ctx(0, 1.0, 0.0);
        no_raise.add_cost(2.0);
        assert_eq!(HitlRequest::pending(&no_raise), None);
    }

    #[test]
    fn test_approve_all() {
        let mut c = ctx(2, 1.0, 0.5);
        c.count_since_hil = 2;
        c.add_cost(1.0);
        approve_all(&mut c);
        assert_eq!(c.count_since_hil, 0);
        assert_eq!(c.budget_remaining, 0.5);
        assert_eq!(HitlRequest::pending(&c), None);
    }

    #[tokio::test]
    async fn test_blocking_approve_continues() {
        let mut c = ctx(2, 1.0, 1.0);
        c.count_since_hil = 2;
        c.add_cost(1.5);
        let shared = shared(c);

        let gate = HitlGate::blocking(Arc::new(AutoApprove));
        assert_eq!(gate.check(&shared).await, GateOutcome::Continue);

        let c = ambient::lock(&shared);
        assert_eq!(c.count_since_hil, 0);
        assert_eq!(c.budget_remaining, 1.0);
        assert_eq!(c.state, RunningState::Agent);
    }

    #[tokio::test]
    async fn test_blocking_decline_halts() {
        let mut c = ctx(1, 1.0, 1.0);
        c.count_since_hil = 1;
        let shared = shared(c);

        let gate = HitlGate::blocking(Arc::new(AutoDecline));
        assert_eq!(gate.check(&shared).await, GateOutcome::Halt);
        assert_eq!(ambient::lock(&shared).state, RunningState::HitlThreshold);
    }

    #[tokio::test]
    async fn test_suspend_mode_halts_without_asking() {
        let mut c = ctx(0, 1.0, 1.0);
        c.add_cost(1.0);
        let shared = shared(c);

        let gate = HitlGate::new(HitlMode::Suspend, Arc::new(AutoApprove));
        assert_eq!(gate.check(&shared).await, GateOutcome::Halt);
        assert_eq!(ambient::lock(&shared).budget_remaining, 0.0);
    }

    #[tokio::test]
    async fn test_no_threshold_continues() {
        let shared = shared(ctx(5, 2.0, 1.0));
        let gate = HitlGate::suspending();
        assert_eq!(gate.check(&shared).await, GateOutcome::Continue);
    }

    mockall::mock! {
        Confirm {}

        #[async_trait]
        impl Confirmation for Confirm {
            async fn confirm(&self, ctx: &ExecutionContext, request: &HitlRequest) -> bool;
        }
    }

    #[tokio::test]
    async fn test_blocking_asks_once_per_threshold() {
        let mut c = ctx(2, 1.0, 0.5);
        c.count_since_hil = 2;
        c.add_cost(1.0);
        let shared = shared(c);

        let mut confirm = MockConfirm::new();
        let mut seq = mockall::Sequence::new();
        confirm
            .expect_confirm()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, request| matches!(request, HitlRequest::Iterations { count: 2 }))
            .returning(|_, _| true);
        confirm
            .expect_confirm()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, request| matches!(request, HitlRequest::Budget { .. }))
            .returning(|_, _| true);

        let gate = HitlGate::blocking(Arc::new(confirm));
        assert_eq!(gate.check(&shared).await, GateOutcome::Continue);
        assert_eq!(ambient::lock(&shared).budget_remaining, 0.5);
    }

    #[test]
    fn test_request_display() {
        assert_eq!(
            HitlRequest::Iterations { count: 5 }.to_string(),
            "5 iterations elapsed, continue?"
        );
    }
}
