//! Task-local ambient context
//!
//! Every agent run executes inside [`with_context`]. Code anywhere in that
//! future (including across `.await` points) reaches the run's context via
//! [`current`]. Concurrent runs each see only their own context.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::{ContextError, ExecutionContext, Result};

/// Context shared between the control loop and the code it calls
pub type SharedContext = Arc<Mutex<ExecutionContext>>;

tokio::task_local! {
    static AMBIENT: SharedContext;
}

pub fn shared(ctx: ExecutionContext) -> SharedContext {
    Arc::new(Mutex::new(ctx))
}

/// Lock a shared context, recovering from a poisoned lock
pub fn lock(ctx: &SharedContext) -> MutexGuard<'_, ExecutionContext> {
    ctx.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `fut` with `ctx` as the ambient context
pub async fn with_context<F>(ctx: SharedContext, fut: F) -> F::Output
where
    F: Future,
{
    AMBIENT.scope(ctx, fut).await
}

/// Synchronous variant for blocking threads
pub fn with_context_sync<R>(ctx: SharedContext, f: impl FnOnce() -> R) -> R {
    AMBIENT.sync_scope(ctx, f)
}

/// The ambient context, if called inside [`with_context`]
pub fn current() -> Option<SharedContext> {
    AMBIENT.try_with(Arc::clone).ok()
}

pub fn require() -> Result<SharedContext> {
    current().ok_or(ContextError::NoContext)
}

/// Run `f` against the ambient context
pub fn with_current<R>(f: impl FnOnce(&mut ExecutionContext) -> R) -> Result<R> {
    let ctx = require()?;
    let mut guard = lock(&ctx);
    Ok(f(&mut guard))
}

/// Charge `delta` to the ambient context; returns the remaining budget
pub fn add_cost(delta: f64) -> Result<f64> {
    with_current(|ctx| {
        let remaining = ctx.add_cost(delta);
        trace!(agent_id = %ctx.agent_id, delta, remaining, "cost added");
        remaining
    })
}

/// Spawn a task that inherits the caller's ambient context
pub fn spawn_in_context<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(ctx) => tokio::spawn(with_context(ctx, fut)),
        None => tokio::spawn(fut),
    }
}
