//! Cooperative cancellation

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Process-wide set of agent ids asked to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    requested: Arc<Mutex<HashSet<String>>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, agent_id: &str) {
        info!(agent_id, "stop requested");
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent_id.to_string());
    }

    pub fn is_requested(&self, agent_id: &str) -> bool {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(agent_id)
    }

    /// Consume a pending request; returns whether there was one
    pub fn take(&self, agent_id: &str) -> bool {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(agent_id)
    }
}

/// Re-check `done` every `interval` until it holds or `timeout` passes.
///
/// Returns whether the condition was met.
pub async fn poll_until<F, Fut>(interval: Duration, timeout: Duration, mut done: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if done().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
