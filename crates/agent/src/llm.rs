//! Tiered model calls with audit and cost accounting

use agentry_context::{ambient, Tier};
use agentry_provider::{GenerateRequest, Generation, LlmCall, LlmRegistry};
use agentry_store::LlmCallStore;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Result;

/// Calls the model bound to a tier of the ambient context.
///
/// Every call is recorded as an [`LlmCall`] and its cost charged to the
/// ambient context.
pub struct ModelClient {
    registry: Arc<LlmRegistry>,
    calls: Arc<dyn LlmCallStore>,
}

impl ModelClient {
    pub fn new(registry: Arc<LlmRegistry>, calls: Arc<dyn LlmCallStore>) -> Self {
        Self { registry, calls }
    }

    pub fn registry(&self) -> &Arc<LlmRegistry> {
        &self.registry
    }

    pub async fn generate(
        &self,
        tier: Tier,
        description: &str,
        request: GenerateRequest,
    ) -> Result<Generation> {
        let ctx = ambient::require()?;
        let (model_id, agent_id, execution_id) = {
            let ctx = ambient::lock(&ctx);
            (
                ctx.llms.get(tier).to_string(),
                ctx.agent_id.clone(),
                ctx.execution_id.clone(),
            )
        };

        let llm = self.registry.resolve(&model_id)?;
        let record = LlmCall::begin(description, &model_id, &request).for_agent(&agent_id, &execution_id);
        debug!(agent_id = %agent_id, model = %model_id, description, "calling model");

        match llm.generate_text(request).await {
            Ok(generation) => {
                let remaining = ambient::add_cost(generation.cost)?;
                debug!(
                    agent_id = %agent_id,
                    cost = generation.cost,
                    remaining,
                    "model call complete"
                );
                self.store(record.complete(&generation)).await;
                Ok(generation)
            }
            Err(e) => {
                self.store(record.fail(&e)).await;
                Err(e.into())
            }
        }
    }

    async fn store(&self, call: LlmCall) {
        if let Err(e) = self.calls.record(&call).await {
            warn!("Failed to record llm call {}: {}", call.id, e);
        }
    }
}
