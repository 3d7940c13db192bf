//! Activation resolver
//!
//! Narrows the registry's static command mapping to the agents that must run
//! for a particular change. Order always comes from the registry; predicates
//! only filter.

use crate::models::{ActivationContext, Agent, CategorySet, PipelineCommand};
use crate::registry::AgentRegistry;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ActivationResolver {
    registry: Arc<AgentRegistry>,
}

impl ActivationResolver {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Agents required for `command` given the change's categories
    pub fn required_agents(
        &self,
        command: PipelineCommand,
        categories: &CategorySet,
    ) -> Vec<Arc<Agent>> {
        self.required_agents_in(command, &ActivationContext::new(categories.clone()))
    }

    pub fn required_agents_in(
        &self,
        command: PipelineCommand,
        ctx: &ActivationContext,
    ) -> Vec<Arc<Agent>> {
        self.registry
            .agents_for(command)
            .iter()
            .filter(|agent| agent.is_active(ctx))
            .cloned()
            .collect()
    }

    /// Same as `required_agents` for a raw command token. Unknown tokens
    /// require no agents.
    pub fn required_agents_for_token(
        &self,
        token: &str,
        categories: &CategorySet,
    ) -> Vec<Arc<Agent>> {
        match PipelineCommand::from_str(token) {
            Some(command) => self.required_agents(command, categories),
            None => Vec::new(),
        }
    }

    /// Blocking-capable reviewers of a change with these categories
    pub fn mandatory_reviewers(&self, categories: &CategorySet) -> Vec<Arc<Agent>> {
        self.required_agents(PipelineCommand::Check, categories)
            .into_iter()
            .filter(|agent| agent.can_block && agent.role.is_reviewer())
            .collect()
    }
}
