//! Agent invocation boundary
//!
//! The orchestrator never looks inside agent output. It hands each required
//! agent an `AgentInvocation` and gets back a completion signal or a verdict.

use crate::models::{Agent, AgentOutcome, CategorySet, Phase, PipelineCommand, ReviewVerdict};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Everything an agent is told about the work it is asked to do
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub change_id: String,
    pub command: PipelineCommand,
    pub agent: Arc<Agent>,
    /// Phase the change is entering (or re-running, for re-reviews)
    pub phase: Phase,
    /// Position of this agent in the command's sequence, starting at 0
    pub position: usize,
    pub categories: CategorySet,
    /// Requirement identifiers currently recorded for the change
    pub requirement_ids: Vec<String>,
}

/// External capability that actually runs an agent
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, invocation: &AgentInvocation) -> anyhow::Result<AgentOutcome>;
}

/// Runner with canned verdicts, for tests and dry runs.
///
/// Reviewers answer with their scripted verdict (pass by default), other
/// agents complete. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    verdicts: Mutex<HashMap<String, ReviewVerdict>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<(String, PipelineCommand)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verdict(&self, agent: &str, verdict: ReviewVerdict) {
        if let Ok(mut verdicts) = self.verdicts.lock() {
            verdicts.insert(agent.to_string(), verdict);
        }
    }

    /// Make every invocation of `agent` fail with `message`
    pub fn fail(&self, agent: &str, message: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(agent.to_string(), message.to_string());
        }
    }

    /// Agent names invoked so far, in order
    pub fn calls(&self) -> Vec<(String, PipelineCommand)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(&self, invocation: &AgentInvocation) -> anyhow::Result<AgentOutcome> {
        let name = invocation.agent.name.clone();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((name.clone(), invocation.command));
        }

        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|f| f.get(&name).cloned());
        if let Some(message) = failure {
            anyhow::bail!("{}", message);
        }

        if !invocation.agent.role.is_reviewer() {
            return Ok(AgentOutcome::Completed);
        }

        let verdict = self
            .verdicts
            .lock()
            .ok()
            .and_then(|v| v.get(&name).cloned())
            .unwrap_or(ReviewVerdict::Pass);
        Ok(verdict.into())
    }
}
