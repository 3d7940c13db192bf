pub mod pipeline;
pub mod runner;

pub use pipeline::{AgentRun, CommandReport, Orchestrator, OrchestratorError, OrchestratorResult};
pub use runner::{AgentInvocation, AgentRunner, ScriptedRunner};
