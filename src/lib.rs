// Agentgate - test-first change pipeline orchestrator
// Gates each change through requirements, failing tests, implementation,
// review and release, invoking the agents each command calls for.

pub mod config;
pub mod evidence;
pub mod gate;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod state;

// Re-export commonly used types
pub use config::{ConfigError, OrchestratorConfig, RemediationCatalog};
pub use evidence::{collect_evidence, Evidence, TestCase};
pub use gate::{GateController, GateDecision, GateError};
pub use ledger::{LedgerError, RequirementLedger};
pub use models::{
    Agent, AgentOutcome, AgentRole, BlockingEvent, BlockingKind, BlockingReason, CategorySet,
    ChangeCategory, CoverageStatus, Phase, PipelineCommand, ReviewVerdict, WorkflowState,
};
pub use orchestrator::{
    AgentInvocation, AgentRunner, CommandReport, Orchestrator, OrchestratorError, ScriptedRunner,
};
pub use registry::{AgentRegistry, RegistryError};
pub use resolver::ActivationResolver;
pub use state::{FileStateStore, InMemoryStateStore, StateError, StateStore, WorkflowStateManager};
