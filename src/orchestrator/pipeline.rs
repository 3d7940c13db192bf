//! Orchestrator facade
//!
//! Drives a change through the pipeline: every operation that touches a
//! change loads it, decides, invokes agents and persists inside the change's
//! critical section. State is saved as the last step, so an attempt that
//! fails half way leaves the stored change untouched.

use super::runner::{AgentInvocation, AgentRunner};
use crate::config::{ConfigError, OrchestratorConfig, RemediationCatalog};
use crate::evidence::{collect_evidence, Evidence, TestCase};
use crate::gate::{GateController, GateDecision, GateError};
use crate::ledger::LedgerError;
use crate::models::{
    ActivationContext, Agent, AgentOutcome, BlockingEvent, BlockingReason, CategorySet, Phase,
    PipelineCommand, ReviewVerdict, WorkflowState,
};
use crate::registry::{AgentRegistry, RegistryError};
use crate::resolver::ActivationResolver;
use crate::state::{
    validate_change_id, ChangeGuard, StateError, StateStore, WorkflowStateManager,
};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Change {change_id} is closed ({phase})")]
    ChangeClosed { change_id: String, phase: Phase },

    #[error("Change {change_id} is in {phase}; cannot {operation}")]
    WrongPhase {
        change_id: String,
        phase: Phase,
        operation: &'static str,
    },

    #[error("Agent {0} does not review changes")]
    NotReviewer(String),

    #[error("Agent {agent} failed: {source}")]
    Agent {
        agent: String,
        #[source]
        source: anyhow::Error,
    },
}

/// One agent invocation made for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    pub agent: String,
    pub outcome: AgentOutcome,
}

/// Result of issuing a command against a change
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub change_id: String,
    pub command: PipelineCommand,
    /// Phase before the command
    pub from: Phase,
    /// Phase after the command
    pub phase: Phase,
    /// Agents invoked, in order
    pub agents: Vec<AgentRun>,
    /// Why the change cannot move on, if anything stands in the way
    pub blocking: Vec<BlockingReason>,
}

impl CommandReport {
    pub fn is_blocked(&self) -> bool {
        !self.blocking.is_empty()
    }

    pub fn advanced(&self) -> bool {
        self.phase != self.from
    }

    fn refused(
        change_id: &str,
        command: PipelineCommand,
        phase: Phase,
        blocking: Vec<BlockingReason>,
    ) -> Self {
        Self {
            change_id: change_id.to_string(),
            command,
            from: phase,
            phase,
            agents: Vec::new(),
            blocking,
        }
    }
}

pub struct Orchestrator {
    gate: GateController,
    states: WorkflowStateManager,
    runner: Arc<dyn AgentRunner>,
}

impl Orchestrator {
    /// Build from config. The agent catalog is validated here, not on first use.
    pub fn new(
        config: &OrchestratorConfig,
        store: Arc<dyn StateStore>,
        runner: Arc<dyn AgentRunner>,
    ) -> OrchestratorResult<Self> {
        let registry = AgentRegistry::from_config(config)?;
        let catalog = config.remediation_catalog()?;
        Ok(Self::with_registry(registry, catalog, store, runner))
    }

    /// Build from `agentgate/config.toml` under `project_root`
    pub fn from_project(
        project_root: &Path,
        store: Arc<dyn StateStore>,
        runner: Arc<dyn AgentRunner>,
    ) -> OrchestratorResult<Self> {
        let config = OrchestratorConfig::load(project_root)?;
        Self::new(&config, store, runner)
    }

    /// Build around an already validated registry, e.g. one whose agents
    /// carry hand-written activation predicates
    pub fn with_registry(
        registry: AgentRegistry,
        catalog: RemediationCatalog,
        store: Arc<dyn StateStore>,
        runner: Arc<dyn AgentRunner>,
    ) -> Self {
        let resolver = ActivationResolver::new(Arc::new(registry));
        Self {
            gate: GateController::new(resolver, catalog),
            states: WorkflowStateManager::new(store),
            runner,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        self.gate.resolver().registry()
    }

    // =========================================================================
    // Change Lifecycle
    // =========================================================================

    /// Register a new change with its categories and initial requirements
    pub async fn open_change<S: AsRef<str>>(
        &self,
        change_id: &str,
        categories: CategorySet,
        requirement_ids: &[S],
    ) -> OrchestratorResult<WorkflowState> {
        validate_change_id(change_id)?;
        let guard = self.states.lock(change_id).await;

        let mut state = WorkflowState::new(change_id, categories);
        for id in requirement_ids {
            state.ledger.record(id.as_ref())?;
        }
        self.states.create(&guard, &state).await?;

        info!(
            change_id,
            requirements = state.ledger.len(),
            categories = state.categories.len(),
            "Opened change"
        );
        Ok(state)
    }

    /// Add requirements found after the change was opened. During
    /// implementation, any new requirement sends the change back to test
    /// authoring.
    pub async fn discover_requirements<S: AsRef<str>>(
        &self,
        change_id: &str,
        requirement_ids: &[S],
    ) -> OrchestratorResult<WorkflowState> {
        let guard = self.states.lock(change_id).await;
        let state = self.load_open(change_id).await?;
        if !state.phase.accepts_requirements() {
            return Err(self.wrong_phase(&state, "add requirements"));
        }

        let mut next = state.clone();
        let mut added = Vec::new();
        for id in requirement_ids {
            if next.ledger.record(id.as_ref())? {
                added.push(id.as_ref().trim().to_string());
            }
        }
        if added.is_empty() {
            return Ok(state);
        }

        if next.phase == Phase::Implementation {
            next = self.gate.regress_to_test_authoring(&next)?;
        } else {
            next.touch();
        }
        self.states.save(&guard, &next).await?;

        info!(change_id, added = ?added, phase = %next.phase, "Discovered requirements");
        Ok(next)
    }

    /// Feed test observations straight into the ledger. Requirements absent
    /// from `evidence` keep their status and uncited tests accumulate.
    pub async fn record_test_results(
        &self,
        change_id: &str,
        evidence: &Evidence,
    ) -> OrchestratorResult<WorkflowState> {
        let guard = self.states.lock(change_id).await;
        let state = self.load_open(change_id).await?;
        self.apply_evidence(&guard, state, evidence, false).await
    }

    /// Derive observations from a complete test run, then record them.
    /// Every requirement and the uncited tests are replaced.
    pub async fn record_test_cases(
        &self,
        change_id: &str,
        cases: &[TestCase],
    ) -> OrchestratorResult<WorkflowState> {
        let guard = self.states.lock(change_id).await;
        let state = self.load_open(change_id).await?;

        let ids: Vec<String> = state.ledger.records().iter().map(|r| r.id.clone()).collect();
        let evidence = collect_evidence(&ids, cases);
        self.apply_evidence(&guard, state, &evidence, true).await
    }

    /// Apply observations to the ledger. A snapshot covers the whole test
    /// run and replaces the uncited tests; a partial feed only adds to them.
    async fn apply_evidence(
        &self,
        guard: &ChangeGuard,
        state: WorkflowState,
        evidence: &Evidence,
        snapshot: bool,
    ) -> OrchestratorResult<WorkflowState> {
        if !matches!(state.phase, Phase::Requirements | Phase::TestAuthoring) {
            return Err(self.wrong_phase(&state, "record test results"));
        }

        let mut next = state;
        for (id, observation) in &evidence.observations {
            next.ledger.apply_observation(id, *observation)?;
        }
        let uncited = evidence.uncited_tests.iter().cloned();
        if snapshot {
            next.ledger.replace_uncited_tests(uncited);
        } else {
            next.ledger.add_uncited_tests(uncited);
        }
        next.touch();
        self.states.save(guard, &next).await?;

        debug!(
            change_id = %next.change_id,
            observations = evidence.observations.len(),
            uncited = evidence.uncited_tests.len(),
            "Recorded test results"
        );
        Ok(next)
    }

    /// Issue a pipeline command.
    ///
    /// A refused transition is reported, appended to the blocking history and
    /// leaves the change where it was. An admitted one invokes every required
    /// agent in order and then persists the new phase.
    pub async fn run(
        &self,
        change_id: &str,
        command: PipelineCommand,
    ) -> OrchestratorResult<CommandReport> {
        let guard = self.states.lock(change_id).await;
        let state = self.load_open(change_id).await?;

        if command == PipelineCommand::Check && state.phase == Phase::Review {
            return self.rerun_review(&guard, state).await;
        }

        let target = command.target_phase();
        let mut next = match self.gate.attempt(&state, target, Some(command))? {
            GateDecision::Advanced(next) => next,
            GateDecision::Blocked(reasons) => {
                self.record_blocking(&guard, &state, target, command, &reasons)
                    .await?;
                info!(
                    change_id,
                    command = %command,
                    phase = %state.phase,
                    reasons = reasons.len(),
                    "Command blocked"
                );
                return Ok(CommandReport::refused(
                    change_id,
                    command,
                    state.phase,
                    reasons,
                ));
            }
        };

        let ctx = ActivationContext::new(state.categories.clone())
            .with_failing_checks(state.has_requested_changes());
        let agents = self.invoke_agents(&mut next, command, &ctx).await?;
        self.finish(&guard, state.phase, next, command, agents).await
    }

    /// Run the reviewers again for a change already in review
    async fn rerun_review(
        &self,
        guard: &ChangeGuard,
        state: WorkflowState,
    ) -> OrchestratorResult<CommandReport> {
        let command = PipelineCommand::Check;
        let ctx = ActivationContext::new(state.categories.clone())
            .with_failing_checks(state.has_requested_changes());

        let mut next = state.clone();
        next.reviews.clear();
        let agents = self.invoke_agents(&mut next, command, &ctx).await?;
        next.touch();

        info!(
            change_id = %state.change_id,
            round_after_changes = ctx.failing_checks,
            "Re-running review"
        );
        self.finish(guard, state.phase, next, command, agents).await
    }

    async fn invoke_agents(
        &self,
        next: &mut WorkflowState,
        command: PipelineCommand,
        ctx: &ActivationContext,
    ) -> OrchestratorResult<Vec<AgentRun>> {
        let agents = self.gate.resolver().required_agents_in(command, ctx);
        let requirement_ids: Vec<String> =
            next.ledger.records().iter().map(|r| r.id.clone()).collect();

        let mut runs = Vec::with_capacity(agents.len());
        for (position, agent) in agents.into_iter().enumerate() {
            let invocation = AgentInvocation {
                change_id: next.change_id.clone(),
                command,
                agent: Arc::clone(&agent),
                phase: next.phase,
                position,
                categories: next.categories.clone(),
                requirement_ids: requirement_ids.clone(),
            };

            debug!(
                change_id = %next.change_id,
                agent = %agent.name,
                position,
                "Invoking agent"
            );
            let outcome = self
                .runner
                .run(&invocation)
                .await
                .map_err(|source| OrchestratorError::Agent {
                    agent: agent.name.clone(),
                    source,
                })?;

            match outcome.verdict() {
                Some(verdict) if agent.role.is_reviewer() => {
                    next.reviews.insert(agent.name.clone(), verdict.clone());
                }
                Some(_) => {
                    debug!(agent = %agent.name, "Ignoring verdict from non-reviewing agent")
                }
                None => {}
            }

            runs.push(AgentRun {
                agent: agent.name.clone(),
                outcome,
            });
        }
        Ok(runs)
    }

    /// Persist an admitted command and report any review objections
    async fn finish(
        &self,
        guard: &ChangeGuard,
        from: Phase,
        next: WorkflowState,
        command: PipelineCommand,
        agents: Vec<AgentRun>,
    ) -> OrchestratorResult<CommandReport> {
        self.states.save(guard, &next).await?;

        let blocking: Vec<BlockingReason> = next
            .reviews
            .iter()
            .filter_map(|(agent, verdict)| self.gate.verdict_reason(agent, verdict))
            .collect();
        if !blocking.is_empty() {
            self.record_blocking(guard, &next, Phase::Release, command, &blocking)
                .await?;
        }

        info!(
            change_id = %next.change_id,
            command = %command,
            from = %from,
            to = %next.phase,
            agents = agents.len(),
            "Command completed"
        );
        Ok(CommandReport {
            change_id: next.change_id.clone(),
            command,
            from,
            phase: next.phase,
            agents,
            blocking,
        })
    }

    /// Record a verdict delivered outside of a `check` run
    pub async fn record_review(
        &self,
        change_id: &str,
        agent: &str,
        verdict: ReviewVerdict,
    ) -> OrchestratorResult<WorkflowState> {
        let reviewer = self.registry().resolve(agent)?;
        if !reviewer.role.is_reviewer() {
            return Err(OrchestratorError::NotReviewer(agent.to_string()));
        }

        let guard = self.states.lock(change_id).await;
        let state = self.load_open(change_id).await?;
        if state.phase != Phase::Review {
            return Err(self.wrong_phase(&state, "record a review"));
        }

        let mut next = state;
        next.reviews.insert(reviewer.name.clone(), verdict.clone());
        next.touch();
        self.states.save(&guard, &next).await?;

        if let Some(reason) = self.gate.verdict_reason(&reviewer.name, &verdict) {
            self.record_blocking(
                &guard,
                &next,
                Phase::Release,
                PipelineCommand::Check,
                std::slice::from_ref(&reason),
            )
            .await?;
        }

        info!(change_id, agent, verdict = %verdict, "Recorded review");
        Ok(next)
    }

    /// Close a change without releasing it
    pub async fn abandon(&self, change_id: &str) -> OrchestratorResult<WorkflowState> {
        let guard = self.states.lock(change_id).await;
        let mut state = self.load_open(change_id).await?;

        state.abandoned_at = Some(Utc::now());
        state.touch();
        self.states.save(&guard, &state).await?;

        info!(change_id, phase = %state.phase, "Abandoned change");
        Ok(state)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn status(&self, change_id: &str) -> OrchestratorResult<WorkflowState> {
        let _guard = self.states.lock(change_id).await;
        Ok(self.states.load(change_id).await?)
    }

    pub async fn list_changes(&self) -> OrchestratorResult<Vec<String>> {
        Ok(self.states.list().await?)
    }

    /// Agents that `command` would invoke for a change with `categories`
    pub fn required_agents(
        &self,
        command: PipelineCommand,
        categories: &CategorySet,
    ) -> Vec<Arc<Agent>> {
        self.gate.resolver().required_agents(command, categories)
    }

    /// Same as `required_agents` for a raw command token
    pub fn required_agents_for_token(
        &self,
        token: &str,
        categories: &CategorySet,
    ) -> Vec<Arc<Agent>> {
        self.gate
            .resolver()
            .required_agents_for_token(token, categories)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_open(&self, change_id: &str) -> OrchestratorResult<WorkflowState> {
        let state = self.states.load(change_id).await?;
        if state.is_closed() {
            return Err(OrchestratorError::ChangeClosed {
                change_id: change_id.to_string(),
                phase: state.phase,
            });
        }
        Ok(state)
    }

    fn wrong_phase(&self, state: &WorkflowState, operation: &'static str) -> OrchestratorError {
        OrchestratorError::WrongPhase {
            change_id: state.change_id.clone(),
            phase: state.phase,
            operation,
        }
    }

    async fn record_blocking(
        &self,
        guard: &ChangeGuard,
        state: &WorkflowState,
        attempted: Phase,
        command: PipelineCommand,
        reasons: &[BlockingReason],
    ) -> OrchestratorResult<()> {
        for reason in reasons {
            let event =
                BlockingEvent::new(state.phase, attempted, reason.clone()).with_command(command);
            self.states.append_blocking_event(guard, &event).await?;
        }
        Ok(())
    }
}
