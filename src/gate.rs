//! Gate controller
//!
//! The phase state machine. Each forward transition has a guard; a guard
//! that fails produces every applicable `BlockingReason` at once. Evaluation
//! never mutates the input state: success hands back a new state for the
//! caller to persist, refusal hands back the reasons.
//!
//! ```text
//! Requirements -> TestAuthoring -> Implementation -> Review -> Release
//!                      ^                 |
//!                      +-----------------+  (new requirements discovered)
//! ```

use crate::config::RemediationCatalog;
use crate::models::{
    AgentRole, BlockingKind, BlockingReason, CategorySet, CoverageStatus, Phase, PipelineCommand,
    ReviewVerdict, WorkflowState,
};
use crate::resolver::ActivationResolver;
use tracing::{debug, info};

pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Change is already in terminal phase {0}")]
    Terminal(Phase),
}

/// Outcome of a transition attempt
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Transition admitted; the state to persist
    Advanced(WorkflowState),
    /// Transition refused with every reason that applies
    Blocked(Vec<BlockingReason>),
}

impl GateDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GateDecision::Blocked(_))
    }
}

/// True iff the categories intersect the security-sensitive set
pub fn security_review_required(categories: &CategorySet) -> bool {
    categories.is_security_sensitive()
}

#[derive(Debug, Clone)]
pub struct GateController {
    resolver: ActivationResolver,
    catalog: RemediationCatalog,
}

impl GateController {
    pub fn new(resolver: ActivationResolver, catalog: RemediationCatalog) -> Self {
        Self { resolver, catalog }
    }

    pub fn resolver(&self) -> &ActivationResolver {
        &self.resolver
    }

    /// Try to move `state` into `target`
    pub fn attempt(
        &self,
        state: &WorkflowState,
        target: Phase,
        command: Option<PipelineCommand>,
    ) -> GateResult<GateDecision> {
        if state.phase.is_terminal() {
            return Err(GateError::Terminal(state.phase));
        }
        if state.phase.successor() != Some(target) {
            return Err(GateError::InvalidTransition {
                from: state.phase,
                to: target,
            });
        }

        let reasons = match target {
            Phase::TestAuthoring => self.requirements_recorded(state),
            Phase::Implementation => self.tests_ready(state),
            Phase::Review => Vec::new(),
            Phase::Release => self.reviews_passed(state),
            Phase::Requirements => unreachable!("Requirements is never a successor"),
        };

        if !reasons.is_empty() {
            debug!(
                change_id = %state.change_id,
                from = %state.phase,
                to = %target,
                reasons = reasons.len(),
                "Transition blocked"
            );
            return Ok(GateDecision::Blocked(reasons));
        }

        let mut next = state.clone();
        if target == Phase::Review {
            next.security_review_required = security_review_required(&next.categories);
            next.reviews.clear();
        }
        next.enter(target, command);

        info!(
            change_id = %state.change_id,
            from = %state.phase,
            to = %target,
            security_review = next.security_review_required,
            "Transition admitted"
        );
        Ok(GateDecision::Advanced(next))
    }

    /// Implementation discovered new requirements; go back to writing tests
    pub fn regress_to_test_authoring(&self, state: &WorkflowState) -> GateResult<WorkflowState> {
        if state.phase != Phase::Implementation {
            return Err(GateError::InvalidTransition {
                from: state.phase,
                to: Phase::TestAuthoring,
            });
        }

        let mut next = state.clone();
        next.iteration += 1;
        next.enter(Phase::TestAuthoring, None);

        info!(
            change_id = %state.change_id,
            iteration = next.iteration,
            "Regressed to test authoring"
        );
        Ok(next)
    }

    /// The blocking reason a review verdict stands for, if any
    pub fn verdict_reason(&self, agent: &str, verdict: &ReviewVerdict) -> Option<BlockingReason> {
        let ReviewVerdict::RequestChanges { summary } = verdict else {
            return None;
        };
        let explanation = if summary.is_empty() {
            format!("{} requested changes", agent)
        } else {
            format!("{} requested changes: {}", agent, summary)
        };
        Some(self.reason(
            BlockingKind::ChangesRequested,
            explanation,
            vec![agent.to_string()],
        ))
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn reason(&self, kind: BlockingKind, explanation: String, refs: Vec<String>) -> BlockingReason {
        BlockingReason::new(kind, explanation, self.catalog.hint(kind)).with_references(refs)
    }

    fn requirements_recorded(&self, state: &WorkflowState) -> Vec<BlockingReason> {
        if state.ledger.is_empty() {
            vec![self.no_requirements()]
        } else {
            Vec::new()
        }
    }

    fn no_requirements(&self) -> BlockingReason {
        self.reason(
            BlockingKind::MissingCoverage,
            "No requirements have been recorded for this change".to_string(),
            Vec::new(),
        )
    }

    fn tests_ready(&self, state: &WorkflowState) -> Vec<BlockingReason> {
        let ledger = &state.ledger;
        if ledger.is_empty() {
            return vec![self.no_requirements()];
        }
        if ledger.ready_for_implementation() {
            return Vec::new();
        }

        let mut reasons = Vec::new();

        let uncovered = ledger.ids_with_status(CoverageStatus::Uncovered);
        if !uncovered.is_empty() {
            reasons.push(self.reason(
                BlockingKind::MissingCoverage,
                format!("{} requirement(s) have no test", uncovered.len()),
                uncovered,
            ));
        }

        let anomalous = ledger.ids_with_status(CoverageStatus::PassingWithoutImplementation);
        if !anomalous.is_empty() {
            reasons.push(self.reason(
                BlockingKind::NoFailingTests,
                format!(
                    "{} requirement(s) have tests that pass before implementation",
                    anomalous.len()
                ),
                anomalous,
            ));
        }

        let tested = || {
            ledger
                .records()
                .iter()
                .filter(|r| r.status != CoverageStatus::Uncovered)
        };

        let trivial: Vec<String> = tested()
            .filter(|r| r.trivial_assertions)
            .map(|r| r.id.clone())
            .collect();
        if !trivial.is_empty() {
            reasons.push(self.reason(
                BlockingKind::TrivialAssertions,
                format!(
                    "{} requirement(s) have tests with unfalsifiable assertions",
                    trivial.len()
                ),
                trivial,
            ));
        }

        let mut uncited: Vec<String> = tested()
            .filter(|r| !r.cited)
            .map(|r| r.id.clone())
            .collect();
        uncited.extend(ledger.uncited_tests().map(str::to_string));
        if !uncited.is_empty() {
            reasons.push(self.reason(
                BlockingKind::MissingCitation,
                "Tests must cite a requirement identifier in their title".to_string(),
                uncited,
            ));
        }

        reasons
    }

    fn reviews_passed(&self, state: &WorkflowState) -> Vec<BlockingReason> {
        let mut reasons = Vec::new();

        for (agent, verdict) in &state.reviews {
            if let Some(reason) = self.verdict_reason(agent, verdict) {
                reasons.push(reason);
            }
        }

        let pending: Vec<String> = self
            .resolver
            .mandatory_reviewers(&state.categories)
            .iter()
            .filter(|agent| {
                !(state.security_review_required && agent.role == AgentRole::SecurityReview)
            })
            .filter(|agent| !state.reviews.contains_key(&agent.name))
            .map(|agent| agent.name.clone())
            .collect();
        if !pending.is_empty() {
            reasons.push(self.reason(
                BlockingKind::ReviewPending,
                format!("{} mandatory reviewer(s) have not reported", pending.len()),
                pending,
            ));
        }

        if state.security_review_required {
            let security_agents: Vec<String> = self
                .resolver
                .registry()
                .agents()
                .iter()
                .filter(|agent| agent.role == AgentRole::SecurityReview)
                .map(|agent| agent.name.clone())
                .collect();
            let passed = security_agents
                .iter()
                .any(|name| state.reviews.get(name).is_some_and(ReviewVerdict::is_pass));
            let rejected = security_agents
                .iter()
                .any(|name| state.reviews.get(name).is_some_and(|v| !v.is_pass()));

            // A rejection is already reported as changes-requested
            if !passed && !rejected {
                let categories: Vec<String> = state
                    .categories
                    .iter()
                    .filter(|c| c.is_security_sensitive())
                    .map(|c| c.name().to_string())
                    .collect();
                reasons.push(self.reason(
                    BlockingKind::SecurityReviewRequired,
                    format!(
                        "Change touches {} and has no passing security review",
                        categories.join(", ")
                    ),
                    security_agents,
                ));
            }
        }

        reasons
    }
}
