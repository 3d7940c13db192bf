use super::{CategorySet, ChangeCategory, PipelineCommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// What kind of work an agent performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Planning,
    TestAuthoring,
    Implementation,
    Review,
    SecurityReview,
    Debugging,
    Documentation,
}

impl AgentRole {
    /// Roles whose agents return a pass/request-changes verdict
    pub fn is_reviewer(&self) -> bool {
        matches!(self, AgentRole::Review | AgentRole::SecurityReview)
    }
}

/// Everything an activation predicate may look at
#[derive(Debug, Clone, Default)]
pub struct ActivationContext {
    /// Categories carried by the change
    pub categories: CategorySet,
    /// A previous review of this change requested changes
    pub failing_checks: bool,
}

impl ActivationContext {
    pub fn new(categories: CategorySet) -> Self {
        Self {
            categories,
            failing_checks: false,
        }
    }

    pub fn with_failing_checks(mut self, failing: bool) -> Self {
        self.failing_checks = failing;
        self
    }
}

/// Pure function deciding whether a conditional agent takes part
#[derive(Clone)]
pub struct ActivationPredicate {
    name: String,
    check: Arc<dyn Fn(&ActivationContext) -> bool + Send + Sync>,
}

impl ActivationPredicate {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&ActivationContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, ctx: &ActivationContext) -> bool {
        (self.check)(ctx)
    }
}

impl fmt::Debug for ActivationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActivationPredicate").field(&self.name).finish()
    }
}

/// Declarative form of an activation predicate, as written in config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "kebab-case")]
pub enum ActivationRule {
    /// Change touches any security-sensitive category
    SecuritySensitive,
    /// Change touches at least one of the listed categories
    AnyCategory { categories: Vec<ChangeCategory> },
    /// A previous review requested changes
    FailingChecks,
}

impl ActivationRule {
    pub fn to_predicate(&self) -> ActivationPredicate {
        match self {
            ActivationRule::SecuritySensitive => {
                ActivationPredicate::new("security-sensitive", |ctx| {
                    ctx.categories.is_security_sensitive()
                })
            }
            ActivationRule::AnyCategory { categories } => {
                let wanted: BTreeSet<ChangeCategory> = categories.iter().copied().collect();
                let name = format!(
                    "any-category({})",
                    wanted
                        .iter()
                        .map(ChangeCategory::name)
                        .collect::<Vec<_>>()
                        .join(",")
                );
                ActivationPredicate::new(name, move |ctx| {
                    wanted.iter().any(|c| ctx.categories.contains(*c))
                })
            }
            ActivationRule::FailingChecks => {
                ActivationPredicate::new("failing-checks", |ctx| ctx.failing_checks)
            }
        }
    }
}

/// A named capability invoked by the orchestrator
#[derive(Debug, Clone)]
pub struct Agent {
    /// Unique name (e.g., "security-reviewer")
    pub name: String,

    pub role: AgentRole,

    /// Responsibilities, in the order the agent addresses them
    pub responsibilities: Vec<String>,

    /// Commands that activate this agent
    pub commands: BTreeSet<PipelineCommand>,

    /// Condition for taking part; `None` means always active
    pub activation: Option<ActivationPredicate>,

    /// Whether a verdict from this agent can hold back release
    pub can_block: bool,
}

impl Agent {
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            name: name.into(),
            role,
            responsibilities: Vec::new(),
            commands: BTreeSet::new(),
            activation: None,
            can_block: false,
        }
    }

    pub fn with_responsibility(mut self, responsibility: impl Into<String>) -> Self {
        self.responsibilities.push(responsibility.into());
        self
    }

    pub fn on(mut self, command: PipelineCommand) -> Self {
        self.commands.insert(command);
        self
    }

    pub fn when(mut self, predicate: ActivationPredicate) -> Self {
        self.activation = Some(predicate);
        self
    }

    pub fn blocking(mut self) -> Self {
        self.can_block = true;
        self
    }

    pub fn activated_by(&self, command: PipelineCommand) -> bool {
        self.commands.contains(&command)
    }

    /// Unconditional agents are always active
    pub fn is_active(&self, ctx: &ActivationContext) -> bool {
        self.activation
            .as_ref()
            .map_or(true, |predicate| predicate.evaluate(ctx))
    }

    pub fn is_conditional(&self) -> bool {
        self.activation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_category_rule() {
        let predicate = ActivationRule::AnyCategory {
            categories: vec![ChangeCategory::Network, ChangeCategory::Persistence],
        }
        .to_predicate();

        assert_eq!(predicate.name(), "any-category(network,persistence)");
        assert!(predicate.evaluate(&ActivationContext::new(CategorySet::from([
            ChangeCategory::Persistence
        ]))));
        assert!(!predicate.evaluate(&ActivationContext::new(CategorySet::from([
            ChangeCategory::Cryptography
        ]))));
    }

    #[test]
    fn test_failing_checks_rule() {
        let predicate = ActivationRule::FailingChecks.to_predicate();
        let ctx = ActivationContext::default();
        assert!(!predicate.evaluate(&ctx));
        assert!(predicate.evaluate(&ctx.with_failing_checks(true)));
    }

    #[test]
    fn test_unconditional_agent_is_always_active() {
        let agent = Agent::new("planner", AgentRole::Planning).on(PipelineCommand::Start);
        assert!(agent.is_active(&ActivationContext::default()));
        assert!(!agent.is_conditional());
        assert!(agent.activated_by(PipelineCommand::Start));
        assert!(!agent.activated_by(PipelineCommand::Ship));
    }
}
