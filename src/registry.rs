//! Agent registry
//!
//! Immutable catalog of agents and the commands that activate them. Built
//! once at process start and validated eagerly; a registry that loads is
//! always usable.

use crate::config::OrchestratorConfig;
use crate::models::{Agent, PipelineCommand};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Agent registry is empty")]
    Empty,

    #[error("Agent with empty name at position {0}")]
    EmptyName(usize),

    #[error("Duplicate agent name: {0}")]
    DuplicateAgent(String),

    #[error("Agent '{0}' is not activated by any command")]
    NoCommands(String),

    #[error("Agent '{agent}' is activated by undeclared command '{command}'")]
    UndeclaredCommand {
        agent: String,
        command: PipelineCommand,
    },

    #[error("Agent '{0}' can block release but does not review")]
    BlockingNonReviewer(String),

    #[error("Command '{0}' has no mapped agents")]
    UnmappedCommand(PipelineCommand),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),
}

/// Read-only map from commands to ordered agents
#[derive(Debug)]
pub struct AgentRegistry {
    agents: Vec<Arc<Agent>>,
    by_command: BTreeMap<PipelineCommand, Vec<Arc<Agent>>>,
}

impl AgentRegistry {
    /// Build from already constructed agents, in activation order
    pub fn new(commands: &[PipelineCommand], agents: Vec<Agent>) -> RegistryResult<Self> {
        if agents.is_empty() {
            return Err(RegistryError::Empty);
        }

        let declared: HashSet<PipelineCommand> = commands.iter().copied().collect();
        validate(&declared, &agents)?;

        let agents: Vec<Arc<Agent>> = agents.into_iter().map(Arc::new).collect();
        let mut by_command = BTreeMap::new();
        for command in commands {
            let mapped: Vec<Arc<Agent>> = agents
                .iter()
                .filter(|a| a.activated_by(*command))
                .cloned()
                .collect();
            if mapped.is_empty() {
                return Err(RegistryError::UnmappedCommand(*command));
            }
            by_command.insert(*command, mapped);
        }

        debug!(
            agents = agents.len(),
            commands = by_command.len(),
            "Agent registry loaded"
        );

        Ok(Self { agents, by_command })
    }

    pub fn from_config(config: &OrchestratorConfig) -> RegistryResult<Self> {
        let agents = config
            .agents
            .iter()
            .map(|entry| Agent {
                name: entry.name.clone(),
                role: entry.role,
                responsibilities: entry.responsibilities.clone(),
                commands: entry.commands.iter().copied().collect(),
                activation: entry.activation.as_ref().map(|rule| rule.to_predicate()),
                can_block: entry.can_block,
            })
            .collect();
        Self::new(&config.commands, agents)
    }

    /// Agents mapped to `command` in declaration order; empty if undeclared
    pub fn agents_for(&self, command: PipelineCommand) -> &[Arc<Agent>] {
        self.by_command
            .get(&command)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resolve(&self, name: &str) -> RegistryResult<Arc<Agent>> {
        self.agents
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| RegistryError::AgentNotFound(name.to_string()))
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn commands(&self) -> impl Iterator<Item = PipelineCommand> + '_ {
        self.by_command.keys().copied()
    }
}

fn validate(declared: &HashSet<PipelineCommand>, agents: &[Agent]) -> RegistryResult<()> {
    let mut seen = HashSet::new();

    for (position, agent) in agents.iter().enumerate() {
        if agent.name.trim().is_empty() {
            return Err(RegistryError::EmptyName(position));
        }
        if !seen.insert(agent.name.as_str()) {
            return Err(RegistryError::DuplicateAgent(agent.name.clone()));
        }
        if agent.commands.is_empty() {
            return Err(RegistryError::NoCommands(agent.name.clone()));
        }
        if agent.can_block && !agent.role.is_reviewer() {
            return Err(RegistryError::BlockingNonReviewer(agent.name.clone()));
        }
        if let Some(command) = agent.commands.iter().find(|c| !declared.contains(*c)) {
            return Err(RegistryError::UndeclaredCommand {
                agent: agent.name.clone(),
                command: *command,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentRole;

    fn names(agents: &[Arc<Agent>]) -> Vec<&str> {
        agents.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn test_default_catalog_loads() {
        let registry = AgentRegistry::from_config(&OrchestratorConfig::default()).unwrap();

        assert_eq!(
            names(registry.agents_for(PipelineCommand::Start)),
            vec!["planner", "test-writer"]
        );
        assert_eq!(
            names(registry.agents_for(PipelineCommand::Check)),
            vec!["debugger", "code-reviewer", "security-reviewer"]
        );
        // Planning precedes documentation for the same command
        assert_eq!(
            names(registry.agents_for(PipelineCommand::Ship)),
            vec!["planner", "doc-writer"]
        );
    }

    #[test]
    fn test_resolve() {
        let registry = AgentRegistry::from_config(&OrchestratorConfig::default()).unwrap();
        assert_eq!(registry.resolve("debugger").unwrap().role, AgentRole::Debugging);
        assert_eq!(
            registry.resolve("oracle").unwrap_err(),
            RegistryError::AgentNotFound("oracle".to_string())
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let agents = vec![
            Agent::new("planner", AgentRole::Planning).on(PipelineCommand::Start),
            Agent::new("planner", AgentRole::Planning).on(PipelineCommand::Start),
        ];
        assert_eq!(
            AgentRegistry::new(&[PipelineCommand::Start], agents).unwrap_err(),
            RegistryError::DuplicateAgent("planner".to_string())
        );
    }

    #[test]
    fn test_unmapped_command_rejected() {
        let agents = vec![Agent::new("planner", AgentRole::Planning).on(PipelineCommand::Start)];
        assert_eq!(
            AgentRegistry::new(&[PipelineCommand::Start, PipelineCommand::Ship], agents)
                .unwrap_err(),
            RegistryError::UnmappedCommand(PipelineCommand::Ship)
        );
    }

    #[test]
    fn test_agent_without_commands_rejected() {
        let agents = vec![Agent::new("idle", AgentRole::Review)];
        assert_eq!(
            AgentRegistry::new(&[PipelineCommand::Check], agents).unwrap_err(),
            RegistryError::NoCommands("idle".to_string())
        );
    }

    #[test]
    fn test_undeclared_command_rejected() {
        let agents = vec![Agent::new("reviewer", AgentRole::Review).on(PipelineCommand::Check)];
        assert!(matches!(
            AgentRegistry::new(&[PipelineCommand::Start], agents),
            Err(RegistryError::UndeclaredCommand { .. })
        ));
    }

    #[test]
    fn test_blocking_agent_must_review() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
commands = ["check"]

[[agents]]
name = "code-reviewer"
role = "review"
commands = ["check"]
can_block = true

[[agents]]
name = "debugger"
role = "debugging"
commands = ["check"]
can_block = true
"#,
        )
        .unwrap();

        assert_eq!(
            AgentRegistry::from_config(&config).unwrap_err(),
            RegistryError::BlockingNonReviewer("debugger".to_string())
        );
    }

    #[test]
    fn test_undeclared_command_has_no_agents() {
        let agents = vec![Agent::new("planner", AgentRole::Planning).on(PipelineCommand::Start)];
        let registry = AgentRegistry::new(&[PipelineCommand::Start], agents).unwrap();
        assert!(registry.agents_for(PipelineCommand::Ship).is_empty());
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert_eq!(
            AgentRegistry::new(&[], Vec::new()).unwrap_err(),
            RegistryError::Empty
        );
    }
}
