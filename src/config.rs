//! Orchestrator configuration
//!
//! One immutable object holding the agent catalog and the blocking-reason
//! remediation hints. Loaded from `agentgate/config.toml` when present, with
//! the built-in catalog as default.

use crate::models::{ActivationRule, AgentRole, BlockingKind, PipelineCommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const CONFIG_PATH: &str = "agentgate/config.toml";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to write config file {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown blocking kind in [remediation]: {0}")]
    UnknownBlockingKind(String),
}

// =============================================================================
// Agent Entries
// =============================================================================

/// One agent as declared in config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,

    pub role: AgentRole,

    #[serde(default)]
    pub responsibilities: Vec<String>,

    /// Commands that activate the agent
    pub commands: Vec<PipelineCommand>,

    /// Condition for conditional agents; omitted means always active
    #[serde(default)]
    pub activation: Option<ActivationRule>,

    #[serde(default)]
    pub can_block: bool,
}

impl AgentConfig {
    fn new(name: &str, role: AgentRole, commands: &[PipelineCommand]) -> Self {
        Self {
            name: name.to_string(),
            role,
            responsibilities: Vec::new(),
            commands: commands.to_vec(),
            activation: None,
            can_block: false,
        }
    }

    fn responsible_for(mut self, items: &[&str]) -> Self {
        self.responsibilities = items.iter().map(|s| s.to_string()).collect();
        self
    }

    fn when(mut self, rule: ActivationRule) -> Self {
        self.activation = Some(rule);
        self
    }

    fn blocking(mut self) -> Self {
        self.can_block = true;
        self
    }
}

fn default_commands() -> Vec<PipelineCommand> {
    PipelineCommand::ALL.to_vec()
}

fn default_agents() -> Vec<AgentConfig> {
    use PipelineCommand::{Check, Implement, Ship, Start};

    vec![
        AgentConfig::new("planner", AgentRole::Planning, &[Start, Ship]).responsible_for(&[
            "Break the change into independently testable requirements",
            "Assign a stable identifier to every requirement",
            "Plan release notes once the change is accepted",
        ]),
        AgentConfig::new("test-writer", AgentRole::TestAuthoring, &[Start]).responsible_for(&[
            "Write one failing test per requirement",
            "Cite the requirement identifier in every test title",
            "Avoid assertions that cannot fail",
        ]),
        AgentConfig::new("implementer", AgentRole::Implementation, &[Implement])
            .responsible_for(&[
                "Write the smallest code that makes the failing tests pass",
                "Report newly discovered requirements instead of coding around them",
            ]),
        AgentConfig::new("debugger", AgentRole::Debugging, &[Check])
            .responsible_for(&[
                "Reproduce the failure reported by review",
                "Identify the root cause before any fix is attempted",
            ])
            .when(ActivationRule::FailingChecks),
        AgentConfig::new("code-reviewer", AgentRole::Review, &[Check])
            .responsible_for(&[
                "Check the implementation against each requirement",
                "Verify tests still cite and exercise their requirements",
            ])
            .blocking(),
        AgentConfig::new("security-reviewer", AgentRole::SecurityReview, &[Check])
            .responsible_for(&[
                "Review authentication, input handling and data exposure",
                "Reject changes that weaken existing protections",
            ])
            .when(ActivationRule::SecuritySensitive)
            .blocking(),
        AgentConfig::new("doc-writer", AgentRole::Documentation, &[Ship]).responsible_for(&[
            "Document user-visible behavior of the change",
            "Record the requirement identifiers the release covers",
        ]),
    ]
}

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Agent catalog plus remediation hints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Commands the registry serves; each needs at least one agent
    #[serde(default = "default_commands")]
    pub commands: Vec<PipelineCommand>,

    /// Agents in activation order
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,

    /// Overrides for remediation hints, keyed by blocking kind name
    #[serde(default)]
    pub remediation: BTreeMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            commands: default_commands(),
            agents: default_agents(),
            remediation: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Load config from agentgate/config.toml, falling back to defaults
    pub fn load(project_root: &Path) -> ConfigResult<Self> {
        let config_path = project_root.join(CONFIG_PATH);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::Read(config_path.clone(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: OrchestratorConfig = toml::from_str(content)?;
        config.remediation_catalog()?;
        Ok(config)
    }

    /// Save config to agentgate/config.toml
    pub fn save(&self, project_root: &Path) -> ConfigResult<()> {
        let config_path = project_root.join(CONFIG_PATH);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Write(config_path.clone(), e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content).map_err(|e| ConfigError::Write(config_path, e))?;
        Ok(())
    }

    pub fn remediation_catalog(&self) -> ConfigResult<RemediationCatalog> {
        let mut overrides = BTreeMap::new();
        for (key, hint) in &self.remediation {
            let kind = BlockingKind::ALL
                .into_iter()
                .find(|k| k.name() == key)
                .ok_or_else(|| ConfigError::UnknownBlockingKind(key.clone()))?;
            overrides.insert(kind, hint.clone());
        }
        Ok(RemediationCatalog { overrides })
    }
}

/// Remediation hint per blocking kind
#[derive(Debug, Clone, Default)]
pub struct RemediationCatalog {
    overrides: BTreeMap<BlockingKind, String>,
}

impl RemediationCatalog {
    pub fn hint(&self, kind: BlockingKind) -> &str {
        self.overrides
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_remediation())
    }
}
