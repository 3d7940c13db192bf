use super::Phase;
use serde::{Deserialize, Serialize};

/// A developer-issued trigger that tries to advance a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineCommand {
    /// Leave Requirements and begin writing failing tests
    Start,
    /// Begin implementation against the failing tests
    Implement,
    /// Submit the implementation for review
    Check,
    /// Release the reviewed change
    Ship,
}

impl PipelineCommand {
    pub const ALL: [PipelineCommand; 4] = [
        PipelineCommand::Start,
        PipelineCommand::Implement,
        PipelineCommand::Check,
        PipelineCommand::Ship,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineCommand::Start => "start",
            PipelineCommand::Implement => "implement",
            PipelineCommand::Check => "check",
            PipelineCommand::Ship => "ship",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "start" => Some(PipelineCommand::Start),
            "implement" => Some(PipelineCommand::Implement),
            "check" => Some(PipelineCommand::Check),
            "ship" => Some(PipelineCommand::Ship),
            _ => None,
        }
    }

    /// Phase this command tries to enter
    pub fn target_phase(&self) -> Phase {
        match self {
            PipelineCommand::Start => Phase::TestAuthoring,
            PipelineCommand::Implement => Phase::Implementation,
            PipelineCommand::Check => Phase::Review,
            PipelineCommand::Ship => Phase::Release,
        }
    }
}

impl std::fmt::Display for PipelineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_follow_phase_order() {
        let mut phase = Phase::Requirements;
        for command in PipelineCommand::ALL {
            assert_eq!(phase.successor(), Some(command.target_phase()));
            phase = command.target_phase();
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_from_str() {
        assert_eq!(PipelineCommand::from_str(" Ship "), Some(PipelineCommand::Ship));
        assert_eq!(PipelineCommand::from_str("deploy"), None);
    }
}
