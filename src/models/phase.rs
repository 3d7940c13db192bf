use serde::{Deserialize, Serialize};

/// Phase of a change in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Requirements are being collected
    Requirements,
    /// Failing tests are being written for each requirement
    TestAuthoring,
    /// Code is being written to make the failing tests pass
    Implementation,
    /// Reviewers are examining the implementation
    Review,
    /// Accepted and shipped (terminal)
    Release,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Requirements => "Requirements",
            Phase::TestAuthoring => "TestAuthoring",
            Phase::Implementation => "Implementation",
            Phase::Review => "Review",
            Phase::Release => "Release",
        }
    }

    /// The phase a forward transition leads to, if any
    pub fn successor(&self) -> Option<Phase> {
        match self {
            Phase::Requirements => Some(Phase::TestAuthoring),
            Phase::TestAuthoring => Some(Phase::Implementation),
            Phase::Implementation => Some(Phase::Review),
            Phase::Review => Some(Phase::Release),
            Phase::Release => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Release)
    }

    /// Whether requirements may still be added in this phase
    pub fn accepts_requirements(&self) -> bool {
        matches!(
            self,
            Phase::Requirements | Phase::TestAuthoring | Phase::Implementation
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
