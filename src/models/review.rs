use serde::{Deserialize, Serialize};

/// Verdict reported by a review-capable agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "kebab-case")]
pub enum ReviewVerdict {
    /// Implementation is acceptable
    Pass,
    /// Implementation needs changes before release
    RequestChanges {
        #[serde(default)]
        summary: String,
    },
}

impl ReviewVerdict {
    pub fn request_changes(summary: impl Into<String>) -> Self {
        ReviewVerdict::RequestChanges {
            summary: summary.into(),
        }
    }

    /// Check if the verdict allows proceeding to release
    pub fn is_pass(&self) -> bool {
        matches!(self, ReviewVerdict::Pass)
    }
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewVerdict::Pass => write!(f, "PASS"),
            ReviewVerdict::RequestChanges { .. } => write!(f, "REQUEST_CHANGES"),
        }
    }
}

/// What an agent invocation returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AgentOutcome {
    /// Authoring agent finished its work
    Completed,
    /// Review agent reached a verdict
    Reviewed { verdict: ReviewVerdict },
}

impl AgentOutcome {
    pub fn verdict(&self) -> Option<&ReviewVerdict> {
        match self {
            AgentOutcome::Completed => None,
            AgentOutcome::Reviewed { verdict } => Some(verdict),
        }
    }
}

impl From<ReviewVerdict> for AgentOutcome {
    fn from(verdict: ReviewVerdict) -> Self {
        AgentOutcome::Reviewed { verdict }
    }
}
