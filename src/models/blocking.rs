use super::{Phase, PipelineCommand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a transition was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockingKind {
    /// A requirement has no test, or no requirement exists at all
    MissingCoverage,
    /// A requirement's test passes before anything is implemented
    NoFailingTests,
    /// A test asserts nothing that could fail
    TrivialAssertions,
    /// A test title does not cite a requirement identifier
    MissingCitation,
    /// A reviewer asked for changes
    ChangesRequested,
    /// A mandatory reviewer has not reported yet
    ReviewPending,
    /// The change touches sensitive surface and no security review passed
    SecurityReviewRequired,
}

impl BlockingKind {
    pub const ALL: [BlockingKind; 7] = [
        BlockingKind::MissingCoverage,
        BlockingKind::NoFailingTests,
        BlockingKind::TrivialAssertions,
        BlockingKind::MissingCitation,
        BlockingKind::ChangesRequested,
        BlockingKind::ReviewPending,
        BlockingKind::SecurityReviewRequired,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BlockingKind::MissingCoverage => "missing-coverage",
            BlockingKind::NoFailingTests => "no-failing-tests",
            BlockingKind::TrivialAssertions => "trivial-assertions",
            BlockingKind::MissingCitation => "missing-citation",
            BlockingKind::ChangesRequested => "changes-requested",
            BlockingKind::ReviewPending => "review-pending",
            BlockingKind::SecurityReviewRequired => "security-review-required",
        }
    }

    /// Raised while the change sits in Review
    pub fn is_review_kind(&self) -> bool {
        matches!(
            self,
            BlockingKind::ChangesRequested
                | BlockingKind::ReviewPending
                | BlockingKind::SecurityReviewRequired
        )
    }

    /// Built-in remediation hint, used when config does not override it
    pub fn default_remediation(&self) -> &'static str {
        match self {
            BlockingKind::MissingCoverage => {
                "Write a failing test for each listed requirement before implementing"
            }
            BlockingKind::NoFailingTests => {
                "Rewrite the listed tests so they fail until the behavior is implemented"
            }
            BlockingKind::TrivialAssertions => {
                "Replace constant or self-comparing assertions with checks on real behavior"
            }
            BlockingKind::MissingCitation => {
                "Put the requirement identifier in the title of every test"
            }
            BlockingKind::ChangesRequested => {
                "Address the reviewer's findings and run `check` again"
            }
            BlockingKind::ReviewPending => "Run `check` so every mandatory reviewer reports",
            BlockingKind::SecurityReviewRequired => {
                "Obtain a passing verdict from the security reviewer"
            }
        }
    }
}

impl std::fmt::Display for BlockingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A structured refusal returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingReason {
    pub kind: BlockingKind,
    /// Human-readable explanation
    pub explanation: String,
    /// How to get past the gate
    pub remediation: String,
    /// Requirement ids, test titles or agent names the reason is about
    #[serde(default)]
    pub references: Vec<String>,
}

impl BlockingReason {
    pub fn new(
        kind: BlockingKind,
        explanation: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            explanation: explanation.into(),
            remediation: remediation.into(),
            references: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    pub fn mentions(&self, reference: &str) -> bool {
        self.references.iter().any(|r| r == reference)
    }
}

impl std::fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.explanation)?;
        if !self.references.is_empty() {
            write!(f, " ({})", self.references.join(", "))?;
        }
        Ok(())
    }
}

/// One entry of a change's blocking history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    /// Phase the change was in when the attempt was refused
    pub phase: Phase,
    /// Phase the attempt tried to reach
    pub attempted: Phase,
    #[serde(default)]
    pub command: Option<PipelineCommand>,
    pub reason: BlockingReason,
}

impl BlockingEvent {
    pub fn new(phase: Phase, attempted: Phase, reason: BlockingReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            phase,
            attempted,
            command: None,
            reason,
        }
    }

    pub fn with_command(mut self, command: PipelineCommand) -> Self {
        self.command = Some(command);
        self
    }
}
