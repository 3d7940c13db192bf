use serde::{Deserialize, Serialize};

/// How well a requirement is backed by tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageStatus {
    /// No test exercises the requirement yet
    Uncovered,
    /// A test exists and fails, as it should before implementation
    FailingTestPresent,
    /// A test passes although nothing is implemented yet
    PassingWithoutImplementation,
}

impl CoverageStatus {
    pub fn name(&self) -> &'static str {
        match self {
            CoverageStatus::Uncovered => "uncovered",
            CoverageStatus::FailingTestPresent => "failing-test-present",
            CoverageStatus::PassingWithoutImplementation => "passing-without-implementation",
        }
    }
}

impl std::fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Coverage record for a single requirement identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    /// Stable identifier (e.g., "REQ-1")
    pub id: String,

    pub status: CoverageStatus,

    /// At least one test title cites the identifier
    #[serde(default)]
    pub cited: bool,

    /// A test for this requirement asserts nothing falsifiable
    #[serde(default)]
    pub trivial_assertions: bool,
}

impl RequirementRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: CoverageStatus::Uncovered,
            cited: false,
            trivial_assertions: false,
        }
    }

    /// Ready for implementation: failing test, cited, meaningful
    pub fn is_gated_ready(&self) -> bool {
        self.status == CoverageStatus::FailingTestPresent
            && self.cited
            && !self.trivial_assertions
    }
}

/// Per-requirement tuple supplied by the test-result feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestObservation {
    pub has_failing_test: bool,
    pub has_passing_test_without_impl: bool,
    pub title_cites_id: bool,
    #[serde(default)]
    pub trivial_assertions: bool,
}

impl TestObservation {
    pub fn failing(cited: bool) -> Self {
        Self {
            has_failing_test: true,
            title_cites_id: cited,
            ..Self::default()
        }
    }

    pub fn passing_without_impl(cited: bool) -> Self {
        Self {
            has_passing_test_without_impl: true,
            title_cites_id: cited,
            ..Self::default()
        }
    }

    pub fn with_trivial_assertions(mut self) -> Self {
        self.trivial_assertions = true;
        self
    }
}
