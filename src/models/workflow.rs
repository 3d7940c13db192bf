use super::{BlockingEvent, CategorySet, Phase, PipelineCommand, ReviewVerdict};
use crate::ledger::RequirementLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A successful phase change, kept for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    #[serde(default)]
    pub command: Option<PipelineCommand>,
    pub at: DateTime<Utc>,
}

/// Durable record of a change moving through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Unique identifier (e.g., "add-oauth")
    pub change_id: String,

    pub phase: Phase,

    #[serde(default)]
    pub categories: CategorySet,

    #[serde(default)]
    pub ledger: RequirementLedger,

    /// Set on entering Review when the categories are security-sensitive
    #[serde(default)]
    pub security_review_required: bool,

    /// Latest verdict per reviewing agent for the current review round
    #[serde(default)]
    pub reviews: BTreeMap<String, ReviewVerdict>,

    /// Refused attempts, oldest first; only ever extended
    #[serde(default)]
    pub blocking_history: Vec<BlockingEvent>,

    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,

    /// Incremented each time implementation regresses to test authoring
    #[serde(default = "default_iteration")]
    pub iteration: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub abandoned_at: Option<DateTime<Utc>>,
}

fn default_iteration() -> u32 {
    1
}

impl WorkflowState {
    pub fn new(change_id: impl Into<String>, categories: CategorySet) -> Self {
        let now = Utc::now();
        Self {
            change_id: change_id.into(),
            phase: Phase::Requirements,
            categories,
            ledger: RequirementLedger::new(),
            security_review_required: false,
            reviews: BTreeMap::new(),
            blocking_history: Vec::new(),
            transitions: Vec::new(),
            iteration: 1,
            created_at: now,
            updated_at: now,
            abandoned_at: None,
        }
    }

    /// Released or abandoned changes accept no further commands
    pub fn is_closed(&self) -> bool {
        self.phase.is_terminal() || self.abandoned_at.is_some()
    }

    /// Any reviewer in the current round asked for changes
    pub fn has_requested_changes(&self) -> bool {
        self.reviews.values().any(|v| !v.is_pass())
    }

    /// Move to `to`, logging the transition
    pub fn enter(&mut self, to: Phase, command: Option<PipelineCommand>) {
        let now = Utc::now();
        self.transitions.push(TransitionRecord {
            from: self.phase,
            to,
            command,
            at: now,
        });
        self.phase = to;
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
