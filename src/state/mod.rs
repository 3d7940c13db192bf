//! Workflow state management
//!
//! Handles persistence and serialization of change state, including:
//! - Current phase and ledger snapshot
//! - Append-only blocking history
//! - Per-change critical sections

mod manager;
mod store;

pub use manager::{
    validate_change_id, ChangeGuard, StateError, StateResult, WorkflowStateManager,
};
pub use store::{FileStateStore, InMemoryStateStore, StateStore, StoreError, StoreResult};
