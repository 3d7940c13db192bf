//! WorkflowStateManager - per-change state CRUD and serialization

use super::store::{StateStore, StoreError};
use crate::models::{BlockingEvent, WorkflowState};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

pub type StateResult<T> = Result<T, StateError>;

type LockTable = DashMap<String, Arc<Mutex<()>>>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Change not found: {0}")]
    NotFound(String),

    #[error("Change already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid change_id '{0}': must be lowercase alphanumeric with hyphens only")]
    InvalidChangeId(String),

    #[error("Change {0} is not locked by the caller")]
    NotLocked(String),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

/// Exclusive hold on one change; released on drop
pub struct ChangeGuard {
    change_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
}

impl ChangeGuard {
    pub fn change_id(&self) -> &str {
        &self.change_id
    }
}

impl Drop for ChangeGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Forget the lock once nobody holds or waits for it
        self.locks
            .remove_if(&self.change_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Validate change_id so it is safe as a directory name
pub fn validate_change_id(change_id: &str) -> StateResult<()> {
    let valid = !change_id.is_empty()
        && !change_id.starts_with('-')
        && change_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(StateError::InvalidChangeId(change_id.to_string()));
    }
    Ok(())
}

/// Owns every change's workflow state.
///
/// Writes take the `ChangeGuard` of the change they touch, so every
/// read-then-write happens inside that change's critical section.
pub struct WorkflowStateManager {
    store: Arc<dyn StateStore>,
    locks: Arc<LockTable>,
}

impl WorkflowStateManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Enter the critical section for `change_id`
    pub async fn lock(&self, change_id: &str) -> ChangeGuard {
        let mutex = self
            .locks
            .entry(change_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        debug!(change_id, "Acquired change lock");
        ChangeGuard {
            change_id: change_id.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of changes currently locked or waited on
    pub fn locked_changes(&self) -> usize {
        self.locks.len()
    }

    fn check_guard(&self, guard: &ChangeGuard, change_id: &str) -> StateResult<()> {
        if guard.change_id != change_id || !Arc::ptr_eq(&guard.locks, &self.locks) {
            return Err(StateError::NotLocked(change_id.to_string()));
        }
        Ok(())
    }

    /// Persist a brand-new change
    pub async fn create(&self, guard: &ChangeGuard, state: &WorkflowState) -> StateResult<()> {
        validate_change_id(&state.change_id)?;
        self.check_guard(guard, &state.change_id)?;
        if self.store.get(&state.change_id).await?.is_some() {
            return Err(StateError::AlreadyExists(state.change_id.clone()));
        }
        self.store.put(state).await?;
        debug!(change_id = %state.change_id, "Created workflow state");
        Ok(())
    }

    pub async fn load(&self, change_id: &str) -> StateResult<WorkflowState> {
        self.store
            .get(change_id)
            .await?
            .ok_or_else(|| StateError::NotFound(change_id.to_string()))
    }

    /// Persist `state`. Blocking history in the store is kept as is.
    pub async fn save(&self, guard: &ChangeGuard, state: &WorkflowState) -> StateResult<()> {
        self.check_guard(guard, &state.change_id)?;
        if self.store.get(&state.change_id).await?.is_none() {
            return Err(StateError::NotFound(state.change_id.clone()));
        }
        self.store.put(state).await?;
        debug!(change_id = %state.change_id, phase = %state.phase, "Saved workflow state");
        Ok(())
    }

    pub async fn append_blocking_event(
        &self,
        guard: &ChangeGuard,
        event: &BlockingEvent,
    ) -> StateResult<()> {
        let change_id = guard.change_id();
        self.check_guard(guard, change_id)?;
        self.store
            .append_event(change_id, event)
            .await
            .map_err(|e| match e {
                StoreError::Missing(id) => StateError::NotFound(id),
                other => StateError::Store(other),
            })?;
        warn!(
            change_id,
            kind = %event.reason.kind,
            attempted = %event.attempted,
            "Blocking event recorded"
        );
        Ok(())
    }

    pub async fn list(&self) -> StateResult<Vec<String>> {
        Ok(self.store.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockingKind, BlockingReason, CategorySet, Phase};
    use crate::state::store::InMemoryStateStore;
    use std::time::Duration;

    fn manager() -> WorkflowStateManager {
        WorkflowStateManager::new(Arc::new(InMemoryStateStore::new()))
    }

    #[test]
    fn test_validate_change_id() {
        assert!(validate_change_id("add-oauth-2").is_ok());
        assert!(validate_change_id("").is_err());
        assert!(validate_change_id("../etc").is_err());
        assert!(validate_change_id("Add_OAuth").is_err());
        assert!(validate_change_id("-flag").is_err());
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let manager = manager();
        let state = WorkflowState::new("add-oauth", CategorySet::new());
        let guard = manager.lock("add-oauth").await;
        manager.create(&guard, &state).await.unwrap();

        let loaded = manager.load("add-oauth").await.unwrap();
        assert_eq!(loaded.phase, Phase::Requirements);

        assert!(matches!(
            manager.create(&guard, &state).await,
            Err(StateError::AlreadyExists(_))
        ));
        assert!(matches!(
            manager.load("missing").await,
            Err(StateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_unknown_change() {
        let manager = manager();
        let state = WorkflowState::new("ghost", CategorySet::new());
        let guard = manager.lock("ghost").await;
        assert!(matches!(
            manager.save(&guard, &state).await,
            Err(StateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_is_only_extended() {
        let manager = manager();
        let state = WorkflowState::new("add-oauth", CategorySet::new());
        let guard = manager.lock("add-oauth").await;
        manager.create(&guard, &state).await.unwrap();

        for _ in 0..3 {
            let reason = BlockingReason::new(BlockingKind::MissingCoverage, "none", "add one");
            let event = BlockingEvent::new(Phase::Requirements, Phase::TestAuthoring, reason);
            manager.append_blocking_event(&guard, &event).await.unwrap();
        }
        manager.save(&guard, &state).await.unwrap();
        drop(guard);

        let loaded = manager.load("add-oauth").await.unwrap();
        assert_eq!(loaded.blocking_history.len(), 3);

        let ghost = manager.lock("ghost").await;
        assert!(matches!(
            manager
                .append_blocking_event(&ghost, &loaded.blocking_history[0])
                .await,
            Err(StateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_require_the_change_guard() {
        let manager = manager();
        let state = WorkflowState::new("add-oauth", CategorySet::new());

        let wrong = manager.lock("fix-login").await;
        assert!(matches!(
            manager.create(&wrong, &state).await,
            Err(StateError::NotLocked(id)) if id == "add-oauth"
        ));

        let guard = manager.lock("add-oauth").await;
        manager.create(&guard, &state).await.unwrap();
        assert!(matches!(
            manager.save(&wrong, &state).await,
            Err(StateError::NotLocked(_))
        ));

        // A guard handed out by another manager does not count
        let other = WorkflowStateManager::new(Arc::new(InMemoryStateStore::new()));
        let foreign = other.lock("add-oauth").await;
        assert!(matches!(
            manager.save(&foreign, &state).await,
            Err(StateError::NotLocked(_))
        ));
        manager.save(&guard, &state).await.unwrap();
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let manager = Arc::new(manager());

        let held = manager.lock("add-oauth").await;
        let unknown = manager.lock("no-such-change").await;
        assert_eq!(manager.locked_changes(), 2);
        drop(unknown);
        assert_eq!(manager.locked_changes(), 1);

        // A waiter keeps the entry alive after the holder lets go
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let _guard = manager.lock("add-oauth").await;
            })
        };
        tokio::task::yield_now().await;
        drop(held);
        waiter.await.unwrap();

        assert_eq!(manager.locked_changes(), 0);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_per_change() {
        let manager = Arc::new(manager());

        let held = manager.lock("add-oauth").await;
        assert_eq!(held.change_id(), "add-oauth");

        // Different change is independent
        let other = tokio::time::timeout(Duration::from_millis(50), manager.lock("fix-login")).await;
        assert!(other.is_ok());

        // Same change waits
        let same = tokio::time::timeout(Duration::from_millis(50), manager.lock("add-oauth")).await;
        assert!(same.is_err());

        drop(held);
        let same = tokio::time::timeout(Duration::from_millis(50), manager.lock("add-oauth")).await;
        assert!(same.is_ok());
    }
}
