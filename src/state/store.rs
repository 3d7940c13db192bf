//! Persistence backends for workflow state
//!
//! Stores keep blocking history append-only: `put` replaces everything about
//! a change except its history, which only `append_event` may extend.

use crate::models::{BlockingEvent, WorkflowState};
use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No stored state for change: {0}")]
    Missing(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Key-value store for workflow state, keyed by change id
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, change_id: &str) -> StoreResult<Option<WorkflowState>>;

    /// Write everything except blocking history
    async fn put(&self, state: &WorkflowState) -> StoreResult<()>;

    /// Extend a change's blocking history
    async fn append_event(&self, change_id: &str, event: &BlockingEvent) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<String>>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory store for tests and embedded hosts
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: DashMap<String, WorkflowState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, change_id: &str) -> StoreResult<Option<WorkflowState>> {
        Ok(self.states.get(change_id).map(|s| s.clone()))
    }

    async fn put(&self, state: &WorkflowState) -> StoreResult<()> {
        let mut incoming = state.clone();
        match self.states.get_mut(&state.change_id) {
            Some(mut stored) => {
                incoming.blocking_history = std::mem::take(&mut stored.blocking_history);
                *stored = incoming;
            }
            None => {
                incoming.blocking_history.clear();
                self.states.insert(state.change_id.clone(), incoming);
            }
        }
        Ok(())
    }

    async fn append_event(&self, change_id: &str, event: &BlockingEvent) -> StoreResult<()> {
        let mut stored = self
            .states
            .get_mut(change_id)
            .ok_or_else(|| StoreError::Missing(change_id.to_string()))?;
        stored.blocking_history.push(event.clone());
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self.states.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

// =============================================================================
// File Store
// =============================================================================

const STATE_FILE: &str = "STATE.yaml";
const HISTORY_FILE: &str = "HISTORY.jsonl";

/// One directory per change: `STATE.yaml` plus an append-only `HISTORY.jsonl`
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn change_dir(&self, change_id: &str) -> PathBuf {
        self.root.join(change_id)
    }

    async fn read_history(&self, change_id: &str) -> anyhow::Result<Vec<BlockingEvent>> {
        let path = self.change_dir(change_id).join(HISTORY_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Failed to parse {} entry {}", HISTORY_FILE, n + 1)
                })
            })
            .collect()
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, change_id: &str) -> StoreResult<Option<WorkflowState>> {
        let path = self.change_dir(change_id).join(STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .context("Failed to read STATE.yaml")?;
        let mut state: WorkflowState =
            serde_yaml::from_str(&content).context("Failed to parse STATE.yaml")?;
        state.blocking_history = self.read_history(change_id).await?;
        Ok(Some(state))
    }

    async fn put(&self, state: &WorkflowState) -> StoreResult<()> {
        let dir = self.change_dir(&state.change_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut document = state.clone();
        document.blocking_history.clear();
        let content =
            serde_yaml::to_string(&document).context("Failed to serialize STATE.yaml")?;

        // Write to a sibling file first so readers never see a partial state
        let temp_path = dir.join(format!("{}.tmp", STATE_FILE));
        tokio::fs::write(&temp_path, content)
            .await
            .context("Failed to write STATE.yaml")?;
        tokio::fs::rename(&temp_path, dir.join(STATE_FILE))
            .await
            .context("Failed to replace STATE.yaml")?;
        Ok(())
    }

    async fn append_event(&self, change_id: &str, event: &BlockingEvent) -> StoreResult<()> {
        let dir = self.change_dir(change_id);
        if !dir.join(STATE_FILE).exists() {
            return Err(StoreError::Missing(change_id.to_string()));
        }

        let mut line = serde_json::to_string(event).context("Failed to serialize event")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(HISTORY_FILE))
            .await
            .context("Failed to open HISTORY.jsonl")?;
        file.write_all(line.as_bytes())
            .await
            .context("Failed to append to HISTORY.jsonl")?;
        file.flush().await.context("Failed to flush HISTORY.jsonl")?;
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to list {}", self.root.display()))?;
        while let Some(entry) = entries.next_entry().await.context("Failed to read entry")? {
            if entry.path().join(STATE_FILE).exists() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockingKind, BlockingReason, CategorySet, ChangeCategory, Phase};
    use tempfile::TempDir;

    fn event() -> BlockingEvent {
        BlockingEvent::new(
            Phase::TestAuthoring,
            Phase::Implementation,
            BlockingReason::new(BlockingKind::MissingCoverage, "no test", "write one")
                .with_references(vec!["REQ-1".to_string()]),
        )
    }

    #[tokio::test]
    async fn test_memory_put_preserves_history() {
        let store = InMemoryStateStore::new();
        let state = WorkflowState::new("add-oauth", CategorySet::new());
        store.put(&state).await.unwrap();
        store.append_event("add-oauth", &event()).await.unwrap();

        // A stale copy without history must not erase it
        let mut stale = state.clone();
        stale.phase = Phase::TestAuthoring;
        store.put(&stale).await.unwrap();

        let loaded = store.get("add-oauth").await.unwrap().unwrap();
        assert_eq!(loaded.phase, Phase::TestAuthoring);
        assert_eq!(loaded.blocking_history.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_append_to_missing_change() {
        let store = InMemoryStateStore::new();
        assert!(matches!(
            store.append_event("ghost", &event()).await,
            Err(StoreError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path());

        let mut state = WorkflowState::new(
            "add-oauth",
            CategorySet::from([ChangeCategory::Authentication]),
        );
        state.ledger.record("REQ-1").unwrap();
        store.put(&state).await.unwrap();
        store.append_event("add-oauth", &event()).await.unwrap();
        store.append_event("add-oauth", &event()).await.unwrap();

        assert!(temp.path().join("add-oauth/STATE.yaml").exists());
        assert!(temp.path().join("add-oauth/HISTORY.jsonl").exists());

        let loaded = store.get("add-oauth").await.unwrap().unwrap();
        assert_eq!(loaded.ledger, state.ledger);
        assert_eq!(loaded.categories, state.categories);
        assert_eq!(loaded.blocking_history.len(), 2);

        store.put(&loaded).await.unwrap();
        let reloaded = store.get("add-oauth").await.unwrap().unwrap();
        assert_eq!(reloaded.blocking_history.len(), 2);

        assert_eq!(store.list().await.unwrap(), vec!["add-oauth".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_missing_change() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path());
        assert!(store.get("ghost").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }
}
