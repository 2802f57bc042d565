use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::decision::Decision;
use crate::domain::entity::{EntityId, WorkflowType, WorkflowedEntity};
use crate::domain::history::HistoryEntry;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity `{entity_id}` changed concurrently (expected version {expected}, found {actual})")]
    Conflict { entity_id: EntityId, expected: u32, actual: u32 },
    #[error("entity `{0}` not found")]
    NotFound(EntityId),
    #[error("entity `{0}` already exists")]
    Duplicate(EntityId),
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Everything one status mutation writes, applied atomically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusCommit {
    pub entity_id: EntityId,
    /// Version read before evaluating; the commit fails if it moved.
    pub expected_version: u32,
    pub new_status: String,
    pub revision_count: u32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub decision: Option<Decision>,
    pub history: HistoryEntry,
}

impl StatusCommit {
    pub fn next_version(&self) -> u32 {
        self.expected_version + 1
    }
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(&self, entity: &WorkflowedEntity) -> Result<(), StoreError>;

    async fn load(&self, entity_id: &EntityId) -> Result<WorkflowedEntity, StoreError>;

    /// Compare-and-swap on `expected_version`; returns the stored entity.
    async fn commit(&self, commit: &StatusCommit) -> Result<WorkflowedEntity, StoreError>;

    /// Entities of one type in one status, oldest submission first. A `scope`
    /// restricts results to entities owned by one of its units.
    async fn list_in_status(
        &self,
        workflow_type: &WorkflowType,
        status: &str,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Vec<WorkflowedEntity>, StoreError>;

    /// Latest first.
    async fn history(&self, entity_id: &EntityId) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Oldest first.
    async fn decisions(&self, entity_id: &EntityId) -> Result<Vec<Decision>, StoreError>;
}

#[async_trait]
impl<T: WorkflowStore + ?Sized> WorkflowStore for Arc<T> {
    async fn create(&self, entity: &WorkflowedEntity) -> Result<(), StoreError> {
        (**self).create(entity).await
    }

    async fn load(&self, entity_id: &EntityId) -> Result<WorkflowedEntity, StoreError> {
        (**self).load(entity_id).await
    }

    async fn commit(&self, commit: &StatusCommit) -> Result<WorkflowedEntity, StoreError> {
        (**self).commit(commit).await
    }

    async fn list_in_status(
        &self,
        workflow_type: &WorkflowType,
        status: &str,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Vec<WorkflowedEntity>, StoreError> {
        (**self).list_in_status(workflow_type, status, scope).await
    }

    async fn history(&self, entity_id: &EntityId) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(entity_id).await
    }

    async fn decisions(&self, entity_id: &EntityId) -> Result<Vec<Decision>, StoreError> {
        (**self).decisions(entity_id).await
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    entities: BTreeMap<EntityId, WorkflowedEntity>,
    decisions: Vec<Decision>,
    history: Vec<HistoryEntry>,
}

/// Process-local store. One mutex guards all three collections so a commit
/// is visible entirely or not at all.
#[derive(Clone, Debug, Default)]
pub struct InMemoryWorkflowStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn decision_count(&self) -> usize {
        self.state().decisions.len()
    }

    pub fn history_count(&self) -> usize {
        self.state().history.len()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, entity: &WorkflowedEntity) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.entities.contains_key(&entity.id) {
            return Err(StoreError::Duplicate(entity.id.clone()));
        }
        state.entities.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn load(&self, entity_id: &EntityId) -> Result<WorkflowedEntity, StoreError> {
        self.state()
            .entities
            .get(entity_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(entity_id.clone()))
    }

    async fn commit(&self, commit: &StatusCommit) -> Result<WorkflowedEntity, StoreError> {
        let mut state = self.state();
        let sequence = commit.next_version();

        let duplicate_sequence = state.history.iter().any(|entry| {
            entry.entity_id == commit.entity_id && entry.sequence == commit.history.sequence
        });

        let entity = state
            .entities
            .get_mut(&commit.entity_id)
            .ok_or_else(|| StoreError::NotFound(commit.entity_id.clone()))?;

        if entity.version != commit.expected_version || duplicate_sequence {
            return Err(StoreError::Conflict {
                entity_id: commit.entity_id.clone(),
                expected: commit.expected_version,
                actual: entity.version,
            });
        }

        entity.status = commit.new_status.clone();
        entity.revision_count = commit.revision_count;
        entity.version = sequence;
        entity.submitted_at = commit.submitted_at;
        entity.updated_at = commit.updated_at;
        let updated = entity.clone();

        if let Some(decision) = &commit.decision {
            state.decisions.push(decision.clone());
        }
        state.history.push(commit.history.clone());

        Ok(updated)
    }

    async fn list_in_status(
        &self,
        workflow_type: &WorkflowType,
        status: &str,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Vec<WorkflowedEntity>, StoreError> {
        let state = self.state();
        let mut matches: Vec<WorkflowedEntity> = state
            .entities
            .values()
            .filter(|entity| &entity.workflow_type == workflow_type && entity.status == status)
            .filter(|entity| match scope {
                None => true,
                Some(units) => {
                    entity.owner_scope.as_ref().is_some_and(|owner| units.contains(owner))
                }
            })
            .cloned()
            .collect();

        matches.sort_by(|left, right| {
            left.submitted_at.cmp(&right.submitted_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(matches)
    }

    async fn history(&self, entity_id: &EntityId) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state();
        if !state.entities.contains_key(entity_id) {
            return Err(StoreError::NotFound(entity_id.clone()));
        }
        let mut entries: Vec<HistoryEntry> =
            state.history.iter().filter(|entry| &entry.entity_id == entity_id).cloned().collect();
        entries.sort_by(|left, right| right.sequence.cmp(&left.sequence));
        Ok(entries)
    }

    async fn decisions(&self, entity_id: &EntityId) -> Result<Vec<Decision>, StoreError> {
        let state = self.state();
        if !state.entities.contains_key(entity_id) {
            return Err(StoreError::NotFound(entity_id.clone()));
        }
        let mut decisions: Vec<Decision> = state
            .decisions
            .iter()
            .filter(|decision| &decision.entity_id == entity_id)
            .cloned()
            .collect();
        decisions.sort_by_key(|decision| decision.sequence);
        Ok(decisions)
    }
}
