use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowType(pub String);

impl WorkflowType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record taking part in an approval chain.
///
/// Only the workflow fields live here; budget amounts, report sections and
/// other payload belong to the owning domain store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowedEntity {
    pub id: EntityId,
    pub workflow_type: WorkflowType,
    pub owner_id: String,
    /// Owning department, matched against a scoped approver's scope.
    pub owner_scope: Option<String>,
    pub status: String,
    pub revision_count: u32,
    /// Optimistic concurrency token, bumped by every committed transition.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntity {
    pub id: EntityId,
    pub workflow_type: WorkflowType,
    pub owner_id: String,
    pub owner_scope: Option<String>,
}

impl WorkflowedEntity {
    pub fn draft(new: NewEntity, draft_status: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            workflow_type: new.workflow_type,
            owner_id: new.owner_id,
            owner_scope: new.owner_scope,
            status: draft_status.into(),
            revision_count: 0,
            version: 1,
            created_at: now,
            submitted_at: None,
            updated_at: now,
        }
    }
}
