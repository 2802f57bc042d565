use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::decision::{Decision, DecisionId};
use crate::domain::entity::WorkflowedEntity;
use crate::domain::history::{HistoryEntry, HistoryEntryId};
use crate::store::{StatusCommit, StoreError, WorkflowStore};
use crate::transition::Transition;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    pub entity: WorkflowedEntity,
    pub decision_id: Option<DecisionId>,
    pub history_id: HistoryEntryId,
}

/// Build the commit for an evaluated transition. Pure: no I/O, fresh ids.
pub fn prepare(
    entity: &WorkflowedEntity,
    transition: &Transition,
    actor: &Actor,
    comments: Option<&str>,
    now: DateTime<Utc>,
) -> StatusCommit {
    let sequence = entity.version + 1;
    let comments = comments.map(str::trim).filter(|text| !text.is_empty()).map(str::to_owned);

    let decision = match (transition.kind, transition.stage_index) {
        (Some(kind), Some(stage_index)) => Some(Decision {
            id: DecisionId(Uuid::new_v4().to_string()),
            entity_id: entity.id.clone(),
            stage_index: stage_index as u32,
            stage_role: transition.stage_role.clone().unwrap_or_default(),
            kind,
            actor_id: actor.id.clone(),
            actor_role: actor.role.clone(),
            comments: comments.clone(),
            from_status: transition.from.clone(),
            to_status: transition.to.clone(),
            sequence,
            decided_at: now,
        }),
        _ => None,
    };

    let submitted_at = if transition.kind.is_none() { Some(now) } else { entity.submitted_at };

    StatusCommit {
        entity_id: entity.id.clone(),
        expected_version: entity.version,
        new_status: transition.to.clone(),
        revision_count: entity.revision_count + u32::from(transition.increments_revision),
        submitted_at,
        updated_at: now,
        history: HistoryEntry {
            id: HistoryEntryId(Uuid::new_v4().to_string()),
            entity_id: entity.id.clone(),
            sequence,
            from_status: transition.from.clone(),
            to_status: transition.to.clone(),
            change_type: transition.change_type,
            actor_id: actor.id.clone(),
            decision_id: decision.as_ref().map(|decision| decision.id.clone()),
            note: comments,
            occurred_at: now,
        },
        decision,
    }
}

/// Writes status, decision and history as one unit through the store.
pub struct DecisionRecorder<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> DecisionRecorder<'a, S>
where
    S: WorkflowStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn record(&self, commit: &StatusCommit) -> Result<Recorded, StoreError> {
        let entity = self.store.commit(commit).await?;
        Ok(Recorded {
            entity,
            decision_id: commit.decision.as_ref().map(|decision| decision.id.clone()),
            history_id: commit.history.id.clone(),
        })
    }
}
