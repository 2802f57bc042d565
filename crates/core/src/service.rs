//! Workflow service: the only mutation path for workflowed entities.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::RequestContext;
use crate::domain::decision::{Decision, DecisionId, DecisionKind};
use crate::domain::entity::{EntityId, NewEntity, WorkflowedEntity};
use crate::domain::history::HistoryEntry;
use crate::errors::{ApplicationError, DomainError};
use crate::recorder::{prepare, DecisionRecorder};
use crate::stages::{StageDefinition, StageTable};
use crate::store::{StoreError, WorkflowStore};
use crate::transition::{next_status, submit_status};
use crate::visibility::{scope_permits, VisibilityFilter};

pub const DEFAULT_MAX_DECIDE_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub entity: WorkflowedEntity,
    pub decision_id: DecisionId,
    pub attempts: u32,
}

pub struct WorkflowService<S, A> {
    store: S,
    audit: A,
    stages: Arc<StageTable>,
    max_decide_attempts: u32,
}

impl<S, A> WorkflowService<S, A>
where
    S: WorkflowStore,
    A: AuditSink,
{
    pub fn new(store: S, audit: A, stages: Arc<StageTable>) -> Self {
        Self { store, audit, stages, max_decide_attempts: DEFAULT_MAX_DECIDE_ATTEMPTS }
    }

    pub fn with_max_decide_attempts(mut self, attempts: u32) -> Self {
        self.max_decide_attempts = attempts.max(1);
        self
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create an entity in the draft status of its workflow type.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        new: NewEntity,
    ) -> Result<WorkflowedEntity, ApplicationError> {
        let entity_id = new.id.clone();
        let result = self.register_inner(new).await;
        self.report(
            ctx,
            Some(&entity_id),
            "workflow.entity_registered",
            AuditCategory::Registration,
            &result,
            |entity| vec![("status", entity.status.clone())],
        );
        result
    }

    async fn register_inner(&self, new: NewEntity) -> Result<WorkflowedEntity, ApplicationError> {
        if new.id.0.trim().is_empty() {
            return Err(DomainError::Validation("entity id must not be empty".to_owned()).into());
        }
        if new.owner_id.trim().is_empty() {
            return Err(DomainError::Validation("owner id must not be empty".to_owned()).into());
        }
        let definition = self.stages.stages_for(&new.workflow_type)?;
        let entity = WorkflowedEntity::draft(new, definition.draft_status.clone(), Utc::now());
        self.store.create(&entity).await?;
        Ok(entity)
    }

    /// Owner hands a draft (or returned) entity to stage 1.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        entity_id: &EntityId,
    ) -> Result<WorkflowedEntity, ApplicationError> {
        let result = self.submit_inner(ctx, entity_id).await;
        self.report(
            ctx,
            Some(entity_id),
            "workflow.submitted",
            AuditCategory::Submission,
            &result,
            |entity| {
                vec![
                    ("to", entity.status.clone()),
                    ("revision_count", entity.revision_count.to_string()),
                ]
            },
        );
        result
    }

    async fn submit_inner(
        &self,
        ctx: &RequestContext,
        entity_id: &EntityId,
    ) -> Result<WorkflowedEntity, ApplicationError> {
        let entity = self.store.load(entity_id).await?;
        let definition = self.definition_for(&entity)?;

        if entity.owner_id != ctx.actor.id {
            return Err(DomainError::forbidden(
                ctx.actor.role.clone(),
                format!("only the owner of `{entity_id}` may submit it"),
            )
            .into());
        }

        let transition = submit_status(definition, &entity.status)?;
        let commit = prepare(&entity, &transition, &ctx.actor, None, Utc::now());
        let recorded = DecisionRecorder::new(&self.store).record(&commit).await?;
        Ok(recorded.entity)
    }

    /// Record an approver decision, retrying the whole read-evaluate-commit
    /// cycle on version conflicts.
    pub async fn decide(
        &self,
        ctx: &RequestContext,
        entity_id: &EntityId,
        kind: DecisionKind,
        comments: Option<&str>,
    ) -> Result<DecisionOutcome, ApplicationError> {
        let result = self.decide_inner(ctx, entity_id, kind, comments).await;
        self.report(
            ctx,
            Some(entity_id),
            "workflow.decision_recorded",
            AuditCategory::Decision,
            &result,
            |outcome| {
                vec![
                    ("decision", kind.as_str().to_owned()),
                    ("decision_id", outcome.decision_id.0.clone()),
                    ("to", outcome.entity.status.clone()),
                    ("attempts", outcome.attempts.to_string()),
                ]
            },
        );
        result
    }

    async fn decide_inner(
        &self,
        ctx: &RequestContext,
        entity_id: &EntityId,
        kind: DecisionKind,
        comments: Option<&str>,
    ) -> Result<DecisionOutcome, ApplicationError> {
        if kind.requires_comments() && comments.map_or(true, |text| text.trim().is_empty()) {
            return Err(DomainError::Validation(format!(
                "comments are required to {}",
                kind.as_str()
            ))
            .into());
        }

        let recorder = DecisionRecorder::new(&self.store);
        let mut observed_status: Option<String> = None;

        for attempt in 1..=self.max_decide_attempts {
            let entity = self.store.load(entity_id).await?;
            match &observed_status {
                Some(status) if status != &entity.status => {
                    return Err(DomainError::invalid_state(entity.status, "decided").into());
                }
                Some(_) => {}
                None => observed_status = Some(entity.status.clone()),
            }

            let definition = self.definition_for(&entity)?;
            let transition =
                next_status(definition, &entity.status, &ctx.actor.role, kind, comments)?;

            if let Some(stage) = transition.stage_index.and_then(|index| definition.stage(index)) {
                if !scope_permits(stage, ctx.actor.scope.as_ref(), &entity) {
                    return Err(DomainError::forbidden(
                        ctx.actor.role.clone(),
                        format!("`{entity_id}` is outside the approver's scope"),
                    )
                    .into());
                }
            }

            let commit = prepare(&entity, &transition, &ctx.actor, comments, Utc::now());
            match recorder.record(&commit).await {
                Ok(recorded) => {
                    let decision_id = recorded.decision_id.ok_or_else(|| {
                        ApplicationError::Storage("decision was not recorded".to_owned())
                    })?;
                    return Ok(DecisionOutcome {
                        entity: recorded.entity,
                        decision_id,
                        attempts: attempt,
                    });
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(error) => return Err(error.into()),
            }
        }

        Err(ApplicationError::Conflict {
            entity_id: entity_id.clone(),
            attempts: self.max_decide_attempts,
        })
    }

    /// Entities currently waiting on the caller's role and scope.
    pub async fn pending(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<WorkflowedEntity>, ApplicationError> {
        let result = VisibilityFilter::new(&self.stages, &self.store)
            .pending_for(&ctx.actor.role, ctx.actor.scope.as_ref())
            .await
            .map_err(ApplicationError::from);
        self.report(
            ctx,
            None,
            "workflow.pending_listed",
            AuditCategory::Query,
            &result,
            |entities| vec![("count", entities.len().to_string())],
        );
        result
    }

    /// Status change log, latest first.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        entity_id: &EntityId,
    ) -> Result<Vec<HistoryEntry>, ApplicationError> {
        let result = self.store.history(entity_id).await.map_err(ApplicationError::from);
        self.report(
            ctx,
            Some(entity_id),
            "workflow.history_read",
            AuditCategory::Query,
            &result,
            |entries| vec![("count", entries.len().to_string())],
        );
        result
    }

    pub async fn decisions(
        &self,
        ctx: &RequestContext,
        entity_id: &EntityId,
    ) -> Result<Vec<Decision>, ApplicationError> {
        let result = self.store.decisions(entity_id).await.map_err(ApplicationError::from);
        self.report(
            ctx,
            Some(entity_id),
            "workflow.decisions_read",
            AuditCategory::Query,
            &result,
            |decisions| vec![("count", decisions.len().to_string())],
        );
        result
    }

    pub async fn entity(
        &self,
        ctx: &RequestContext,
        entity_id: &EntityId,
    ) -> Result<WorkflowedEntity, ApplicationError> {
        let result = self.store.load(entity_id).await.map_err(ApplicationError::from);
        self.report(
            ctx,
            Some(entity_id),
            "workflow.entity_read",
            AuditCategory::Query,
            &result,
            |entity| vec![("status", entity.status.clone())],
        );
        result
    }

    /// Stored status must still be one the entity's workflow declares.
    fn definition_for(
        &self,
        entity: &WorkflowedEntity,
    ) -> Result<&StageDefinition, ApplicationError> {
        let definition = self.stages.stages_for(&entity.workflow_type)?;
        if !definition.is_declared(&entity.status) {
            return Err(ApplicationError::Configuration(format!(
                "entity `{}` holds status `{}` which workflow `{}` does not declare",
                entity.id, entity.status, entity.workflow_type
            )));
        }
        Ok(definition)
    }

    fn report<T, F>(
        &self,
        ctx: &RequestContext,
        entity_id: Option<&EntityId>,
        event_type: &str,
        category: AuditCategory,
        result: &Result<T, ApplicationError>,
        metadata: F,
    ) where
        F: FnOnce(&T) -> Vec<(&'static str, String)>,
    {
        let event = match result {
            Ok(value) => {
                let mut event = AuditEvent::new(
                    entity_id.cloned(),
                    ctx.correlation_id.clone(),
                    event_type,
                    category,
                    ctx.actor.id.clone(),
                    AuditOutcome::Success,
                );
                for (key, value) in metadata(value) {
                    event = event.with_metadata(key, value);
                }
                event
            }
            Err(error) => {
                let (outcome, category) = match error {
                    ApplicationError::Domain(_)
                    | ApplicationError::NotFound(_)
                    | ApplicationError::AlreadyExists(_) => (AuditOutcome::Rejected, category),
                    ApplicationError::Conflict { .. } | ApplicationError::Storage(_) => {
                        (AuditOutcome::Failed, AuditCategory::Persistence)
                    }
                    ApplicationError::Configuration(_) => (AuditOutcome::Failed, category),
                };
                AuditEvent::new(
                    entity_id.cloned(),
                    ctx.correlation_id.clone(),
                    event_type.replacen("workflow.", "workflow.rejected.", 1),
                    category,
                    ctx.actor.id.clone(),
                    outcome,
                )
                .with_metadata("error", error.to_string())
            }
        };
        self.audit.emit(event.with_metadata("role", ctx.actor.role.clone()));
    }
}
