use crate::domain::actor::Scope;
use crate::domain::entity::WorkflowedEntity;
use crate::stages::{Stage, StageTable};
use crate::store::{StoreError, WorkflowStore};

/// Whether an approver with `scope` may see or decide `entity` at `stage`.
pub fn scope_permits(stage: &Stage, scope: Option<&Scope>, entity: &WorkflowedEntity) -> bool {
    if !stage.scoped {
        return true;
    }
    match (scope, entity.owner_scope.as_deref()) {
        (Some(scope), Some(owner)) => scope.contains(owner),
        _ => false,
    }
}

pub struct VisibilityFilter<'a, S: ?Sized> {
    table: &'a StageTable,
    store: &'a S,
}

impl<'a, S> VisibilityFilter<'a, S>
where
    S: WorkflowStore + ?Sized,
{
    pub fn new(table: &'a StageTable, store: &'a S) -> Self {
        Self { table, store }
    }

    /// Entities waiting on `role`, across every workflow type, oldest
    /// submission first. Always read from the store.
    pub async fn pending_for(
        &self,
        role: &str,
        scope: Option<&Scope>,
    ) -> Result<Vec<WorkflowedEntity>, StoreError> {
        let mut pending = Vec::new();

        for definition in self.table.definitions() {
            for (_, stage) in definition.stages_for_role(role) {
                let units = if stage.scoped {
                    match scope {
                        Some(scope) if !scope.is_empty() => Some(&scope.units),
                        _ => continue,
                    }
                } else {
                    None
                };

                let entities = self
                    .store
                    .list_in_status(&definition.workflow_type, &stage.pending_status, units)
                    .await?;
                pending.extend(entities);
            }
        }

        pending.sort_by(|left, right| {
            left.submitted_at.cmp(&right.submitted_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(pending)
    }
}
