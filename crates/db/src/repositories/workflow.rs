use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use onay_core::domain::decision::{Decision, DecisionId, DecisionKind};
use onay_core::domain::entity::{EntityId, WorkflowType, WorkflowedEntity};
use onay_core::domain::history::{ChangeType, HistoryEntry, HistoryEntryId};
use onay_core::store::{StatusCommit, StoreError, WorkflowStore};

use super::RepositoryError;
use crate::DbPool;

const ENTITY_COLUMNS: &str = "id,
    workflow_type,
    owner_id,
    owner_scope,
    status,
    revision_count,
    version,
    created_at,
    submitted_at,
    updated_at";

pub struct SqlWorkflowStore {
    pool: DbPool,
}

enum CommitOutcome {
    Applied(WorkflowedEntity),
    Stale { actual: u32 },
    Missing,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn insert_entity(&self, entity: &WorkflowedEntity) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_entity (
                id,
                workflow_type,
                owner_id,
                owner_scope,
                status,
                revision_count,
                version,
                created_at,
                submitted_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entity.id.0)
        .bind(entity.workflow_type.as_str())
        .bind(&entity.owner_id)
        .bind(entity.owner_scope.as_deref())
        .bind(&entity.status)
        .bind(i64::from(entity.revision_count))
        .bind(i64::from(entity.version))
        .bind(encode_timestamp(&entity.created_at))
        .bind(entity.submitted_at.as_ref().map(encode_timestamp))
        .bind(encode_timestamp(&entity.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_entity(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<WorkflowedEntity>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ENTITY_COLUMNS} FROM workflow_entity WHERE id = ?"))
            .bind(&entity_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(entity_from_row).transpose()
    }

    async fn entity_exists(&self, entity_id: &EntityId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 AS present FROM workflow_entity WHERE id = ?")
            .bind(&entity_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn apply_commit(&self, commit: &StatusCommit) -> Result<CommitOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE workflow_entity
             SET status = ?,
                 revision_count = ?,
                 version = ?,
                 submitted_at = ?,
                 updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&commit.new_status)
        .bind(i64::from(commit.revision_count))
        .bind(i64::from(commit.next_version()))
        .bind(commit.submitted_at.as_ref().map(encode_timestamp))
        .bind(encode_timestamp(&commit.updated_at))
        .bind(&commit.entity_id.0)
        .bind(i64::from(commit.expected_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current = sqlx::query("SELECT version FROM workflow_entity WHERE id = ?")
                .bind(&commit.entity_id.0)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            return match current {
                Some(row) => Ok(CommitOutcome::Stale {
                    actual: parse_u32("version", row.try_get("version")?)?,
                }),
                None => Ok(CommitOutcome::Missing),
            };
        }

        if let Some(decision) = &commit.decision {
            insert_decision(&mut *tx, decision).await?;
        }
        insert_history(&mut *tx, &commit.history).await?;

        let row = sqlx::query(&format!("SELECT {ENTITY_COLUMNS} FROM workflow_entity WHERE id = ?"))
            .bind(&commit.entity_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let entity = entity_from_row(row)?;

        tx.commit().await?;
        Ok(CommitOutcome::Applied(entity))
    }

    async fn select_in_status(
        &self,
        workflow_type: &WorkflowType,
        status: &str,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Vec<WorkflowedEntity>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {ENTITY_COLUMNS} FROM workflow_entity WHERE workflow_type = "));
        builder.push_bind(workflow_type.as_str().to_owned());
        builder.push(" AND status = ");
        builder.push_bind(status.to_owned());

        if let Some(units) = scope {
            if units.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND owner_scope IN (");
            let mut separated = builder.separated(", ");
            for unit in units {
                separated.push_bind(unit.clone());
            }
            separated.push_unseparated(")");
        }

        builder.push(" ORDER BY submitted_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(entity_from_row).collect()
    }

    async fn select_history(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                entity_id,
                sequence,
                from_status,
                to_status,
                change_type,
                actor_id,
                decision_id,
                note,
                occurred_at
             FROM workflow_history
             WHERE entity_id = ?
             ORDER BY sequence DESC",
        )
        .bind(&entity_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }

    async fn select_decisions(&self, entity_id: &EntityId) -> Result<Vec<Decision>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                entity_id,
                stage_index,
                stage_role,
                decision,
                actor_id,
                actor_role,
                comments,
                from_status,
                to_status,
                sequence,
                decided_at
             FROM workflow_decision
             WHERE entity_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&entity_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decision_from_row).collect()
    }
}

#[async_trait::async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn create(&self, entity: &WorkflowedEntity) -> Result<(), StoreError> {
        match self.insert_entity(entity).await {
            Ok(()) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                Err(StoreError::Duplicate(entity.id.clone()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn load(&self, entity_id: &EntityId) -> Result<WorkflowedEntity, StoreError> {
        self.find_entity(entity_id).await?.ok_or_else(|| StoreError::NotFound(entity_id.clone()))
    }

    async fn commit(&self, commit: &StatusCommit) -> Result<WorkflowedEntity, StoreError> {
        match self.apply_commit(commit).await {
            Ok(CommitOutcome::Applied(entity)) => Ok(entity),
            Ok(CommitOutcome::Stale { actual }) => Err(StoreError::Conflict {
                entity_id: commit.entity_id.clone(),
                expected: commit.expected_version,
                actual,
            }),
            Ok(CommitOutcome::Missing) => Err(StoreError::NotFound(commit.entity_id.clone())),
            // UNIQUE(entity_id, sequence) caught a writer that slipped past the version check.
            Err(error) if is_unique_violation(&error) => Err(StoreError::Conflict {
                entity_id: commit.entity_id.clone(),
                expected: commit.expected_version,
                actual: commit.next_version(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    async fn list_in_status(
        &self,
        workflow_type: &WorkflowType,
        status: &str,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Vec<WorkflowedEntity>, StoreError> {
        Ok(self.select_in_status(workflow_type, status, scope).await?)
    }

    async fn history(&self, entity_id: &EntityId) -> Result<Vec<HistoryEntry>, StoreError> {
        let entries = self.select_history(entity_id).await?;
        if entries.is_empty() && !self.entity_exists(entity_id).await? {
            return Err(StoreError::NotFound(entity_id.clone()));
        }
        Ok(entries)
    }

    async fn decisions(&self, entity_id: &EntityId) -> Result<Vec<Decision>, StoreError> {
        let decisions = self.select_decisions(entity_id).await?;
        if decisions.is_empty() && !self.entity_exists(entity_id).await? {
            return Err(StoreError::NotFound(entity_id.clone()));
        }
        Ok(decisions)
    }
}

async fn insert_decision(
    conn: &mut SqliteConnection,
    decision: &Decision,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO workflow_decision (
            id,
            entity_id,
            stage_index,
            stage_role,
            decision,
            actor_id,
            actor_role,
            comments,
            from_status,
            to_status,
            sequence,
            decided_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&decision.id.0)
    .bind(&decision.entity_id.0)
    .bind(i64::from(decision.stage_index))
    .bind(&decision.stage_role)
    .bind(decision.kind.as_str())
    .bind(&decision.actor_id)
    .bind(&decision.actor_role)
    .bind(decision.comments.as_deref())
    .bind(&decision.from_status)
    .bind(&decision.to_status)
    .bind(i64::from(decision.sequence))
    .bind(encode_timestamp(&decision.decided_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_history(
    conn: &mut SqliteConnection,
    entry: &HistoryEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO workflow_history (
            id,
            entity_id,
            sequence,
            from_status,
            to_status,
            change_type,
            actor_id,
            decision_id,
            note,
            occurred_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.entity_id.0)
    .bind(i64::from(entry.sequence))
    .bind(&entry.from_status)
    .bind(&entry.to_status)
    .bind(entry.change_type.as_str())
    .bind(&entry.actor_id)
    .bind(entry.decision_id.as_ref().map(|id| id.0.as_str()))
    .bind(entry.note.as_deref())
    .bind(encode_timestamp(&entry.occurred_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn is_unique_violation(error: &RepositoryError) -> bool {
    match error {
        RepositoryError::Database(sqlx::Error::Database(database)) => {
            database.is_unique_violation()
        }
        _ => false,
    }
}

fn entity_from_row(row: SqliteRow) -> Result<WorkflowedEntity, RepositoryError> {
    Ok(WorkflowedEntity {
        id: EntityId(row.try_get("id")?),
        workflow_type: WorkflowType(row.try_get("workflow_type")?),
        owner_id: row.try_get("owner_id")?,
        owner_scope: row.try_get("owner_scope")?,
        status: row.try_get("status")?,
        revision_count: parse_u32("revision_count", row.try_get("revision_count")?)?,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        submitted_at: parse_optional_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn decision_from_row(row: SqliteRow) -> Result<Decision, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("decision")?;
    let kind = DecisionKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{kind_raw}`")))?;

    Ok(Decision {
        id: DecisionId(row.try_get("id")?),
        entity_id: EntityId(row.try_get("entity_id")?),
        stage_index: parse_u32("stage_index", row.try_get("stage_index")?)?,
        stage_role: row.try_get("stage_role")?,
        kind,
        actor_id: row.try_get("actor_id")?,
        actor_role: row.try_get("actor_role")?,
        comments: row.try_get("comments")?,
        from_status: row.try_get("from_status")?,
        to_status: row.try_get("to_status")?,
        sequence: parse_u32("sequence", row.try_get("sequence")?)?,
        decided_at: parse_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}

fn history_from_row(row: SqliteRow) -> Result<HistoryEntry, RepositoryError> {
    let change_raw = row.try_get::<String, _>("change_type")?;
    let change_type = ChangeType::parse(&change_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown change type `{change_raw}`")))?;

    Ok(HistoryEntry {
        id: HistoryEntryId(row.try_get("id")?),
        entity_id: EntityId(row.try_get("entity_id")?),
        sequence: parse_u32("sequence", row.try_get("sequence")?)?,
        from_status: row.try_get("from_status")?,
        to_status: row.try_get("to_status")?,
        change_type,
        actor_id: row.try_get("actor_id")?,
        decision_id: row.try_get::<Option<String>, _>("decision_id")?.map(DecisionId),
        note: row.try_get("note")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
