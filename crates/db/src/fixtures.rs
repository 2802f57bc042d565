use std::sync::Arc;

use thiserror::Error;

use onay_core::audit::NoopAuditSink;
use onay_core::domain::actor::{Actor, RequestContext, Scope};
use onay_core::domain::decision::DecisionKind;
use onay_core::domain::entity::{EntityId, NewEntity, WorkflowType};
use onay_core::errors::ApplicationError;
use onay_core::service::WorkflowService;
use onay_core::stages::StageTable;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlWorkflowStore};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("seed step for `{entity_id}` failed: {source}")]
    Workflow { entity_id: String, source: ApplicationError },
}

#[derive(Clone, Copy, Debug)]
enum SeedStep {
    Submit,
    Decide { role: &'static str, kind: DecisionKind, comments: Option<&'static str> },
}

struct SeedEntityContract {
    entity_id: &'static str,
    workflow_type: &'static str,
    owner_id: &'static str,
    owner_scope: &'static str,
    steps: &'static [SeedStep],
    expected_status: &'static str,
    expected_revision_count: u32,
    description: &'static str,
}

const SEED_ENTITIES: &[SeedEntityContract] = &[
    SeedEntityContract {
        entity_id: "BT-2026-0001",
        workflow_type: "budget_proposal",
        owner_id: "u-butce-1",
        owner_scope: "strateji-gelistirme",
        steps: &[SeedStep::Submit],
        expected_status: "vp_review",
        expected_revision_count: 0,
        description: "Budget proposal waiting on the vice president",
    },
    SeedEntityContract {
        entity_id: "BT-2026-0002",
        workflow_type: "budget_proposal",
        owner_id: "u-butce-2",
        owner_scope: "mali-hizmetler",
        steps: &[
            SeedStep::Submit,
            SeedStep::Decide { role: "vice_president", kind: DecisionKind::Approve, comments: None },
        ],
        expected_status: "finance_review",
        expected_revision_count: 0,
        description: "Budget proposal waiting on finance",
    },
    SeedEntityContract {
        entity_id: "FR-2026-0001",
        workflow_type: "activity_report",
        owner_id: "u-rapor-1",
        owner_scope: "insan-kaynaklari",
        steps: &[
            SeedStep::Submit,
            SeedStep::Decide {
                role: "unit_manager",
                kind: DecisionKind::Reject,
                comments: Some("performance indicators are missing"),
            },
            SeedStep::Submit,
        ],
        expected_status: "unit_review",
        expected_revision_count: 1,
        description: "Activity report resubmitted after a revision loop",
    },
    SeedEntityContract {
        entity_id: "SR-2026-0001",
        workflow_type: "bpm_process",
        owner_id: "u-surec-1",
        owner_scope: "bilgi-islem",
        steps: &[
            SeedStep::Submit,
            SeedStep::Decide { role: "process_owner", kind: DecisionKind::Approve, comments: None },
            SeedStep::Decide { role: "quality_unit", kind: DecisionKind::Approve, comments: None },
            SeedStep::Decide {
                role: "top_management",
                kind: DecisionKind::Approve,
                comments: None,
            },
        ],
        expected_status: "in_effect",
        expected_revision_count: 0,
        description: "Business process fully approved",
    },
    SeedEntityContract {
        entity_id: "IK-2026-0001",
        workflow_type: "internal_control_decision",
        owner_id: "u-kontrol-1",
        owner_scope: "ic-kontrol",
        steps: &[SeedStep::Submit],
        expected_status: "control_review",
        expected_revision_count: 0,
        description: "Internal control decision waiting on the control unit",
    },
];

/// Demo workflow data for local runs and smoke tests.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Drive every seed entity through the workflow service. Entities that
    /// already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, SeedError> {
        let stages = StageTable::builtin().map_err(|error| SeedError::Workflow {
            entity_id: "*".to_string(),
            source: error.into(),
        })?;
        let service =
            WorkflowService::new(SqlWorkflowStore::new(pool.clone()), NoopAuditSink, Arc::new(stages));

        let mut seeded = Vec::new();
        let mut skipped = Vec::new();

        for contract in SEED_ENTITIES {
            if entity_exists(pool, contract.entity_id).await? {
                skipped.push(contract.entity_id);
                continue;
            }

            Self::run_contract(&service, contract).await.map_err(|source| SeedError::Workflow {
                entity_id: contract.entity_id.to_string(),
                source,
            })?;
            seeded.push(EntitySeedInfo {
                entity_id: contract.entity_id,
                workflow_type: contract.workflow_type,
                status: contract.expected_status,
                description: contract.description,
            });
        }

        Ok(SeedResult { entities_seeded: seeded, entities_skipped: skipped })
    }

    async fn run_contract(
        service: &WorkflowService<SqlWorkflowStore, NoopAuditSink>,
        contract: &SeedEntityContract,
    ) -> Result<(), ApplicationError> {
        let owner = RequestContext::new(
            Actor::new(contract.owner_id, "staff"),
            format!("seed-{}", contract.entity_id),
        );
        let entity_id = EntityId(contract.entity_id.to_string());

        service
            .register(
                &owner,
                NewEntity {
                    id: entity_id.clone(),
                    workflow_type: WorkflowType(contract.workflow_type.to_string()),
                    owner_id: contract.owner_id.to_string(),
                    owner_scope: Some(contract.owner_scope.to_string()),
                },
            )
            .await?;

        for step in contract.steps {
            match *step {
                SeedStep::Submit => {
                    service.submit(&owner, &entity_id).await?;
                }
                SeedStep::Decide { role, kind, comments } => {
                    let approver = RequestContext::new(
                        Actor::new(format!("seed-{role}"), role)
                            .with_scope(Scope::new([contract.owner_scope])),
                        format!("seed-{}-{role}", contract.entity_id),
                    );
                    service.decide(&approver, &entity_id, kind, comments).await?;
                }
            }
        }

        Ok(())
    }

    /// Verify that seed entities exist in their expected status with one
    /// history row per seeded step.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for contract in SEED_ENTITIES {
            let status_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM workflow_entity WHERE id = ?1 AND status = ?2 AND revision_count = ?3)",
            )
            .bind(contract.entity_id)
            .bind(contract.expected_status)
            .bind(i64::from(contract.expected_revision_count))
            .fetch_one(pool)
            .await?;
            checks.push((format!("{}:status", contract.entity_id), status_ok == 1));

            let history_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM workflow_history WHERE entity_id = ?1")
                    .bind(contract.entity_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((
                format!("{}:history", contract.entity_id),
                history_count == contract.steps.len() as i64,
            ));

            let expected_decisions = contract
                .steps
                .iter()
                .filter(|step| matches!(step, SeedStep::Decide { .. }))
                .count() as i64;
            let decision_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM workflow_decision WHERE entity_id = ?1")
                    .bind(contract.entity_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((
                format!("{}:decisions", contract.entity_id),
                decision_count == expected_decisions,
            ));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub fn entity_ids() -> Vec<&'static str> {
        SEED_ENTITIES.iter().map(|contract| contract.entity_id).collect()
    }
}

async fn entity_exists(pool: &DbPool, entity_id: &str) -> Result<bool, RepositoryError> {
    let exists: i64 =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workflow_entity WHERE id = ?1)")
            .bind(entity_id)
            .fetch_one(pool)
            .await?;
    Ok(exists == 1)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub entities_seeded: Vec<EntitySeedInfo>,
    pub entities_skipped: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitySeedInfo {
    pub entity_id: &'static str,
    pub workflow_type: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
