use crate::domain::entity::WorkflowType;
use crate::stages::{RejectRoute, Stage, StageDefinition};

/// Approval chains shipped with the portal. Deployments may replace them with
/// a TOML file via `workflow.definitions_path`.
pub fn builtin_definitions() -> Vec<StageDefinition> {
    vec![budget_proposal(), activity_report(), bpm_process(), internal_control_decision()]
}

fn budget_proposal() -> StageDefinition {
    StageDefinition {
        workflow_type: WorkflowType("budget_proposal".to_string()),
        draft_status: "draft".to_string(),
        returned_status: None,
        approved_status: "approved".to_string(),
        stages: vec![
            terminating("vice_president", "vp_review", "vp_rejected", true),
            terminating("finance", "finance_review", "finance_revision_requested", false),
            terminating("president", "president_review", "president_rejected", false),
        ],
    }
}

fn activity_report() -> StageDefinition {
    StageDefinition {
        workflow_type: WorkflowType("activity_report".to_string()),
        draft_status: "draft".to_string(),
        returned_status: None,
        approved_status: "published".to_string(),
        stages: vec![
            looping("unit_manager", "unit_review", true),
            looping("strategy_office", "strategy_review", false),
        ],
    }
}

fn bpm_process() -> StageDefinition {
    StageDefinition {
        workflow_type: WorkflowType("bpm_process".to_string()),
        draft_status: "draft".to_string(),
        returned_status: Some("returned".to_string()),
        approved_status: "in_effect".to_string(),
        stages: vec![
            terminating("process_owner", "owner_review", "owner_rejected", true),
            terminating("quality_unit", "quality_review", "quality_rejected", false),
            terminating("top_management", "management_review", "management_rejected", false),
        ],
    }
}

fn internal_control_decision() -> StageDefinition {
    StageDefinition {
        workflow_type: WorkflowType("internal_control_decision".to_string()),
        draft_status: "draft".to_string(),
        returned_status: None,
        approved_status: "ratified".to_string(),
        stages: vec![
            looping("internal_control_unit", "control_review", false),
            looping("board", "board_review", false),
        ],
    }
}

fn terminating(role: &str, pending: &str, rejected: &str, scoped: bool) -> Stage {
    Stage {
        role: role.to_string(),
        pending_status: pending.to_string(),
        rejected_status: Some(rejected.to_string()),
        on_reject: RejectRoute::Terminate,
        scoped,
    }
}

fn looping(role: &str, pending: &str, scoped: bool) -> Stage {
    Stage {
        role: role.to_string(),
        pending_status: pending.to_string(),
        rejected_status: None,
        on_reject: RejectRoute::RevisionLoop,
        scoped,
    }
}
