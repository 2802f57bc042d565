//! Stage definition table.
//!
//! Each workflow type is an ordered chain of approving roles. A stage owns a
//! pending status and, for terminating rejections, a rejected status. Approval
//! at stage `k` lands on stage `k + 1`'s pending status; approval at the last
//! stage lands on the definition's terminal approved status.

mod catalog;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::entity::WorkflowType;

pub use catalog::builtin_definitions;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectRoute {
    /// Rejection ends the workflow in the stage's rejected status.
    #[default]
    Terminate,
    /// Rejection hands the entity back to its owner in `draft_status`, even
    /// when the workflow declares a separate `returned_status` for `revise`.
    RevisionLoop,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub role: String,
    pub pending_status: String,
    #[serde(default)]
    pub rejected_status: Option<String>,
    #[serde(default)]
    pub on_reject: RejectRoute,
    /// Department-bound role: only entities inside the approver's scope.
    #[serde(default)]
    pub scoped: bool,
}

impl Stage {
    pub fn is_owned_by(&self, role: &str) -> bool {
        normalize_key(&self.role) == normalize_key(role)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    #[serde(default = "default_draft_status")]
    pub draft_status: String,
    /// Status `revise` returns to. Falls back to `draft_status`.
    #[serde(default)]
    pub returned_status: Option<String>,
    #[serde(default = "default_approved_status")]
    pub approved_status: String,
    #[serde(rename = "stage", default)]
    pub stages: Vec<Stage>,
}

fn default_draft_status() -> String {
    "draft".to_string()
}

fn default_approved_status() -> String {
    "approved".to_string()
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StageConfigError {
    #[error("no stages registered for workflow type `{0}`")]
    UnknownWorkflowType(String),
    #[error("workflow type `{0}` is registered more than once")]
    DuplicateWorkflowType(String),
    #[error("workflow type `{workflow_type}` declares no stages")]
    EmptyStageList { workflow_type: String },
    #[error("workflow type `{workflow_type}` declares status `{status}` more than once")]
    DuplicateStatus { workflow_type: String, status: String },
    #[error("workflow type `{workflow_type}`, stage {stage}: {reason}")]
    MalformedStage { workflow_type: String, stage: usize, reason: String },
    #[error("malformed workflow definition: {0}")]
    Malformed(String),
    #[error("could not read stage definitions `{path}`: {message}")]
    ReadFile { path: PathBuf, message: String },
    #[error("could not parse stage definitions: {0}")]
    Parse(String),
}

impl StageDefinition {
    pub fn validate(&self) -> Result<(), StageConfigError> {
        let workflow_type = self.workflow_type.as_str();
        if workflow_type.trim().is_empty() {
            return Err(StageConfigError::Malformed("workflow type must not be empty".to_string()));
        }
        if self.stages.is_empty() {
            return Err(StageConfigError::EmptyStageList {
                workflow_type: workflow_type.to_string(),
            });
        }

        for (index, stage) in self.stages.iter().enumerate() {
            let malformed = |reason: &str| StageConfigError::MalformedStage {
                workflow_type: workflow_type.to_string(),
                stage: index + 1,
                reason: reason.to_string(),
            };

            if stage.role.trim().is_empty() {
                return Err(malformed("role must not be empty"));
            }
            if stage.pending_status.trim().is_empty() {
                return Err(malformed("pending_status must not be empty"));
            }
            match (&stage.on_reject, &stage.rejected_status) {
                (RejectRoute::Terminate, None) => {
                    return Err(malformed("rejected_status is required when on_reject = terminate"));
                }
                (_, Some(status)) if status.trim().is_empty() => {
                    return Err(malformed("rejected_status must not be empty"));
                }
                _ => {}
            }
        }

        let mut seen = HashSet::new();
        for status in self.declared_statuses() {
            if status.trim().is_empty() {
                return Err(StageConfigError::Malformed(format!(
                    "workflow type `{workflow_type}` declares an empty status"
                )));
            }
            if !seen.insert(status) {
                return Err(StageConfigError::DuplicateStatus {
                    workflow_type: workflow_type.to_string(),
                    status: status.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Every status an entity of this type may hold, in chain order.
    pub fn declared_statuses(&self) -> Vec<&str> {
        let mut statuses = vec![self.draft_status.as_str()];
        if let Some(returned) = &self.returned_status {
            statuses.push(returned.as_str());
        }
        for stage in &self.stages {
            statuses.push(stage.pending_status.as_str());
            if let Some(rejected) = &stage.rejected_status {
                statuses.push(rejected.as_str());
            }
        }
        statuses.push(self.approved_status.as_str());
        statuses
    }

    pub fn is_declared(&self, status: &str) -> bool {
        self.declared_statuses().contains(&status)
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub fn first_stage(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn pending_stage(&self, status: &str) -> Option<(usize, &Stage)> {
        self.stages.iter().enumerate().find(|(_, stage)| stage.pending_status == status)
    }

    pub fn stages_for_role<'a>(
        &'a self,
        role: &'a str,
    ) -> impl Iterator<Item = (usize, &'a Stage)> + 'a {
        self.stages.iter().enumerate().filter(move |(_, stage)| stage.is_owned_by(role))
    }

    pub fn return_status(&self) -> &str {
        self.returned_status.as_deref().unwrap_or(&self.draft_status)
    }

    /// Status reached when the stage at `index` approves.
    pub fn approved_status_of(&self, index: usize) -> &str {
        match self.stages.get(index + 1) {
            Some(next) => &next.pending_status,
            None => &self.approved_status,
        }
    }

    pub fn accepts_submission(&self, status: &str) -> bool {
        status == self.draft_status || status == self.return_status()
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        if status == self.approved_status {
            return true;
        }
        self.stages.iter().any(|stage| {
            stage.on_reject == RejectRoute::Terminate
                && stage.rejected_status.as_deref() == Some(status)
        })
    }
}

/// Immutable map of workflow type to stage chain, built once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageTable {
    definitions: BTreeMap<WorkflowType, StageDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct StageFile {
    #[serde(default)]
    workflow: Vec<StageDefinition>,
}

impl StageTable {
    pub fn from_definitions(definitions: Vec<StageDefinition>) -> Result<Self, StageConfigError> {
        let mut table = BTreeMap::new();
        for definition in definitions {
            definition.validate()?;
            let key = definition.workflow_type.clone();
            if table.contains_key(&key) {
                return Err(StageConfigError::DuplicateWorkflowType(key.0));
            }
            table.insert(key, definition);
        }

        if table.is_empty() {
            return Err(StageConfigError::Malformed(
                "at least one workflow type must be defined".to_string(),
            ));
        }

        Ok(Self { definitions: table })
    }

    pub fn builtin() -> Result<Self, StageConfigError> {
        Self::from_definitions(builtin_definitions())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, StageConfigError> {
        let file = toml::from_str::<StageFile>(raw)
            .map_err(|error| StageConfigError::Parse(error.to_string()))?;
        Self::from_definitions(file.workflow)
    }

    pub fn load(path: &Path) -> Result<Self, StageConfigError> {
        let raw = fs::read_to_string(path).map_err(|error| StageConfigError::ReadFile {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn stages_for(
        &self,
        workflow_type: &WorkflowType,
    ) -> Result<&StageDefinition, StageConfigError> {
        self.definitions
            .get(workflow_type)
            .ok_or_else(|| StageConfigError::UnknownWorkflowType(workflow_type.0.clone()))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &StageDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{RejectRoute, Stage, StageConfigError, StageDefinition, StageTable};
    use crate::domain::entity::WorkflowType;

    fn stage(role: &str, pending: &str, rejected: &str) -> Stage {
        Stage {
            role: role.to_owned(),
            pending_status: pending.to_owned(),
            rejected_status: Some(rejected.to_owned()),
            on_reject: RejectRoute::Terminate,
            scoped: false,
        }
    }

    fn budget_definition() -> StageDefinition {
        StageDefinition {
            workflow_type: WorkflowType("budget_proposal".to_owned()),
            draft_status: "draft".to_owned(),
            returned_status: None,
            approved_status: "approved".to_owned(),
            stages: vec![
                stage("vice_president", "vp_review", "vp_rejected"),
                stage("finance", "finance_review", "finance_revision_requested"),
                stage("president", "president_review", "president_rejected"),
            ],
        }
    }

    #[test]
    fn builtin_catalogue_is_valid() {
        let table = StageTable::builtin().expect("builtin catalogue should validate");

        assert_eq!(table.len(), 4);
        for workflow_type in
            ["budget_proposal", "activity_report", "bpm_process", "internal_control_decision"]
        {
            table
                .stages_for(&WorkflowType(workflow_type.to_owned()))
                .expect("builtin workflow type should be registered");
        }
    }

    #[test]
    fn unknown_workflow_type_is_a_config_error() {
        let table = StageTable::from_definitions(vec![budget_definition()]).expect("table");

        let error = table
            .stages_for(&WorkflowType("strategic_plan".to_owned()))
            .expect_err("unregistered type must fail");

        assert_eq!(error, StageConfigError::UnknownWorkflowType("strategic_plan".to_owned()));
    }

    #[test]
    fn duplicate_statuses_are_rejected() {
        let mut definition = budget_definition();
        definition.stages[1].pending_status = "vp_review".to_owned();

        let error = StageTable::from_definitions(vec![definition]).expect_err("ambiguous");

        assert!(matches!(
            error,
            StageConfigError::DuplicateStatus { ref status, .. } if status == "vp_review"
        ));
    }

    #[test]
    fn rejected_status_may_not_collide_with_draft() {
        let mut definition = budget_definition();
        definition.stages[2].rejected_status = Some("draft".to_owned());

        let error = definition.validate().expect_err("draft collision");
        assert!(matches!(error, StageConfigError::DuplicateStatus { .. }));
    }

    #[test]
    fn terminating_stage_requires_rejected_status() {
        let mut definition = budget_definition();
        definition.stages[0].rejected_status = None;

        let error = definition.validate().expect_err("missing rejected status");
        assert!(matches!(error, StageConfigError::MalformedStage { stage: 1, .. }));
    }

    #[test]
    fn empty_stage_list_is_rejected() {
        let mut definition = budget_definition();
        definition.stages.clear();

        assert!(matches!(
            definition.validate(),
            Err(StageConfigError::EmptyStageList { .. })
        ));
    }

    #[test]
    fn duplicate_workflow_types_are_rejected() {
        let error = StageTable::from_definitions(vec![budget_definition(), budget_definition()])
            .expect_err("duplicate type");

        assert_eq!(error, StageConfigError::DuplicateWorkflowType("budget_proposal".to_owned()));
    }

    #[test]
    fn approval_targets_follow_chain_order() {
        let definition = budget_definition();

        assert_eq!(definition.approved_status_of(0), "finance_review");
        assert_eq!(definition.approved_status_of(1), "president_review");
        assert_eq!(definition.approved_status_of(2), "approved");
        assert!(definition.is_terminal("approved"));
        assert!(definition.is_terminal("finance_revision_requested"));
        assert!(!definition.is_terminal("finance_review"));
        assert!(!definition.is_terminal("draft"));
    }

    #[test]
    fn revision_loop_rejections_are_not_terminal() {
        let mut definition = budget_definition();
        definition.stages[1].on_reject = RejectRoute::RevisionLoop;

        assert!(!definition.is_terminal("finance_revision_requested"));
    }

    #[test]
    fn role_lookup_is_case_insensitive() {
        let definition = budget_definition();

        let stages: Vec<usize> =
            definition.stages_for_role(" Finance ").map(|(index, _)| index).collect();
        assert_eq!(stages, vec![1]);
    }

    #[test]
    fn toml_definitions_load_with_defaults() {
        let table = StageTable::from_toml_str(
            r#"
[[workflow]]
type = "activity_report"
returned_status = "returned"

[[workflow.stage]]
role = "unit_manager"
pending_status = "unit_review"
on_reject = "revision_loop"
scoped = true

[[workflow.stage]]
role = "strategy_office"
pending_status = "strategy_review"
rejected_status = "strategy_rejected"
"#,
        )
        .expect("toml table");

        let definition =
            table.stages_for(&WorkflowType("activity_report".to_owned())).expect("registered");
        assert_eq!(definition.draft_status, "draft");
        assert_eq!(definition.approved_status, "approved");
        assert_eq!(definition.return_status(), "returned");
        assert!(definition.accepts_submission("returned"));
        assert!(definition.stages[0].scoped);
        assert_eq!(definition.stages[0].on_reject, RejectRoute::RevisionLoop);
        assert_eq!(definition.stages[1].on_reject, RejectRoute::Terminate);
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let error = StageTable::from_toml_str("[[workflow]]\ntype = 42").expect_err("bad toml");
        assert!(matches!(error, StageConfigError::Parse(_)));
    }

    #[test]
    fn empty_file_is_rejected() {
        let error = StageTable::from_toml_str("").expect_err("no workflows");
        assert!(matches!(error, StageConfigError::Malformed(_)));
    }
}
