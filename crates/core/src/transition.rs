//! Pure transition evaluation over a [`StageDefinition`].
//!
//! Nothing here touches storage: callers feed the current status and get back
//! either the transition to commit or the domain error to surface.

use crate::domain::decision::DecisionKind;
use crate::domain::history::ChangeType;
use crate::errors::DomainError;
use crate::stages::{RejectRoute, Stage, StageDefinition};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: String,
    pub to: String,
    /// Zero-based stage that decided; `None` for submission.
    pub stage_index: Option<usize>,
    pub stage_role: Option<String>,
    pub kind: Option<DecisionKind>,
    pub change_type: ChangeType,
    pub increments_revision: bool,
    pub terminal: bool,
}

/// Evaluate one approver decision.
///
/// Check order: comments, then the status must be a stage's pending status,
/// then the acting role must own that stage.
pub fn next_status(
    definition: &StageDefinition,
    current_status: &str,
    acting_role: &str,
    kind: DecisionKind,
    comments: Option<&str>,
) -> Result<Transition, DomainError> {
    if kind.requires_comments() && !has_text(comments) {
        return Err(DomainError::Validation(format!(
            "comments are required to {}",
            kind.as_str()
        )));
    }

    let (index, stage) = definition
        .pending_stage(current_status)
        .ok_or_else(|| DomainError::invalid_state(current_status, "decided"))?;

    if !stage.is_owned_by(acting_role) {
        return Err(DomainError::forbidden(
            acting_role,
            format!("stage `{}` belongs to `{}`", stage.pending_status, stage.role),
        ));
    }

    let (to, increments_revision) = match kind {
        DecisionKind::Approve => (definition.approved_status_of(index).to_owned(), false),
        DecisionKind::Reject => reject_target(definition, stage)?,
        DecisionKind::Revise => (definition.return_status().to_owned(), true),
    };

    Ok(Transition {
        from: current_status.to_owned(),
        terminal: definition.is_terminal(&to),
        to,
        stage_index: Some(index),
        stage_role: Some(stage.role.clone()),
        kind: Some(kind),
        change_type: ChangeType::from(kind),
        increments_revision,
    })
}

/// Evaluate an owner submitting a draft (or returned) entity into stage 1.
pub fn submit_status(
    definition: &StageDefinition,
    current_status: &str,
) -> Result<Transition, DomainError> {
    if !definition.accepts_submission(current_status) {
        return Err(DomainError::invalid_state(current_status, "submitted"));
    }

    let first = definition.first_stage().ok_or_else(|| {
        DomainError::Validation(format!(
            "workflow type `{}` has no stages",
            definition.workflow_type
        ))
    })?;

    Ok(Transition {
        from: current_status.to_owned(),
        to: first.pending_status.clone(),
        stage_index: None,
        stage_role: None,
        kind: None,
        change_type: ChangeType::Submitted,
        increments_revision: false,
        terminal: false,
    })
}

fn reject_target(
    definition: &StageDefinition,
    stage: &Stage,
) -> Result<(String, bool), DomainError> {
    match stage.on_reject {
        RejectRoute::RevisionLoop => Ok((definition.draft_status.clone(), true)),
        RejectRoute::Terminate => stage
            .rejected_status
            .clone()
            .map(|status| (status, false))
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "stage `{}` has no rejected status configured",
                    stage.pending_status
                ))
            }),
    }
}

fn has_text(comments: Option<&str>) -> bool {
    comments.is_some_and(|text| !text.trim().is_empty())
}
