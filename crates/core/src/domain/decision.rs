use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::EntityId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Reject,
    Revise,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Revise => "revise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "revise" => Some(Self::Revise),
            _ => None,
        }
    }

    pub fn requires_comments(&self) -> bool {
        !matches!(self, Self::Approve)
    }
}

/// One `decide` call that changed an entity's status. Never updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub entity_id: EntityId,
    pub stage_index: u32,
    pub stage_role: String,
    pub kind: DecisionKind,
    pub actor_id: String,
    pub actor_role: String,
    pub comments: Option<String>,
    pub from_status: String,
    pub to_status: String,
    /// Entity version produced by this decision.
    pub sequence: u32,
    pub decided_at: DateTime<Utc>,
}
