use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::decision::{DecisionId, DecisionKind};
use crate::domain::entity::EntityId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Submitted,
    Approved,
    Rejected,
    RevisionRequested,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RevisionRequested => "revision_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "revision_requested" => Some(Self::RevisionRequested),
            _ => None,
        }
    }
}

impl From<DecisionKind> for ChangeType {
    fn from(kind: DecisionKind) -> Self {
        match kind {
            DecisionKind::Approve => Self::Approved,
            DecisionKind::Reject => Self::Rejected,
            DecisionKind::Revise => Self::RevisionRequested,
        }
    }
}

/// Audit row written in the same transaction as every status mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub entity_id: EntityId,
    pub sequence: u32,
    pub from_status: String,
    pub to_status: String,
    pub change_type: ChangeType,
    pub actor_id: String,
    pub decision_id: Option<DecisionId>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ChangeType;
    use crate::domain::decision::DecisionKind;

    #[test]
    fn change_type_round_trips_from_storage_encoding() {
        let cases = [
            ChangeType::Submitted,
            ChangeType::Approved,
            ChangeType::Rejected,
            ChangeType::RevisionRequested,
        ];

        for change in cases {
            assert_eq!(ChangeType::parse(change.as_str()), Some(change));
        }
    }

    #[test]
    fn decisions_map_onto_history_change_types() {
        assert_eq!(ChangeType::from(DecisionKind::Approve), ChangeType::Approved);
        assert_eq!(ChangeType::from(DecisionKind::Reject), ChangeType::Rejected);
        assert_eq!(ChangeType::from(DecisionKind::Revise), ChangeType::RevisionRequested);
    }
}
