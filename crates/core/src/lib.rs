pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod recorder;
pub mod service;
pub mod stages;
pub mod store;
pub mod transition;
pub mod visibility;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::actor::{Actor, RequestContext, Scope};
pub use domain::decision::{Decision, DecisionId, DecisionKind};
pub use domain::entity::{EntityId, NewEntity, WorkflowType, WorkflowedEntity};
pub use domain::history::{ChangeType, HistoryEntry, HistoryEntryId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use service::{DecisionOutcome, WorkflowService};
pub use stages::{RejectRoute, Stage, StageConfigError, StageDefinition, StageTable};
pub use store::{InMemoryWorkflowStore, StatusCommit, StoreError, WorkflowStore};
pub use transition::{next_status, submit_status, Transition};
pub use visibility::{scope_permits, VisibilityFilter};
