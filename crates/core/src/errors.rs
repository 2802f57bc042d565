use thiserror::Error;

use crate::domain::entity::EntityId;
use crate::stages::StageConfigError;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("entity in status `{status}` cannot be {action}")]
    InvalidState { status: String, action: String },
    #[error("role `{role}` may not act here: {reason}")]
    Forbidden { role: String, reason: String },
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn invalid_state(status: impl Into<String>, action: impl Into<String>) -> Self {
        Self::InvalidState { status: status.into(), action: action.into() }
    }

    pub fn forbidden(role: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Forbidden { role: role.into(), reason: reason.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("entity `{0}` was not found")]
    NotFound(EntityId),
    #[error("entity `{0}` is already registered")]
    AlreadyExists(EntityId),
    #[error("entity `{entity_id}` kept changing underneath the decision after {attempts} attempt(s)")]
    Conflict { entity_id: EntityId, attempts: u32 },
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Conflicts are the only failure a caller should blindly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::InvalidState { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict { entity_id, .. } => Self::Conflict { entity_id, attempts: 1 },
            StoreError::NotFound(entity_id) => Self::NotFound(entity_id),
            StoreError::Duplicate(entity_id) => Self::AlreadyExists(entity_id),
            StoreError::Backend(message) => Self::Storage(message),
        }
    }
}

impl From<StageConfigError> for ApplicationError {
    fn from(value: StageConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("invalid state: {message}")]
    InvalidState { message: String, correlation_id: String },
    /// `retryable` is set only when repeating the whole request can succeed.
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String, retryable: bool },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Client-side failures echo their specific cause; server-side failures
    /// never leak internals.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::InvalidState { message, .. }
            | Self::Conflict { message, .. } => message,
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::InvalidState { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { retryable: true, .. })
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error @ DomainError::Forbidden { .. }) => {
                Self::Forbidden { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(error @ DomainError::InvalidState { .. }) => {
                Self::InvalidState { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(DomainError::Validation(message)) => {
                Self::BadRequest { message, correlation_id }
            }
            error @ ApplicationError::NotFound(_) => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::AlreadyExists(_) => {
                Self::Conflict { message: error.to_string(), correlation_id, retryable: false }
            }
            error @ ApplicationError::Conflict { .. } => {
                Self::Conflict { message: error.to_string(), correlation_id, retryable: true }
            }
            ApplicationError::Storage(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::entity::EntityId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::store::StoreError;

    #[test]
    fn validation_error_maps_to_bad_request_with_specific_message() {
        let interface = ApplicationError::from(DomainError::Validation(
            "comments are required to reject".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(interface.user_message(), "comments are required to reject");
    }

    #[test]
    fn forbidden_role_maps_to_forbidden() {
        let interface = ApplicationError::from(DomainError::forbidden(
            "president",
            "stage `finance_review` belongs to `finance`",
        ))
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert!(interface.user_message().contains("finance"));
    }

    #[test]
    fn invalid_state_is_final_while_exhausted_conflict_is_retryable() {
        let invalid = ApplicationError::from(DomainError::invalid_state("approved", "decided"))
            .into_interface("req-3");
        assert_eq!(invalid.kind(), "invalid_state");
        assert!(!invalid.is_retryable());

        let conflict = ApplicationError::Conflict {
            entity_id: EntityId("BT-1".to_owned()),
            attempts: 3,
        };
        assert!(conflict.is_retryable());
        let conflict = conflict.into_interface("req-4");
        assert_eq!(conflict.kind(), "conflict");
        assert!(conflict.is_retryable());

        let duplicate =
            ApplicationError::AlreadyExists(EntityId("BT-1".to_owned())).into_interface("req-4");
        assert_eq!(duplicate.kind(), "conflict");
        assert!(!duplicate.is_retryable());
    }

    #[test]
    fn store_errors_keep_their_meaning() {
        let id = EntityId("BT-9".to_owned());

        assert_eq!(
            ApplicationError::from(StoreError::NotFound(id.clone())),
            ApplicationError::NotFound(id.clone())
        );
        assert_eq!(
            ApplicationError::from(StoreError::Duplicate(id.clone())),
            ApplicationError::AlreadyExists(id.clone())
        );
        assert!(matches!(
            ApplicationError::from(StoreError::Conflict { entity_id: id, expected: 2, actual: 3 }),
            ApplicationError::Conflict { attempts: 1, .. }
        ));
    }

    #[test]
    fn storage_error_maps_to_service_unavailable_without_leaking_details() {
        let interface =
            ApplicationError::Storage("database lock timeout".to_owned()).into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
        assert_eq!(interface.correlation_id(), "req-5");
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("unknown workflow type".to_owned())
            .into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
