use thiserror::Error;

use crate::domain::expense::ExpenseStatus;
use crate::domain::rule::RuleSetError;

/// Failures raised by the workflow engine itself. Every failure path carries
/// a typed reason; nothing is swallowed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("validation failed for: {}", fields.join(", "))]
    Validation { fields: Vec<String> },
    #[error("workflow configuration error: {0}")]
    Configuration(String),
    #[error("`{actual}` is not the current approver (expected `{expected}`)")]
    NotCurrentApprover { expected: String, actual: String },
    #[error("expense is already terminal with status {status:?}")]
    Terminal { status: ExpenseStatus },
    #[error("workflow invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<RuleSetError> for WorkflowError {
    fn from(value: RuleSetError) -> Self {
        Self::Configuration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// What the transport layer hands to a client: a coarse class, an internal
/// message, and a correlation id for support. The user-facing text never
/// leaks internals.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("misconfigured workflow: {message}")]
    Misconfigured { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not the approver this expense is waiting on.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The expense changed while you were acting on it. Reload and try again."
            }
            Self::Misconfigured { .. } => {
                "The approval workflow is not configured correctly. Contact your administrator."
            }
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
            | Self::Conflict { correlation_id, .. }
            | Self::Misconfigured { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Misconfigured { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Workflow(WorkflowError::Validation { fields }) => Self::BadRequest {
                message: format!("validation failed for: {}", fields.join(", ")),
                correlation_id: unassigned,
            },
            ApplicationError::Workflow(WorkflowError::Configuration(message))
            | ApplicationError::Configuration(message) => {
                Self::Misconfigured { message, correlation_id: unassigned }
            }
            ApplicationError::Workflow(WorkflowError::NotCurrentApprover { expected, actual }) => {
                Self::Forbidden {
                    message: format!("`{actual}` is not the current approver (expected `{expected}`)"),
                    correlation_id: unassigned,
                }
            }
            ApplicationError::Workflow(WorkflowError::Terminal { status }) => Self::Conflict {
                message: format!("expense is already terminal with status {status:?}"),
                correlation_id: unassigned,
            },
            ApplicationError::Workflow(WorkflowError::InvariantViolation(message)) => {
                Self::Internal { message, correlation_id: unassigned }
            }
            ApplicationError::NotFound { entity, id } => Self::NotFound {
                message: format!("{entity} `{id}` was not found"),
                correlation_id: unassigned,
            },
            ApplicationError::Conflict(message) => {
                Self::Conflict { message, correlation_id: unassigned }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
        }
    }
}
