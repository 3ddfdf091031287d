use thiserror::Error;

use crate::{domain::offer::InventoryKind, flows::FlowTransitionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no {0} matched the request")]
    EmptyInventory(InventoryKind),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
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
            Self::NotFound { .. } => "No trip options matched the request.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::EmptyInventory(kind) => {
                Self::NotFound { message: format!("no {kind} available"), correlation_id: unassigned() }
            }
            ApplicationError::Transport(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
