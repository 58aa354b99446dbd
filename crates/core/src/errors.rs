use thiserror::Error;

use crate::assignment::AssignmentError;
use crate::auth::AuthError;
use crate::flows::FlowTransitionError;
use crate::orders::{OrderValidationError, PaymentError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error(transparent)]
    OrderValidation(#[from] OrderValidationError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<AuthError> for ApplicationError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::WeakPassword => {
                Self::Domain(DomainError::InvariantViolation(value.to_string()))
            }
            AuthError::MalformedHash => Self::Persistence(value.to_string()),
            AuthError::MalformedToken | AuthError::InvalidSignature | AuthError::Expired(_) => {
                Self::Unauthorized(value.to_string())
            }
        }
    }
}

macro_rules! domain_from {
    ($($source:ty),+) => {
        $(impl From<$source> for ApplicationError {
            fn from(value: $source) -> Self {
                Self::Domain(DomainError::from(value))
            }
        })+
    };
}

domain_from!(FlowTransitionError, OrderValidationError, PaymentError, AssignmentError);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
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
            Self::Unauthorized { .. } => "Authentication is required.",
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::NotFound { .. } => "The requested resource was not found.",
            Self::Conflict { .. } => {
                "The request conflicts with the current state of the resource."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Message safe to return to the caller. Infrastructure failures hide their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. } => message.clone(),
            Self::ServiceUnavailable { .. } | Self::Internal { .. } => {
                self.user_message().to_owned()
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
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
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

const UNASSIGNED: &str = "unassigned";

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_owned();
        match value {
            ApplicationError::Domain(domain) => {
                let message = domain.to_string();
                match domain {
                    DomainError::FlowTransition(FlowTransitionError::NotPermitted { .. }) => {
                        Self::Forbidden { message, correlation_id }
                    }
                    DomainError::FlowTransition(_)
                    | DomainError::Assignment(_)
                    | DomainError::Payment(PaymentError::OrderClosed { .. })
                    | DomainError::Payment(PaymentError::NotUnpaid { .. }) => {
                        Self::Conflict { message, correlation_id }
                    }
                    DomainError::OrderValidation(_)
                    | DomainError::Payment(_)
                    | DomainError::InvariantViolation(_) => {
                        Self::BadRequest { message, correlation_id }
                    }
                }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            ApplicationError::Unauthorized(message) => {
                Self::Unauthorized { message, correlation_id }
            }
            ApplicationError::Forbidden(message) => Self::Forbidden { message, correlation_id },
            ApplicationError::Conflict(message) => Self::Conflict { message, correlation_id },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
