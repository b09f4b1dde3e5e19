use thiserror::Error;

use crate::engine::EngineError;
use crate::session::SessionStoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("carrier signature did not match")]
    AuthenticationFailure,
    #[error("unsupported carrier api version `{found}` (expected `{expected}`)")]
    VersionMismatch { expected: String, found: String },
    #[error(transparent)]
    Store(#[from] SessionStoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "Unauthorized",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Unauthorized { correlation_id, .. }
            | Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl BridgeError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<BridgeError> for InterfaceError {
    fn from(value: BridgeError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            BridgeError::AuthenticationFailure => Self::Unauthorized { message, correlation_id },
            BridgeError::VersionMismatch { .. } => Self::BadRequest { message, correlation_id },
            BridgeError::Store(_) | BridgeError::Engine(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}
