//! Status machines for proposals and contracts.
//!
//! Both machines are pure: they take the stored state, the requested action
//! and who is asking, and either return the next state or say why not.
//! Callers persist the result.

pub mod contract;
pub mod proposal;

use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("cannot {action} while {entity} is {state}")]
    InvalidTransition {
        entity: &'static str,
        action: &'static str,
        state: String,
    },
    #[error("{0}")]
    Precondition(&'static str),
    #[error("unrecognised {entity} status '{value}'")]
    UnknownStatus { entity: &'static str, value: String },
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Forbidden(message) => AppError::forbidden(message),
            err @ (WorkflowError::InvalidTransition { .. } | WorkflowError::Precondition(_)) => {
                AppError::conflict(err.to_string())
            }
            err @ WorkflowError::UnknownStatus { .. } => AppError::internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn maps_to_http_statuses() {
        let forbidden: AppError = WorkflowError::Forbidden("admins only").into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let conflict: AppError = WorkflowError::InvalidTransition {
            entity: "proposal",
            action: "send",
            state: "draft".into(),
        }
        .into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.message(), "cannot send while proposal is draft");

        let corrupt: AppError = WorkflowError::UnknownStatus {
            entity: "contract",
            value: "lost".into(),
        }
        .into();
        assert_eq!(corrupt.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
