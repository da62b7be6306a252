use mongodb::error::{Error as DbError, TRANSIENT_TRANSACTION_ERROR};
use reqwest::{Error as HttpError, StatusCode};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Stored data broke a referential or lifecycle invariant.
    #[error("Integrity violation: {0}")]
    Integrity(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("Upstream service error: {0}")]
    Upstream(String),
}

impl Error {
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::NotFound(what.as_ref().to_string())
    }

    /// True for the four caller-facing kinds; false for internal and collaborator failures.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::Conflict(_) | Self::InvalidState(_)
        )
    }

    /// A concurrent transaction on the same position won; the whole operation may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(err) => err.contains_label(TRANSIENT_TRANSACTION_ERROR),
            _ => false,
        }
    }

    /// The response category an API layer should use for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidState(_) => StatusCode::PRECONDITION_FAILED,
            Self::Integrity(_) | Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_distinct_statuses() {
        let errors = [
            Error::Validation("name".to_string()),
            Error::not_found("Position 1"),
            Error::Conflict("dup".to_string()),
            Error::InvalidState("closed".to_string()),
        ];
        let statuses: Vec<_> = errors.iter().map(Error::status).collect();
        assert_eq!(
            statuses,
            vec![
                StatusCode::BAD_REQUEST,
                StatusCode::NOT_FOUND,
                StatusCode::CONFLICT,
                StatusCode::PRECONDITION_FAILED,
            ]
        );
        assert!(errors.iter().all(Error::is_business));
    }

    #[test]
    fn integrity_is_never_a_business_error() {
        let err = Error::Integrity("orphaned nomination".to_string());
        assert!(!err.is_business());
        assert!(!err.is_transient());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Integrity violation: orphaned nomination");
    }

    #[test]
    fn upstream_failures_are_bad_gateway() {
        let err = Error::Upstream("voting-service returned 503".to_string());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(!err.is_business());
    }
}
