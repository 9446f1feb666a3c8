//! Service error types with their HTTP mappings

use thiserror::Error;

/// Failures a route handler can produce
#[derive(Debug, Error)]
pub enum ServiceError {
    /// 400 - malformed body, invalid path, empty bulk delete
    #[error("{0}")]
    BadRequest(String),

    /// 401 - missing/malformed/forged credentials
    #[error("{0}")]
    Unauthorized(String),

    /// 404 - presigned GET for an object that is not there
    #[error("object not found")]
    NotFound,

    /// 412 - If-Match did not match the stored ETag
    #[error("etag precondition failed")]
    PreconditionFailed,

    /// 428 - manifest exists but If-Match was omitted
    #[error("if-match header required")]
    IfMatchRequired,

    /// 500 - store failure or undecodable stored state
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// The HTTP status this error maps to
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::NotFound => 404,
            Self::PreconditionFailed => 412,
            Self::IfMatchRequired => 428,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServiceError::BadRequest("x".into()).status(), 400);
        assert_eq!(ServiceError::Unauthorized("x".into()).status(), 401);
        assert_eq!(ServiceError::NotFound.status(), 404);
        assert_eq!(ServiceError::PreconditionFailed.status(), 412);
        assert_eq!(ServiceError::IfMatchRequired.status(), 428);
        assert_eq!(ServiceError::Internal("x".into()).status(), 500);
    }
}
