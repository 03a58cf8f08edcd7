use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use shadowvec_core::{AccessContext, Error};

const GENERIC_MESSAGE: &str = "Something went wrong while processing your request.";

/// A core error on its way to an HTTP caller. Internal failures are only
/// described in detail to administrators.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ApiError {
    error: Error,
    detailed: bool,
}

impl ApiError {
    pub fn new(error: Error, access: &AccessContext) -> Self {
        Self {
            error,
            detailed: access.is_admin(),
        }
    }

    /// `map_err` adapter for handlers.
    pub fn for_caller(access: &AccessContext) -> impl Fn(Error) -> ApiError + '_ {
        move |error| ApiError::new(error, access)
    }

    pub fn inner(&self) -> &Error {
        &self.error
    }

    fn message(&self) -> String {
        if self.error.is_client_error() || self.detailed {
            self.error.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            error,
            detailed: false,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.error {
            Error::Validation(_)
            | Error::Schema(_)
            | Error::InvalidDimension { .. }
            | Error::CollectionExists(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Timeout => StatusCode::REQUEST_TIMEOUT,
            Error::Storage(_) | Error::Io(_) | Error::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.error, "request failed");
        }
        HttpResponse::build(status).json(json!({
            "code": status.as_u16(),
            "message": self.message(),
            "data": {},
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let guest = AccessContext::guest();
        let status = |e: Error| ApiError::new(e, &guest).status_code();
        assert_eq!(status(Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(Error::Schema("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(Error::InvalidDimension { expected: 3, actual: 2 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status(Error::Timeout), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(status(Error::Storage("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_detail_is_admin_only() {
        let err = || Error::Storage("mdb corrupted".into());
        assert_eq!(ApiError::new(err(), &AccessContext::guest()).message(), GENERIC_MESSAGE);
        assert!(ApiError::new(err(), &AccessContext::admin())
            .message()
            .contains("mdb corrupted"));
        assert!(ApiError::new(Error::Validation("bad".into()), &AccessContext::guest())
            .message()
            .contains("bad"));
    }
}
