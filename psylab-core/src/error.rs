// Error types for the psylab request pipeline

use crate::HttpResponse;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Not Acceptable: {0}")]
    NotAcceptable(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        let status = match self {
            Error::Deserialization(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // Default to 500 for unmapped errors
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.as_u16()
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Short machine-readable name used in the error envelope.
    pub fn name(&self) -> &'static str {
        match self {
            Error::Deserialization(_) | Error::BadRequest(_) => "BadRequestError",
            Error::Unauthorized(_) => "AuthFailureError",
            Error::Forbidden(_) => "ForbiddenError",
            Error::NotFound(_) | Error::MethodNotAllowed(_) => "NotFoundError",
            Error::NotAcceptable(_) => "NotAcceptableError",
            Error::PayloadTooLarge(_) => "PayloadTooLargeError",
            Error::TooManyRequests(_) => "RateLimitError",
            _ => "InternalError",
        }
    }

    /// Render the error as the JSON envelope returned to clients.
    ///
    /// Server errors never expose their inner message.
    pub fn into_response(self) -> HttpResponse {
        let status = self.status_code();
        let message = if self.is_server_error() {
            "Something wrong happened.".to_string()
        } else {
            self.message()
        };

        HttpResponse::new(status).with_json_value(json!({
            "data": null,
            "error": {
                "status": status,
                "name": self.name(),
                "message": message,
            }
        }))
    }

    fn message(&self) -> String {
        match self {
            Error::Http(m)
            | Error::Serialization(m)
            | Error::Deserialization(m)
            | Error::BadRequest(m)
            | Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::NotFound(m)
            | Error::MethodNotAllowed(m)
            | Error::NotAcceptable(m)
            | Error::PayloadTooLarge(m)
            | Error::TooManyRequests(m)
            | Error::Internal(m)
            | Error::ServiceUnavailable(m) => m.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}
