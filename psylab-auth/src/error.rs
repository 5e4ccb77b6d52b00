// Error types for authentication

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not Authorized, no token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("User with id:{0} not found")]
    UserNotFound(String),

    #[error("Access forbidden, role does not match")]
    Forbidden,

    #[error("Identity lookup failed: {0}")]
    Resolver(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(err.to_string()),
        }
    }
}

impl From<AuthError> for psylab_core::Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => psylab_core::Error::Unauthorized(err.to_string()),
            AuthError::InvalidToken(_) | AuthError::TokenExpired | AuthError::UserNotFound(_) => {
                psylab_core::Error::Unauthorized("Not Authorized, token failed".to_string())
            }
            AuthError::Forbidden => psylab_core::Error::Forbidden(err.to_string()),
            AuthError::Resolver(_) | AuthError::Config(_) => {
                psylab_core::Error::Internal(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AuthError::MissingToken, 401),
            (AuthError::TokenExpired, 401),
            (AuthError::UserNotFound("u1".into()), 401),
            (AuthError::Forbidden, 403),
            (AuthError::Resolver("db down".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(psylab_core::Error::from(err).status_code(), status);
        }
    }
}
