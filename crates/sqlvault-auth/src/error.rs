//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Authorization header is empty, undecodable or of an unknown scheme.
    #[error("Invalid authorization header: {0}")]
    InvalidHeader(String),

    /// No user matches the credentials or token.
    #[error("User not found")]
    UserNotFound,

    /// The user holds none of the required roles.
    #[error("User {0} has none of the required roles")]
    NoRoles(String),

    #[error("Session token has expired")]
    TokenExpired,

    /// A bearer token was presented while sessions are disabled.
    #[error("Session tokens are disabled")]
    JwtDisabled,

    #[error("Database {0} does not exist")]
    DatabaseNotFound(String),

    /// The operation would leave the database without an admin.
    #[error("Operation would remove the last admin user")]
    LastAdmin,

    /// Token is malformed, tampered with or no longer stored.
    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    /// Session timeout setting could not be parsed.
    #[error("Invalid session timeout '{0}'")]
    InvalidTimeout(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Database error
    #[error(transparent)]
    Database(#[from] sqlvault_database::DatabaseError),

    /// Configuration or key material error
    #[error(transparent)]
    Core(#[from] sqlvault_config_and_utils::CoreError),

    /// Token encoding error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
