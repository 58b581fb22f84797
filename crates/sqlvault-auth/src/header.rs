//! Authorization header parsing.
//!
//! Two schemes are accepted, each carrying a base64 payload:
//! `Basic base64(name:password)` and `Bearer base64(token)`.

use crate::{AuthError, AuthResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;

const BASIC_PREFIX: &str = "Basic ";
const BEARER_PREFIX: &str = "Bearer ";

/// Credentials carried by an authorization header.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { name: String, password: String },
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { name, .. } => f
                .debug_struct("Basic")
                .field("name", name)
                .field("password", &"[redacted]")
                .finish(),
            Credentials::Token(_) => f.debug_tuple("Token").field(&"[redacted]").finish(),
        }
    }
}

fn strip_scheme<'a>(header: &'a str, prefix: &str) -> Option<&'a str> {
    let head = header.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        header.get(prefix.len()..)
    } else {
        None
    }
}

fn decode_payload(payload: &str) -> AuthResult<String> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| AuthError::InvalidHeader(format!("payload is not base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| AuthError::InvalidHeader("payload is not UTF-8".to_string()))
}

impl Credentials {
    /// Parse the value of an `Authorization` header.
    pub fn parse(header: &str) -> AuthResult<Self> {
        let header = header.trim();
        if header.is_empty() {
            return Err(AuthError::InvalidHeader("header is empty".to_string()));
        }

        if let Some(payload) = strip_scheme(header, BEARER_PREFIX) {
            let token = decode_payload(payload)?;
            if token.trim().is_empty() {
                return Err(AuthError::InvalidHeader("token is empty".to_string()));
            }
            return Ok(Credentials::Token(token));
        }

        if let Some(payload) = strip_scheme(header, BASIC_PREFIX) {
            let decoded = decode_payload(payload)?;
            let (name, password) = decoded.split_once(':').ok_or_else(|| {
                AuthError::InvalidHeader("expected name:password".to_string())
            })?;
            if name.is_empty() || password.is_empty() {
                return Err(AuthError::InvalidHeader(
                    "name and password are required".to_string(),
                ));
            }
            return Ok(Credentials::Basic {
                name: name.to_string(),
                password: password.to_string(),
            });
        }

        Err(AuthError::InvalidHeader(
            "expected a Basic or Bearer scheme".to_string(),
        ))
    }

    /// Header value for these credentials.
    pub fn to_header(&self) -> String {
        match self {
            Credentials::Basic { name, password } => format!(
                "{}{}",
                BASIC_PREFIX,
                STANDARD.encode(format!("{}:{}", name, password))
            ),
            Credentials::Token(token) => format!("{}{}", BEARER_PREFIX, STANDARD.encode(token)),
        }
    }
}

pub fn basic_header(name: &str, password: &str) -> String {
    Credentials::Basic {
        name: name.to_string(),
        password: password.to_string(),
    }
    .to_header()
}

pub fn bearer_header(token: &str) -> String {
    Credentials::Token(token.to_string()).to_header()
}
