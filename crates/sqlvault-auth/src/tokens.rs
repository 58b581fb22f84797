//! Session token signing and verification.
//!
//! Tokens are HS256 JWTs. The audience names the user, and the signing
//! secret is derived per database so a token never validates elsewhere.

use crate::{AuthError, AuthResult};
use chrono::{DateTime, Duration, Utc};
use hkdf::Hkdf;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlvault_config_and_utils::CipherKey;
use sqlvault_database::ids::random_string;
use sqlvault_database::models::RANDOM_ID_LENGTH;

const SECRET_INFO_PREFIX: &str = "sqlvault-jwt:";

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    /// User id the token was issued to.
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(issuer: String, subject: String, user_id: String, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer,
            sub: subject,
            aud: user_id,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: random_string(RANDOM_ID_LENGTH),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Issuer claim for tokens of one database.
pub fn issuer(database: &str, version: &str) -> String {
    format!("sqlvault ({}@v{})", database, version)
}

/// Signing secret of `database`.
///
/// Derived from the cipher key material when encryption is on. Without a key
/// the secret depends on the database name alone.
pub fn signing_secret(key: Option<&CipherKey>, database: &str) -> AuthResult<[u8; 32]> {
    let info = format!("{}{}", SECRET_INFO_PREFIX, database);
    match key {
        Some(key) => Ok(key.derive(info.as_bytes())?),
        None => {
            let hk = Hkdf::<Sha256>::new(None, database.as_bytes());
            let mut okm = [0u8; 32];
            hk.expand(info.as_bytes(), &mut okm)
                .map_err(|e| AuthError::KeyDerivation(e.to_string()))?;
            Ok(okm)
        }
    }
}

/// `0x`-prefixed hex SHA-256 of a token, stored next to it.
pub fn fingerprint(token: &str) -> String {
    format!("0x{}", hex::encode(Sha256::digest(token.as_bytes())))
}

pub fn sign(claims: &Claims, secret: &[u8]) -> AuthResult<String> {
    Ok(encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )?)
}

/// Check signature, issuer and expiry of `token`.
pub fn verify(token: &str, secret: &[u8], expected_issuer: &str) -> AuthResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[expected_issuer]);
    validation.validate_aud = false;
    validation.validate_nbf = true;
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })
}

/// Parse a session lifetime such as `30s`, `15m`, `1h` or `7d`.
pub fn parse_timeout(timeout: &str) -> AuthResult<Duration> {
    let invalid = || AuthError::InvalidTimeout(timeout.to_string());
    let trimmed = timeout.trim();
    let (split, _) = trimmed.char_indices().last().ok_or_else(invalid)?;
    let (amount, unit) = trimmed.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let seconds_per_unit = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(seconds_per_unit)
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(lifetime: Duration) -> Claims {
        Claims::new(
            issuer("shop", "1"),
            "session token".to_string(),
            "usr001".to_string(),
            lifetime,
        )
    }

    #[test]
    fn test_sign_and_verify() {
        let secret = signing_secret(None, "shop").unwrap();
        let claims = claims(Duration::hours(1));
        let token = sign(&claims, &secret).unwrap();

        let verified = verify(&token, &secret, &issuer("shop", "1")).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.jti.len(), RANDOM_ID_LENGTH);
    }

    #[test]
    fn test_expired_token() {
        let secret = signing_secret(None, "shop").unwrap();
        let token = sign(&claims(Duration::seconds(-120)), &secret).unwrap();
        assert!(matches!(
            verify(&token, &secret, &issuer("shop", "1")),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_database_or_issuer() {
        let secret = signing_secret(None, "shop").unwrap();
        let token = sign(&claims(Duration::hours(1)), &secret).unwrap();

        let other = signing_secret(None, "billing").unwrap();
        assert!(matches!(
            verify(&token, &other, &issuer("shop", "1")),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            verify(&token, &secret, &issuer("shop", "2")),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_secret_depends_on_key() {
        let key = CipherKey::generate();
        let keyed = signing_secret(Some(&key), "shop").unwrap();
        assert_ne!(keyed, signing_secret(None, "shop").unwrap());
        assert_ne!(keyed, signing_secret(Some(&key), "billing").unwrap());
        assert_eq!(keyed, signing_secret(Some(&key), "shop").unwrap());
    }

    #[test]
    fn test_fingerprint() {
        let print = fingerprint("abc");
        assert_eq!(
            print,
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_timeout("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_timeout("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_timeout(" 7d ").unwrap(), Duration::days(7));
        for bad in ["", "h", "10", "0h", "-1h", "1w", "1.5h"] {
            assert!(
                matches!(parse_timeout(bad), Err(AuthError::InvalidTimeout(_))),
                "{}",
                bad
            );
        }
    }
}
