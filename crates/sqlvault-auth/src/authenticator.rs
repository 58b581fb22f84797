//! Credential and session checks against a tenant database.
//!
//! Users live in `__users` (`id`, `name`, `password`, `roles`); each user has
//! at most one session token in `__jwts` (`id`, `token`, `sha256`,
//! `expiration`). All reads and writes go through [`SqlWrapper`], so stored
//! values are encrypted whenever the database is.

use crate::header::Credentials;
use crate::tokens::{self, Claims};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use sqlvault_config_and_utils::{CipherKey, Config, JwtConfig, Paths};
use sqlvault_database::models::{JWT_TABLE, METADATA_TABLE, ROLE_ADMIN, ROLE_PREFIX, USERS_TABLE};
use sqlvault_database::{where_eq, Row, SqlWrapper, Statement, Value, WrapperOptions};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// User matched by name and password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub roles: Vec<String>,
}

/// User matched by a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
}

/// A freshly issued session token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

fn text_column(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        value => Some(value.to_string()),
    }
}

fn roles_column(row: &Row) -> Vec<String> {
    row.get("roles")
        .and_then(Value::as_list)
        .unwrap_or_default()
}

fn is_admin_role(role: &str) -> bool {
    role.eq_ignore_ascii_case(ROLE_ADMIN)
}

/// Whether `roles` satisfies `required`.
///
/// Admins satisfy everything. Required roles are compared case-insensitively
/// and may be given with or without the `__db:` prefix.
pub fn has_required_role(roles: &[String], required: &[&str]) -> bool {
    if required.is_empty() {
        return true;
    }
    roles.iter().any(|role| {
        is_admin_role(role)
            || required.iter().any(|wanted| {
                let bare = wanted.strip_prefix(ROLE_PREFIX).unwrap_or(wanted);
                format!("{}{}", ROLE_PREFIX, bare).eq_ignore_ascii_case(role)
            })
    })
}

/// Fail with [`AuthError::LastAdmin`] when the users matched by `filter`
/// include every admin of the database.
///
/// Run before deleting users or rewriting their roles.
pub fn ensure_admins_remain(wrapper: &SqlWrapper, filter: &str, args: &[Value]) -> AuthResult<()> {
    let admin_ids = |rows: Vec<Row>| -> HashSet<String> {
        rows.iter()
            .filter(|row| roles_column(row).iter().any(|role| is_admin_role(role)))
            .filter_map(|row| text_column(row, "id"))
            .collect()
    };

    let admins = admin_ids(wrapper.query_decoded(
        Statement::select(USERS_TABLE, &["id", "roles"], None),
        &[],
    )?);
    if admins.is_empty() {
        return Ok(());
    }

    let affected = admin_ids(wrapper.query_decoded(
        Statement::select(USERS_TABLE, &["id", "roles"], Some(filter)),
        args,
    )?);
    if admins.is_subset(&affected) {
        warn!(admins = admins.len(), "Refusing to remove the last admin");
        return Err(AuthError::LastAdmin);
    }
    Ok(())
}

/// Authenticates requests against the tenant databases under one storage directory.
pub struct Authenticator {
    paths: Paths,
    options: WrapperOptions,
    jwt: JwtConfig,
}

impl Authenticator {
    pub fn new(paths: Paths, options: WrapperOptions, jwt: JwtConfig) -> Self {
        Self {
            paths,
            options,
            jwt,
        }
    }

    pub fn from_config(config: &Config, key: Option<CipherKey>) -> Self {
        Self::new(
            Paths::from_config(config),
            WrapperOptions::from_config(config, key),
            config.session.jwt.clone(),
        )
    }

    fn open(&self, database: &str) -> AuthResult<SqlWrapper> {
        let path = self.paths.database_file(database);
        if !path.exists() {
            return Err(AuthError::DatabaseNotFound(database.to_string()));
        }
        Ok(SqlWrapper::open(&path, self.options.clone())?)
    }

    fn secret(&self, database: &str) -> AuthResult<[u8; 32]> {
        tokens::signing_secret(self.options.key.as_ref(), database)
    }

    fn issuer(&self, wrapper: &SqlWrapper, database: &str) -> AuthResult<String> {
        let version = wrapper
            .query_decoded(Statement::select(METADATA_TABLE, &["version"], None), &[])?
            .first()
            .and_then(|row| text_column(row, "version"))
            .unwrap_or_else(|| "NULL".to_string());
        Ok(tokens::issuer(database, &version))
    }

    /// Look a user up by name and password.
    ///
    /// A user without roles is treated as unknown.
    pub fn check_credentials(
        &self,
        database: &str,
        name: &str,
        password: &str,
    ) -> AuthResult<Option<UserIdentity>> {
        let wrapper = self.open(database)?;
        let rows = wrapper.query_decoded(
            Statement::select(
                USERS_TABLE,
                &["id", "roles"],
                Some(&where_eq(&["name", "password"])),
            ),
            &[Value::from(name), Value::from(password)],
        )?;

        let identity = rows.iter().find_map(|row| {
            let roles = roles_column(row);
            let id = text_column(row, "id")?;
            (!roles.is_empty()).then_some(UserIdentity { id, roles })
        });
        debug!(database, user = name, found = identity.is_some(), "Checked credentials");
        Ok(identity)
    }

    /// Resolve the user a session token was issued to.
    ///
    /// The token must verify, and must still be the one stored for its user.
    pub fn check_token(&self, database: &str, token: &str) -> AuthResult<Option<TokenIdentity>> {
        if !self.jwt.enabled {
            return Err(AuthError::JwtDisabled);
        }

        let wrapper = self.open(database)?;
        let issuer = self.issuer(&wrapper, database)?;
        let claims = tokens::verify(token, &self.secret(database)?, &issuer)?;
        let user_id = claims.aud;

        let stored = wrapper.query_row(
            Statement::select(JWT_TABLE, &["token", "sha256"], Some(&where_eq(&["id"]))),
            &[Value::from(user_id.as_str())],
        )?;
        let Some(stored) = stored else {
            debug!(database, user_id = %user_id, "No stored session token");
            return Ok(None);
        };
        let stored = wrapper.decode_row(stored)?;

        if text_column(&stored, "token").as_deref() != Some(token) {
            debug!(database, user_id = %user_id, "Session token was replaced");
            return Ok(None);
        }
        if text_column(&stored, "sha256") != Some(tokens::fingerprint(token)) {
            return Err(AuthError::InvalidToken(
                "stored fingerprint does not match".to_string(),
            ));
        }

        let user = wrapper.query_row(
            Statement::select(USERS_TABLE, &["name", "roles"], Some(&where_eq(&["id"]))),
            &[Value::from(user_id.as_str())],
        )?;
        let Some(user) = user else {
            return Ok(None);
        };
        let user = wrapper.decode_row(user)?;
        let roles = roles_column(&user);
        match text_column(&user, "name") {
            Some(name) if !roles.is_empty() => Ok(Some(TokenIdentity {
                id: user_id,
                name,
                roles,
            })),
            _ => Ok(None),
        }
    }

    /// Authenticate an `Authorization` header and check its roles.
    ///
    /// Returns the user id. An empty `required_roles` accepts any known user.
    pub fn run_auth_checks(
        &self,
        header: &str,
        database: &str,
        correlation_id: &str,
        required_roles: &[&str],
    ) -> AuthResult<String> {
        debug!(correlation_id, database, "Running authentication checks");

        let (user_id, roles) = match Credentials::parse(header)? {
            Credentials::Basic { name, password } => self
                .check_credentials(database, &name, &password)?
                .map(|user| (user.id, user.roles)),
            Credentials::Token(token) => match self.check_token(database, &token) {
                Ok(found) => found.map(|user| (user.id, user.roles)),
                Err(AuthError::TokenExpired) => {
                    warn!(correlation_id, database, "Session token has expired");
                    return Err(AuthError::TokenExpired);
                }
                Err(e) => return Err(e),
            },
        }
        .ok_or(AuthError::UserNotFound)?;

        if !has_required_role(&roles, required_roles) {
            debug!(correlation_id, user_id = %user_id, ?required_roles, "Missing required role");
            return Err(AuthError::NoRoles(user_id));
        }

        info!(correlation_id, database, user_id = %user_id, "User authenticated");
        Ok(user_id)
    }

    /// Sign a session token for `user_id` and store it, replacing any previous one.
    pub fn issue_token(&self, database: &str, user_id: &str, name: &str) -> AuthResult<IssuedToken> {
        if !self.jwt.enabled {
            return Err(AuthError::JwtDisabled);
        }

        let lifetime = tokens::parse_timeout(&self.jwt.timeout)?;
        let mut wrapper = self.open(database)?;
        let claims = Claims::new(
            self.issuer(&wrapper, database)?,
            format!("session token for {} in {}", name, database),
            user_id.to_string(),
            lifetime,
        );
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| AuthError::InvalidTimeout(self.jwt.timeout.clone()))?;
        let token = tokens::sign(&claims, &self.secret(database)?)?;

        wrapper.execute(
            format!(
                "INSERT OR REPLACE INTO {} (id, token, sha256, expiration) VALUES (?, ?, ?, ?)",
                JWT_TABLE
            ),
            user_id,
            &[
                Value::from(user_id),
                Value::from(token.as_str()),
                Value::from(tokens::fingerprint(&token)),
                Value::from(expires_at.to_rfc3339()),
            ],
        )?;

        info!(database, user_id, expires_at = %expires_at, "Issued session token");
        Ok(IssuedToken { token, expires_at })
    }

    /// Delete the stored session token of `user_id`. Returns whether one existed.
    pub fn revoke_token(&self, database: &str, user_id: &str) -> AuthResult<bool> {
        let mut wrapper = self.open(database)?;
        let filter = where_eq(&["id"]);

        // DELETE binds stored values, so fetch the id as stored first.
        let stored_id = wrapper
            .query_row(
                Statement::select(JWT_TABLE, &["id"], Some(&filter)),
                &[Value::from(user_id)],
            )?
            .and_then(|row| row.get("id").cloned());
        let Some(stored_id) = stored_id else {
            return Ok(false);
        };

        let outcome = wrapper.execute(Statement::delete(JWT_TABLE, &filter), user_id, &[stored_id])?;
        info!(database, user_id, "Revoked session token");
        Ok(outcome.rows_affected > 0)
    }
}
