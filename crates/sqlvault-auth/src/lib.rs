//! Authentication for sqlvault tenant databases.
//!
//! - `Basic` and `Bearer` authorization headers ([`Credentials`])
//! - user lookup by name and password, or by session token
//! - role checks, with admins passing every check
//! - session token issue and revocation
//! - the admin lockout guard for user updates and deletes

mod authenticator;
mod error;
mod header;
pub mod tokens;

pub use authenticator::{
    ensure_admins_remain, has_required_role, Authenticator, IssuedToken, TokenIdentity,
    UserIdentity,
};
pub use error::{AuthError, AuthResult};
pub use header::{basic_header, bearer_header, Credentials};
