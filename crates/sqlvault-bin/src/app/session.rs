//! `login`: issue a session token from the command line.

use super::init::wrapper_options;
use anyhow::{bail, Context};
use sqlvault_auth::{bearer_header, Authenticator};
use sqlvault_config_and_utils::{Config, Paths};
use tracing::info;

pub fn login(config: &Config, database: &str, user: &str, password: &str) -> anyhow::Result<()> {
    let options = wrapper_options(config)?;
    let auth = Authenticator::new(
        Paths::from_config(config),
        options,
        config.session.jwt.clone(),
    );

    let Some(identity) = auth
        .check_credentials(database, user, password)
        .context("credential check failed")?
    else {
        bail!("unknown user or wrong password for database '{}'", database);
    };

    let issued = auth
        .issue_token(database, &identity.id, user)
        .context("failed to issue session token")?;
    info!(database, user, expires_at = %issued.expires_at, "Logged in");

    println!("{}", bearer_header(&issued.token));
    Ok(())
}
