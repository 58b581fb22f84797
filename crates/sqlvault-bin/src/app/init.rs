//! Startup: key material, codec self-test, database creation.

use anyhow::{anyhow, Context};
use sqlvault_config_and_utils::{resolve_cipher_key, Config, Paths};
use sqlvault_database::{create_databases, DatabaseError, ValueCodec, WrapperOptions};
use tracing::info;

/// Connection options for `config`, resolving the cipher key when encryption is on.
pub(crate) fn wrapper_options(config: &Config) -> anyhow::Result<WrapperOptions> {
    let paths = Paths::from_config(config);
    let key = resolve_cipher_key(config, &paths).context("failed to resolve encryption key")?;
    Ok(WrapperOptions::from_config(config, key))
}

/// Map the disabled-encryption case to an actionable message.
pub(crate) fn fatal_database_error(error: DatabaseError) -> anyhow::Error {
    match error {
        DatabaseError::EncryptedWhileDisabled => anyhow!(
            "found encrypted data while encryption is disabled; \
             enable storage.encryption and restore the original key"
        ),
        other => anyhow::Error::new(other),
    }
}

/// Create every configured database that does not exist yet.
pub fn run_bootstrap(config: &Config) -> anyhow::Result<()> {
    info!(
        storage = %config.storage.path.display(),
        encryption = config.storage.encryption.enabled,
        audit = config.logging.transactions.enabled,
        "Starting sqlvault"
    );

    let options = wrapper_options(config)?;
    ValueCodec::new(options.key.clone())
        .self_test()
        .context("codec self-test failed")?;

    create_databases(config, &options).map_err(fatal_database_error)?;
    info!(databases = config.databases.len(), "Bootstrap complete");
    Ok(())
}
