//! `audit-log`: print the tail of a database's audit trail.

use super::init::{fatal_database_error, wrapper_options};
use anyhow::{bail, Context};
use sqlvault_config_and_utils::{Config, Paths};
use sqlvault_database::codec::{has_header, HEADER_PREFIX};
use sqlvault_database::{AuditRecord, SqlWrapper, ValueCodec};

/// Decrypt every encrypted element of a `[a b c]` value snapshot.
///
/// Elements are space separated, so only snapshots holding ciphertext are
/// split. Plaintext snapshots are returned as stored.
fn decode_snapshot(codec: &ValueCodec, snapshot: &str) -> anyhow::Result<String> {
    if !snapshot.contains(HEADER_PREFIX) {
        return Ok(snapshot.to_string());
    }

    let inner = snapshot
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(snapshot);

    let parts = inner
        .split(' ')
        .map(|part| {
            if has_header(part) {
                Ok(codec.decode(part).map_err(fatal_database_error)?.to_string())
            } else {
                Ok(part.to_string())
            }
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(format!("[{}]", parts.join(" ")))
}

fn decode_record(codec: &ValueCodec, mut record: AuditRecord) -> anyhow::Result<AuditRecord> {
    if let Some(old) = record.old_values.take() {
        record.old_values = Some(decode_snapshot(codec, &old)?);
    }
    if let Some(new) = record.new_values.take() {
        record.new_values = Some(decode_snapshot(codec, &new)?);
    }
    Ok(record)
}

/// Print the newest `limit` audit entries of `database`, oldest first.
pub fn print_audit_log(config: &Config, database: &str, limit: usize) -> anyhow::Result<()> {
    if config.database(database).is_none() {
        bail!("database '{}' is not configured", database);
    }
    let path = Paths::from_config(config).database_file(database);
    if !path.exists() {
        bail!("database file {} does not exist, run bootstrap first", path.display());
    }

    let wrapper = SqlWrapper::open(&path, wrapper_options(config)?)?;
    let records = wrapper
        .recorder()
        .recent(limit)
        .with_context(|| format!("failed to read the audit trail of '{}'", database))?;

    for record in records.into_iter().rev() {
        let record = decode_record(wrapper.codec(), record)?;
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
