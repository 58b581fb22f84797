//! First-start creation of tenant databases.
//!
//! A new database gets, in order: the audit table (when auditing is on), the
//! metadata table stamped with the configured version, the users table seeded
//! with the default user, the JWT table, then every configured user table.
//! Any failure deletes the partially created files.

use crate::ids::{new_user_id, new_user_password};
use crate::models::{
    COLUMN_PREFIX, DEFAULT_ROLES, ENTRY_ID_COLUMN, JWT_TABLE, METADATA_TABLE, SYSTEM_USER_ID,
    TABLE_PREFIX, TRANSACTIONS_TABLE, USERS_TABLE,
};
use crate::statement::Statement;
use crate::wrapper::{SqlWrapper, WrapperOptions};
use crate::{DatabaseError, DatabaseResult, Value};
use sqlvault_config_and_utils::{Config, DatabaseDefinition, DefaultUserConfig, Paths, TableDefinition};
use tracing::{debug, error, info, warn};

const DEFAULT_NAME_ENV_VAR: &str = "SQLVAULT_DEFAULT_NAME";
const DEFAULT_PASSWORD_ENV_VAR: &str = "SQLVAULT_DEFAULT_PASSWORD";

/// Column types without a length.
const PLAIN_COLUMN_TYPES: [&str; 8] = [
    "TEXT",
    "TINYTEXT",
    "MEDIUMTEXT",
    "LONGTEXT",
    "NTEXT",
    "BLOB",
    "CLOB",
    "NCLOB",
];
/// Column types taking a `(n)` length.
const SIZED_COLUMN_TYPES: [&str; 4] = ["NVARCHAR", "VARCHAR", "NCHAR", "CHAR"];

/// What [`ensure_database`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    Existing { version: i64 },
    VersionMismatch { found: i64, expected: i64 },
}

/// Credentials for the seeded default user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultCredentials {
    pub name: String,
    pub password: String,
    /// The password was generated rather than configured.
    pub generated: bool,
}

impl DefaultCredentials {
    /// Environment first, then configuration, then a generated password.
    pub fn resolve(config: &DefaultUserConfig) -> Self {
        let from_env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let name = from_env(DEFAULT_NAME_ENV_VAR)
            .or_else(|| Some(config.name.clone()).filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| DefaultUserConfig::default().name);

        match from_env(DEFAULT_PASSWORD_ENV_VAR)
            .or_else(|| Some(config.password.clone()).filter(|p| !p.is_empty()))
        {
            Some(password) => Self {
                name,
                password,
                generated: false,
            },
            None => Self {
                name,
                password: new_user_password(),
                generated: true,
            },
        }
    }
}

/// Whether `column_type` is one of the supported text-compatible types.
///
/// Matching is case-insensitive; sized types need a numeric length, e.g. `VARCHAR(255)`.
pub fn is_supported_column_type(column_type: &str) -> bool {
    let normalized = column_type.trim().to_ascii_uppercase();
    if PLAIN_COLUMN_TYPES.contains(&normalized.as_str()) {
        return true;
    }

    SIZED_COLUMN_TYPES.iter().any(|base| {
        normalized
            .strip_prefix(base)
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
            .map(|len| !len.trim().is_empty() && len.trim().chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    })
}

/// Check names and column types of a user table.
pub fn validate_table(table: &TableDefinition) -> DatabaseResult<()> {
    if table.name.starts_with(TABLE_PREFIX) {
        return Err(DatabaseError::ReservedName(format!(
            "table '{}' uses the reserved prefix '{}'",
            table.name, TABLE_PREFIX
        )));
    }

    for column in &table.columns {
        if column.name.starts_with(COLUMN_PREFIX) {
            return Err(DatabaseError::ReservedName(format!(
                "column '{}' of table '{}' uses the reserved prefix '{}'",
                column.name, table.name, COLUMN_PREFIX
            )));
        }
        if !is_supported_column_type(&column.column_type) {
            return Err(DatabaseError::InvalidColumnType {
                column: format!("{}.{}", table.name, column.name),
                column_type: column.column_type.clone(),
            });
        }
    }

    Ok(())
}

/// Column definitions of a user table, with the entry id column appended.
pub fn column_definitions(table: &TableDefinition) -> Vec<String> {
    table
        .columns
        .iter()
        .map(|column| {
            let mut definition = format!("{} {}", column.name, column.column_type);
            if column.primary_key {
                definition.push_str(" PRIMARY KEY");
            }
            definition
        })
        .chain(std::iter::once(format!("{} TEXT", ENTRY_ID_COLUMN)))
        .collect()
}

/// Ensure every configured database exists.
pub fn create_databases(config: &Config, options: &WrapperOptions) -> DatabaseResult<()> {
    let paths = Paths::from_config(config);
    for definition in &config.databases {
        ensure_database(&paths, definition, &config.session.default, options)?;
    }
    info!(databases = config.databases.len(), "All databases ready");
    Ok(())
}

/// Open or create one database, creating its schema on first start.
pub fn ensure_database(
    paths: &Paths,
    definition: &DatabaseDefinition,
    default_user: &DefaultUserConfig,
    options: &WrapperOptions,
) -> DatabaseResult<BootstrapOutcome> {
    paths.ensure_storage_dir()?;
    let path = paths.database_file(&definition.name);
    let mut wrapper = SqlWrapper::open(&path, options.clone())?;

    match read_version(&wrapper) {
        Ok(found) if found == definition.version => {
            debug!(database = %definition.name, version = found, "Database ready");
            return Ok(BootstrapOutcome::Existing { version: found });
        }
        Ok(found) => {
            warn!(
                database = %definition.name,
                found,
                expected = definition.version,
                "Schema version mismatch, migrations are not supported"
            );
            return Ok(BootstrapOutcome::VersionMismatch {
                found,
                expected: definition.version,
            });
        }
        Err(DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(_, Some(message))))
            if message.contains("no such table") => {}
        Err(e) => return Err(e),
    }

    info!(database = %definition.name, path = %path.display(), "Creating database");

    if let Err(e) = create_schema(&mut wrapper, definition, default_user, options) {
        drop(wrapper);
        error!(database = %definition.name, error = %e, "Database initialization failed");
        remove_database_files(paths, &definition.name);
        return Err(e);
    }

    info!(
        database = %definition.name,
        version = definition.version,
        tables = definition.tables.len(),
        "Database created"
    );
    Ok(BootstrapOutcome::Created)
}

fn read_version(wrapper: &SqlWrapper) -> DatabaseResult<i64> {
    let row = wrapper
        .query_row(Statement::select(METADATA_TABLE, &["version"], None), &[])?
        .ok_or_else(|| DatabaseError::Bootstrap("metadata table has no version".to_string()))?;
    let row = wrapper.decode_row(row)?;

    row.get("version")
        .and_then(Value::as_i64)
        .ok_or_else(|| DatabaseError::Bootstrap("stored schema version is not a number".to_string()))
}

fn create_schema(
    wrapper: &mut SqlWrapper,
    definition: &DatabaseDefinition,
    default_user: &DefaultUserConfig,
    options: &WrapperOptions,
) -> DatabaseResult<()> {
    if options.audit.enabled {
        create_transactions_table(wrapper)?;
    }
    create_metadata_table(wrapper, definition.version)?;
    create_users_table(wrapper, &definition.name, default_user)?;
    create_jwt_table(wrapper)?;

    for table in &definition.tables {
        validate_table(table)?;
        wrapper.execute(
            Statement::create_table(&table.name, &column_definitions(table), true),
            SYSTEM_USER_ID,
            &[],
        )?;
        debug!(database = %definition.name, table = %table.name, "Created user table");
    }

    Ok(())
}

/// Create the audit trail table.
fn create_transactions_table(wrapper: &mut SqlWrapper) -> DatabaseResult<()> {
    let columns = [
        "id INTEGER PRIMARY KEY AUTOINCREMENT",
        "timestamp DATETIME DEFAULT CURRENT_TIMESTAMP",
        "user_id TEXT",
        "action_type TEXT NOT NULL",
        "affected_table TEXT NOT NULL",
        "record_id TEXT NOT NULL",
        "old_values TEXT",
        "new_values TEXT",
        "ip_address TEXT",
        "status TEXT NOT NULL",
        "error_message TEXT",
    ]
    .map(String::from);
    wrapper.execute(
        Statement::create_table(TRANSACTIONS_TABLE, &columns, true),
        SYSTEM_USER_ID,
        &[],
    )?;
    Ok(())
}

/// Create the metadata table and stamp the schema version.
fn create_metadata_table(wrapper: &mut SqlWrapper, version: i64) -> DatabaseResult<()> {
    wrapper.execute(
        Statement::create_table(METADATA_TABLE, &["version TEXT".to_string()], true),
        SYSTEM_USER_ID,
        &[],
    )?;
    wrapper.execute(
        Statement::insert(METADATA_TABLE, &["version"]),
        SYSTEM_USER_ID,
        &[Value::Str(version.to_string())],
    )?;
    Ok(())
}

/// Create the users table and seed the default user.
fn create_users_table(
    wrapper: &mut SqlWrapper,
    database: &str,
    default_user: &DefaultUserConfig,
) -> DatabaseResult<()> {
    let columns = [
        "id TEXT PRIMARY KEY",
        "name TEXT",
        "password TEXT",
        "roles TEXT",
    ]
    .map(String::from);
    wrapper.execute(
        Statement::create_table(USERS_TABLE, &columns, true),
        SYSTEM_USER_ID,
        &[],
    )?;

    let credentials = DefaultCredentials::resolve(default_user);
    let roles = serde_json::to_string(DEFAULT_ROLES)?;
    wrapper.execute(
        Statement::insert(USERS_TABLE, &["id", "name", "password", "roles"]),
        SYSTEM_USER_ID,
        &[
            Value::Str(new_user_id()),
            Value::Str(credentials.name.clone()),
            Value::Str(credentials.password.clone()),
            Value::Str(roles),
        ],
    )?;

    if credentials.generated {
        warn!(
            database,
            user = %credentials.name,
            password = %credentials.password,
            "Generated a password for the default user, it will not be shown again"
        );
    }
    Ok(())
}

/// Create the session token table.
fn create_jwt_table(wrapper: &mut SqlWrapper) -> DatabaseResult<()> {
    let columns = [
        "id TEXT PRIMARY KEY",
        "token TEXT",
        "sha256 TEXT",
        "expiration TEXT",
    ]
    .map(String::from);
    wrapper.execute(
        Statement::create_table(JWT_TABLE, &columns, true),
        SYSTEM_USER_ID,
        &[],
    )?;
    Ok(())
}

fn remove_database_files(paths: &Paths, name: &str) {
    let [wal, shm] = paths.database_side_files(name);
    for file in [paths.database_file(name), wal, shm] {
        match std::fs::remove_file(&file) {
            Ok(()) => warn!(path = %file.display(), "Deleted file of failed database"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(path = %file.display(), error = %e, "Failed to delete database file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlvault_config_and_utils::ColumnDefinition;

    #[test]
    fn test_supported_column_types() {
        for column_type in [
            "TEXT",
            "text",
            "VARCHAR(255)",
            "nvarchar(10)",
            "CHAR (4)",
            "BLOB",
            "CLOB",
            "NCLOB",
            "LONGTEXT",
        ] {
            assert!(is_supported_column_type(column_type), "{}", column_type);
        }

        for column_type in ["INTEGER", "VARCHAR", "VARCHAR(n)", "CHAR()", "REAL", ""] {
            assert!(!is_supported_column_type(column_type), "{}", column_type);
        }
    }

    #[test]
    fn test_validate_table_reserved_names() {
        let table = TableDefinition {
            name: "__foo".to_string(),
            columns: vec![],
        };
        assert!(matches!(
            validate_table(&table),
            Err(DatabaseError::ReservedName(_))
        ));

        let table = TableDefinition {
            name: "widgets".to_string(),
            columns: vec![ColumnDefinition::new("sys_bar", "TEXT")],
        };
        assert!(matches!(
            validate_table(&table),
            Err(DatabaseError::ReservedName(_))
        ));
    }

    #[test]
    fn test_validate_table_column_type() {
        let table = TableDefinition {
            name: "widgets".to_string(),
            columns: vec![ColumnDefinition::new("count", "INTEGER")],
        };
        assert!(matches!(
            validate_table(&table),
            Err(DatabaseError::InvalidColumnType { .. })
        ));
    }

    #[test]
    fn test_column_definitions_append_entry_id() {
        let mut key = ColumnDefinition::new("sku", "VARCHAR(32)");
        key.primary_key = true;
        let table = TableDefinition {
            name: "widgets".to_string(),
            columns: vec![key, ColumnDefinition::new("color", "TEXT")],
        };
        assert_eq!(
            column_definitions(&table),
            vec![
                "sku VARCHAR(32) PRIMARY KEY".to_string(),
                "color TEXT".to_string(),
                "sys_eid TEXT".to_string(),
            ]
        );
    }

    #[test]
    fn test_default_credentials_from_config() {
        std::env::remove_var(DEFAULT_NAME_ENV_VAR);
        std::env::remove_var(DEFAULT_PASSWORD_ENV_VAR);

        let configured = DefaultCredentials::resolve(&DefaultUserConfig {
            name: "root".to_string(),
            password: "hunter2".to_string(),
        });
        assert_eq!(configured.name, "root");
        assert_eq!(configured.password, "hunter2");
        assert!(!configured.generated);

        let generated = DefaultCredentials::resolve(&DefaultUserConfig {
            name: String::new(),
            password: String::new(),
        });
        assert_eq!(generated.name, "admin");
        assert!(generated.generated);
        assert_eq!(generated.password.len(), 32);
    }
}
