#![allow(dead_code)]

use sqlvault_config_and_utils::{
    CipherKey, ColumnDefinition, DatabaseDefinition, DefaultUserConfig, Paths, TableDefinition,
};
use sqlvault_database::{
    ensure_database, AuditRecord, AuditSettings, BootstrapOutcome, SqlWrapper, Value,
    WrapperOptions,
};
use tempfile::TempDir;

pub const DATABASE: &str = "shop";
pub const ADMIN_NAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct-horse-battery";

/// A bootstrapped database in a temp directory.
pub struct TestDb {
    pub dir: TempDir,
    pub paths: Paths,
    pub options: WrapperOptions,
    pub definition: DatabaseDefinition,
}

pub fn widgets_definition() -> DatabaseDefinition {
    DatabaseDefinition {
        name: DATABASE.to_string(),
        version: 1,
        tables: vec![TableDefinition {
            name: "widgets".to_string(),
            columns: vec![
                ColumnDefinition::new("color", "TEXT"),
                ColumnDefinition::new("size", "VARCHAR(16)"),
            ],
        }],
    }
}

pub fn default_user() -> DefaultUserConfig {
    DefaultUserConfig {
        name: ADMIN_NAME.to_string(),
        password: ADMIN_PASSWORD.to_string(),
    }
}

pub fn options(encrypted: bool, audit: bool) -> WrapperOptions {
    WrapperOptions {
        key: encrypted.then(CipherKey::generate),
        audit: AuditSettings {
            enabled: audit,
            log_select_queries: false,
        },
    }
}

/// Bootstrap the widgets database with the given encryption and audit switches.
pub fn setup(encrypted: bool, audit: bool) -> TestDb {
    setup_with(widgets_definition(), options(encrypted, audit))
}

pub fn setup_with(definition: DatabaseDefinition, options: WrapperOptions) -> TestDb {
    let dir = TempDir::new().expect("failed to create temp dir");
    let paths = Paths::with_base_dir(dir.path().join("storage"));
    let outcome = ensure_database(&paths, &definition, &default_user(), &options)
        .expect("bootstrap failed");
    assert_eq!(outcome, BootstrapOutcome::Created);

    TestDb {
        dir,
        paths,
        options,
        definition,
    }
}

impl TestDb {
    pub fn db_path(&self) -> std::path::PathBuf {
        self.paths.database_file(&self.definition.name)
    }

    pub fn wrapper(&self) -> SqlWrapper {
        SqlWrapper::open(&self.db_path(), self.options.clone()).expect("failed to open wrapper")
    }

    pub fn count(&self, table: &str) -> i64 {
        let row = self
            .wrapper()
            .query_row(format!("SELECT COUNT(*) AS n FROM {}", table), &[])
            .expect("count query failed")
            .expect("count returned no row");
        row.get("n").and_then(Value::as_i64).expect("count is not a number")
    }

    pub fn audit_rows(&self) -> Vec<AuditRecord> {
        self.wrapper()
            .recorder()
            .recent(1_000)
            .expect("failed to read audit rows")
    }

    pub fn latest_audit(&self) -> AuditRecord {
        self.audit_rows()
            .into_iter()
            .next()
            .expect("no audit rows")
    }
}
