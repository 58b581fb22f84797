//! Query executor.
//!
//! [`SqlWrapper`] owns one SQLite connection to a tenant database. Every
//! mutating statement runs inside an immediate transaction, has its bound
//! values passed through the [`ValueCodec`], and is recorded in the audit
//! trail once its outcome is known.

use crate::audit::{AuditEntry, AuditRecorder, AuditSettings};
use crate::codec::{strip_wildcard, wrap_wildcard, ValueCodec};
use crate::models::TRANSACTIONS_TABLE;
use crate::statement::{Action, Statement};
use crate::value::{render_values, Value};
use crate::{AuditStatus, DatabaseError, DatabaseResult};
use regex::Regex;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use sqlvault_config_and_utils::{CipherKey, Config};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

/// Connection settings shared by every wrapper of a process.
#[derive(Debug, Clone, Default)]
pub struct WrapperOptions {
    /// Value encryption key; `None` disables encryption.
    pub key: Option<CipherKey>,
    pub audit: AuditSettings,
}

impl WrapperOptions {
    pub fn from_config(config: &Config, key: Option<CipherKey>) -> Self {
        Self {
            key,
            audit: AuditSettings::from(&config.logging.transactions),
        }
    }
}

/// How [`SqlWrapper::execute_with`] treats a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Process bound values and record the statement in the audit trail.
    #[default]
    Audited,
    /// Write into the audit trail itself: values bound raw, nothing recorded.
    AuditWrite,
}

/// Result of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: usize,
    pub last_insert_rowid: i64,
}

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }
}

pub struct SqlWrapper {
    conn: Connection,
    path: PathBuf,
    codec: ValueCodec,
    options: WrapperOptions,
}

impl SqlWrapper {
    /// Open (creating if needed) the database at `path` in WAL mode.
    pub fn open(path: &Path, options: WrapperOptions) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            codec: ValueCodec::new(options.key.clone()),
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn options(&self) -> &WrapperOptions {
        &self.options
    }

    /// Recorder writing into this database's audit trail.
    pub fn recorder(&self) -> AuditRecorder {
        AuditRecorder::new(self.path.clone(), self.options.audit.clone())
    }

    /// Execute a mutating statement on behalf of `user_id` and audit it.
    pub fn execute(
        &mut self,
        statement: impl Into<Statement>,
        user_id: &str,
        args: &[Value],
    ) -> DatabaseResult<ExecOutcome> {
        self.execute_with(statement, user_id, args, ExecMode::Audited)
    }

    /// [`SqlWrapper::execute`] with an explicit [`ExecMode`].
    pub fn execute_with(
        &mut self,
        statement: impl Into<Statement>,
        user_id: &str,
        args: &[Value],
        mode: ExecMode,
    ) -> DatabaseResult<ExecOutcome> {
        let statement = statement.into();
        let (action, table) = match (statement.action(), statement.table()) {
            (Some(action), Some(table)) => (action, table.to_string()),
            _ => {
                return Err(DatabaseError::TableIdentification(
                    statement.sql().to_string(),
                ))
            }
        };

        let flattened = flatten_lists(args);
        let bound: Vec<Value> = match (mode, action) {
            (ExecMode::AuditWrite, _) | (ExecMode::Audited, Action::Delete) => flattened,
            (ExecMode::Audited, _) => flattened
                .iter()
                .map(|arg| self.codec.process(arg))
                .collect::<DatabaseResult<_>>()?,
        };

        let recorder = self.recorder();
        let audited =
            mode == ExecMode::Audited && table != TRANSACTIONS_TABLE && recorder.records(action);
        let record_id = if audited {
            Some(recorder.resolve_record_id(
                action.as_str(),
                &table,
                statement.record_id(&bound, &self.codec),
            )?)
        } else {
            None
        };

        debug!(
            action = %action,
            table = %table,
            args = bound.len(),
            audited,
            "Executing statement"
        );

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let old_values = if action == Action::Update {
            // Dropping the transaction on error rolls it back.
            Some(capture_old_values(&tx, &statement, &table, &bound)?)
        } else {
            None
        };

        let entry = |action_label: String, status: AuditStatus, error: Option<String>| AuditEntry {
            user_id: user_id.to_string(),
            action: action_label,
            table: table.clone(),
            record_id: record_id.clone(),
            old_values: old_values.clone(),
            new_values: Some(render_values(&bound)),
            ip_address: None,
            status,
            error,
        };
        let rollback_label = format!("{}(ROLLBACK)", action.as_str());

        let rows_affected = match run_statement(&tx, statement.sql(), &bound) {
            Ok(rows) => rows,
            Err(e) => {
                error!(action = %action, table = %table, error = %e, "Statement failed, rolling back");
                if let Err(rollback_error) = tx.rollback() {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                if audited {
                    let failed = entry(rollback_label, AuditStatus::Error, Some(e.to_string()));
                    if let Err(audit_error) = recorder.record(failed) {
                        warn!(error = %audit_error, "Failed to record rolled back statement");
                    }
                }
                return Err(e.into());
            }
        };

        let last_insert_rowid = tx.last_insert_rowid();
        if let Err(e) = tx.commit() {
            error!(action = %action, table = %table, error = %e, "Commit failed");
            if audited {
                let failed = entry(rollback_label, AuditStatus::Error, Some(e.to_string()));
                if let Err(audit_error) = recorder.record(failed) {
                    warn!(error = %audit_error, "Failed to record failed commit");
                }
            }
            return Err(e.into());
        }

        if audited {
            recorder
                .record(entry(action.as_str().to_string(), AuditStatus::Success, None))
                .map_err(|e| DatabaseError::Audit(e.to_string()))?;
        }

        Ok(ExecOutcome {
            rows_affected,
            last_insert_rowid,
        })
    }

    /// Run a read query; returned rows hold stored (undecoded) values.
    ///
    /// Inline `LIKE '...'` and `= '...'` literals are turned into bound
    /// parameters, then every argument goes through the codec.
    pub fn query(
        &self,
        statement: impl Into<Statement>,
        args: &[Value],
    ) -> DatabaseResult<Vec<Row>> {
        let statement = statement.into();
        let (sql, merged) = inline_literals(statement.sql(), args);
        let bound = merged
            .iter()
            .map(|arg| self.process_query_arg(arg))
            .collect::<DatabaseResult<Vec<_>>>()?;

        if self.options.audit.enabled && self.options.audit.log_select_queries {
            warn!(
                table = statement.table().unwrap_or_default(),
                "SELECT audit logging is enabled but not implemented, query not recorded"
            );
        }

        debug!(sql = %sql, args = bound.len(), "Running query");
        collect_rows(&self.conn, &sql, &bound)
    }

    /// First row of [`SqlWrapper::query`], if any.
    pub fn query_row(
        &self,
        statement: impl Into<Statement>,
        args: &[Value],
    ) -> DatabaseResult<Option<Row>> {
        Ok(self.query(statement, args)?.into_iter().next())
    }

    /// Decrypt and re-type every value of a row.
    pub fn decode_row(&self, row: Row) -> DatabaseResult<Row> {
        let values = row
            .values
            .into_iter()
            .map(|value| self.codec.decode_value(value))
            .collect::<DatabaseResult<Vec<_>>>()?;
        Ok(Row {
            columns: row.columns,
            values,
        })
    }

    /// [`SqlWrapper::query`] followed by [`SqlWrapper::decode_row`].
    pub fn query_decoded(
        &self,
        statement: impl Into<Statement>,
        args: &[Value],
    ) -> DatabaseResult<Vec<Row>> {
        self.query(statement, args)?
            .into_iter()
            .map(|row| self.decode_row(row))
            .collect()
    }

    fn process_query_arg(&self, arg: &Value) -> DatabaseResult<Value> {
        if let Value::Str(text) = arg {
            if let Some(inner) = strip_wildcard(text) {
                let processed = self.codec.process(&Value::from(inner))?;
                return Ok(wrap_wildcard(&processed));
            }
        }
        self.codec.process(arg)
    }
}

/// Expand list arguments into one bound value per element.
fn flatten_lists(args: &[Value]) -> Vec<Value> {
    let mut flattened = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::StrList(items) => flattened.extend(items.iter().cloned().map(Value::Str)),
            other => flattened.push(other.clone()),
        }
    }
    flattened
}

/// Select the SET columns of an UPDATE under its WHERE filter.
fn capture_old_values(
    conn: &Connection,
    statement: &Statement,
    table: &str,
    bound: &[Value],
) -> DatabaseResult<String> {
    let (set, filter) = statement.set_clause()?;
    if set.columns.is_empty() {
        return Err(DatabaseError::MalformedClause(
            "SET clause names no columns".to_string(),
        ));
    }
    let where_args = bound.get(set.placeholders..).ok_or_else(|| {
        DatabaseError::MalformedClause(format!(
            "SET clause expects {} arguments, got {}",
            set.placeholders,
            bound.len()
        ))
    })?;

    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        set.columns.join(", "),
        table,
        filter
    );
    let width = set.columns.len();
    let result = conn.query_row(&sql, params_from_iter(where_args.iter()), |row| {
        (0..width)
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()
    });

    match result {
        Ok(values) => Ok(render_values(&values)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NoEntry(table.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Execute `sql`, counting rows for statements that return them.
fn run_statement(conn: &Connection, sql: &str, bound: &[Value]) -> rusqlite::Result<usize> {
    let mut prepared = conn.prepare(sql)?;
    if prepared.column_count() == 0 {
        return prepared.execute(params_from_iter(bound.iter()));
    }

    let mut rows = prepared.query(params_from_iter(bound.iter()))?;
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}

fn collect_rows(conn: &Connection, sql: &str, bound: &[Value]) -> DatabaseResult<Vec<Row>> {
    let mut prepared = conn.prepare(sql)?;
    let columns: Vec<String> = prepared
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = prepared.query(params_from_iter(bound.iter()))?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collected.push(Row {
            columns: columns.clone(),
            values,
        });
    }
    Ok(collected)
}

fn literal_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)(\bLIKE\s+|=\s*)'((?:[^']|'')*)'").ok())
        .as_ref()
}

/// Replace `LIKE '...'` and `= '...'` literals with `?`, merging the literal
/// values into `args` at their positional slots.
pub fn inline_literals(sql: &str, args: &[Value]) -> (String, Vec<Value>) {
    let Some(pattern) = literal_pattern() else {
        return (sql.to_string(), args.to_vec());
    };

    let mut rewritten = String::with_capacity(sql.len());
    let mut merged = Vec::with_capacity(args.len());
    let mut remaining = args.iter();
    let mut last = 0;

    for captures in pattern.captures_iter(sql) {
        let (Some(whole), Some(operator), Some(literal)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        let segment = &sql[last..whole.start()];
        merged.extend(remaining.by_ref().take(segment.matches('?').count()).cloned());
        merged.push(Value::Str(literal.as_str().replace("''", "'")));

        rewritten.push_str(segment);
        rewritten.push_str(operator.as_str());
        rewritten.push('?');
        last = whole.end();
    }

    rewritten.push_str(&sql[last..]);
    merged.extend(remaining.cloned());
    (rewritten, merged)
}
