//! Audit recorder for `__transactions`.
//!
//! Every audited statement appends one row through a separate connection,
//! written in [`ExecMode::AuditWrite`] so the write is never audited itself.

use crate::ids::{create_record_id, system_record_id};
use crate::models::{is_system_table, AuditRecord, AuditStatus, SYSTEM_USER_ID, TRANSACTIONS_TABLE};
use crate::statement::{Action, Statement};
use crate::wrapper::{ExecMode, SqlWrapper, WrapperOptions};
use crate::{DatabaseError, DatabaseResult, Value};
use sqlvault_config_and_utils::TransactionLoggingConfig;
use std::path::PathBuf;
use tracing::{debug, warn};

const AUDIT_COLUMNS: [&str; 9] = [
    "user_id",
    "action_type",
    "affected_table",
    "record_id",
    "old_values",
    "new_values",
    "ip_address",
    "status",
    "error_message",
];

/// Audit trail switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSettings {
    pub enabled: bool,
    /// Accepted but not acted on: SELECT statements are never recorded.
    pub log_select_queries: bool,
}

impl From<&TransactionLoggingConfig> for AuditSettings {
    fn from(config: &TransactionLoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            log_select_queries: config.log_select_queries,
        }
    }
}

/// One audit row to write.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub user_id: String,
    /// Verb, possibly suffixed with `(ROLLBACK)`.
    pub action: String,
    pub table: String,
    pub record_id: Option<String>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub status: AuditStatus,
    pub error: Option<String>,
}

fn non_empty(value: Option<String>) -> Value {
    match value {
        Some(text) if !text.is_empty() => Value::Str(text),
        _ => Value::Null,
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecorder {
    path: PathBuf,
    settings: AuditSettings,
}

impl AuditRecorder {
    pub fn new(path: PathBuf, settings: AuditSettings) -> Self {
        Self { path, settings }
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Whether a statement with this verb produces an audit row.
    pub fn records(&self, action: Action) -> bool {
        self.settings.enabled && action != Action::Select
    }

    /// Record id to store, synthesizing one for CREATE and system tables.
    pub fn resolve_record_id(
        &self,
        action: &str,
        table: &str,
        candidate: Option<String>,
    ) -> DatabaseResult<String> {
        let verb = action.split(['(', ' ']).next().unwrap_or(action);
        match candidate.filter(|id| !id.is_empty()) {
            Some(id) => Ok(id),
            None if verb == Action::Create.as_str() => Ok(create_record_id(table)),
            None if is_system_table(table) => Ok(system_record_id(verb)),
            None => Err(DatabaseError::RecordIdentification {
                action: action.to_string(),
                table: table.to_string(),
            }),
        }
    }

    /// Append one audit row.
    pub fn record(&self, entry: AuditEntry) -> DatabaseResult<()> {
        if !self.settings.enabled {
            return Ok(());
        }

        if entry.action.starts_with(Action::Select.as_str()) {
            if self.settings.log_select_queries {
                warn!(
                    table = %entry.table,
                    "SELECT audit logging is enabled but not implemented, nothing recorded"
                );
            }
            return Ok(());
        }

        if entry.action.trim().is_empty() {
            return Err(DatabaseError::Audit("action type is required".to_string()));
        }
        if entry.table.trim().is_empty() {
            return Err(DatabaseError::Audit("affected table is required".to_string()));
        }

        let record_id = self.resolve_record_id(&entry.action, &entry.table, entry.record_id)?;

        let args = vec![
            non_empty(Some(entry.user_id)),
            Value::Str(entry.action.clone()),
            Value::Str(entry.table.clone()),
            Value::Str(record_id),
            non_empty(entry.old_values),
            non_empty(entry.new_values),
            non_empty(entry.ip_address),
            Value::Str(entry.status.as_str().to_string()),
            non_empty(entry.error),
        ];

        let options = WrapperOptions {
            key: None,
            audit: self.settings.clone(),
        };
        let mut wrapper = SqlWrapper::open(&self.path, options)?;
        wrapper.execute_with(
            Statement::insert(TRANSACTIONS_TABLE, &AUDIT_COLUMNS),
            SYSTEM_USER_ID,
            &args,
            ExecMode::AuditWrite,
        )?;

        debug!(
            action = %entry.action,
            table = %entry.table,
            status = entry.status.as_str(),
            "Recorded audit entry"
        );
        Ok(())
    }

    /// Most recent audit rows, newest first.
    pub fn recent(&self, limit: usize) -> DatabaseResult<Vec<AuditRecord>> {
        let options = WrapperOptions {
            key: None,
            audit: AuditSettings::default(),
        };
        let wrapper = SqlWrapper::open(&self.path, options)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = wrapper.query(
            format!(
                "SELECT id, timestamp, {} FROM {} ORDER BY id DESC LIMIT ?",
                AUDIT_COLUMNS.join(", "),
                TRANSACTIONS_TABLE
            ),
            &[Value::Int64(limit)],
        )?;

        rows.into_iter()
            .map(|row| {
                let text = |column: &str| -> Option<String> {
                    match row.get(column) {
                        None | Some(Value::Null) => None,
                        Some(value) => Some(value.to_string()),
                    }
                };
                let required = |column: &str| -> DatabaseResult<String> {
                    text(column).ok_or_else(|| {
                        DatabaseError::Audit(format!("audit row is missing {}", column))
                    })
                };

                Ok(AuditRecord {
                    id: row.get("id").and_then(Value::as_i64).unwrap_or_default(),
                    timestamp: required("timestamp")?,
                    user_id: text("user_id"),
                    action_type: required("action_type")?,
                    affected_table: required("affected_table")?,
                    record_id: required("record_id")?,
                    old_values: text("old_values"),
                    new_values: text("new_values"),
                    ip_address: text("ip_address"),
                    status: required("status")?,
                    error_message: text("error_message"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(enabled: bool) -> AuditRecorder {
        AuditRecorder::new(
            PathBuf::from("/nonexistent/never-opened.db"),
            AuditSettings {
                enabled,
                log_select_queries: false,
            },
        )
    }

    fn entry(action: &str, table: &str) -> AuditEntry {
        AuditEntry {
            user_id: "u1".to_string(),
            action: action.to_string(),
            table: table.to_string(),
            record_id: None,
            old_values: None,
            new_values: None,
            ip_address: None,
            status: AuditStatus::Success,
            error: None,
        }
    }

    #[test]
    fn test_disabled_recorder_is_noop() {
        // The path is never opened when auditing is off.
        recorder(false).record(entry("INSERT", "widgets")).unwrap();
    }

    #[test]
    fn test_select_is_noop() {
        let mut recorder = recorder(true);
        recorder.record(entry("SELECT", "widgets")).unwrap();
        recorder.settings.log_select_queries = true;
        recorder.record(entry("SELECT", "widgets")).unwrap();
        assert!(!recorder.records(Action::Select));
        assert!(recorder.records(Action::Insert));
    }

    #[test]
    fn test_required_fields() {
        assert!(matches!(
            recorder(true).record(entry("", "widgets")),
            Err(DatabaseError::Audit(_))
        ));
        assert!(matches!(
            recorder(true).record(entry("INSERT", " ")),
            Err(DatabaseError::Audit(_))
        ));
    }

    #[test]
    fn test_record_id_resolution() {
        let recorder = recorder(true);
        assert_eq!(
            recorder
                .resolve_record_id("UPDATE", "widgets", Some("eid::x::eid".into()))
                .unwrap(),
            "eid::x::eid"
        );
        assert!(recorder
            .resolve_record_id("CREATE", "widgets", None)
            .unwrap()
            .starts_with("create-widgets-"));
        assert!(recorder
            .resolve_record_id("INSERT(ROLLBACK)", "__users", None)
            .unwrap()
            .starts_with("system-insert-"));
        assert!(recorder
            .resolve_record_id("CREATE(ROLLBACK)", "widgets", None)
            .unwrap()
            .starts_with("create-widgets-"));
        assert!(matches!(
            recorder.resolve_record_id("UPDATE", "widgets", Some(String::new())),
            Err(DatabaseError::RecordIdentification { .. })
        ));
    }
}
