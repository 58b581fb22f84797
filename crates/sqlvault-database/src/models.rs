//! Reserved names and system table records.

use serde::{Deserialize, Serialize};

/// Prefix reserved for system tables.
pub const TABLE_PREFIX: &str = "__";
/// Prefix reserved for system columns.
pub const COLUMN_PREFIX: &str = "sys_";
/// Prefix carried by every role name.
pub const ROLE_PREFIX: &str = "__db:";

pub const METADATA_TABLE: &str = "__metadata";
pub const USERS_TABLE: &str = "__users";
pub const JWT_TABLE: &str = "__jwts";
pub const TRANSACTIONS_TABLE: &str = "__transactions";

/// Synthetic entry identifier column appended to every user table.
pub const ENTRY_ID_COLUMN: &str = "sys_eid";
pub const ENTRY_ID_PREFIX: &str = "eid::";
pub const ENTRY_ID_SUFFIX: &str = "::eid";

/// Acting user id for statements issued by sqlvault itself.
pub const SYSTEM_USER_ID: &str = "__db:system";

pub const ROLE_ADMIN: &str = "__db:admin";
pub const ROLE_USER: &str = "__db:user";
pub const ROLE_READONLY: &str = "__db:readonly";

/// Roles granted to the seeded default user.
pub const DEFAULT_ROLES: &[&str] = &[ROLE_ADMIN];

pub const USER_ID_LENGTH: usize = 6;
pub const USER_PASSWORD_LENGTH: usize = 32;
pub const RANDOM_ID_LENGTH: usize = 32;

/// Whether `table` is one of the reserved system tables (or uses their prefix).
pub fn is_system_table(table: &str) -> bool {
    table.starts_with(TABLE_PREFIX)
}

/// Outcome stored with an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Error => "ERROR",
        }
    }
}

/// One row of `__transactions` as read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: String,
    pub user_id: Option<String>,
    pub action_type: String,
    pub affected_table: String,
    pub record_id: String,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
}

impl AuditRecord {
    /// Whether the audited statement was rolled back.
    pub fn rolled_back(&self) -> bool {
        self.action_type.ends_with("(ROLLBACK)")
    }
}
