//! Encrypted, audited SQLite access for sqlvault tenant databases.
//!
//! - [`ValueCodec`] encrypts bound values behind a type header
//! - [`SqlWrapper`] runs statements in transactions and audits them
//! - [`AuditRecorder`] appends rows to `__transactions`
//! - [`create_databases`] creates schemas on first start

mod audit;
mod bootstrap;
pub mod codec;
pub mod encryption;
mod error;
pub mod ids;
pub mod models;
mod statement;
mod value;
mod wrapper;

pub use audit::{AuditEntry, AuditRecorder, AuditSettings};
pub use bootstrap::{
    column_definitions, create_databases, ensure_database, is_supported_column_type,
    validate_table, BootstrapOutcome, DefaultCredentials,
};
pub use codec::ValueCodec;
pub use error::{DatabaseError, DatabaseResult};
pub use models::{AuditRecord, AuditStatus};
pub use statement::{where_entry_id, where_eq, Action, SetClause, Statement};
pub use value::{render_values, OriginalFormat, Value};
pub use wrapper::{inline_literals, ExecMode, ExecOutcome, Row, SqlWrapper, WrapperOptions};
