//! Command implementations.

mod audit_log;
mod init;
mod session;

pub use audit_log::print_audit_log;
pub use init::run_bootstrap;
pub use session::login;
