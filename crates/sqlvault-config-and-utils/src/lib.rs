//! Configuration, filesystem layout, logging and key material for sqlvault.

mod config;
mod error;
pub mod key_material;
mod logging;
mod paths;

pub use config::{
    ColumnDefinition, Config, DatabaseDefinition, DefaultUserConfig, EncryptionConfig, JwtConfig,
    LoggingConfig, SessionConfig, StorageConfig, TableDefinition, TransactionLoggingConfig,
    DEFAULT_LOG_LEVEL, DEFAULT_STORAGE_PATH,
};
pub use error::{CoreError, CoreResult};
pub use key_material::{resolve_cipher_key, CipherKey, KEY_SIZE, NONCE_SIZE};
pub use logging::{init_logging, parse_level, LogFileWriter};
pub use paths::Paths;
