#![allow(dead_code)]

use sqlvault_auth::Authenticator;
use sqlvault_config_and_utils::{
    CipherKey, DatabaseDefinition, DefaultUserConfig, JwtConfig, Paths,
};
use sqlvault_database::models::USERS_TABLE;
use sqlvault_database::{
    ensure_database, AuditSettings, SqlWrapper, Statement, Value, WrapperOptions,
};
use tempfile::TempDir;

pub const DATABASE: &str = "shop";
pub const ADMIN_NAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct-horse-battery";

pub struct TestAuth {
    pub dir: TempDir,
    pub paths: Paths,
    pub options: WrapperOptions,
    pub auth: Authenticator,
}

pub fn jwt(enabled: bool, timeout: &str) -> JwtConfig {
    JwtConfig {
        enabled,
        timeout: timeout.to_string(),
    }
}

pub fn setup(encrypted: bool) -> TestAuth {
    setup_with(encrypted, jwt(true, "1h"))
}

/// Bootstrap a database with only the system tables and the default admin.
pub fn setup_with(encrypted: bool, jwt: JwtConfig) -> TestAuth {
    let dir = TempDir::new().expect("failed to create temp dir");
    let paths = Paths::with_base_dir(dir.path().join("storage"));
    let options = WrapperOptions {
        key: encrypted.then(CipherKey::generate),
        audit: AuditSettings {
            enabled: true,
            log_select_queries: false,
        },
    };
    let definition = DatabaseDefinition {
        name: DATABASE.to_string(),
        version: 3,
        tables: vec![],
    };
    let default_user = DefaultUserConfig {
        name: ADMIN_NAME.to_string(),
        password: ADMIN_PASSWORD.to_string(),
    };
    ensure_database(&paths, &definition, &default_user, &options).expect("bootstrap failed");

    let auth = Authenticator::new(paths.clone(), options.clone(), jwt);
    TestAuth {
        dir,
        paths,
        options,
        auth,
    }
}

impl TestAuth {
    pub fn wrapper(&self) -> SqlWrapper {
        SqlWrapper::open(&self.paths.database_file(DATABASE), self.options.clone())
            .expect("failed to open wrapper")
    }

    /// Insert a user with the given roles, returning its id.
    pub fn add_user(&self, id: &str, name: &str, password: &str, roles: &[&str]) -> String {
        let roles = serde_json::to_string(roles).expect("failed to encode roles");
        self.wrapper()
            .execute(
                Statement::insert(USERS_TABLE, &["id", "name", "password", "roles"]),
                "test",
                &[
                    Value::from(id),
                    Value::from(name),
                    Value::from(password),
                    Value::from(roles),
                ],
            )
            .expect("failed to add user");
        id.to_string()
    }

    pub fn admin_id(&self) -> String {
        self.auth
            .check_credentials(DATABASE, ADMIN_NAME, ADMIN_PASSWORD)
            .expect("credential check failed")
            .expect("default admin missing")
            .id
    }
}
