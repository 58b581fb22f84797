//! sqlvault - encrypted, audited multi-tenant SQLite.

mod app;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlvault_config_and_utils::{init_logging, Config, Paths};

/// sqlvault command-line interface.
#[derive(Parser)]
#[command(name = "sqlvault")]
#[command(about = "Encrypted, audited multi-tenant SQLite databases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file. Defaults to ~/.sqlvault/config.json
    #[arg(short, long, env = "SQLVAULT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every configured database that does not exist yet
    Bootstrap,
    /// Print the default configuration as JSON
    GenerateConfig,
    /// Print the most recent audit entries of a database as JSON lines
    AuditLog {
        database: String,
        /// Number of entries to print
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Check credentials and issue a session token
    Login {
        database: String,
        #[arg(short, long)]
        user: String,
        #[arg(short, long, env = "SQLVAULT_LOGIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Bootstrap);

    if let Commands::GenerateConfig = command {
        println!("{}", Config::default_json()?);
        return Ok(());
    }

    let config_path = match cli.config {
        Some(path) => path,
        None => Paths::default_config_file()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let level = cli
        .log_level
        .unwrap_or_else(|| config.effective_log_level().to_string());
    init_logging(&level, config.log_file.as_deref())?;

    match command {
        Commands::Bootstrap => app::run_bootstrap(&config),
        Commands::AuditLog { database, limit } => app::print_audit_log(&config, &database, limit),
        Commands::Login {
            database,
            user,
            password,
        } => app::login(&config, &database, &user, &password),
        Commands::GenerateConfig => Ok(()),
    }
}
