use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root directory for the local JSON store (one file per collection,
    /// plus `backups/`).
    pub data_dir: PathBuf,

    /// Remote database connection string. `None` runs local-only.
    pub mongo_uri: Option<String>,

    /// Database name on the remote side.
    pub mongo_db: String,

    /// Per-operation timeout against the remote, in seconds.
    pub remote_timeout_secs: u64,
}

/// Global CLI options, merged over `SECURECLOUD_*` environment variables.
#[derive(clap::Args, Debug)]
pub struct GlobalArgs {
    /// Local data directory (overrides SECURECLOUD_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Remote database URI (overrides SECURECLOUD_MONGO_URI)
    #[arg(long, global = true)]
    pub mongo_uri: Option<String>,

    /// Remote database name (overrides SECURECLOUD_MONGO_DB)
    #[arg(long, global = true)]
    pub mongo_db: Option<String>,

    /// Remote operation timeout in seconds (overrides SECURECLOUD_REMOTE_TIMEOUT_SECS)
    #[arg(long, global = true)]
    pub remote_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Merge CLI arguments over environment variables.
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        // --- Environment fallback ---
        let env_data_dir = env::var("SECURECLOUD_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let env_mongo_uri = env::var("SECURECLOUD_MONGO_URI").ok();
        let env_mongo_db =
            env::var("SECURECLOUD_MONGO_DB").unwrap_or_else(|_| "securecloud".into());
        let env_timeout = match env::var("SECURECLOUD_REMOTE_TIMEOUT_SECS") {
            Ok(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing SECURECLOUD_REMOTE_TIMEOUT_SECS value `{value}`"))?,
            Err(env::VarError::NotPresent) => 5,
            Err(err) => return Err(err).context("reading SECURECLOUD_REMOTE_TIMEOUT_SECS"),
        };

        // --- Merge ---
        Ok(Self {
            data_dir: args
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(env_data_dir)),
            mongo_uri: args.mongo_uri.clone().or(env_mongo_uri),
            mongo_db: args.mongo_db.clone().unwrap_or(env_mongo_db),
            remote_timeout_secs: args.remote_timeout_secs.unwrap_or(env_timeout),
        })
    }
}
