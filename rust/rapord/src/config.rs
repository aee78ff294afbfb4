use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// `tracing` filter directive, e.g. `info` or `rapord=debug`.
    pub log_filter: String,
    /// Workspace opened at startup, as if `workspace.select` had been sent.
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let log_filter = env::var("RAPORD_LOG").unwrap_or_else(|_| "info".to_string());
        let workspace = env::var("RAPORD_WORKSPACE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            log_filter,
            workspace,
        }
    }
}
