use crate::storage::DEFAULT_MAX_CONNECTIONS;

/// Default database file, relative to the working directory.
pub const DEFAULT_DATABASE: &str = "fundflow.db";

/// Runtime settings gathered from the command line and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database: String,
    pub max_connections: u32,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.log_filter = if verbose { "debug" } else { "info" }.to_string();
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// sqlx connection URL. `create` adds `mode=rwc` so a missing file is created.
    pub fn database_url(&self, create: bool) -> String {
        if create {
            format!("sqlite:{}?mode=rwc", self.database)
        } else {
            format!("sqlite:{}", self.database)
        }
    }
}
