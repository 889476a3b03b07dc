//! Server configuration.
//!
//! Values come from environment variables and can be overridden by command
//! line flags:
//! - `LAB_RESERVATIONS_HOST` - Bind address (default: `127.0.0.1`)
//! - `LAB_RESERVATIONS_PORT` - HTTP port (default: `3000`)
//! - `LAB_RESERVATIONS_DATABASE` - SQLite file (default: the platform data directory)
//!
//! Authentication settings live in [`crate::api::SecurityConfig`].

use std::path::PathBuf;

use anyhow::Result;

use crate::db::Database;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_path: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port = match lookup("LAB_RESERVATIONS_PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring invalid LAB_RESERVATIONS_PORT: {}", raw);
                defaults.port
            }),
            None => defaults.port,
        };

        Self {
            host: lookup("LAB_RESERVATIONS_HOST").unwrap_or(defaults.host),
            port,
            database_path: lookup("LAB_RESERVATIONS_DATABASE").map(PathBuf::from),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Open the configured database and bring its schema up to date.
    pub fn open_database(&self) -> Result<Database> {
        let db = match &self.database_path {
            Some(path) => Database::open(path.clone())?,
            None => Database::open_default()?,
        };
        db.migrate()?;
        Ok(db)
    }
}
