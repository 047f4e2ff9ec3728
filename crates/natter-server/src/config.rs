use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub presence_timeout: i64,
}

impl Config {
    /// Read configuration from `NATTER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("NATTER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("NATTER_PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .context("NATTER_PORT must be a port number")?;
        let db_path: PathBuf = std::env::var("NATTER_DB_PATH")
            .unwrap_or_else(|_| "natter.db".into())
            .into();
        let presence_timeout: i64 = std::env::var("NATTER_PRESENCE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .context("NATTER_PRESENCE_TIMEOUT_SECS must be a number of seconds")?;

        Ok(Self {
            host,
            port,
            db_path,
            presence_timeout,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
