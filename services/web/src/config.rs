//! Application configuration

use anyhow::Result;
use serde::Deserialize;

/// Web application settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Show error details on error pages
    pub debug: bool,
    /// Public base URL of the site
    pub url: String,
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Session lifetime in seconds
    pub session_ttl: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            url: "http://localhost:3000".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            session_ttl: 7200,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfig from environment variables
    ///
    /// # Environment Variables
    /// - `APP_DEBUG`: Show error details (default: false)
    /// - `APP_URL`: Public base URL (default: http://localhost:3000)
    /// - `APP_HOST`: Bind address (default: 0.0.0.0)
    /// - `APP_PORT`: Bind port (default: 3000)
    /// - `APP_SESSION_TTL`: Session lifetime in seconds (default: 7200)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("debug", defaults.debug)?
            .set_default("url", defaults.url)?
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port)?
            .set_default("session_ttl", defaults.session_ttl)?
            .add_source(config::Environment::with_prefix("APP").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
