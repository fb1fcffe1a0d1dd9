//! Service configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:3000"
//! response_time_header = "x-response-time"
//!
//! [middleware]
//! request_timeout_ms = 30000   # omit for no deadline
//! max_body_size = 8192         # bytes of each body kept in the request log
//! truncate_bodies = true
//!
//! [log]
//! level = "info"               # RUST_LOG overrides it
//! format = "text"              # or "json"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use http::HeaderName;
use serde::Deserialize;

use crate::error::Error;
use crate::middleware::log::{DEFAULT_MAX_BODY_SIZE, RequestLog};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub middleware: MiddlewareConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// Name of the latency header stamped on every response.
    pub response_time_header: String,
}

impl ServerConfig {
    pub fn response_time_header(&self) -> Result<HeaderName, Error> {
        HeaderName::from_str(&self.response_time_header).map_err(|source| Error::InvalidHeader {
            name: self.response_time_header.clone(),
            source,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            response_time_header: "x-response-time".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiddlewareConfig {
    pub request_timeout_ms: Option<u64>,
    pub max_body_size: usize,
    pub truncate_bodies: bool,
}

impl MiddlewareConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// The request-log middleware these settings describe.
    pub fn request_log(&self) -> RequestLog {
        if self.truncate_bodies {
            RequestLog::new().max_body_size(self.max_body_size)
        } else {
            RequestLog::new().unlimited()
        }
    }
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self { request_timeout_ms: None, max_body_size: DEFAULT_MAX_BODY_SIZE, truncate_bodies: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive, e.g. `info` or `loupe=debug,info`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Text }
    }
}

impl Config {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| config_error(path, e))?;
        Self::parse(&text, path)
    }

    /// Parses and validates configuration held in memory.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, path: &Path) -> Result<Self, Error> {
        let config: Self = toml::from_str(text).map_err(|e| config_error(path, e))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), Error> {
        self.server.response_time_header()?;

        if self.middleware.request_timeout_ms == Some(0) {
            return Err(config_error(path, "middleware.request_timeout_ms must be positive"));
        }
        if self.log.level.trim().is_empty() {
            return Err(config_error(path, "log.level must not be empty"));
        }
        Ok(())
    }
}

fn config_error(path: &Path, message: impl ToString) -> Error {
    Error::Config { path: path.to_path_buf(), message: message.to_string() }
}
