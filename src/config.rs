//! Server configuration.
//!
//! Every field has a default, so a JSON document only needs the keys it
//! changes:
//!
//! ```json
//! { "port": 8080, "max_buffered": 16384 }
//! ```
//!
//! The same fields can be set through `HTTPWIRE_HOST`, `HTTPWIRE_PORT`,
//! `HTTPWIRE_INITIAL_CAPACITY`, `HTTPWIRE_MAX_BUFFERED`, `HTTPWIRE_MAX_HEAD`
//! and `HTTPWIRE_MAX_BODY`.

use std::env;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::http::ReadOptions;
use crate::http::request::{
    DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_BODY, DEFAULT_MAX_BUFFERED, DEFAULT_MAX_HEAD,
};

/// Errors produced while loading a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidVar { var: &'static str, value: String },
}

/// Listener address and per-connection read buffer policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Starting size of each connection's read buffer.
    pub initial_capacity: usize,
    /// Limit on unconsumed bytes buffered while waiting for a line to complete.
    pub max_buffered: usize,
    /// Limit on the start line plus header block.
    pub max_head: usize,
    /// Largest accepted `Content-Length`; larger requests get `413`.
    pub max_body: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 42069,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_buffered: DEFAULT_MAX_BUFFERED,
            max_head: DEFAULT_MAX_HEAD,
            max_body: DEFAULT_MAX_BODY,
        }
    }
}

impl ServerConfig {
    /// Parses a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds a configuration from `HTTPWIRE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(host) = env::var("HTTPWIRE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var("HTTPWIRE_PORT")? {
            config.port = port;
        }
        if let Some(capacity) = parse_var("HTTPWIRE_INITIAL_CAPACITY")? {
            config.initial_capacity = capacity;
        }
        if let Some(max) = parse_var("HTTPWIRE_MAX_BUFFERED")? {
            config.max_buffered = max;
        }
        if let Some(max) = parse_var("HTTPWIRE_MAX_HEAD")? {
            config.max_head = max;
        }
        if let Some(max) = parse_var("HTTPWIRE_MAX_BODY")? {
            config.max_body = max;
        }
        Ok(config)
    }

    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the read-loop buffer policy.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            initial_capacity: self.initial_capacity,
            max_buffered: self.max_buffered,
            max_head: self.max_head,
            max_body: self.max_body,
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_overrides_only_given_keys() {
        let config =
            ServerConfig::from_json(r#"{ "port": 8080, "max_buffered": 1024 }"#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_buffered, 1024);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            ServerConfig::from_json(r#"{ "prot": 8080 }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn read_options_follow_config() {
        let config = ServerConfig {
            initial_capacity: 32,
            max_buffered: 4096,
            max_body: 1 << 20,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.read_options(),
            ReadOptions {
                initial_capacity: 32,
                max_buffered: 4096,
                max_head: DEFAULT_MAX_HEAD,
                max_body: 1 << 20,
            }
        );
    }
}
