//! Client configuration
//!
//! Loaded from TOML, overridable through `EYEX_*` environment variables, and
//! validated before a session starts. Every field has a default, so an empty
//! file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use eyex_core::constants::{
    DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_TIME_SYNC_INTERVAL_MS, DEFAULT_WEBSOCKET_URL,
};
use eyex_core::{EyeXError, Rect, Result};
use eyex_transport::CommunicatorConfig;
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`ClientConfig::merge_with_env`]
pub const ENV_PREFIX: &str = "EYEX_";

/// Runtime configuration of one client session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Engine endpoint
    pub url: String,
    /// Delay between reconnect attempts, in milliseconds
    pub reconnect_interval_ms: u64,
    /// Delay between time-sync requests, in milliseconds
    pub time_sync_interval_ms: u64,
    /// Optional request timeout, in milliseconds; unset waits for disconnect
    pub request_timeout_ms: Option<u64>,
    /// Upper bound for opening the socket, in milliseconds
    pub connect_timeout_ms: u64,
    /// Smallest cell the spatial cache splits down to
    pub cache_min_size: f64,
    /// Virtual bounds reported by the default identity converter
    pub virtual_bounds: Rect,
    /// Master page id sent in the slave handshake
    pub master_id: Option<String>,
    /// This page's slave id
    pub slave_id: Option<String>,
    /// Token authorizing this page
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEBSOCKET_URL.to_string(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            time_sync_interval_ms: DEFAULT_TIME_SYNC_INTERVAL_MS,
            request_timeout_ms: None,
            connect_timeout_ms: 5_000,
            cache_min_size: 100.0,
            virtual_bounds: Rect::new(0.0, 0.0, 1920.0, 1080.0),
            master_id: None,
            slave_id: None,
            token: None,
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EyeXError::configuration(format!("Invalid TOML: {e}")))
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EyeXError::configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `EYEX_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `EYEX_*` overrides from the given variables
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "URL" => self.url = value,
                "RECONNECT_INTERVAL_MS" => self.reconnect_interval_ms = parse_number(&key, &value)?,
                "TIME_SYNC_INTERVAL_MS" => self.time_sync_interval_ms = parse_number(&key, &value)?,
                "REQUEST_TIMEOUT_MS" => self.request_timeout_ms = Some(parse_number(&key, &value)?),
                "CONNECT_TIMEOUT_MS" => self.connect_timeout_ms = parse_number(&key, &value)?,
                "MASTER_ID" => self.master_id = Some(value),
                "SLAVE_ID" => self.slave_id = Some(value),
                "TOKEN" => self.token = Some(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Check that the configuration can drive a session
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(EyeXError::configuration(format!(
                "url must use ws:// or wss://, got {}",
                self.url
            )));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(EyeXError::configuration("reconnect_interval_ms must be positive"));
        }
        if self.time_sync_interval_ms == 0 {
            return Err(EyeXError::configuration("time_sync_interval_ms must be positive"));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(EyeXError::configuration("request_timeout_ms must be positive when set"));
        }
        if !(self.cache_min_size > 0.0) {
            return Err(EyeXError::configuration("cache_min_size must be positive"));
        }
        Ok(())
    }

    /// Communicator settings
    pub fn communicator_config(&self) -> CommunicatorConfig {
        CommunicatorConfig {
            url: self.url.clone(),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            time_sync_interval: Duration::from_millis(self.time_sync_interval_ms),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| EyeXError::configuration(format!("{key} must be a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn defaults_match_engine_conventions() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "ws://127.0.0.1:44049");
        assert_eq!(config.reconnect_interval_ms, 2_000);
        assert_eq!(config.time_sync_interval_ms, 10_000);
        assert_eq!(config.request_timeout_ms, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            url = "ws://localhost:1234"
            request_timeout_ms = 30000
            slave_id = "frame-2"
            "#,
        )
        .unwrap();
        assert_eq!(config.url, "ws://localhost:1234");
        assert_eq!(config.request_timeout_ms, Some(30_000));
        assert_eq!(config.slave_id.as_deref(), Some("frame-2"));
        assert_eq!(config.reconnect_interval_ms, 2_000);
        assert_eq!(
            config.communicator_config().request_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_min_size = 50.0").unwrap();
        let config = ClientConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cache_min_size, 50.0);
    }

    #[test]
    fn environment_overrides() {
        let mut config = ClientConfig::default();
        config
            .merge_with_vars([
                ("EYEX_URL".to_string(), "wss://engine:9".to_string()),
                ("EYEX_TOKEN".to_string(), "t0k".to_string()),
                ("EYEX_RECONNECT_INTERVAL_MS".to_string(), "500".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();
        assert_eq!(config.url, "wss://engine:9");
        assert_eq!(config.token.as_deref(), Some("t0k"));
        assert_eq!(config.reconnect_interval_ms, 500);

        let bad = config.merge_with_vars([(
            "EYEX_TIME_SYNC_INTERVAL_MS".to_string(),
            "soon".to_string(),
        )]);
        assert_matches!(bad, Err(EyeXError::Configuration { .. }));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = ClientConfig {
            url: "http://127.0.0.1".to_string(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            cache_min_size: 0.0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
