//! Connection and session configuration.
//!
//! A [`Config`] can be built in code through the `with_*` methods or
//! deserialized from a JSON file. Every field has a working default; a
//! zero-value config connects to a paper-trading gateway on localhost with a
//! random client id.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::error::GwError;

/// Default blocking-request timeout, seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway host.
    pub host: String,
    /// Gateway port (7497 paper, 7496 live).
    pub port: u16,
    /// API client id. 0 means pick a random id at connect time.
    pub client_id: i64,
    /// Replay the gateway's full state (orders, positions, account values)
    /// into the store before the session is handed to the caller.
    pub in_sync: bool,
    /// Deadline for blocking requests, seconds.
    pub timeout_secs: u64,
    /// Refuse order placement and cancellation.
    pub read_only: bool,
    /// Account to scope account-update subscriptions to. Empty means the
    /// session's default account.
    pub account: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7497,
            client_id: 0,
            in_sync: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_only: false,
            account: String::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, GwError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GwError::Config(e.to_string()))?;
        let cfg: Config = serde_json::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_client_id(mut self, client_id: i64) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_in_sync(mut self, in_sync: bool) -> Self {
        self.in_sync = in_sync;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_account(mut self, account: &str) -> Self {
        self.account = account.into();
        self
    }

    /// Effective client id: the configured one, or a fresh random id in
    /// `[1, 999999]` when unset.
    pub fn effective_client_id(&self) -> i64 {
        if self.client_id != 0 {
            return self.client_id;
        }
        rand::thread_rng().gen_range(1..=999_999)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), GwError> {
        if self.host.is_empty() {
            return Err(GwError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(GwError::Config("port must not be 0".into()));
        }
        if self.client_id < 0 {
            return Err(GwError::Config("client_id must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_paper_localhost() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 7497);
        assert!(cfg.in_sync);
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builder_chain() {
        let cfg = Config::new()
            .with_host("10.0.0.5")
            .with_port(7496)
            .with_client_id(42)
            .with_read_only(true)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, 7496);
        assert_eq!(cfg.effective_client_id(), 42);
        assert!(cfg.read_only);
        assert_eq!(cfg.timeout_secs, 5);
    }

    #[test]
    fn zero_client_id_randomizes() {
        let cfg = Config::default();
        for _ in 0..10 {
            let id = cfg.effective_client_id();
            assert!((1..=999_999).contains(&id));
        }
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(Config::default().with_host("").validate().is_err());
        assert!(Config::default().with_client_id(-1).validate().is_err());
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: Config = serde_json::from_str(r#"{"port": 4002, "account": "DU123"}"#).unwrap();
        assert_eq!(cfg.port, 4002);
        assert_eq!(cfg.account, "DU123");
        assert_eq!(cfg.host, "127.0.0.1");
    }
}
