//! Configuration for the signaling core
//!
//! [`CoreConfig`] gathers the timer values and table capacities. It
//! deserializes with defaults for every field, so a partial TOML file or a
//! handful of environment variables is enough:
//!
//! ```toml
//! max_transactions = 20000
//! application_session_timeout_secs = 300
//!
//! [timers]
//! t1_ms = 250
//! ```
//!
//! Environment overrides follow the layout of the file, e.g.
//! `SIPHON__TIMERS__T1_MS=250` or `SIPHON__MAX_TRANSACTIONS=20000`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DialogError, DialogResult};
use crate::transaction::TimerSettings;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "SIPHON";

/// Configuration of the transaction, session and dispatch layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Transaction timer values
    pub timers: TimerSettings,
    /// Capacity of the transaction table; beyond it new requests get 503
    pub max_transactions: usize,
    /// Capacity of the application session table
    pub max_application_sessions: usize,
    /// Idle lifetime of an application session, in seconds
    pub application_session_timeout_secs: u64,
    /// Period of the expiry sweep, in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            timers: TimerSettings::default(),
            max_transactions: 100_000,
            max_application_sessions: 50_000,
            application_session_timeout_secs: 180,
            sweep_interval_ms: 30_000,
        }
    }
}

impl CoreConfig {
    /// Load from an optional TOML file plus `SIPHON__*` environment variables
    pub fn load(path: Option<&Path>) -> DialogResult<Self> {
        let config: Self = siphon_infra_common::config::load_config(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML document
    pub fn from_toml(document: &str) -> DialogResult<Self> {
        let config: Self = siphon_infra_common::config::parse_toml(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the stack cannot run with
    pub fn validate(&self) -> DialogResult<()> {
        let invalid = |message: &str| Err(DialogError::Config { message: message.to_string() });
        if self.timers.t1_ms == 0 {
            return invalid("timers.t1_ms must be positive");
        }
        if self.timers.t2_ms < self.timers.t1_ms {
            return invalid("timers.t2_ms must not be lower than timers.t1_ms");
        }
        if self.timers.invite_retransmit_cap_ms == Some(0) {
            return invalid("timers.invite_retransmit_cap_ms must be positive when set");
        }
        if self.max_transactions == 0 {
            return invalid("max_transactions must be positive");
        }
        if self.max_application_sessions == 0 {
            return invalid("max_application_sessions must be positive");
        }
        if self.sweep_interval_ms == 0 {
            return invalid("sweep_interval_ms must be positive");
        }
        Ok(())
    }

    /// Default idle lifetime of application sessions
    pub fn application_session_timeout(&self) -> Duration {
        Duration::from_secs(self.application_session_timeout_secs)
    }

    /// Period of the expiry sweep
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timers.t1_ms, 500);
        assert_eq!(config.application_session_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_partial_toml() {
        let config = CoreConfig::from_toml("max_transactions = 10\n[timers]\nt1_ms = 100\n").unwrap();
        assert_eq!(config.max_transactions, 10);
        assert_eq!(config.timers.t1_ms, 100);
        assert_eq!(config.timers.t2_ms, 4_000);
        assert_eq!(config.max_application_sessions, 50_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = CoreConfig::from_toml("[timers]\nt1_ms = 0\n");
        assert!(matches!(result, Err(DialogError::Config { .. })));

        let config = CoreConfig {
            max_transactions: 0,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        std::env::set_var("SIPHON__MAX_TRANSACTIONS", "42");
        std::env::set_var("SIPHON__TIMERS__T1_MS", "250");
        let config = CoreConfig::load(None);
        std::env::remove_var("SIPHON__MAX_TRANSACTIONS");
        std::env::remove_var("SIPHON__TIMERS__T1_MS");

        let config = config.unwrap();
        assert_eq!(config.max_transactions, 42);
        assert_eq!(config.timers.t1_ms, 250);
        assert_eq!(config.timers.t4_ms, 5_000);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        let result = CoreConfig::load(Some(Path::new("/nonexistent/siphon.toml")));
        assert!(matches!(result, Err(DialogError::Config { .. })));
    }
}
