//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::LocationId;
use domain::DEFAULT_MAX_RETRIES;

/// How log lines are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Plain
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for structured output, anything else for plain
/// - `REMOTE_CALL_TIMEOUT_MS`: limit on catalog and inventory calls (default `5000`)
/// - `COMMAND_MAX_RETRIES`: optimistic-concurrency retries per command (default `5`)
/// - `RECEIVING_LOCATION_ID`: where purchase-order receipts land (default `1`)
/// - `EVENT_HISTORY_LIMIT`: published events kept for inspection (default `1024`)
/// - `DATABASE_URL`: Postgres store when set, in-memory otherwise
///
/// Unparseable numbers fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub remote_call_timeout: Duration,
    pub command_max_retries: u32,
    pub receiving_location: LocationId,
    pub event_history_limit: usize,
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            remote_call_timeout: number("REMOTE_CALL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.remote_call_timeout),
            command_max_retries: number("COMMAND_MAX_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.command_max_retries),
            receiving_location: lookup("RECEIVING_LOCATION_ID")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map(LocationId::new)
                .unwrap_or(defaults.receiving_location),
            event_history_limit: number("EVENT_HISTORY_LIMIT")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.event_history_limit),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            remote_call_timeout: Duration::from_millis(5000),
            command_max_retries: DEFAULT_MAX_RETRIES,
            receiving_location: LocationId::new(1),
            event_history_limit: 1024,
            database_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_pairs(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Plain);
        assert_eq!(config.remote_call_timeout, Duration::from_secs(5));
        assert_eq!(config.command_max_retries, 5);
        assert_eq!(config.receiving_location, LocationId::new(1));
        assert_eq!(config.event_history_limit, 1024);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("REMOTE_CALL_TIMEOUT_MS", "250"),
            ("COMMAND_MAX_RETRIES", "9"),
            ("RECEIVING_LOCATION_ID", "4"),
            ("EVENT_HISTORY_LIMIT", "16"),
            ("DATABASE_URL", "postgres://localhost/ledger"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.remote_call_timeout, Duration::from_millis(250));
        assert_eq!(config.command_max_retries, 9);
        assert_eq!(config.receiving_location, LocationId::new(4));
        assert_eq!(config.event_history_limit, 16);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ledger"));
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let config = from_pairs(&[("PORT", "eighty"), ("COMMAND_MAX_RETRIES", "-1"), ("DATABASE_URL", "")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.command_max_retries, 5);
        assert!(config.database_url.is_none());
    }
}
