use std::time::Duration;

use crawldeck_channel::reconnect::ReconnectConfig;
use crawldeck_gateway::config::{GatewayConfig, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT};
use crawldeck_registry::registry::DEFAULT_DATABASE;

/// Databases the runner's task listing understands.
const DATABASES: [&str; 3] = ["sqlite", "mysql", "all"];

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Panel configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelConfig {
    /// Runner API base URL, including the `/api` prefix.
    pub api_url: String,
    pub request_timeout: Duration,
    /// Storage backend whose tasks are listed.
    pub database: String,
    /// Interval between refreshes of running tasks.
    pub poll_interval: Duration,
    /// Realtime channel URL. No channel is opened when unset.
    pub ws_url: Option<String>,
    pub reconnect: ReconnectConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl PanelConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                            | Default                      |
    /// |------------------------------------|------------------------------|
    /// | `CRAWLDECK_API_URL`                | `http://localhost:10001/api` |
    /// | `CRAWLDECK_REQUEST_TIMEOUT_SECS`   | `30`                         |
    /// | `CRAWLDECK_DATABASE`               | `sqlite`                     |
    /// | `CRAWLDECK_POLL_INTERVAL_SECS`     | `5`                          |
    /// | `CRAWLDECK_WS_URL`                 | unset                        |
    /// | `CRAWLDECK_RECONNECT_DELAY_MS`     | `3000`                       |
    /// | `CRAWLDECK_MAX_RECONNECT_ATTEMPTS` | `5`                          |
    /// | `CRAWLDECK_CONNECT_TIMEOUT_MS`     | `10000`                      |
    /// | `LOG_FORMAT`                       | `text`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = get("CRAWLDECK_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let request_timeout = Duration::from_secs(positive(
            "CRAWLDECK_REQUEST_TIMEOUT_SECS",
            get("CRAWLDECK_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?);

        let database = get("CRAWLDECK_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        if !DATABASES.contains(&database.as_str()) {
            return Err(ConfigError::Invalid {
                var: "CRAWLDECK_DATABASE",
                value: database,
                expected: "one of sqlite, mysql, all",
            });
        }

        let poll_interval = Duration::from_secs(positive(
            "CRAWLDECK_POLL_INTERVAL_SECS",
            get("CRAWLDECK_POLL_INTERVAL_SECS"),
            DEFAULT_POLL_INTERVAL_SECS,
        )?);

        let ws_url = get("CRAWLDECK_WS_URL");

        let defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            delay: match get("CRAWLDECK_RECONNECT_DELAY_MS") {
                Some(raw) => Duration::from_millis(parse("CRAWLDECK_RECONNECT_DELAY_MS", raw)?),
                None => defaults.delay,
            },
            max_attempts: match get("CRAWLDECK_MAX_RECONNECT_ATTEMPTS") {
                Some(raw) => parse("CRAWLDECK_MAX_RECONNECT_ATTEMPTS", raw)?,
                None => defaults.max_attempts,
            },
            connect_timeout: Duration::from_millis(positive(
                "CRAWLDECK_CONNECT_TIMEOUT_MS",
                get("CRAWLDECK_CONNECT_TIMEOUT_MS"),
                defaults.connect_timeout.as_millis() as u64,
            )?),
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    expected: "text or json",
                })
            }
        };

        Ok(Self {
            api_url,
            request_timeout,
            database,
            poll_interval,
            ws_url,
            reconnect,
            log_format,
        })
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(self.api_url.clone()).with_timeout(self.request_timeout)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        var,
        value: raw,
        expected: "a non-negative integer",
    })
}

fn positive(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            expected: "a positive integer",
        }),
    }
}
