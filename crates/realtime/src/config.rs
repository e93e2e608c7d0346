use std::str::FromStr;
use std::time::Duration;

/// Exponential-backoff parameters for automatic reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Factor by which the delay grows with each attempt.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Attempts made before giving up with `ReconnectExhausted`.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Connection settings for the real-time channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConfig {
    /// Channel base address, e.g. `wss://rota.example.com`. `/ws` is appended.
    pub url: String,
    /// Upper bound on a single connect or reconnect attempt.
    pub connect_timeout: Duration,
    /// Keepalive ping interval. `None` disables client pings.
    pub ping_interval: Option<Duration>,
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".into(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Some(Duration::from_secs(25)),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default               |
    /// |--------------------------------|-----------------------|
    /// | `ROTA_REALTIME_URL`            | `ws://localhost:3000` |
    /// | `ROTA_CONNECT_TIMEOUT_SECS`    | `10`                  |
    /// | `ROTA_PING_INTERVAL_SECS`      | `25` (`0` disables)   |
    /// | `ROTA_RECONNECT_BASE_DELAY_MS` | `1000`                |
    /// | `ROTA_RECONNECT_MULTIPLIER`    | `2`                   |
    /// | `ROTA_RECONNECT_MAX_ATTEMPTS`  | `5`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("ROTA_REALTIME_URL").unwrap_or_else(|| "ws://localhost:3000".into());
        let url = url.trim_end_matches('/').to_string();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                key: "ROTA_REALTIME_URL",
                value: url,
            });
        }

        let connect_timeout_secs: u64 = parse_or(&lookup, "ROTA_CONNECT_TIMEOUT_SECS", 10)?;
        let ping_interval_secs: u64 = parse_or(&lookup, "ROTA_PING_INTERVAL_SECS", 25)?;
        let base_delay_ms: u64 = parse_or(&lookup, "ROTA_RECONNECT_BASE_DELAY_MS", 1000)?;
        let multiplier: f64 = parse_or(&lookup, "ROTA_RECONNECT_MULTIPLIER", 2.0)?;
        let max_attempts: u32 = parse_or(&lookup, "ROTA_RECONNECT_MAX_ATTEMPTS", 5)?;

        if multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "ROTA_RECONNECT_MULTIPLIER",
                value: multiplier.to_string(),
            });
        }

        Ok(Self {
            url,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            ping_interval: (ping_interval_secs > 0).then(|| Duration::from_secs(ping_interval_secs)),
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(base_delay_ms),
                multiplier,
                max_attempts,
                ..ReconnectConfig::default()
            },
        })
    }
}

/// Presentation settings for the native notification bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// How long a non-urgent alert stays visible.
    pub auto_dismiss: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            auto_dismiss: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    /// Reads `ROTA_ALERT_DISMISS_SECS` (default `5`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs: u64 = parse_or(&lookup, "ROTA_ALERT_DISMISS_SECS", 5)?;
        Ok(Self {
            auto_dismiss: Duration::from_secs(secs),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable is set but cannot be used.
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}
