//! Configuration types for batch-dl

use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

use crate::error::{Error, Result};

/// Engine configuration, fixed at construction
///
/// Every field has a default, so a partial JSON/TOML document (or
/// `..Default::default()`) is enough to build a usable engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Number of workers, and therefore the maximum number of in-flight requests (default: 8)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for a single task, covering response headers and body copy (default: 5s)
    #[serde(default = "default_task_timeout", with = "duration_serde")]
    pub task_timeout: Duration,

    /// How long `stop()` waits for in-flight tasks before aborting them (default: 10s)
    #[serde(default = "default_stop_timeout", with = "duration_serde")]
    pub stop_timeout: Duration,

    /// TCP/TLS connect timeout for the HTTP client (None = reqwest default)
    #[serde(default, with = "optional_duration_serde")]
    pub connect_timeout: Option<Duration>,

    /// `Accept` header sent with every request
    #[serde(default = "default_accept")]
    pub accept: String,

    /// `User-Agent` header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Additional headers sent with every request (task headers take precedence)
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    /// Listen for SIGINT/SIGTERM during a run and stop gracefully (default: true)
    ///
    /// Signal handlers are process-wide and tokio keeps them registered once
    /// installed: after the first run, SIGINT/SIGTERM no longer terminate the
    /// process by default. Host programs that rely on the default Ctrl+C
    /// behavior, or install their own handling, should set this to `false`
    /// and call [`BatchDownloader::stop`](crate::BatchDownloader::stop) themselves.
    #[serde(default = "default_true")]
    pub handle_signals: bool,

    /// Create missing parent directories of a destination before writing (default: true)
    #[serde(default = "default_true")]
    pub create_parent_dirs: bool,

    /// Event broadcast buffer size (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout: default_task_timeout(),
            stop_timeout: default_stop_timeout(),
            connect_timeout: None,
            accept: default_accept(),
            user_agent: default_user_agent(),
            default_headers: HashMap::new(),
            handle_signals: true,
            create_parent_dirs: true,
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Check every setting, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(config_error(
                "max_concurrency must be greater than zero",
                "max_concurrency",
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(config_error(
                "task_timeout must be greater than zero",
                "task_timeout",
            ));
        }
        if self.stop_timeout.is_zero() {
            return Err(config_error(
                "stop_timeout must be greater than zero",
                "stop_timeout",
            ));
        }
        if self.event_capacity == 0 {
            return Err(config_error(
                "event_capacity must be greater than zero",
                "event_capacity",
            ));
        }
        self.request_headers().map(|_| ())
    }

    /// Default headers for every request: Accept, User-Agent, then `default_headers`
    pub fn request_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, header_value(&self.accept, "accept")?);
        headers.insert(USER_AGENT, header_value(&self.user_agent, "user_agent")?);
        for (name, value) in &self.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                config_error(
                    format!("invalid header name '{}': {}", name, e),
                    "default_headers",
                )
            })?;
            headers.insert(name, header_value(value, "default_headers")?);
        }
        Ok(headers)
    }
}

fn header_value(value: &str, key: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| config_error(format!("invalid header value '{}': {}", value, e), key))
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_max_concurrency() -> usize {
    8
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_accept() -> String {
    "image/avif,image/webp,*/*".to_string()
}

fn default_user_agent() -> String {
    concat!("batch-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1000
}

// Durations are written as (possibly fractional) seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(D::Error::custom))
            .transpose()
    }
}
