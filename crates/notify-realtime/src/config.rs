//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Error, Result};

pub(crate) const DEFAULT_PUSH_URL: &str = "ws://localhost:8000/ws/notifications";
pub(crate) const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_POLL_PAGE_SIZE: u32 = 20;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for [`NotificationClient::start`](crate::NotificationClient::start).
///
/// Every field has a default, so a config file only needs the fields it overrides.
/// Durations are written in milliseconds (`reconnect_interval_ms: 1000`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch. When `false`, `connect()` does nothing.
    pub enabled: bool,
    /// Connect as soon as the client starts.
    pub auto_connect: bool,
    /// Push endpoint; the credential is appended as the `token` query parameter.
    pub push_url: String,
    /// REST base URL; `/notifications/...` paths are appended.
    pub api_base_url: String,
    /// Fixed delay before each reconnect attempt.
    #[serde(rename = "reconnect_interval_ms", with = "millis")]
    pub reconnect_interval: Duration,
    /// Retries allowed before push is declared `failed`.
    pub max_reconnect_attempts: u32,
    #[serde(rename = "heartbeat_interval_ms", with = "millis")]
    pub heartbeat_interval: Duration,
    /// Force a reconnect after this many heartbeat intervals without an ack.
    /// `None` leaves dead-peer detection to the transport.
    pub heartbeat_timeout_intervals: Option<u32>,
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Fetch the notification list on every poll with a non-zero unread count,
    /// not only when the count rises.
    pub poll_list: bool,
    pub poll_page_size: u32,
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
    /// Capacity of the event channel returned by `next()`.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_connect: true,
            push_url: DEFAULT_PUSH_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout_intervals: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_list: false,
            poll_page_size: DEFAULT_POLL_PAGE_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("reconnect_interval_ms", self.reconnect_interval),
            ("heartbeat_interval_ms", self.heartbeat_interval),
            ("poll_interval_ms", self.poll_interval),
            ("connect_timeout_ms", self.connect_timeout),
            ("request_timeout_ms", self.request_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.poll_page_size == 0 {
            return Err(Error::Config("poll_page_size must be greater than zero".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be greater than zero".into()));
        }
        if self.heartbeat_timeout_intervals == Some(0) {
            return Err(Error::Config(
                "heartbeat_timeout_intervals must be greater than zero when set".into(),
            ));
        }
        url::Url::parse(&self.push_url)?;
        url::Url::parse(&self.api_base_url)?;
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.enabled);
        assert!(config.auto_connect);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"reconnect_interval_ms": 1000, "max_reconnect_attempts": 3, "poll_list": true}"#,
        )
        .unwrap();
        assert_eq!(config.reconnect_interval, Duration::from_millis(1000));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert!(config.poll_list);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn serializes_durations_as_millis() {
        let value = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(value["heartbeat_interval_ms"], 30_000);
        assert!(value.get("heartbeat_interval").is_none());
    }

    #[test]
    fn zero_interval_rejected() {
        let config = Config {
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        };
        match config.validate() {
            Err(Error::Config(msg)) => assert!(msg.contains("heartbeat_interval_ms")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_heartbeat_timeout_rejected() {
        let config = Config {
            heartbeat_timeout_intervals: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn bad_url_rejected() {
        let config = Config {
            push_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Url(_))));
    }
}
