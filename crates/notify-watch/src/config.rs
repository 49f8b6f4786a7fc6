use std::path::Path;

use notify_realtime::Config;
use serde::{Deserialize, Serialize};

use crate::error::{WatchError, WatchResult};

/// Contents of `notify-watch.yaml`.
///
/// ```yaml
/// realtime:
///   push_url: wss://push.example.com/ws/notifications
///   api_base_url: https://api.example.com/api
///   reconnect_interval_ms: 5000
/// topics: [billing, security]
/// ```
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub realtime: Config,
    pub topics: Vec<String>,
}

impl WatchConfig {
    /// Apply command-line overrides on top of the file values.
    pub fn with_overrides(mut self, push_url: Option<String>, api_url: Option<String>) -> Self {
        if let Some(url) = push_url {
            self.realtime.push_url = url;
        }
        if let Some(url) = api_url {
            self.realtime.api_base_url = url;
        }
        self
    }
}

/// Load a watch config from a YAML file. Fields left out keep their defaults.
pub async fn load(path: &Path) -> WatchResult<WatchConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| WatchError::Config(format!("read {}: {e}", path.display())))?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| WatchError::Config(format!("parse {}: {e}", path.display())))
}
