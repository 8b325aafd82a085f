//! Layered settings: serde defaults, then an optional file, then `RELAY_*`
//! environment variables (`RELAY_SERVER__PORT=9090`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::alarm::DEFAULT_THRESHOLD;
use crate::error::RelayResult;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub server: ServerSettings,
    pub alarm: AlarmSettings,
    pub metrics: MetricsSettings,
    pub log_filter: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    /// Bound of the adapter -> pipeline channel.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Extra static files (the alarm sound) served for unmatched paths.
    pub assets_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmSettings {
    pub threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub listen_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            server: ServerSettings::default(),
            alarm: AlarmSettings::default(),
            metrics: MetricsSettings::default(),
            log_filter: "info".into(),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "test.mosquitto.org".into(),
            port: 1883,
            client_id: format!("stocklevel-relay-{}", std::process::id()),
            topic: "Stock_Level".into(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 1000,
            channel_capacity: 64,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { listen_port: 9000 }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> RelayResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

impl BrokerSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
