//! Relay a stock-level sensor from an MQTT topic to browser clients.
//!
//! Broker -> [`transform`] -> [`relay::registry::ConnectionSet`] -> every open
//! WebSocket. The page served at `/` shows the level and raises an alarm above
//! the threshold.

pub mod alarm;
pub mod broker;
pub mod config;
pub mod error;
pub mod relay;
pub mod telemetry;
pub mod transform;

pub use error::{RelayError, RelayResult};
