use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker client error: {0}")]
    Broker(#[from] rumqttc::ClientError),

    #[error("telemetry setup error: {0}")]
    Telemetry(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
