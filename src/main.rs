use std::path::PathBuf;

use clap::Parser;
use stocklevel_relay::broker::mqtt::MqttAdapter;
use stocklevel_relay::config::Settings;
use stocklevel_relay::relay::Relay;
use stocklevel_relay::telemetry;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "stocklevel-relay", about = "Relay MQTT stock-level readings to WebSocket clients")]
struct Args {
    /// Settings file (toml, yaml or json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP / WebSocket port
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    broker_host: Option<String>,

    #[arg(long)]
    broker_port: Option<u16>,

    /// Topic carrying the distance readings
    #[arg(long)]
    topic: Option<String>,

    /// Default tracing filter when RUST_LOG is unset
    #[arg(long)]
    log_filter: Option<String>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = self.broker_host {
            settings.broker.host = host;
        }
        if let Some(port) = self.broker_port {
            settings.broker.port = port;
        }
        if let Some(topic) = self.topic {
            settings.broker.topic = topic;
        }
        if let Some(filter) = self.log_filter {
            settings.log_filter = filter;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);

    telemetry::init_tracing(&settings.log_filter)?;
    telemetry::init_metrics(&settings.metrics)?;

    let listener = TcpListener::bind(settings.server.bind_addr()).await?;
    info!(
        port = settings.server.port,
        broker = %settings.broker.address(),
        topic = %settings.broker.topic,
        "Starting stock level relay"
    );

    let adapter = MqttAdapter::new(settings.broker.clone());
    Relay::new(settings, adapter)
        .serve(listener, shutdown_signal())
        .await?;

    info!("Relay stopped");
    Ok(())
}
