// Relay orchestrates broker adapter -> pipeline -> connection set + HTTP server

pub mod registry;
pub mod server;

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmMonitor, AlarmTransition};
use crate::broker::{BrokerAdapter, BrokerEvent};
use crate::config::Settings;
use crate::error::RelayResult;
use crate::transform::{parse_measurement, StockLevel};
use registry::ConnectionSet;
use server::AppState;

/// Upper bound on draining open connections once shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The single message handler: topic filter, parse, transform, broadcast.
pub struct Pipeline {
    topic: String,
    connections: Arc<ConnectionSet>,
    alarm: AlarmMonitor,
}

impl Pipeline {
    pub fn new(topic: impl Into<String>, connections: Arc<ConnectionSet>, alarm: AlarmMonitor) -> Self {
        Self { topic: topic.into(), connections, alarm }
    }

    pub fn alarm(&self) -> &AlarmMonitor {
        &self.alarm
    }

    /// Handle one broker event; returns the level that was broadcast, if any.
    pub fn handle(&mut self, event: BrokerEvent) -> Option<StockLevel> {
        match event {
            BrokerEvent::Connected { broker } => {
                info!(%broker, topic = %self.topic, "Subscribed to topic");
                None
            }
            BrokerEvent::Disconnected { reason } => {
                warn!(%reason, "Broker connection lost");
                None
            }
            BrokerEvent::Message { topic, payload } => {
                if topic != self.topic {
                    debug!(%topic, "Ignoring message on unexpected topic");
                    return None;
                }
                self.relay_payload(&topic, &payload)
            }
        }
    }

    fn relay_payload(&mut self, topic: &str, payload: &[u8]) -> Option<StockLevel> {
        let text = String::from_utf8_lossy(payload);
        info!(topic, payload = %text, "Received measurement (cm)");

        let measurement = match parse_measurement(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(topic, payload = %text, error = %e, "Rejecting payload");
                metrics::counter!("relay_rejected_payloads_total").increment(1);
                return None;
            }
        };
        metrics::counter!("relay_measurements_total").increment(1);

        let level = StockLevel::from(measurement);
        metrics::gauge!("relay_stock_level").set(level.value());

        match self.alarm.observe(level) {
            Some(AlarmTransition::Raised(level)) => {
                warn!(%level, threshold = self.alarm.threshold(), "Stock level alarm raised");
                metrics::gauge!("relay_alarm_raised").set(1.0);
            }
            Some(AlarmTransition::Cleared(level)) => {
                info!(%level, threshold = self.alarm.threshold(), "Stock level alarm cleared");
                metrics::gauge!("relay_alarm_raised").set(0.0);
            }
            None => {}
        }

        let delivered = self.connections.broadcast(&level.to_string());
        metrics::counter!("relay_broadcasts_total").increment(1);
        debug!(%level, delivered, "Broadcast stock level");
        Some(level)
    }
}

pub struct Relay<A> {
    settings: Settings,
    adapter: A,
    connections: Arc<ConnectionSet>,
}

impl<A> Relay<A>
where
    A: BrokerAdapter + Send + Sync + 'static,
{
    pub fn new(settings: Settings, adapter: A) -> Self {
        Self {
            settings,
            adapter,
            connections: Arc::new(ConnectionSet::new()),
        }
    }

    pub fn connections(&self) -> Arc<ConnectionSet> {
        Arc::clone(&self.connections)
    }

    /// Run until `shutdown` resolves or the broker side of the pipeline stops.
    ///
    /// A broker adapter that fails (say, the subscribe is refused) ends the
    /// relay with its error. After `shutdown`, connections get [`SHUTDOWN_GRACE`]
    /// to finish their close handshake before the server is dropped.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Relay { settings, adapter, connections } = self;

        // 1. Broker adapter feeds raw events into a bounded channel
        let (tx, mut rx) = mpsc::channel::<BrokerEvent>(settings.broker.channel_capacity.max(1));
        let mut adapter_task = tokio::spawn(async move { adapter.spawn(tx).await });

        // 2. One pipeline task handles events in arrival order
        let mut pipeline = Pipeline::new(
            settings.broker.topic.clone(),
            Arc::clone(&connections),
            AlarmMonitor::new(settings.alarm.threshold),
        );
        let mut pipeline_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                pipeline.handle(event);
            }
        });

        // 3. HTTP + WebSocket server; closing the sockets lets graceful shutdown finish
        let state = AppState {
            connections: Arc::clone(&connections),
            topic: settings.broker.topic.clone(),
            broker: settings.broker.address(),
            threshold: settings.alarm.threshold,
        };
        let app = server::router(state, &settings.server.assets_dir);
        info!(addr = %listener.local_addr()?, "Server started");

        let closing = Arc::clone(&connections);
        let draining = Arc::new(Notify::new());
        let drain_started = Arc::clone(&draining);
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown requested");
                closing.close_all();
                drain_started.notify_one();
            })
            .into_future();

        let result: RelayResult<()> = tokio::select! {
            res = server => res.map_err(Into::into),
            _ = &mut pipeline_task => {
                warn!("Broker pipeline stopped");
                connections.close_all();
                adapter_outcome(&mut adapter_task).await
            }
            _ = async {
                draining.notified().await;
                tokio::time::sleep(SHUTDOWN_GRACE).await;
            } => {
                warn!(grace = ?SHUTDOWN_GRACE, "Connections still draining, stopping anyway");
                Ok(())
            }
        };

        adapter_task.abort();
        pipeline_task.abort();
        result
    }
}

// The pipeline only ends once the adapter dropped its sender, so this resolves promptly.
async fn adapter_outcome(task: &mut JoinHandle<RelayResult<()>>) -> RelayResult<()> {
    match task.await {
        Ok(Err(e)) => {
            error!(error = %e, "Broker adapter failed");
            Err(e)
        }
        Ok(Ok(())) => Ok(()),
        Err(e) => {
            error!(error = %e, "Broker adapter task aborted");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;

    fn message(payload: &str) -> BrokerEvent {
        BrokerEvent::Message { topic: "Stock_Level".into(), payload: payload.as_bytes().to_vec() }
    }

    fn next_text(rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<String> {
        match rx.try_recv() {
            Ok(Message::Text(t)) => Some(t),
            _ => None,
        }
    }

    fn pipeline() -> (Pipeline, Arc<ConnectionSet>) {
        let connections = Arc::new(ConnectionSet::new());
        let pipeline = Pipeline::new("Stock_Level", Arc::clone(&connections), AlarmMonitor::default());
        (pipeline, connections)
    }

    #[test]
    fn test_measurement_is_broadcast_as_level() {
        let (mut pipeline, connections) = pipeline();
        let (_, mut rx_a) = connections.add();
        let (_, mut rx_b) = connections.add();

        assert_eq!(pipeline.handle(message("150")), Some(StockLevel(2.5)));
        assert_eq!(next_text(&mut rx_a).as_deref(), Some("2.5"));
        assert_eq!(next_text(&mut rx_b).as_deref(), Some("2.5"));
        assert!(pipeline.alarm().is_raised());

        assert_eq!(pipeline.handle(message("250")), Some(StockLevel(1.5)));
        assert_eq!(next_text(&mut rx_a).as_deref(), Some("1.5"));
        assert_eq!(next_text(&mut rx_b).as_deref(), Some("1.5"));
        assert!(!pipeline.alarm().is_raised());
    }

    #[test]
    fn test_malformed_payload_is_not_broadcast() {
        let (mut pipeline, connections) = pipeline();
        let (_, mut rx) = connections.add();

        assert_eq!(pipeline.handle(message("not a number")), None);
        assert_eq!(next_text(&mut rx), None);

        assert_eq!(pipeline.handle(message("100")), Some(StockLevel(3.0)));
        assert_eq!(next_text(&mut rx).as_deref(), Some("3"));
    }

    #[test]
    fn test_other_topics_are_ignored() {
        let (mut pipeline, connections) = pipeline();
        let (_, mut rx) = connections.add();
        let event = BrokerEvent::Message { topic: "Other".into(), payload: b"100".to_vec() };
        assert_eq!(pipeline.handle(event), None);
        assert_eq!(next_text(&mut rx), None);
    }

    #[test]
    fn test_session_events_do_not_broadcast() {
        let (mut pipeline, connections) = pipeline();
        let (_, mut rx) = connections.add();
        assert_eq!(pipeline.handle(BrokerEvent::Connected { broker: "b:1883".into() }), None);
        assert_eq!(pipeline.handle(BrokerEvent::Disconnected { reason: "eof".into() }), None);
        assert_eq!(next_text(&mut rx), None);
    }

    #[test]
    fn test_closed_client_causes_no_error() {
        let (mut pipeline, connections) = pipeline();
        let (_, gone) = connections.add();
        drop(gone);
        assert_eq!(pipeline.handle(message("500")), Some(StockLevel(-1.0)));
        assert!(connections.is_empty());
    }
}
