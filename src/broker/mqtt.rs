// MQTT adapter: one broker, one topic, QoS 0

use super::{BrokerAdapter, BrokerEvent};
use crate::config::BrokerSettings;
use crate::error::RelayResult;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

// Requests we queue towards the event loop (only the subscribe, in practice).
const REQUEST_CAPACITY: usize = 10;

pub struct MqttAdapter {
    pub settings: BrokerSettings,
}

impl MqttAdapter {
    pub fn new(settings: BrokerSettings) -> Self {
        Self { settings }
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(
            self.settings.client_id.clone(),
            self.settings.host.clone(),
            self.settings.port,
        );
        opts.set_keep_alive(self.settings.keep_alive());
        opts.set_clean_session(true);
        opts
    }

    fn message_event(publish: Publish) -> BrokerEvent {
        BrokerEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }
    }
}

#[async_trait::async_trait]
impl BrokerAdapter for MqttAdapter {
    async fn spawn(&self, tx: Sender<BrokerEvent>) -> RelayResult<()> {
        let broker = self.settings.address();
        let topic = self.settings.topic.as_str();
        let (client, mut eventloop) = AsyncClient::new(self.mqtt_options(), REQUEST_CAPACITY);
        info!(%broker, topic, client_id = %self.settings.client_id, "Connecting to MQTT broker");

        loop {
            let event = match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(%broker, session_present = ack.session_present, "Connected to MQTT broker");
                    // Clean sessions drop subscriptions, so ask again on every ConnAck.
                    if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
                        error!(topic, error = %e, "Failed to subscribe");
                        return Err(e.into());
                    }
                    Some(BrokerEvent::Connected { broker: broker.clone() })
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!(topic, "Subscription acknowledged");
                    None
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => Some(Self::message_event(publish)),
                Ok(_) => None,
                Err(e) => {
                    warn!(%broker, error = %e, "MQTT connection error");
                    if tx.send(BrokerEvent::Disconnected { reason: e.to_string() }).await.is_err() {
                        break;
                    }
                    // rumqttc reconnects on the next poll; pause so a dead broker isn't hammered.
                    tokio::time::sleep(self.settings.reconnect_delay()).await;
                    continue;
                }
            };

            if let Some(event) = event {
                if tx.send(event).await.is_err() {
                    debug!("Relay pipeline closed, stopping MQTT adapter");
                    break;
                }
            }
        }

        if let Err(e) = client.try_disconnect() {
            debug!(error = %e, "Disconnect request not queued");
        }
        Ok(())
    }
}
