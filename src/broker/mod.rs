// Shared trait + event for broker adapters

use crate::error::RelayResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    // Session (re)established and the subscription has been requested
    Connected { broker: String },
    // Raw publish as received, not yet parsed
    Message { topic: String, payload: Vec<u8> },
    // Connection dropped; the adapter keeps polling
    Disconnected { reason: String },
}

#[async_trait::async_trait]
pub trait BrokerAdapter {
    // Push events into the relay pipeline. Ok once the receiving side is gone,
    // Err when the broker session cannot be set up.
    async fn spawn(&self, tx: tokio::sync::mpsc::Sender<BrokerEvent>) -> RelayResult<()>;
}

pub mod mqtt;
