//! Cross-tab shared key-value channel. Updates reach every tab of the
//! session except the writer, matching browser storage-event semantics.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

/// Channel key carrying batch claims written by the chatroom tab.
pub const CHATROOM_NOTIFICATION_KEY: &str = "chatroom_notification";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUpdate {
    pub key: String,
    pub value: String,
}

#[async_trait]
pub trait TabChannel: Send + Sync {
    async fn publish(&self, key: &str, value: &str) -> Result<()>;
    fn updates(&self) -> broadcast::Receiver<ChannelUpdate>;
}

pub struct MissingTabChannel;

#[async_trait]
impl TabChannel for MissingTabChannel {
    async fn publish(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("cross-tab channel is unavailable"))
    }

    fn updates(&self) -> broadcast::Receiver<ChannelUpdate> {
        let (_sender, receiver) = broadcast::channel(1);
        receiver
    }
}

/// In-memory stand-in for the browser's shared storage channel: one hub per
/// session, one endpoint per tab. Used by tests and the demo app.
pub struct LocalTabHub {
    endpoints: Mutex<Vec<broadcast::Sender<ChannelUpdate>>>,
}

impl LocalTabHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: Mutex::new(Vec::new()),
        })
    }

    pub async fn endpoint(self: &Arc<Self>) -> Arc<LocalTabEndpoint> {
        let (sender, _) = broadcast::channel(64);
        let index = {
            let mut endpoints = self.endpoints.lock().await;
            endpoints.push(sender.clone());
            endpoints.len() - 1
        };
        Arc::new(LocalTabEndpoint {
            hub: Arc::clone(self),
            index,
            sender,
        })
    }
}

pub struct LocalTabEndpoint {
    hub: Arc<LocalTabHub>,
    index: usize,
    sender: broadcast::Sender<ChannelUpdate>,
}

#[async_trait]
impl TabChannel for LocalTabEndpoint {
    async fn publish(&self, key: &str, value: &str) -> Result<()> {
        let update = ChannelUpdate {
            key: key.to_string(),
            value: value.to_string(),
        };
        let endpoints = self.hub.endpoints.lock().await;
        for (index, endpoint) in endpoints.iter().enumerate() {
            if index == self.index {
                continue;
            }
            // A tab with no active listener is fine.
            let _ = endpoint.send(update.clone());
        }
        Ok(())
    }

    fn updates(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_other_tabs_but_not_the_writer() {
        let hub = LocalTabHub::new();
        let writer = hub.endpoint().await;
        let reader = hub.endpoint().await;

        let mut writer_updates = writer.updates();
        let mut reader_updates = reader.updates();

        writer.publish("chatroom_notification", "\"abc\"").await.unwrap();

        let update = reader_updates.recv().await.unwrap();
        assert_eq!(
            update,
            ChannelUpdate {
                key: "chatroom_notification".to_string(),
                value: "\"abc\"".to_string(),
            }
        );
        assert!(writer_updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_channel_rejects_publishes() {
        let channel = MissingTabChannel;
        assert!(channel.publish("k", "v").await.is_err());
    }
}
