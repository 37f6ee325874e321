//! # pagepool-redis
//!
//! A [`pagepool::ReloadBus`] implementation over the `redis` crate's async
//! pub/sub, subscribed to the well-known `pool:reload` channel (§6 External
//! Interfaces). Malformed payloads are logged and surfaced as a
//! [`pagepool::bus::BusError`] so the listener loop retries rather than
//! treating them as fatal.
#![warn(missing_docs)]

use async_trait::async_trait;
use futures_util::StreamExt;
use pagepool::bus::BusError;
use pagepool::{ReloadBus, ReloadMessage};
use tokio::sync::Mutex;

/// The channel name the core listens on for reload/resize/refresh messages.
pub const RELOAD_CHANNEL: &str = "pool:reload";

/// A [`ReloadBus`] backed by one dedicated Redis pub/sub connection, held
/// open for the process lifetime rather than reconnected per message.
pub struct RedisBus {
    pubsub: Mutex<redis::aio::PubSub>,
}

impl RedisBus {
    /// Opens a pub/sub connection against `client` and subscribes to
    /// [`RELOAD_CHANNEL`].
    pub async fn connect(client: &redis::Client) -> Result<Self, BusError> {
        Self::connect_to(client, RELOAD_CHANNEL).await
    }

    /// Subscribes to an explicit channel instead of the default, for tests
    /// or namespaced deployments.
    pub async fn connect_to(client: &redis::Client, channel: &str) -> Result<Self, BusError> {
        let conn = client.get_async_connection().await.map_err(|e| BusError::Backend(e.into()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(channel).await.map_err(|e| BusError::Backend(e.into()))?;
        Ok(Self { pubsub: Mutex::new(pubsub) })
    }
}

#[async_trait]
impl ReloadBus for RedisBus {
    async fn recv(&self) -> Result<ReloadMessage, BusError> {
        let mut pubsub = self.pubsub.lock().await;
        let message = pubsub
            .on_message()
            .next()
            .await
            .ok_or_else(|| BusError::Backend(anyhow::anyhow!("pub/sub stream closed")))?;
        let payload: String = message.get_payload().map_err(|e| BusError::Backend(e.into()))?;
        serde_json::from_str::<ReloadMessage>(&payload).map_err(|e| {
            tracing::warn!(target: "pagepool.redis", payload = %payload, %e, "malformed reload message, ignoring");
            BusError::Backend(anyhow::Error::from(e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channel_is_pool_reload() {
        assert_eq!(RELOAD_CHANNEL, "pool:reload");
    }
}
