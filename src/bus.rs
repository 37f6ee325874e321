//! The pub-sub reload collaborator trait and the `pool:reload` message
//! envelope (§4.7, §6). `pagepool-redis` implements [`ReloadBus`] against
//! the `redis` crate's async pub/sub; the core only depends on the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a reload message asks the manager to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadAction {
    /// Reload configuration and rebuild components whose tuning changed.
    Reload,
    /// Resize one or more components without a full rebuild.
    Resize,
    /// Reload the reusable keyword/image samples for one or all groups.
    Refresh,
}

/// The JSON envelope carried on the `pool:reload` channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReloadMessage {
    pub action: ReloadAction,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub sizes: Option<serde_json::Map<String, serde_json::Value>>,
    pub timestamp: i64,
}

/// Errors a [`ReloadBus`] implementation can surface while subscribing or
/// receiving. The listener loop logs these and keeps trying rather than
/// propagating them to the render path.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("reload bus backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// The pub-sub collaborator the manager's reload listener task subscribes
/// through. `recv` is expected to be called in a loop; a transient error
/// should be retried by the caller rather than treated as fatal.
#[async_trait]
pub trait ReloadBus: Send + Sync {
    /// Blocks until the next message arrives on the well-known reload
    /// channel, or an error occurs.
    async fn recv(&self) -> Result<ReloadMessage, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_message_round_trips_through_json() {
        let msg = ReloadMessage {
            action: ReloadAction::Resize,
            scope: Some("cls".to_string()),
            sizes: None,
            timestamp: 1_700_000_000,
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: ReloadMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.action, ReloadAction::Resize);
        assert_eq!(decoded.scope.as_deref(), Some("cls"));
    }

    #[test]
    fn action_is_lowercase_in_json() {
        let msg = ReloadMessage {
            action: ReloadAction::Refresh,
            scope: None,
            sizes: None,
            timestamp: 0,
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        assert!(encoded.contains("\"refresh\""));
    }
}
