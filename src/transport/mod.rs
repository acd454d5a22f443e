//! Transport to the remote agent
//!
//! The session consumes this interface only: connect once, push frames
//! fire-and-forget, and read one ordered stream of inbound events.
//! `ws` speaks the JSON wire protocol over a WebSocket; `channel` is an
//! in-process implementation for tests and embedding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{SessionSetup, TransportEvent};

pub mod channel;
pub mod outbound;
#[cfg(feature = "ws")]
pub mod ws;

pub use channel::{ChannelTransport, PeerLink, RemotePeer};
pub use outbound::{outbound_channel, FrameReceiver, FrameSender, QueueStats};
#[cfg(feature = "ws")]
pub use ws::WsTransport;

/// Outbound queueing policy.
///
/// `Unbounded` mirrors the fire-and-forget contract: sends never block
/// and never fail, and a stalled connection queues without limit.
/// `DropOldest` bounds the queue and discards from the head, keeping
/// delivery in order while capping memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SendPolicy {
    #[default]
    Unbounded,
    DropOldest { capacity: usize },
}

/// A live connection: the frame sender plus the ordered event stream
pub struct TransportConnection {
    pub sender: FrameSender,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Bidirectional streaming channel to a remote agent
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection, delivering `setup` to the agent before any
    /// audio flows. Implementations emit `TransportEvent::Opened` once
    /// the connection is ready for frames.
    async fn connect(
        &self,
        setup: SessionSetup,
        policy: SendPolicy,
    ) -> Result<TransportConnection, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default_is_unbounded() {
        assert_eq!(SendPolicy::default(), SendPolicy::Unbounded);
    }

    #[test]
    fn test_policy_serde_tags() {
        let json = serde_json::to_string(&SendPolicy::DropOldest { capacity: 8 }).unwrap();
        assert_eq!(json, r#"{"policy":"drop_oldest","capacity":8}"#);
        let policy: SendPolicy = serde_json::from_str(r#"{"policy":"unbounded"}"#).unwrap();
        assert_eq!(policy, SendPolicy::Unbounded);
    }
}
