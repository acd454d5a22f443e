//! In-process transport
//!
//! Wires a session to a scripted peer over channels, with no sockets
//! involved. Tests and embedding hosts play the remote agent through
//! `RemotePeer`: accept the connect, emit `Opened` when ready, then
//! feed audio and control events and inspect the outbound frames.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{InboundMessage, OutboundFrame, SessionSetup, TransportEvent};
use crate::transport::outbound::{outbound_channel, FrameReceiver};
use crate::transport::{SendPolicy, Transport, TransportConnection};

/// Client end; hand this to the session
pub struct ChannelTransport {
    link_tx: mpsc::UnboundedSender<PeerLink>,
}

/// Agent end; accepts one `PeerLink` per connect
pub struct RemotePeer {
    link_rx: mpsc::UnboundedReceiver<PeerLink>,
}

/// One accepted connection, as seen by the agent side
pub struct PeerLink {
    pub setup: SessionSetup,
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: FrameReceiver,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, RemotePeer) {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        (ChannelTransport { link_tx }, RemotePeer { link_rx })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    /// Unlike the WebSocket transport, readiness is the peer's call:
    /// no `Opened` is emitted until the peer sends one.
    async fn connect(
        &self,
        setup: SessionSetup,
        policy: SendPolicy,
    ) -> Result<TransportConnection, TransportError> {
        let (sender, frames) = outbound_channel(policy);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let link = PeerLink {
            setup,
            events: event_tx,
            frames,
        };
        self.link_tx
            .send(link)
            .map_err(|_| TransportError::ConnectionFailed("peer dropped".to_string()))?;
        Ok(TransportConnection {
            sender,
            events: event_rx,
        })
    }
}

impl RemotePeer {
    /// Wait for the next connect from the client side
    pub async fn accept(&mut self) -> Option<PeerLink> {
        self.link_rx.recv().await
    }
}

impl PeerLink {
    /// Declare the connection ready for frames
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    /// Deliver an audio chunk (base64 PCM16)
    pub fn send_audio(&self, data: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Chunk { data: data.into() });
    }

    /// Deliver a barge-in signal
    pub fn interrupt(&self) {
        let _ = self.events.send(TransportEvent::Interrupted);
    }

    /// Deliver a full inbound message, expanded in consumption order
    pub fn send_message(&self, message: InboundMessage) {
        for event in message.into_events() {
            let _ = self.events.send(event);
        }
    }

    /// Fail the connection
    pub fn error(&self, error: TransportError) {
        let _ = self.events.send(TransportEvent::Error(error));
    }

    /// Close the connection gracefully
    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Next outbound frame from the client, in submission order
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.recv().await
    }

    /// Next outbound frame if one is already queued
    pub fn try_next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.try_recv()
    }
}
