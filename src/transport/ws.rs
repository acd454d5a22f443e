//! WebSocket transport
//!
//! Speaks the JSON wire protocol over a WebSocket: one `setup` envelope
//! on connect, then `media` envelopes outbound and `InboundMessage`
//! JSON inbound. A writer task drains the outbound queue and a reader
//! task maps socket traffic onto the ordered event stream.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::protocol::{ClientMessage, InboundMessage, SessionSetup, TransportEvent};
use crate::transport::outbound::outbound_channel;
use crate::transport::{SendPolicy, Transport, TransportConnection};

/// WebSocket client for a remote agent endpoint
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        setup: SessionSetup,
        policy: SendPolicy,
    ) -> Result<TransportConnection, TransportError> {
        tracing::info!(url = %self.url, model = %setup.model, "connecting to agent");
        let (ws, _response) = connect_async(&self.url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        // Setup goes out before any audio
        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;
        sink.send(Message::Text(setup_json))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let (sender, mut frames) = outbound_channel(policy);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let _ = event_tx.send(TransportEvent::Opened);

        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let text = match serde_json::to_string(&ClientMessage::Media(frame)) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("skipping unserializable frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!("outbound send failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
            tracing::debug!("ws writer finished");
        });

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<InboundMessage>(&text) {
                            Ok(inbound) => {
                                for event in inbound.into_events() {
                                    if event_tx.send(event).is_err() {
                                        return;
                                    }
                                }
                            }
                            // One corrupt message is not worth the session
                            Err(e) => tracing::warn!("ignoring malformed message: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = event_tx.send(TransportEvent::Closed);
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(
                            TransportError::ReceiveFailed(e.to_string()),
                        ));
                        return;
                    }
                }
            }
            let _ = event_tx.send(TransportEvent::Closed);
            tracing::debug!("ws reader finished");
        });

        Ok(TransportConnection {
            sender,
            events: event_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OutboundFrame;

    fn test_setup() -> SessionSetup {
        SessionSetup {
            model: "test-model".to_string(),
            voice: "Zephyr".to_string(),
            system_instruction: "test".to_string(),
            response_modalities: vec!["AUDIO".to_string()],
        }
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_connection_failed() {
        let transport = WsTransport::new("ws://127.0.0.1:1");
        let result = transport.connect(test_setup(), SendPolicy::Unbounded).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // Setup envelope must arrive before any media
            let first = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(first.contains(r#""setup""#));
            assert!(first.contains(r#""model":"test-model""#));

            let second = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(second.contains(r#""media""#));
            assert!(second.contains(r#""mimeType":"audio/pcm;rate=16000""#));

            ws.send(Message::Text(
                r#"{"audioData":"AAAA","interrupted":true}"#.to_string(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        });

        let transport = WsTransport::new(format!("ws://{addr}"));
        let mut conn = transport
            .connect(test_setup(), SendPolicy::Unbounded)
            .await
            .unwrap();

        assert!(matches!(conn.events.recv().await, Some(TransportEvent::Opened)));

        conn.sender.send(OutboundFrame {
            data: "QUJD".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        });

        assert!(matches!(
            conn.events.recv().await,
            Some(TransportEvent::Chunk { data }) if data == "AAAA"
        ));
        assert!(matches!(conn.events.recv().await, Some(TransportEvent::Interrupted)));
        assert!(matches!(conn.events.recv().await, Some(TransportEvent::Closed)));

        server.await.unwrap();
    }
}
