//! Wire shapes exchanged with the remote agent

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// One outbound audio frame: base64 PCM16 plus its declared mime type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub data: String,
    pub mime_type: String,
}

/// Connection configuration passed through to the agent unmodified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub response_modalities: Vec<String>,
}

/// Envelope for client-to-agent messages on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    #[serde(rename = "setup")]
    Setup(SessionSetup),
    #[serde(rename = "media")]
    Media(OutboundFrame),
}

/// One agent-to-client message. Either field may be present; a message
/// carrying both is consumed audio-first, then the interruption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}

impl InboundMessage {
    /// Expands the message into transport events in consumption order.
    pub fn into_events(self) -> Vec<TransportEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(data) = self.audio_data {
            events.push(TransportEvent::Chunk { data });
        }
        if self.interrupted == Some(true) {
            events.push(TransportEvent::Interrupted);
        }
        events
    }
}

/// Inbound edge of the transport, delivered as one ordered stream
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection is established and ready for frames
    Opened,
    /// An audio chunk (base64 PCM16 at the session's output rate)
    Chunk { data: String },
    /// The agent cut off its own speech; discard all scheduled playback
    Interrupted,
    /// The connection failed; the session must tear down
    Error(TransportError),
    /// The connection closed gracefully
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_frame_uses_camel_case_mime_key() {
        let frame = OutboundFrame {
            data: "AAA=".to_string(),
            mime_type: crate::constants::OUTBOUND_MIME_TYPE.to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"data":"AAA=","mimeType":"audio/pcm;rate=16000"}"#);
    }

    #[test]
    fn test_setup_envelope_is_externally_tagged() {
        let msg = ClientMessage::Setup(SessionSetup {
            model: "m".to_string(),
            voice: "v".to_string(),
            system_instruction: "s".to_string(),
            response_modalities: vec!["AUDIO".to_string()],
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"setup":{"model":"m","voice":"v","systemInstruction":"s","responseModalities":["AUDIO"]}}"#
        );
    }

    #[test]
    fn test_inbound_audio_only_yields_single_chunk() {
        let msg: InboundMessage = serde_json::from_str(r#"{"audioData":"UUU="}"#).unwrap();
        let events = msg.into_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TransportEvent::Chunk { data } if data == "UUU="));
    }

    #[test]
    fn test_inbound_interrupted_only_yields_interruption() {
        let msg: InboundMessage = serde_json::from_str(r#"{"interrupted":true}"#).unwrap();
        let events = msg.into_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransportEvent::Interrupted));
    }

    #[test]
    fn test_inbound_with_both_fields_is_audio_first() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"audioData":"UUU=","interrupted":true}"#).unwrap();
        let events = msg.into_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TransportEvent::Chunk { .. }));
        assert!(matches!(events[1], TransportEvent::Interrupted));
    }

    #[test]
    fn test_inbound_interrupted_false_is_ignored() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"audioData":"UUU=","interrupted":false}"#).unwrap();
        let events = msg.into_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransportEvent::Chunk { .. }));
    }

    #[test]
    fn test_unknown_inbound_fields_are_tolerated() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"audioData":"UUU=","turnId":7}"#).unwrap();
        assert_eq!(msg.audio_data.as_deref(), Some("UUU="));
    }
}
