use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};

/// Messages sent from a client to the realtime endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configures the session. Sent once per connection, after `session.created`.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    /// Appends base64-encoded PCM16 audio to the input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
}

impl ClientEvent {
    /// The wire name of this event's `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AudioFormat, Modality};
    use serde_json::json;

    #[test]
    fn test_session_update_is_tagged() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                modalities: vec![Modality::Audio],
                input_audio_format: Some(AudioFormat::Pcm16),
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["modalities"], json!(["audio"]));
        assert_eq!(value["session"]["input_audio_format"], "pcm16");
        assert_eq!(event.event_type(), "session.update");
    }

    #[test]
    fn test_audio_append_shape() {
        let event = ClientEvent::InputAudioBufferAppend {
            audio: "AAAA".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "input_audio_buffer.append", "audio": "AAAA" })
        );
    }
}
