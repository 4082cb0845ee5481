//! Wire message types for the realtime conversation protocol.
//!
//! All messages are JSON objects discriminated by a `type` field and carried
//! as WebSocket text frames; binary payloads travel base64-encoded inside
//! them, never as raw binary frames.
//!
//! Client events (sent to the peer):
//! - `session.update` - declare session configuration
//! - `conversation.item.create` - upload one user audio message
//! - `response.create` - ask the peer to start generating
//!
//! Server events (consumed from the peer):
//! - `session.updated` - configuration acknowledged
//! - `response.text.delta` - text fragment
//! - `response.audio.delta` - audio fragment (base64 PCM)
//! - `response.audio_transcript.delta` - transcript fragment
//! - `response.done` - turn complete
//! - `error` - peer-reported failure
//! - `conversation.item.input_audio_transcription.completed` - logged only
//!
//! Every other inbound `type` lands in [`ServerEvent::Unknown`]: the schema is
//! open-ended on the peer's side, so unknown events must stay a harmless no-op.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration declared in the `session.update` handshake event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Output audio encoding; the wire mandates `pcm16`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Behavioral instructions for the peer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// A conversation item uploaded by the client.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    /// Item type (always "message")
    #[serde(rename = "type")]
    pub item_type: String,
    /// Speaker role (always "user")
    pub role: String,
    /// Content parts
    pub content: Vec<ContentPart>,
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize)]
pub struct ContentPart {
    /// Content type (always "input_audio")
    #[serde(rename = "type")]
    pub content_type: String,
    /// Base64-encoded canonical PCM audio
    pub audio: String,
}

// =============================================================================
// Client Events (sent to the peer)
// =============================================================================

/// Client events sent to the peer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Declare session configuration; the handshake completes when the peer
    /// acknowledges this with `session.updated`.
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Upload one user audio message.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
    },

    /// Ask the peer to start generating a response. No payload.
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Build an upload event carrying raw canonical PCM as a user message.
    pub fn user_audio(pcm: &[u8]) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                item_type: "message".to_string(),
                role: "user".to_string(),
                content: vec![ContentPart {
                    content_type: "input_audio".to_string(),
                    audio: BASE64_STANDARD.encode(pcm),
                }],
            },
        }
    }
}

// =============================================================================
// Server Events (received from the peer)
// =============================================================================

/// Server events received from the peer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Configuration acknowledged; resolves the session handshake
    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// Text fragment
    #[serde(rename = "response.text.delta")]
    TextDelta {
        /// Incremental text
        delta: String,
    },

    /// Audio fragment, base64-encoded canonical PCM
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded audio chunk
        delta: String,
    },

    /// Transcript fragment for the synthesized audio
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Incremental transcript text
        delta: String,
    },

    /// Turn complete
    #[serde(rename = "response.done")]
    ResponseDone,

    /// Peer-reported error; fails the outstanding turn
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Transcription of the uploaded audio finished; logged only
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Transcript of the uploaded audio
        #[serde(default)]
        transcript: String,
    },

    /// Any event type this client does not consume. Ignored.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode the base64 payload of an audio fragment.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

/// Peer error information.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_create_serialization() {
        let event = ClientEvent::ResponseCreate;
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"response.create"}"#);
    }

    #[test]
    fn test_session_update_serialization() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                output_audio_format: Some("pcm16".to_string()),
                instructions: None,
                input_audio_transcription: Some(InputAudioTranscription {
                    model: "whisper-1".to_string(),
                }),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session.update"));
        assert!(json.contains("pcm16"));
        assert!(json.contains("whisper-1"));
        assert!(!json.contains("instructions"));
    }

    #[test]
    fn test_user_audio_roundtrip() {
        let pcm = vec![0u8, 1, 2, 3];
        let event = ClientEvent::user_audio(&pcm);
        match event {
            ClientEvent::ConversationItemCreate { item } => {
                assert_eq!(item.item_type, "message");
                assert_eq!(item.role, "user");
                assert_eq!(item.content.len(), 1);
                assert_eq!(item.content[0].content_type, "input_audio");
                let decoded = BASE64_STANDARD.decode(&item.content[0].audio).unwrap();
                assert_eq!(decoded, pcm);
            }
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn test_text_delta_deserialization_ignores_extra_fields() {
        let json = r#"{
            "type": "response.text.delta",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "Hello"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::TextDelta { delta } => assert_eq!(delta, "Hello"),
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn test_session_updated_ignores_payload() {
        let json = r#"{"type": "session.updated", "session": {"id": "sess_1"}}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ServerEvent::SessionUpdated));
    }

    #[test]
    fn test_error_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "rate_limit_error",
                "message": "rate limited"
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.error_type, "rate_limit_error");
                assert_eq!(error.message, "rate limited");
            }
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn test_unknown_event_types_are_tolerated() {
        for json in [
            r#"{"type": "response.created", "response": {"id": "r"}}"#,
            r#"{"type": "rate_limits.updated", "rate_limits": []}"#,
            r#"{"type": "some.future.event"}"#,
        ] {
            let event: ServerEvent = serde_json::from_str(json).unwrap();
            assert!(matches!(event, ServerEvent::Unknown), "failed for {json}");
        }
    }

    #[test]
    fn test_audio_delta_decode() {
        let original = vec![0u8, 1, 2, 3, 4, 5];
        let encoded = BASE64_STANDARD.encode(&original);
        assert_eq!(ServerEvent::decode_audio_delta(&encoded).unwrap(), original);
    }
}
