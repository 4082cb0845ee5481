//! Endpoint and model configuration for the realtime protocol.

use serde::{Deserialize, Serialize};

/// Realtime protocol WebSocket endpoint.
pub const REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Protocol feature header sent on the upgrade request.
pub const REALTIME_BETA_HEADER: &str = "realtime=v1";

/// Audio encoding declared during the handshake; the only one the wire accepts.
pub const WIRE_AUDIO_FORMAT: &str = "pcm16";

/// Default input transcription model requested during the handshake.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Supported realtime model identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RealtimeModel {
    /// GPT-4o Realtime Preview model
    #[default]
    #[serde(rename = "gpt-4o-realtime-preview")]
    Gpt4oRealtimePreview,
    /// GPT-4o Realtime Preview 2024-10-01
    #[serde(rename = "gpt-4o-realtime-preview-2024-10-01")]
    Gpt4oRealtimePreview20241001,
    /// GPT-4o Realtime Preview 2024-12-17
    #[serde(rename = "gpt-4o-realtime-preview-2024-12-17")]
    Gpt4oRealtimePreview20241217,
    /// GPT-4o Mini Realtime Preview
    #[serde(rename = "gpt-4o-mini-realtime-preview")]
    Gpt4oMiniRealtimePreview,
}

impl RealtimeModel {
    /// Convert to the endpoint query parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4oRealtimePreview => "gpt-4o-realtime-preview",
            Self::Gpt4oRealtimePreview20241001 => "gpt-4o-realtime-preview-2024-10-01",
            Self::Gpt4oRealtimePreview20241217 => "gpt-4o-realtime-preview-2024-12-17",
            Self::Gpt4oMiniRealtimePreview => "gpt-4o-mini-realtime-preview",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gpt-4o-realtime-preview" => Self::Gpt4oRealtimePreview,
            "gpt-4o-realtime-preview-2024-10-01" => Self::Gpt4oRealtimePreview20241001,
            "gpt-4o-realtime-preview-2024-12-17" => Self::Gpt4oRealtimePreview20241217,
            "gpt-4o-mini-realtime-preview" => Self::Gpt4oMiniRealtimePreview,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for RealtimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
