//! Configuration module for the Talkwire client.
//!
//! Configuration comes from process environment variables, with `.env` files
//! honored when the binary loads them via dotenvy before calling
//! [`ClientConfig::from_env`].
//!
//! # Environment variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `OPENAI_API_KEY` | Bearer credential for the peer | empty (see below) |
//! | `TALKWIRE_MODEL` | Realtime model identifier | `gpt-4o-realtime-preview` |
//! | `TALKWIRE_INSTRUCTIONS` | Behavioral instructions | none |
//! | `TALKWIRE_TRANSCRIPTION_MODEL` | Input transcription model | `whisper-1` |
//! | `TALKWIRE_OUTPUT` | Reply audio artifact path | `response.wav` |
//! | `TALKWIRE_ENDPOINT` | WebSocket endpoint override | protocol default |
//! | `TALKWIRE_HANDSHAKE_TIMEOUT_MS` | Handshake ack timeout | `10000` |
//! | `TALKWIRE_TURN_TIMEOUT_MS` | Turn round-trip timeout | none |
//!
//! A missing credential is deliberately not a configuration error: the
//! connection attempt proceeds unauthenticated and the peer's rejection
//! surfaces as a handshake failure.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::realtime::config::{DEFAULT_TRANSCRIPTION_MODEL, RealtimeModel};

/// Default path for the materialized reply audio.
pub const DEFAULT_OUTPUT_PATH: &str = "response.wav";

/// Default handshake acknowledgment timeout in milliseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric environment variable did not parse
    #[error("invalid value for {var}: {source}")]
    InvalidNumber {
        /// The offending variable name
        var: &'static str,
        /// The underlying parse failure
        source: std::num::ParseIntError,
    },
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer credential for the peer; empty means unauthenticated
    pub api_key: String,
    /// Realtime model identifier
    pub model: String,
    /// Behavioral instructions declared during the handshake
    pub instructions: Option<String>,
    /// Input transcription model requested during the handshake
    pub transcription_model: Option<String>,
    /// Path the reply audio is materialized to on turn completion
    pub output_path: PathBuf,
    /// WebSocket endpoint override; the protocol default when `None`
    pub endpoint: Option<String>,
    /// Handshake acknowledgment timeout in milliseconds
    pub handshake_timeout_ms: u64,
    /// Turn round-trip timeout in milliseconds; unbounded when `None`
    pub turn_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: RealtimeModel::default().as_str().to_string(),
            instructions: None,
            transcription_model: Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            endpoint: None,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            turn_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty and whitespace-only values are treated as unset, so
    /// `TALKWIRE_TRANSCRIPTION_MODEL=""` disables input transcription.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                "OPENAI_API_KEY is not set; the peer will reject the unauthenticated handshake"
            );
        }

        // Distinguish "unset" (default transcription model) from "set empty"
        // (transcription disabled).
        let transcription_model = match lookup("TALKWIRE_TRANSCRIPTION_MODEL") {
            None => Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            Some(v) => {
                let v = v.trim().to_string();
                (!v.is_empty()).then_some(v)
            }
        };

        Ok(Self {
            api_key,
            model: get("TALKWIRE_MODEL")
                .unwrap_or_else(|| RealtimeModel::default().as_str().to_string()),
            instructions: get("TALKWIRE_INSTRUCTIONS"),
            transcription_model,
            output_path: get("TALKWIRE_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            endpoint: get("TALKWIRE_ENDPOINT"),
            handshake_timeout_ms: parse_ms(
                get("TALKWIRE_HANDSHAKE_TIMEOUT_MS"),
                "TALKWIRE_HANDSHAKE_TIMEOUT_MS",
            )?
            .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            turn_timeout_ms: parse_ms(get("TALKWIRE_TURN_TIMEOUT_MS"), "TALKWIRE_TURN_TIMEOUT_MS")?,
        })
    }

    /// Handshake acknowledgment timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Turn round-trip timeout, if one is configured.
    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_ms(value: Option<String>, var: &'static str) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| v.parse().map_err(|source| ConfigError::InvalidNumber { var, source }))
        .transpose()
}
