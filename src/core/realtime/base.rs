//! Shared types for the realtime conversation client.
//!
//! # Audio Format
//!
//! All audio crossing the wire is PCM 16-bit signed little-endian, mono, at
//! 24kHz. Container formats exist only at the boundary and are converted by
//! [`crate::core::audio`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::core::audio::CodecError;
use crate::core::realtime::turn::TurnHandle;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
///
/// Session-fatal variants: [`Transport`](Self::Transport) and
/// [`HandshakeTimeout`](Self::HandshakeTimeout). Everything else fails the
/// specific operation and leaves the session usable.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection-level failure; fatal to the session, never retried
    #[error("transport failure: {0}")]
    Transport(String),

    /// The peer never acknowledged the session configuration
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Malformed input audio; fails the upload attempt before any network
    /// traffic, the session remains usable
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Peer-reported error event; fails the outstanding turn, a new turn may
    /// be attempted
    #[error("peer error: {0}")]
    Protocol(String),

    /// The session handshake has not completed
    #[error("not connected")]
    NotConnected,

    /// A turn is already outstanding on this session
    #[error("a turn is already in flight")]
    TurnInFlight,

    /// The turn round-trip exceeded the configured timeout
    #[error("turn timed out after {0:?}")]
    Timeout(Duration),

    /// Outbound event could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a realtime session.
///
/// There is no reconnecting state: a dropped connection is terminal for the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to the peer
    #[default]
    Disconnected,
    /// Transport open, configuration not yet acknowledged
    Connecting,
    /// Configuration acknowledged, ready for turns
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

// =============================================================================
// Turn Input / Output
// =============================================================================

/// Audio supplied by the caller for one turn.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// A container-wrapped audio file on disk, normalized to the canonical
    /// PCM shape before upload.
    WavFile(PathBuf),
    /// Raw PCM already in the canonical wire shape, uploaded untouched.
    RawPcm(Bytes),
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        AudioSource::WavFile(path)
    }
}

impl From<Bytes> for AudioSource {
    fn from(pcm: Bytes) -> Self {
        AudioSource::RawPcm(pcm)
    }
}

/// Final artifacts of one completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    /// Streamed text fragments joined with single spaces
    pub text: String,
    /// Streamed transcript fragments concatenated verbatim
    pub transcript: String,
    /// Path of the materialized reply audio; `None` when the peer streamed no
    /// audio fragments
    pub audio_path: Option<PathBuf>,
    /// Wall-clock time from submission to the terminal event
    pub elapsed: Duration,
}

// =============================================================================
// Base Trait
// =============================================================================

/// Session interface for turn-based realtime voice conversation.
///
/// One session owns one connection and carries at most one turn at a time.
///
/// # Example
///
/// ```rust,ignore
/// use talkwire::{AudioSource, BaseRealtime, ClientConfig, RealtimeClient};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ClientConfig::from_env()?;
///     let client = RealtimeClient::new(config)?;
///     client.connect().await?;
///
///     let handle = client
///         .submit_audio(AudioSource::WavFile("input.wav".into()))
///         .await?;
///     let output = handle.wait().await?;
///     println!("{}", output.text);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait BaseRealtime: Send + Sync {
    /// Connect to the peer and complete the configuration handshake.
    ///
    /// Idempotent: concurrent and repeated callers all observe the same
    /// eventual result. Resolves only once the peer acknowledges the
    /// configuration, not on transport open.
    async fn connect(&self) -> RealtimeResult<()>;

    /// Tear down the connection, failing any outstanding turn.
    async fn disconnect(&self) -> RealtimeResult<()>;

    /// Whether the configuration handshake has completed.
    fn is_connected(&self) -> bool;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Upload one audio payload and request a response, returning an awaitable
    /// handle for the turn's outcome.
    async fn submit_audio(&self, source: AudioSource) -> RealtimeResult<TurnHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
    }

    #[test]
    fn test_error_display() {
        let err = RealtimeError::Transport("boom".to_string());
        assert!(err.to_string().contains("transport failure"));

        let err = RealtimeError::NotConnected;
        assert_eq!(err.to_string(), "not connected");

        let err = RealtimeError::Protocol("rate limited".to_string());
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_codec_error_converts() {
        fn fails() -> RealtimeResult<()> {
            crate::core::audio::normalize_wav_bytes(b"junk")?;
            Ok(())
        }
        assert!(matches!(fails(), Err(RealtimeError::Codec(_))));
    }
}
