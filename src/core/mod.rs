pub mod audio;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{CANONICAL_BIT_DEPTH, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE, CodecError};
pub use realtime::{
    AudioSource, BaseRealtime, ConnectionState, RealtimeClient, RealtimeError, RealtimeModel,
    RealtimeResult, TurnHandle, TurnOutput,
};
