pub mod config;
pub mod core;

// Re-export commonly used items for convenience
pub use crate::config::{ClientConfig, ConfigError};
pub use crate::core::audio::CodecError;
pub use crate::core::realtime::{
    AudioSource, BaseRealtime, ConnectionState, RealtimeClient, RealtimeError, RealtimeModel,
    RealtimeResult, TurnHandle, TurnOutput,
};
