//! Realtime voice conversation module.
//!
//! This module implements a client for a duplex, streaming realtime
//! conversation protocol over a persistent WebSocket: the session handshake,
//! the inbound event multiplexer, the single-slot turn correlator, and the
//! closed wire-message schema.
//!
//! # Architecture
//!
//! - [`BaseRealtime`] - session trait: connect, disconnect, submit a turn
//! - [`RealtimeClient`] - the WebSocket implementation
//! - [`TurnHandle`] - awaitable outcome of one submitted turn
//! - [`messages`] - tagged wire events with an explicit unknown variant
//!
//! # Audio Format
//!
//! All wire audio is PCM 16-bit signed little-endian, mono, at 24kHz,
//! base64-encoded inside JSON text frames.

mod base;
mod client;
pub mod config;
pub mod messages;
mod turn;

pub use base::{
    AudioSource, BaseRealtime, ConnectionState, RealtimeError, RealtimeResult, TurnOutput,
};
pub use client::RealtimeClient;
pub use config::{REALTIME_URL, RealtimeModel};
pub use turn::TurnHandle;
