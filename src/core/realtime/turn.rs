//! Per-turn state: output accumulators, completion signalling, and the
//! awaitable handle returned to the caller.
//!
//! Accumulators are scoped to one turn. They are created when the turn is
//! installed in the session's single pending slot and dropped when the turn
//! resolves, so nothing can leak from one turn into the next.

use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::core::realtime::base::{RealtimeError, RealtimeResult, TurnOutput};

/// Separator placed between streamed text fragments when they are joined.
const TEXT_FRAGMENT_SEPARATOR: &str = " ";

/// Output accumulators for a single turn.
///
/// Fragments append in arrival order; the multiplexer never reorders or
/// buffers ahead.
#[derive(Debug, Default)]
pub(crate) struct TurnBuffers {
    text: Vec<String>,
    transcript: String,
    audio: Vec<u8>,
}

impl TurnBuffers {
    pub fn push_text(&mut self, fragment: &str) {
        self.text.push(fragment.to_string());
    }

    pub fn push_transcript(&mut self, fragment: &str) {
        self.transcript.push_str(fragment);
    }

    pub fn push_audio(&mut self, chunk: &[u8]) {
        self.audio.extend_from_slice(chunk);
    }

    /// Text fragments joined with single spaces.
    pub fn joined_text(&self) -> String {
        self.text.join(TEXT_FRAGMENT_SEPARATOR)
    }

    /// Transcript fragments concatenated verbatim.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Raw audio bytes concatenated in arrival order.
    pub fn audio(&self) -> &[u8] {
        &self.audio
    }
}

/// The session's one outstanding turn.
pub(crate) struct PendingTurn {
    pub buffers: TurnBuffers,
    started: Instant,
    tx: oneshot::Sender<RealtimeResult<TurnOutput>>,
}

impl PendingTurn {
    /// Create a pending turn together with the receiver its handle will await.
    pub fn new() -> (Self, oneshot::Receiver<RealtimeResult<TurnOutput>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                buffers: TurnBuffers::default(),
                started: Instant::now(),
                tx,
            },
            rx,
        )
    }

    /// Time since the turn was submitted.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Resolve the turn exactly once. A dropped handle is not an error.
    pub fn resolve(self, result: RealtimeResult<TurnOutput>) {
        let _ = self.tx.send(result);
    }
}

/// Awaitable handle for one submitted turn.
///
/// Resolves with [`TurnOutput`] when the peer signals turn completion, or with
/// the peer's error text if an error event arrives first. When the session was
/// configured with a turn timeout, waiting longer than that rejects with
/// [`RealtimeError::Timeout`]. There is no way to cancel a submitted turn.
#[derive(Debug)]
pub struct TurnHandle {
    rx: oneshot::Receiver<RealtimeResult<TurnOutput>>,
    timeout: Option<Duration>,
}

impl TurnHandle {
    pub(crate) fn new(
        rx: oneshot::Receiver<RealtimeResult<TurnOutput>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self { rx, timeout }
    }

    /// Wait for the turn's outcome.
    pub async fn wait(self) -> RealtimeResult<TurnOutput> {
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.rx)
                .await
                .map_err(|_| RealtimeError::Timeout(limit))?,
            None => self.rx.await,
        };
        outcome.unwrap_or_else(|_| {
            Err(RealtimeError::Transport(
                "connection closed before the turn completed".to_string(),
            ))
        })
    }
}
