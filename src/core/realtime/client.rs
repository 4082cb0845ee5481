//! Realtime conversation client.
//!
//! One [`RealtimeClient`] owns one WebSocket connection and carries at most
//! one turn at a time. The connection task is the sole consumer of the inbound
//! message stream; it dispatches events in arrival order into the pending
//! turn's accumulators and resolves the turn on a terminal event.
//!
//! # Handshake
//!
//! Connecting is a double handshake: the transport opens, the client sends a
//! `session.update` declaring the wire audio format, and only the peer's
//! `session.updated` acknowledgment marks the session connected. The peer does
//! not accept data before that acknowledgment, so [`RealtimeClient::connect`]
//! resolves on the ack, not on transport open, and rejects with
//! [`RealtimeError::HandshakeTimeout`] when the ack never arrives.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::core::audio;
use crate::core::realtime::base::{
    AudioSource, BaseRealtime, ConnectionState, RealtimeError, RealtimeResult, TurnOutput,
};
use crate::core::realtime::config::{REALTIME_BETA_HEADER, REALTIME_URL, RealtimeModel,
    WIRE_AUDIO_FORMAT};
use crate::core::realtime::messages::{
    ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig,
};
use crate::core::realtime::turn::{PendingTurn, TurnHandle};

/// Channel capacity for outbound WebSocket events.
const WS_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake progress observed by every `connect()` caller.
#[derive(Debug, Clone, Default)]
enum HandshakeState {
    #[default]
    Pending,
    Ready,
    Failed(String),
}

/// State shared between the client and its connection task.
///
/// This is the session's entire mutable surface: the connected flag, the
/// handshake signal, and the single pending-turn slot. It is handed to the
/// connection task explicitly; nothing about a session is ambient.
struct SessionShared {
    connected: AtomicBool,
    handshake: watch::Sender<HandshakeState>,
    turn: Mutex<Option<PendingTurn>>,
    output_path: PathBuf,
}

impl SessionShared {
    /// Fail the handshake if it is still pending.
    fn fail_handshake(&self, reason: &str) {
        self.handshake.send_if_modified(|state| {
            if matches!(state, HandshakeState::Pending) {
                *state = HandshakeState::Failed(reason.to_string());
                true
            } else {
                false
            }
        });
    }

    /// Mark the session dead and fail anything still waiting on it.
    async fn shutdown(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.fail_handshake(reason);
        if let Some(turn) = self.turn.lock().await.take() {
            turn.resolve(Err(RealtimeError::Transport(reason.to_string())));
        }
    }

    /// Dispatch one inbound event. Runs on the connection task, synchronously
    /// relative to message arrival, so fragments append in wire order.
    async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::SessionUpdated => {
                tracing::info!("session configuration acknowledged");
                self.connected.store(true, Ordering::SeqCst);
                self.handshake.send_replace(HandshakeState::Ready);
            }

            ServerEvent::TextDelta { delta } => {
                let mut slot = self.turn.lock().await;
                match slot.as_mut() {
                    Some(turn) => {
                        tracing::debug!(
                            elapsed_ms = turn.elapsed().as_millis() as u64,
                            "text fragment"
                        );
                        turn.buffers.push_text(&delta);
                    }
                    None => tracing::warn!("text fragment with no turn in flight"),
                }
            }

            ServerEvent::AudioDelta { delta } => match ServerEvent::decode_audio_delta(&delta) {
                Ok(chunk) => {
                    let mut slot = self.turn.lock().await;
                    match slot.as_mut() {
                        Some(turn) => {
                            tracing::debug!(
                                elapsed_ms = turn.elapsed().as_millis() as u64,
                                bytes = chunk.len(),
                                "audio fragment"
                            );
                            turn.buffers.push_audio(&chunk);
                        }
                        None => tracing::warn!("audio fragment with no turn in flight"),
                    }
                }
                Err(e) => tracing::error!("failed to decode audio fragment: {e}"),
            },

            ServerEvent::AudioTranscriptDelta { delta } => {
                let mut slot = self.turn.lock().await;
                match slot.as_mut() {
                    Some(turn) => {
                        tracing::debug!(
                            elapsed_ms = turn.elapsed().as_millis() as u64,
                            "transcript fragment"
                        );
                        turn.buffers.push_transcript(&delta);
                    }
                    None => tracing::warn!("transcript fragment with no turn in flight"),
                }
            }

            ServerEvent::ResponseDone => self.finish_turn().await,

            ServerEvent::Error { error } => {
                tracing::error!(kind = %error.error_type, "peer error: {}", error.message);
                // An error during the handshake (e.g. a rejected credential)
                // must fail connect(), not strand it until the timeout.
                if !self.connected.load(Ordering::SeqCst) {
                    self.fail_handshake(&error.message);
                }
                if let Some(turn) = self.turn.lock().await.take() {
                    turn.resolve(Err(RealtimeError::Protocol(error.message)));
                }
            }

            ServerEvent::TranscriptionCompleted { transcript } => {
                tracing::info!(%transcript, "input transcription completed");
            }

            ServerEvent::Unknown => {
                tracing::debug!("ignoring unrecognized server event");
            }
        }
    }

    /// Materialize the pending turn's buffers and resolve its handle.
    async fn finish_turn(&self) {
        let Some(turn) = self.turn.lock().await.take() else {
            tracing::warn!("turn completion event with no turn in flight");
            return;
        };

        let elapsed = turn.elapsed();
        let text = turn.buffers.joined_text();
        let transcript = turn.buffers.transcript().to_string();
        let audio_bytes = turn.buffers.audio().len();

        let audio_path = if audio_bytes == 0 {
            tracing::debug!("turn streamed no audio, skipping materialization");
            None
        } else {
            match audio::write_wav(&self.output_path, turn.buffers.audio()) {
                Ok(()) => Some(self.output_path.clone()),
                Err(e) => {
                    tracing::error!("failed to materialize reply audio: {e}");
                    turn.resolve(Err(e.into()));
                    return;
                }
            }
        };

        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            text_chars = text.len(),
            audio_bytes,
            "turn complete"
        );
        turn.resolve(Ok(TurnOutput {
            text,
            transcript,
            audio_path,
            elapsed,
        }));
    }
}

// =============================================================================
// Client
// =============================================================================

/// Turn-based realtime voice conversation client.
///
/// See [`BaseRealtime`] for the session contract and an example.
pub struct RealtimeClient {
    config: ClientConfig,
    model: RealtimeModel,
    shared: Arc<SessionShared>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientEvent>>>>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Create a client. The connection is opened by [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> RealtimeResult<Self> {
        if let Some(endpoint) = &config.endpoint {
            url::Url::parse(endpoint)
                .map_err(|e| RealtimeError::Transport(format!("invalid endpoint {endpoint}: {e}")))?;
        }

        let model = RealtimeModel::from_str_or_default(&config.model);
        let (handshake, _) = watch::channel(HandshakeState::default());
        let shared = Arc::new(SessionShared {
            connected: AtomicBool::new(false),
            handshake,
            turn: Mutex::new(None),
            output_path: config.output_path.clone(),
        });

        Ok(Self {
            config,
            model,
            shared,
            ws_sender: Arc::new(Mutex::new(None)),
            connection_handle: Mutex::new(None),
        })
    }

    /// The resolved model identifier.
    pub fn model(&self) -> RealtimeModel {
        self.model
    }

    /// Build the WebSocket upgrade request with authentication and protocol
    /// feature headers.
    fn build_request(&self) -> RealtimeResult<http::Request<()>> {
        let base = self.config.endpoint.as_deref().unwrap_or(REALTIME_URL);
        let mut url = url::Url::parse(base)
            .map_err(|e| RealtimeError::Transport(format!("invalid endpoint {base}: {e}")))?;
        url.query_pairs_mut().append_pair("model", self.model.as_str());

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => return Err(RealtimeError::Transport(format!("endpoint {base} has no host"))),
        };

        let mut builder = http::Request::builder()
            .uri(url.as_str())
            .header("OpenAI-Beta", REALTIME_BETA_HEADER)
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);

        if self.config.api_key.is_empty() {
            tracing::warn!("no credential configured, attempting an unauthenticated handshake");
        } else {
            builder = builder.header("Authorization", format!("Bearer {}", self.config.api_key));
        }

        builder
            .body(())
            .map_err(|e| RealtimeError::Transport(e.to_string()))
    }

    /// The configuration event opening every session.
    fn session_config_event(&self) -> ClientEvent {
        ClientEvent::SessionUpdate {
            session: SessionConfig {
                output_audio_format: Some(WIRE_AUDIO_FORMAT.to_string()),
                instructions: self.config.instructions.clone(),
                input_audio_transcription: self
                    .config
                    .transcription_model
                    .clone()
                    .map(|model| InputAudioTranscription { model }),
            },
        }
    }

    /// Hand an event to the connection task.
    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        let guard = self.ws_sender.lock().await;
        match guard.as_ref() {
            Some(sender) => sender
                .send(event)
                .await
                .map_err(|_| RealtimeError::Transport("connection task is gone".to_string())),
            None => Err(RealtimeError::NotConnected),
        }
    }

    /// Wait for the shared handshake signal, bounded by the configured timeout.
    async fn await_handshake(&self) -> RealtimeResult<()> {
        let limit = self.config.handshake_timeout();
        let mut rx = self.shared.handshake.subscribe();

        let wait = async {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    HandshakeState::Ready => return Ok(()),
                    HandshakeState::Failed(reason) => return Err(RealtimeError::Transport(reason)),
                    HandshakeState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return Err(RealtimeError::Transport(
                        "connection task ended before the handshake completed".to_string(),
                    ));
                }
            }
        };

        match tokio::time::timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::HandshakeTimeout(limit)),
        }
    }
}

#[async_trait]
impl BaseRealtime for RealtimeClient {
    async fn connect(&self) -> RealtimeResult<()> {
        // A failed handshake is terminal for the session; report it instead of
        // dialing again.
        if let HandshakeState::Failed(reason) = &*self.shared.handshake.borrow() {
            return Err(RealtimeError::Transport(reason.clone()));
        }

        {
            let mut handle_guard = self.connection_handle.lock().await;
            if self.shared.connected.load(Ordering::SeqCst) {
                return Ok(());
            }

            // First caller opens the transport; everyone else falls through to
            // await the shared handshake signal.
            if handle_guard.is_none() {
                let request = self.build_request()?;
                let started = Instant::now();

                let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
                    .await
                    .map_err(|e| {
                        let reason = format!("connection failed: {e}");
                        self.shared.fail_handshake(&reason);
                        RealtimeError::Transport(reason)
                    })?;
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    model = %self.model,
                    "transport open"
                );

                let (ws_sink, ws_read) = ws_stream.split();
                let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
                *self.ws_sender.lock().await = Some(tx);

                *handle_guard = Some(tokio::spawn(run_connection(
                    ws_sink,
                    ws_read,
                    rx,
                    self.shared.clone(),
                    self.ws_sender.clone(),
                )));

                // Declare configuration; the peer accepts no data until it
                // acknowledges this.
                self.send_event(self.session_config_event()).await?;
            }
        }

        self.await_handshake().await
    }

    async fn disconnect(&self) -> RealtimeResult<()> {
        // Lock order matches connect(): connection handle first, then sender.
        if let Some(handle) = self.connection_handle.lock().await.take() {
            handle.abort();
        }
        *self.ws_sender.lock().await = None;
        self.shared.shutdown("disconnected").await;
        tracing::info!("disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> ConnectionState {
        if self.shared.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else if matches!(&*self.shared.handshake.borrow(), HandshakeState::Pending)
            && self.ws_sender.try_lock().map(|g| g.is_some()).unwrap_or(false)
        {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn submit_audio(&self, source: AudioSource) -> RealtimeResult<TurnHandle> {
        // Normalize first: a codec failure must surface before any network
        // traffic is generated for this turn.
        let pcm: Vec<u8> = match &source {
            AudioSource::WavFile(path) => audio::normalize_wav_file(path)?,
            AudioSource::RawPcm(bytes) => bytes.to_vec(),
        };

        if !self.is_connected() {
            return Err(RealtimeError::NotConnected);
        }

        // Install the turn before sending so no inbound event can race the
        // slot. Exactly one turn may be outstanding.
        let (pending, rx) = PendingTurn::new();
        {
            let mut slot = self.shared.turn.lock().await;
            if slot.is_some() {
                return Err(RealtimeError::TurnInFlight);
            }
            *slot = Some(pending);
        }

        tracing::debug!(pcm_bytes = pcm.len(), "submitting turn");
        let sent = async {
            self.send_event(ClientEvent::user_audio(&pcm)).await?;
            self.send_event(ClientEvent::ResponseCreate).await
        }
        .await;

        if let Err(e) = sent {
            self.shared.turn.lock().await.take();
            return Err(e);
        }

        Ok(TurnHandle::new(rx, self.config.turn_timeout()))
    }
}

// =============================================================================
// Connection task
// =============================================================================

/// Own the socket for the session's lifetime: forward outbound events, parse
/// and dispatch inbound messages in arrival order, and tear the session down
/// when either direction ends.
async fn run_connection(
    mut ws_sink: SplitSink<WsStream, Message>,
    mut ws_read: SplitStream<WsStream>,
    mut rx: mpsc::Receiver<ClientEvent>,
    shared: Arc<SessionShared>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientEvent>>>>,
) {
    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("failed to serialize outbound event: {e}");
                        continue;
                    }
                };
                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    tracing::error!("failed to send WebSocket message: {e}");
                    break;
                }
            }

            Some(msg) = ws_read.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => shared.handle_event(event).await,
                            Err(e) => tracing::warn!("unparseable server event: {e} - {text}"),
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        // The protocol carries binary payloads base64-encoded
                        // inside text frames; raw binary frames are unexpected.
                        tracing::debug!(bytes = data.len(), "discarding binary frame");
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            tracing::error!("failed to send pong: {e}");
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket closed by peer");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            else => break,
        }
    }

    shared.shutdown("connection closed").await;
    *ws_sender.lock().await = None;
    tracing::info!("realtime connection task ended");
}

// =============================================================================
// Tests
// =============================================================================
