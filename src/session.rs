//! Voice session orchestration over the relay WebSocket.
//!
//! The [`AudioManager`] owns one session at a time: it acquires a bearer
//! token, opens the relay channel, performs the auth handshake, and only
//! then builds the audio graph - Player first, then Recorder - when the
//! backend acknowledges authorization. Inbound events are dispatched in
//! arrival order by a single spawned session task.
//!
//! # Flow control
//!
//! On speaker setups without hardware echo cancellation (no headset), mic
//! transmission is gated while the model is speaking: receiving an audio
//! delta drops the clear-to-send flag, and the player's silence monitor
//! raises it again once the output channel goes quiet.
//!
//! # Cancellation
//!
//! Cancelling a response records the current item id as ignored before the
//! cancel frame is sent, so deltas for that item already in flight are
//! discarded instead of played.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, trace, warn};

use crate::audio::{
    CaptureStream, FrameHandler, OutboundAudioBuffer, PlaybackSink, Player, Recorder,
};
use crate::config::{SessionConfig, TARGET_SAMPLE_RATE, backend_authority, relay_url};
use crate::error::{SessionError, SessionResult};
use crate::messages::{ClientEvent, ServerEvent};

/// Channel capacity for outbound relay events.
const WS_CHANNEL_CAPACITY: usize = 256;

/// How long `stop_conversation` waits for the session task to flush the
/// outbound queue before aborting it.
const SESSION_DRAIN_TIMEOUT_MS: u64 = 1_000;

/// Async callback producing a bearer token for the auth handshake.
pub type TokenProvider =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>> + Send + Sync>;

/// Callback invoked with non-fatal business errors reported by the backend.
pub type BusinessErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Idle,
    /// Relay channel opening
    Connecting,
    /// Auth frame sent, awaiting acknowledgement
    Authenticating,
    /// Recorder and Player running, frames flowing
    Active,
    /// Teardown in progress
    Stopping,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Authenticating => write!(f, "Authenticating"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Stopping => write!(f, "Stopping"),
        }
    }
}

// =============================================================================
// Shared session state
// =============================================================================

/// State shared between the manager and the spawned session task.
struct SessionShared {
    config: SessionConfig,
    sink: Arc<dyn PlaybackSink>,
    state: RwLock<SessionState>,
    connected: AtomicBool,
    /// Mic frames may be transmitted; dropped while the model is speaking
    /// in non-headset mode
    clear_to_send: Arc<AtomicBool>,
    ws_sender: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    /// Capture stream held between start() and the authorization ack
    pending_capture: Mutex<Option<CaptureStream>>,
    recorder: Mutex<Option<Recorder>>,
    player: Mutex<Option<Player>>,
    /// Item currently being played
    current_item: RwLock<Option<String>>,
    /// Item whose remaining deltas are discarded after a cancel
    ignored_item: RwLock<Option<String>>,
    outbound: Arc<StdMutex<OutboundAudioBuffer>>,
    error_callback: Mutex<Option<BusinessErrorCallback>>,
}

// =============================================================================
// AudioManager
// =============================================================================

/// Orchestrates one realtime voice session over the relay channel.
///
/// At most one session is open per manager; a new `start` never reuses a
/// prior session's channel.
pub struct AudioManager {
    backend_host: String,
    token_provider: TokenProvider,
    shared: Arc<SessionShared>,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

impl AudioManager {
    /// Create a manager for the given backend host and session config.
    pub fn new(
        backend_host: impl Into<String>,
        config: SessionConfig,
        token_provider: TokenProvider,
        sink: Arc<dyn PlaybackSink>,
    ) -> Self {
        Self {
            backend_host: backend_host.into(),
            token_provider,
            shared: Arc::new(SessionShared {
                config,
                sink,
                state: RwLock::new(SessionState::Idle),
                connected: AtomicBool::new(false),
                clear_to_send: Arc::new(AtomicBool::new(true)),
                ws_sender: Mutex::new(None),
                pending_capture: Mutex::new(None),
                recorder: Mutex::new(None),
                player: Mutex::new(None),
                current_item: RwLock::new(None),
                ignored_item: RwLock::new(None),
                outbound: Arc::new(StdMutex::new(OutboundAudioBuffer::new())),
                error_callback: Mutex::new(None),
            }),
            session_task: Mutex::new(None),
        }
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        *self.shared.state.read().await
    }

    /// Whether a session is live with audio flowing.
    pub async fn is_active(&self) -> bool {
        self.state().await == SessionState::Active
    }

    /// Register a callback for business errors reported by the backend.
    pub fn on_business_error(&self, callback: BusinessErrorCallback) {
        if let Ok(mut guard) = self.shared.error_callback.try_lock() {
            *guard = Some(callback);
        } else {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                *shared.error_callback.lock().await = Some(callback);
            });
        }
    }

    /// Start a session with an already-acquired capture stream.
    ///
    /// Acquires a token, opens the relay channel and sends the auth frame.
    /// Recorder and Player are only constructed once the backend
    /// acknowledges authorization. Any failure leaves the manager idle and
    /// safe to start again.
    pub async fn start(&self, capture: CaptureStream) -> SessionResult<()> {
        if self.shared.connected.load(Ordering::SeqCst) {
            debug!("tearing down previous session before starting a new one");
            self.stop().await;
        }

        // Token failure aborts before any channel exists
        let token = (self.token_provider)()
            .await
            .map_err(|e| SessionError::TokenAcquisition(e.to_string()))?;

        match self.open_session(token, capture).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("session start failed: {}", e);
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn open_session(&self, token: String, capture: CaptureStream) -> SessionResult<()> {
        *self.shared.state.write().await = SessionState::Connecting;

        let url = relay_url(&self.backend_host);
        let authority = backend_authority(&self.backend_host).to_string();

        let request = http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", authority)
            .body(())
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        info!("connected to relay at {}", url);

        let (mut ws_sink, mut ws_read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);

        *self.shared.ws_sender.lock().await = Some(tx.clone());
        *self.shared.pending_capture.lock().await = Some(capture);
        self.shared.connected.store(true, Ordering::SeqCst);
        *self.shared.state.write().await = SessionState::Authenticating;

        // One auth frame carrying the token and the full session config
        tx.send(ClientEvent::AuthConfig {
            token,
            session: self.shared.config.normalized(),
        })
        .await
        .map_err(|e| SessionError::WebSocket(e.to_string()))?;

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => {
                        match event {
                            Some(event) => {
                                let json = match serde_json::to_string(&event) {
                                    Ok(j) => j,
                                    Err(e) => {
                                        error!("failed to serialize client event: {}", e);
                                        continue;
                                    }
                                };
                                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                    error!("failed to send relay message: {}", e);
                                    break;
                                }
                            }
                            // Every sender dropped: the queue has been
                            // drained, close the socket and end the session
                            None => {
                                if let Err(e) = ws_sink.send(Message::Close(None)).await {
                                    debug!("failed to send close frame: {}", e);
                                }
                                break;
                            }
                        }
                    }

                    Some(msg) = ws_read.next() => {
                        match msg {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        Self::handle_server_event(&shared, event).await;
                                    }
                                    Err(e) => {
                                        warn!("failed to parse server event: {} - {}", e, text);
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => {
                                info!("relay closed the channel");
                                break;
                            }
                            Ok(Message::Ping(data)) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    error!("failed to send pong: {}", e);
                                }
                            }
                            Err(e) => {
                                error!("relay channel error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }

                    else => break,
                }
            }

            // Channel ended: sends become no-ops, but audio handles stay
            // put until an explicit stop. No automatic reconnection - the
            // user restarts the session.
            shared.connected.store(false, Ordering::SeqCst);
            *shared.ws_sender.lock().await = None;
            info!("relay session task ended");
        });

        *self.session_task.lock().await = Some(handle);
        Ok(())
    }

    /// Handle one inbound relay event.
    async fn handle_server_event(shared: &Arc<SessionShared>, event: ServerEvent) {
        match event {
            ServerEvent::Authorized => {
                let state = *shared.state.read().await;
                if state != SessionState::Authenticating {
                    warn!("authorization ack ignored in {} state", state);
                    return;
                }
                info!("relay authorized session");

                // Player strictly before Recorder: playback must be ready
                // before the first delta can follow mic audio
                *shared.player.lock().await =
                    Some(Player::start(shared.sink.clone(), TARGET_SAMPLE_RATE));

                let Some(capture) = shared.pending_capture.lock().await.take() else {
                    error!("no capture stream available at authorization");
                    return;
                };
                let Some(tx) = shared.ws_sender.lock().await.clone() else {
                    error!("relay channel gone at authorization");
                    return;
                };

                let handler = Self::frame_handler(
                    tx,
                    shared.clear_to_send.clone(),
                    shared.outbound.clone(),
                );
                match Recorder::start(capture, handler) {
                    Ok(recorder) => {
                        *shared.recorder.lock().await = Some(recorder);
                        *shared.state.write().await = SessionState::Active;
                    }
                    Err(e) => {
                        error!("failed to start capture graph: {}", e);
                        Self::teardown_shared(shared).await;
                    }
                }
            }

            ServerEvent::BusinessError { message } => {
                // Non-fatal: the session continues
                error!("relay business error: {}", message);
                if let Some(cb) = shared.error_callback.lock().await.as_ref() {
                    cb(message);
                }
            }

            ServerEvent::SpeechStarted => {
                if !shared.config.headset {
                    debug!("user speech detected, interrupting current response");
                    Self::cancel_active(shared).await;
                }
            }

            ServerEvent::AudioDelta { item_id, delta } => {
                if *shared.state.read().await != SessionState::Active {
                    warn!("audio delta ignored outside active session");
                    return;
                }
                if shared.ignored_item.read().await.as_deref() == Some(item_id.as_str()) {
                    trace!("dropping stale delta for cancelled item {}", item_id);
                    return;
                }

                *shared.current_item.write().await = Some(item_id);

                let pcm = match ServerEvent::decode_audio_delta(&delta) {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        error!("failed to decode audio delta: {}", e);
                        return;
                    }
                };

                if let Some(player) = shared.player.lock().await.as_mut() {
                    // The analyser must see this utterance before the mic is
                    // gated: playing first bumps its activity clock, so a
                    // monitor tick cannot read pre-utterance silence and
                    // reopen the gate mid-utterance.
                    player.play(Bytes::from(pcm));
                    if !shared.config.headset {
                        shared.clear_to_send.store(false, Ordering::SeqCst);
                        let clear_to_send = shared.clear_to_send.clone();
                        player.start_monitoring(Arc::new(move || {
                            clear_to_send.store(true, Ordering::SeqCst);
                        }));
                    }
                }
            }

            ServerEvent::Unknown => {
                trace!("unhandled server event");
            }
        }
    }

    /// Build the handler that quantizes, batches and transmits mic frames.
    fn frame_handler(
        tx: mpsc::Sender<ClientEvent>,
        clear_to_send: Arc<AtomicBool>,
        outbound: Arc<StdMutex<OutboundAudioBuffer>>,
    ) -> FrameHandler {
        Arc::new(move |samples: &[f32]| {
            let permitted = clear_to_send.load(Ordering::SeqCst);
            if let Ok(mut buffer) = outbound.lock() {
                buffer.push(samples, permitted, |audio| {
                    // The capture task must not block on a backed-up channel
                    if tx
                        .try_send(ClientEvent::InputAudioBufferAppend { audio })
                        .is_err()
                    {
                        trace!("relay channel full or closed, dropping audio chunk");
                    }
                });
            }
        })
    }

    /// Transmit one already-encoded audio chunk. No-op when the channel is
    /// not open.
    pub async fn send_audio_data(&self, audio: String) {
        Self::send_event(
            &self.shared,
            ClientEvent::InputAudioBufferAppend { audio },
        )
        .await;
    }

    /// Cancel the response currently being played.
    ///
    /// Records the in-flight item as ignored before sending the cancel
    /// frame, then flushes the player queue: buffered audio stops
    /// immediately and late deltas for the same item are discarded.
    pub async fn cancel_response(&self) {
        Self::cancel_active(&self.shared).await;
    }

    async fn cancel_active(shared: &Arc<SessionShared>) {
        let current = shared.current_item.read().await.clone();
        *shared.ignored_item.write().await = current;

        Self::send_event(shared, ClientEvent::ResponseCancel).await;

        if let Some(player) = shared.player.lock().await.as_ref() {
            player.clear_buffer();
        }
    }

    /// End the audio conversation: queue the stop frame, let the session
    /// task drain it onto the wire, then tear down. Teardown proceeds even
    /// if the drain times out.
    pub async fn stop_conversation(&self) {
        Self::send_event(&self.shared, ClientEvent::StopAudioConversation).await;

        // Dropping every outbound sender lets the session task flush the
        // queue, stop frame included, and close the socket on its own.
        if let Some(mut recorder) = self.shared.recorder.lock().await.take() {
            recorder.stop();
        }
        *self.shared.ws_sender.lock().await = None;

        if let Some(mut task) = self.session_task.lock().await.take() {
            let drain = Duration::from_millis(SESSION_DRAIN_TIMEOUT_MS);
            if tokio::time::timeout(drain, &mut task).await.is_err() {
                warn!("session task did not drain before timeout");
                task.abort();
            }
        }

        self.stop().await;
    }

    /// Tear the session down. Safe to invoke from any state, including
    /// before the session ever became active.
    pub async fn stop(&self) {
        *self.shared.state.write().await = SessionState::Stopping;

        if let Some(task) = self.session_task.lock().await.take() {
            task.abort();
        }
        Self::teardown_shared(&self.shared).await;
    }

    async fn teardown_shared(shared: &Arc<SessionShared>) {
        if let Some(mut recorder) = shared.recorder.lock().await.take() {
            recorder.stop();
        }
        if let Some(mut player) = shared.player.lock().await.take() {
            player.stop();
        }

        *shared.ws_sender.lock().await = None;
        *shared.pending_capture.lock().await = None;
        *shared.current_item.write().await = None;
        *shared.ignored_item.write().await = None;
        if let Ok(mut outbound) = shared.outbound.lock() {
            outbound.clear();
        }

        shared.clear_to_send.store(true, Ordering::SeqCst);
        shared.connected.store(false, Ordering::SeqCst);
        *shared.state.write().await = SessionState::Idle;
        debug!("session torn down");
    }

    async fn send_event(shared: &Arc<SessionShared>, event: ClientEvent) {
        let sender = shared.ws_sender.lock().await.clone();
        match sender {
            Some(tx) => {
                if let Err(e) = tx.send(event).await {
                    error!("failed to queue relay event: {}", e);
                }
            }
            None => trace!("no open channel, dropping client event"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
