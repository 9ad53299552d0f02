//! WebSocket Game Server
//!
//! Async WebSocket server tying the pieces together: accepts connections,
//! decodes inbound messages, routes them through the connection registry to
//! the matchmaking queue or the owning session, and fans session events back
//! out. Also drives the bot: the queue fallback after a lonely wait and the
//! delayed reply moves.
//!
//! Every error a request can produce is converted to a sender-directed
//! `{type:"error"}` message here; nothing propagates to the opponent and
//! nothing takes a session down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::game::bot;
use crate::game::board::Mark;
use crate::network::matchmaking::{JoinOutcome, MatchQueue, QueueEntry};
use crate::network::protocol::{ClientMessage, RequestError, ServerMessage};
use crate::network::registry::{ConnectionRegistry, GameId};
use crate::network::session::{Participant, RematchOutcome, SessionManager};

/// Longest accepted display name.
const MAX_USERNAME_LEN: usize = 32;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a queued player waits before being paired with the bot.
    pub bot_fallback: Duration,
    /// Artificial thinking delay before a bot reply move.
    pub bot_move_delay: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static bind address"),
            max_connections: 1000,
            bot_fallback: Duration::from_secs(10),
            bot_move_delay: Duration::from_millis(400),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(addr) = std::env::var("FOURLINE_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.bind_addr = addr;
        }
        if let Some(max) = std::env::var("FOURLINE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_connections = max;
        }
        if let Some(secs) = std::env::var("FOURLINE_BOT_FALLBACK_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.bot_fallback = Duration::from_secs(secs);
        }
        if let Some(millis) = std::env::var("FOURLINE_BOT_MOVE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.bot_move_delay = Duration::from_millis(millis);
        }
        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to the configured address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Live connections and identity bindings.
    registry: Arc<ConnectionRegistry>,
    /// Live sessions.
    sessions: Arc<SessionManager>,
    /// Waiting players.
    queue: Arc<MatchQueue>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            sessions: Arc::new(SessionManager::new()),
            queue: Arc::new(MatchQueue::new()),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            "game server v{} listening on {}",
            self.config.version, self.config.bind_addr
        );
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.registry.connection_count().await >= self.config.max_connections {
                                warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("new connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let sessions = self.sessions.clone();
        let queue = self.queue.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("websocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            registry.register(addr).await;

            // Writer task: everything the server says to this client goes
            // through one channel, keeping per-connection ordering.
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("invalid message from {}: {}", addr, e);
                                        let err = RequestError::MalformedMessage(
                                            "unparseable message or missing fields".to_string(),
                                        );
                                        let _ = msg_tx.send(ServerMessage::error(&err)).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &registry,
                                    &sessions,
                                    &queue,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("websocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::info("server shutting down")).await;
                        break;
                    }
                }
            }

            sender_task.abort();
            Self::handle_disconnect(addr, &registry, &sessions, &queue).await;
        });
    }

    /// Dispatch one decoded message; any rejection goes back to the sender
    /// only.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        registry: &Arc<ConnectionRegistry>,
        sessions: &Arc<SessionManager>,
        queue: &Arc<MatchQueue>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let result = match msg {
            ClientMessage::Join { username } => {
                Self::handle_join(addr, username, registry, sessions, queue, config, sender).await
            }
            ClientMessage::Drop {
                game_id,
                username,
                column,
            } => {
                Self::handle_drop(addr, &game_id, &username, column, registry, sessions, config)
                    .await
            }
            ClientMessage::RematchRequest { game_id } => {
                Self::handle_rematch(addr, &game_id, registry, sessions).await
            }
        };

        if let Err(err) = result {
            debug!("request from {} rejected: {}", addr, err);
            let _ = sender.send(ServerMessage::error(&err)).await;
        }
    }

    /// Handle a join: bind the identity, enqueue, pair if possible.
    async fn handle_join(
        addr: SocketAddr,
        username: String,
        registry: &Arc<ConnectionRegistry>,
        sessions: &Arc<SessionManager>,
        queue: &Arc<MatchQueue>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), RequestError> {
        let username = username.trim().to_string();
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            return Err(RequestError::MalformedMessage(format!(
                "username must be 1-{MAX_USERNAME_LEN} characters"
            )));
        }
        if username == bot::BOT_NAME {
            return Err(RequestError::DuplicateIdentity(username));
        }

        registry.bind_identity(addr, &username).await?;
        info!("{} joined matchmaking from {}", username, addr);

        match queue.join(username.clone(), sender.clone()).await {
            JoinOutcome::Paired(first, second) => {
                Self::start_match(first, second, registry, sessions).await;
            }
            JoinOutcome::Queued => {
                let _ = sender
                    .send(ServerMessage::info("waiting for an opponent"))
                    .await;

                // Nobody showed up in time -> play the bot instead.
                let queue = queue.clone();
                let registry = registry.clone();
                let sessions = sessions.clone();
                let fallback = config.bot_fallback;
                tokio::spawn(async move {
                    tokio::time::sleep(fallback).await;
                    if let Some(entry) = queue.take_if_waiting(&username).await {
                        Self::start_bot_match(entry, &registry, &sessions).await;
                    }
                });
            }
        }

        Ok(())
    }

    /// Create a session for two paired humans and announce it.
    async fn start_match(
        first: QueueEntry,
        second: QueueEntry,
        registry: &Arc<ConnectionRegistry>,
        sessions: &Arc<SessionManager>,
    ) {
        debug!(
            "pairing {} (waited {:?}) with {}",
            first.username,
            first.queued_at.elapsed(),
            second.username
        );

        let player_one = Participant::human(first.username.clone(), first.sender.clone());
        let player_two = Participant::human(second.username.clone(), second.sender.clone());
        let (game_id, session) = sessions.create_session(player_one, player_two).await;

        // A participant can vanish between pairing and registration; the
        // session then starts with that side already marked gone.
        for entry in [&first, &second] {
            if !registry.assign_session(&entry.username, &game_id).await {
                session.write().await.mark_disconnected(&entry.username);
            }
        }

        let _ = first
            .sender
            .send(ServerMessage::Matched {
                game_id: game_id.clone(),
                opponent: second.username.clone(),
                you: Mark::P1.value(),
            })
            .await;
        let _ = second
            .sender
            .send(ServerMessage::Matched {
                game_id: game_id.clone(),
                opponent: first.username.clone(),
                you: Mark::P2.value(),
            })
            .await;

        {
            let s = session.read().await;
            s.broadcast(s.state_message()).await;
        }

        info!(
            "game {} created: {} vs {}",
            game_id, first.username, second.username
        );
    }

    /// Create a session against the bot for a player nobody paired with.
    async fn start_bot_match(
        entry: QueueEntry,
        registry: &Arc<ConnectionRegistry>,
        sessions: &Arc<SessionManager>,
    ) {
        let player_one = Participant::human(entry.username.clone(), entry.sender.clone());
        let (game_id, session) = sessions.create_session(player_one, Participant::bot()).await;

        if !registry.assign_session(&entry.username, &game_id).await {
            // Player disconnected while the fallback timer ran.
            sessions.remove_session(&game_id).await;
            return;
        }

        let _ = entry
            .sender
            .send(ServerMessage::Matched {
                game_id: game_id.clone(),
                opponent: bot::BOT_NAME.to_string(),
                you: Mark::P1.value(),
            })
            .await;

        {
            let s = session.read().await;
            s.broadcast(s.state_message()).await;
        }

        info!("game {} created: {} vs {}", game_id, entry.username, bot::BOT_NAME);
    }

    /// Handle a drop: resolve routing, apply under the session lock, fan out.
    async fn handle_drop(
        addr: SocketAddr,
        claimed_game: &str,
        claimed_username: &str,
        column: i64,
        registry: &Arc<ConnectionRegistry>,
        sessions: &Arc<SessionManager>,
        config: &ServerConfig,
    ) -> Result<(), RequestError> {
        let (username, game_id) = registry.resolve(addr, claimed_game).await?;
        if claimed_username != username {
            return Err(RequestError::SessionMismatch);
        }

        let session = sessions
            .get_session(&game_id)
            .await
            .ok_or(RequestError::SessionMismatch)?;

        let outcome = { session.write().await.handle_drop(&username, column)? };

        {
            let s = session.read().await;
            s.broadcast(outcome.state.clone()).await;
            if let Some(result) = outcome.result.clone() {
                s.broadcast(result).await;
                let played_for = chrono::Utc::now().signed_duration_since(s.started_at());
                info!(
                    "game {} finished after {}s",
                    game_id,
                    played_for.num_seconds()
                );
            }
        }

        if outcome.bot_to_move {
            let sessions = sessions.clone();
            let game_id = game_id.clone();
            let delay = config.bot_move_delay;
            tokio::spawn(async move {
                Self::run_bot_move(sessions, game_id, delay).await;
            });
        }

        Ok(())
    }

    /// Play the bot's reply after its thinking delay.
    async fn run_bot_move(sessions: Arc<SessionManager>, game_id: GameId, delay: Duration) {
        tokio::time::sleep(delay).await;

        // The game may have been discarded while the bot was "thinking".
        let Some(session) = sessions.get_session(&game_id).await else {
            return;
        };

        let outcome = {
            let mut s = session.write().await;
            let Some(mark) = s.bot_turn() else {
                return;
            };
            let column = bot::choose_column(s.board(), mark);
            match s.handle_drop(bot::BOT_NAME, column) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("bot move rejected in game {}: {}", game_id, err);
                    return;
                }
            }
        };

        let s = session.read().await;
        s.broadcast(outcome.state.clone()).await;
        if let Some(result) = outcome.result {
            s.broadcast(result).await;
            info!("game {} finished", game_id);
        }
    }

    /// Handle a rematch request.
    async fn handle_rematch(
        addr: SocketAddr,
        claimed_game: &str,
        registry: &Arc<ConnectionRegistry>,
        sessions: &Arc<SessionManager>,
    ) -> Result<(), RequestError> {
        let (username, game_id) = registry.resolve(addr, claimed_game).await?;
        let session = sessions
            .get_session(&game_id)
            .await
            .ok_or(RequestError::SessionMismatch)?;

        let outcome = { session.write().await.request_rematch(&username)? };

        let s = session.read().await;
        match outcome {
            RematchOutcome::Started => {
                s.broadcast(ServerMessage::RematchStart).await;
                s.broadcast(s.state_message()).await;
                info!("game {} restarted by rematch", game_id);
            }
            RematchOutcome::Pending => {
                s.send_to(
                    &username,
                    ServerMessage::info("rematch requested, waiting for your opponent"),
                )
                .await;
                if let Some(opponent) = s.opponent_username(&username) {
                    let notice = format!("{username} requested a rematch");
                    s.send_to(opponent, ServerMessage::info(notice)).await;
                }
            }
        }

        Ok(())
    }

    /// Tear down everything a closed connection was holding.
    async fn handle_disconnect(
        addr: SocketAddr,
        registry: &Arc<ConnectionRegistry>,
        sessions: &Arc<SessionManager>,
        queue: &Arc<MatchQueue>,
    ) {
        let Some(removed) = registry.remove(addr).await else {
            return;
        };
        let Some(username) = removed.username else {
            debug!("client {} left without joining", addr);
            return;
        };

        queue.leave(&username).await;

        if let Some(game_id) = removed.game_id {
            if let Some(session) = sessions.get_session(&game_id).await {
                let abandoned = {
                    let mut s = session.write().await;
                    s.mark_disconnected(&username);
                    s.all_humans_gone()
                };

                if abandoned {
                    sessions.remove_session(&game_id).await;
                    info!("game {} discarded: all participants gone", game_id);
                } else {
                    let s = session.read().await;
                    s.broadcast(ServerMessage::info(format!("{username} disconnected")))
                        .await;
                }
            }
        }

        info!(
            "{} disconnected after {:?}",
            username, removed.connected_for
        );
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.queue.len().await
    }
}
