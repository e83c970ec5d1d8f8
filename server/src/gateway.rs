//! The WebSocket gateway: token handshake, per-connection read/write
//! tasks, heartbeat, and command dispatch.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use protocol::{ClientEnvelope, Handshake, ServerEvent, ServerFrame};

use crate::auth_token::{now_epoch, now_ms};
use crate::commands::{AuthedUser, CommandDispatcher};
use crate::context::ServerContext;

/// Heartbeat cadence and how many unanswered pings close the socket.
const PING_INTERVAL: Duration = Duration::from_secs(5);
const MAX_MISSED_PINGS: u32 = 2;

/// How long the client gets to present its handshake frame.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GatewayHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl GatewayHandle {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and closes every connected socket.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub async fn start_gateway(
    ctx: ServerContext,
    dispatcher: CommandDispatcher,
) -> anyhow::Result<GatewayHandle> {
    let bind_addr = format!("{}:{}", ctx.config.gateway.host, ctx.config.gateway.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway at {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve gateway local address")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(accept_loop(listener, ctx, dispatcher, shutdown_rx));

    Ok(GatewayHandle {
        local_addr,
        shutdown_tx,
    })
}

async fn accept_loop(
    listener: TcpListener,
    ctx: ServerContext,
    dispatcher: CommandDispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("gateway accept failed: {err}");
                        continue;
                    }
                };

                let ctx = ctx.clone();
                let dispatcher = dispatcher.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_async(stream).await {
                        Ok(socket) => {
                            log::info!("socket connected from {peer}");
                            handle_connection(socket, ctx, dispatcher, shutdown).await;
                            log::info!("socket disconnected from {peer}");
                        }
                        Err(err) => log::warn!("websocket handshake failed for {peer}: {err}"),
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    log::info!("gateway stopped accepting connections");
                    break;
                }
            }
        }
    }
}

async fn handle_connection(
    socket: WebSocketStream<TcpStream>,
    ctx: ServerContext,
    dispatcher: CommandDispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut sink, mut stream) = socket.split();

    // First frame must be the token handshake.
    let user = match authenticate(&ctx, &mut stream).await {
        Ok(user) => user,
        Err(reason) => {
            let event = ServerEvent::AuthError { message: reason };
            if let Ok(raw) = serde_json::to_string(&ServerFrame::Event(event)) {
                let _ = sink.send(Message::Text(raw)).await;
            }
            let _ = sink.close().await;
            return;
        }
    };

    let socket_id = Uuid::new_v4();
    let queue = ctx.bus.register_socket(socket_id, user.user_id);
    ctx.bus.note_connected(user.user_id, &user.username);
    ctx.cache.mark_online(user.user_id, now_epoch()).await;

    queue.push(ServerFrame::Event(ServerEvent::AuthOk {
        user_id: user.user_id,
        username: user.username.clone(),
        realm: user.realm,
    }));

    let missed_pings = Arc::new(AtomicU32::new(0));

    // Write side: drain the queue and drive the heartbeat.
    let writer_missed = missed_pings.clone();
    let writer_queue = queue.clone();
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = writer_queue.pop() => {
                    let Some(frame) = frame else { break };
                    let raw = match serde_json::to_string(&frame) {
                        Ok(raw) => raw,
                        Err(err) => {
                            log::warn!("outbound frame failed to serialize: {err}");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(raw)).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if writer_missed.fetch_add(1, Ordering::Relaxed) >= MAX_MISSED_PINGS {
                        log::debug!("socket missed {MAX_MISSED_PINGS} pings, closing");
                        break;
                    }
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sink.close().await;
    });

    // Read side: commands in, activity bookkeeping, pong accounting.
    loop {
        tokio::select! {
            incoming = stream.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => {
                        log::debug!("socket read error for {}: {err}", user.user_id);
                        break;
                    }
                    None => break,
                };

                match message {
                    Message::Text(raw) => {
                        let envelope: ClientEnvelope = match serde_json::from_str(&raw) {
                            Ok(envelope) => envelope,
                            Err(err) => {
                                log::debug!("bad frame from {}: {err}", user.user_id);
                                continue;
                            }
                        };

                        let now = now_epoch();
                        ctx.cache.mark_online(user.user_id, now).await;
                        ctx.cache.buffer_last_active(user.user_id, now).await;

                        if let Some(frame) = dispatcher.dispatch(&user, envelope).await {
                            ctx.bus.send_to_socket(socket_id, frame);
                        }
                    }
                    Message::Pong(_) => {
                        missed_pings.store(0, Ordering::Relaxed);
                        ctx.cache.mark_online(user.user_id, now_epoch()).await;
                    }
                    Message::Ping(payload) => {
                        // tungstenite answers pings itself; track liveness.
                        let _ = payload;
                        missed_pings.store(0, Ordering::Relaxed);
                    }
                    Message::Close(_) => break,
                    Message::Binary(_) | Message::Frame(_) => {}
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    ctx.bus.unregister_socket(socket_id);
    ctx.bus.note_disconnected(user.user_id);
    if ctx.bus.user_socket_count(user.user_id) == 0 {
        ctx.cache.mark_offline(user.user_id).await;
    }
    let _ = writer.await;
}

/// Reads and verifies the handshake frame, then loads the player identity.
async fn authenticate(
    ctx: &ServerContext,
    stream: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Result<AuthedUser, String> {
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next())
        .await
        .map_err(|_| "handshake timed out".to_string())?;

    let raw = match first {
        Some(Ok(Message::Text(raw))) => raw,
        _ => return Err("expected a handshake frame".to_string()),
    };

    let handshake: Handshake =
        serde_json::from_str(&raw).map_err(|_| "malformed handshake".to_string())?;

    let claims = ctx
        .auth_tokens
        .verify(&handshake.token, now_ms())
        .map_err(|err| {
            log::debug!("socket token rejected: {err}");
            "invalid or expired token".to_string()
        })?;

    let realm = match ctx.db.players().find_by_id(claims.user_id).await {
        Ok(row) => row.and_then(|row| row.realm()),
        Err(err) => {
            log::error!("player lookup failed during handshake: {err}");
            return Err("internal error".to_string());
        }
    };

    Ok(AuthedUser {
        user_id: claims.user_id,
        username: claims.username,
        realm,
    })
}
