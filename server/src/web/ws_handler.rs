use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{debug, info};

use super::app_state::AppState;
use crate::engine::envelope::Envelope;
use crate::engine::relay::{RelayEngine, RelayError};
use crate::engine::session::{OutboundFrame, SessionId};

/// How long a fresh connection may sit silent before the auth envelope.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// WebSocket upgrade endpoint. The size limits are raised well above the
/// defaults because screen frames travel as single messages.
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection through its lifecycle: auth handshake, session
/// registration, envelope dispatch, and exactly-once cleanup.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // The first envelope must be `auth`; anything else (or a close, or
    // silence) ends the connection with no side effects.
    let Some(username) = await_auth(&mut receiver).await else {
        return;
    };

    let (session_id, frames) = match state.engine.connect(&username) {
        Ok(connected) => connected,
        Err(e) => {
            let reply = Envelope::Error {
                message: e.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&reply) {
                let _ = sender.send(Message::Text(json.into())).await;
            }
            return;
        }
    };

    // Writer side: drain the session's frame queue and keep the peer
    // alive with interval pings.
    let writer = tokio::spawn(write_loop(sender, frames, state.ping_interval));

    read_loop(
        &mut receiver,
        &state.engine,
        session_id,
        state.ping_interval + state.ping_timeout,
    )
    .await;

    // Sole cleanup point for this connection.
    state.engine.disconnect(session_id);
    writer.abort();
}

/// Wait for the opening `auth` envelope. Returns the claimed display name,
/// or None when the handshake fails (close, timeout, or a non-auth first
/// message — a protocol error that terminates the session).
async fn await_auth(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    let first = match timeout(AUTH_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(message))) => message,
        Ok(_) => return None,
        Err(_) => {
            debug!("closing connection: no auth envelope before timeout");
            return None;
        }
    };

    let Message::Text(text) = first else {
        debug!("closing connection: first frame was not text");
        return None;
    };

    match serde_json::from_str::<Envelope>(&text) {
        Ok(Envelope::Auth { username }) => Some(username),
        Ok(other) => {
            debug!(kind = other.kind(), "closing connection: first envelope was not auth");
            None
        }
        Err(e) => {
            debug!(error = %e, "closing connection: malformed auth envelope");
            None
        }
    }
}

/// Forward queued frames to the socket and ping on an interval. Ends when
/// the engine drops the session's sender or the socket goes away.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<OutboundFrame>,
    ping_every: Duration,
) {
    let mut ping = interval(ping_every);
    ping.tick().await; // skip the immediate first tick

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame.as_ref().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Pull envelopes off the socket until it closes or goes silent past the
/// keep-alive window (pongs count as traffic, so a healthy idle peer never
/// trips it).
async fn read_loop(
    receiver: &mut SplitStream<WebSocket>,
    engine: &RelayEngine,
    session_id: SessionId,
    idle_limit: Duration,
) {
    loop {
        let next = match timeout(idle_limit, receiver.next()).await {
            Ok(next) => next,
            Err(_) => {
                info!(%session_id, "keep-alive timeout, closing connection");
                break;
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => dispatch(engine, session_id, &text),
            Some(Ok(Message::Close(_))) | None => break,
            // Pings are answered by the transport; pongs and binary noise
            // only count as liveness.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(%session_id, error = %e, "websocket error");
                break;
            }
        }
    }
}

/// Route one inbound envelope to the engine. Malformed or unrecognized
/// input is logged and dropped; the connection stays open.
fn dispatch(engine: &RelayEngine, session_id: SessionId, text: &str) {
    let envelope = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(%session_id, error = %e, "ignoring malformed envelope");
            return;
        }
    };

    let outcome = match envelope {
        Envelope::Auth { .. } => {
            debug!(%session_id, "ignoring repeated auth");
            Ok(())
        }
        Envelope::CreateGuild { name } => engine
            .create_guild(session_id, &name)
            .map(|guild| engine.push_to(session_id, &Envelope::GuildCreated { guild })),
        Envelope::JoinGuild { invite_code } => engine
            .join_guild(session_id, &invite_code)
            .map(|guild| engine.push_to(session_id, &Envelope::GuildJoined { guild })),
        Envelope::SwitchGuild { guild_id } => engine.switch_guild(session_id, &guild_id),
        Envelope::Text { content, .. } => engine.send_text(session_id, &content),
        Envelope::VoiceJoin { .. } => engine.voice_join(session_id),
        Envelope::VoiceLeave { .. } => engine.voice_leave(session_id),
        Envelope::ScreenStart { .. } => engine.screen_start(session_id),
        Envelope::ScreenStop { .. } => engine.screen_stop(session_id),
        media @ (Envelope::VoiceData { .. } | Envelope::ScreenFrame { .. }) => {
            engine.relay_media(session_id, media)
        }
        // Server-push kinds arriving from a client are dropped.
        other => {
            debug!(%session_id, kind = other.kind(), "ignoring unexpected envelope");
            Ok(())
        }
    };

    if let Err(err) = outcome {
        match err {
            // Actions that merely lack an active guild are dropped quietly,
            // matching the relay's tolerance for racing clients.
            RelayError::NoGuild => {
                debug!(%session_id, "dropping envelope from session with no active guild");
            }
            err => engine.push_to(
                session_id,
                &Envelope::Error {
                    message: err.to_string(),
                },
            ),
        }
    }
}
