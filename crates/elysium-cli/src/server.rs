//! Browser surface: static client, plus one story session per `/ws/game`
//! connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use elysium_contracts::protocol::{parse_choice_frame, parse_start_frame, ServerFrame};
use elysium_engine::{Scene, StoryEngine, StorySession};
use uuid::Uuid;

const EMBEDDED_INDEX: &str = include_str!("../static/index.html");

#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub peer: SocketAddr,
    pub connected_at: SystemTime,
}

/// Live websocket sessions, keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<Uuid, ConnectionInfo>>,
}

impl ConnectionRegistry {
    pub fn connect(&self, peer: SocketAddr) -> Uuid {
        let id = Uuid::new_v4();
        let info = ConnectionInfo {
            peer,
            connected_at: SystemTime::now(),
        };
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, info);
        id
    }

    pub fn disconnect(&self, id: &Uuid) -> Option<ConnectionInfo> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<StoryEngine>,
    registry: Arc<ConnectionRegistry>,
    static_dir: PathBuf,
}

impl AppState {
    pub fn new(engine: Arc<StoryEngine>, static_dir: PathBuf) -> Self {
        Self {
            engine,
            registry: Arc::new(ConnectionRegistry::default()),
            static_dir,
        }
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/static/*path", get(static_file))
        .route("/ws/game", get(game_socket))
        .with_state(state)
}

pub async fn serve(bind: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let address = listener.local_addr()?;
    tracing::info!(%address, "serving story client at http://{address}/");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server stopped with an error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(body) => Html(body),
        Err(_) => Html(EMBEDDED_INDEX.to_string()),
    }
}

async fn static_file(State(state): State<AppState>, UrlPath(path): UrlPath<String>) -> Response {
    let Some(file) = resolve_static(&state.static_dir, &path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Joins a request path onto `root`, refusing anything that is not a plain
/// file name component.
fn resolve_static(root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    let mut pushed = false;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                pushed = true;
            }
            _ => return None,
        }
    }
    pushed.then_some(resolved)
}

async fn game_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, state, peer))
}

async fn run_connection(mut socket: WebSocket, state: AppState, peer: SocketAddr) {
    let id = state.registry.connect(peer);
    tracing::info!(connection = %id, %peer, live = state.registry.len(), "client connected");

    let mut session = state.engine.session(id.to_string());
    let reason = match drive_session(&mut socket, &mut session).await {
        Ok(reason) => reason,
        Err(err) => {
            tracing::warn!(connection = %id, error = %format!("{err:#}"), "session ended on error");
            "send_failed"
        }
    };
    session.finish(reason);

    state.registry.disconnect(&id);
    tracing::info!(connection = %id, reason, turns = session.turns(), "client disconnected");
}

async fn drive_session(socket: &mut WebSocket, session: &mut StorySession) -> Result<&'static str> {
    let Some(raw) = next_text(socket).await else {
        return Ok("disconnected");
    };
    let premise = parse_start_frame(&raw);
    tracing::debug!(session = session.id(), premise = %premise, "story requested");

    let scene = session.begin(&premise).await;
    deliver(socket, session, &scene).await?;

    while let Some(raw) = next_text(socket).await {
        let Some(choice) = parse_choice_frame(&raw) else {
            tracing::debug!(session = session.id(), frame = %raw, "rejected choice frame");
            send(socket, &ServerFrame::invalid_choice()).await?;
            continue;
        };
        let scene = session.advance(choice).await;
        deliver(socket, session, &scene).await?;
    }
    Ok("disconnected")
}

/// Story text first, then the illustration when one was produced.
async fn deliver(socket: &mut WebSocket, session: &StorySession, scene: &Scene) -> Result<()> {
    send(socket, &ServerFrame::story(scene.text.clone())).await?;
    if let Some(illustration) = session.illustrate(scene).await {
        send(socket, &ServerFrame::image(illustration.to_base64())).await?;
    }
    Ok(())
}

async fn send(socket: &mut WebSocket, frame: &ServerFrame) -> Result<()> {
    let body = frame.to_json().context("failed to encode server frame")?;
    socket
        .send(Message::Text(body))
        .await
        .context("websocket send failed")
}

/// Next text frame, skipping control and binary frames. `None` once the
/// peer has gone away.
async fn next_text(socket: &mut WebSocket) -> Option<String> {
    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(error = %err, "websocket receive failed");
                return None;
            }
        }
    }
    None
}
