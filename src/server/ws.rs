//! WebSocket acceptor.
//!
//! Every upgraded connection gets its own task running [`serve_connection`],
//! which owns one [`Session`] until the socket closes or fails.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::relay::RelayHandle;
use crate::session::Session;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(handle_upgrade)).with_state(state)
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if !state.settings.network.allow_any_origin && !origin_allowed(&headers) {
        warn!(%peer, "Rejected WebSocket upgrade from foreign origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| serve_connection(socket, relay, peer))
}

/// Run one client's session until the connection ends.
///
/// Read failures and close frames both end the session; a session holding the
/// producer lock releases it on the way out.
pub async fn serve_connection(mut socket: WebSocket, relay: RelayHandle, peer: SocketAddr) {
    let mut session = Session::new(relay);
    let span = info_span!("session", id = session.id(), %peer);

    async move {
        info!("Client connected");
        while let Some(received) = socket.recv().await {
            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    warn!("Read error, closing connection: {}", e);
                    break;
                }
            };

            let reply = match message {
                Message::Text(text) => session.handle_text(text.as_str()).await,
                Message::Binary(data) => {
                    if let Err(e) = session.handle_binary(data).await {
                        error!("Dropping connection: {}", e);
                        break;
                    }
                    continue;
                }
                Message::Close(_) => break,
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            let text = match reply.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode reply: {}", e);
                    continue;
                }
            };
            if let Err(e) = socket.send(Message::Text(text.into())).await {
                debug!("Write failed, closing connection: {}", e);
                break;
            }
        }

        session.close().await;
        info!("Client disconnected");
    }
    .instrument(span)
    .await
}

fn origin_allowed(headers: &HeaderMap) -> bool {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    match (origin, host) {
        // Non-browser clients send no Origin
        (None, _) => true,
        (Some(origin), Some(host)) => origin_matches_host(origin, host),
        (Some(_), None) => false,
    }
}

/// Compare host names only; the capture page is served from a different port.
fn origin_matches_host(origin: &str, host: &str) -> bool {
    let authority = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let authority = authority.split('/').next().unwrap_or(authority);
    let origin_host = strip_port(authority);
    !origin_host.is_empty() && origin_host.eq_ignore_ascii_case(strip_port(host))
}

fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return authority.split_inclusive(']').next().unwrap_or(authority);
    }
    authority.rsplit_once(':').map_or(authority, |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSink;
    use crate::relay::{Relay, RelayOptions, ResultFile};
    use crate::session::{ReplyKind, ServerReply};
    use crate::settings::ServerSettings;
    use axum::http::HeaderValue;
    use futures::{SinkExt, StreamExt};
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const LOCK: &str = r#"{"type":"AUDIOSTREAMINGSERVICE_LOCK"}"#;

    async fn spawn_server(result: PathBuf) -> (Relay, SocketAddr) {
        let relay = Relay::start(Box::new(NullSink), ResultFile::new(result), RelayOptions::default());
        let state = AppState::new(relay.handle(), ServerSettings::default());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (relay, addr)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
        client
    }

    async fn next_reply(client: &mut Client) -> ServerReply {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for reply")
                .expect("connection ended")
                .unwrap();
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Keep asking for the lock until the previous holder's release lands.
    async fn lock_eventually(client: &mut Client) -> ServerReply {
        for _ in 0..100 {
            client.send(WsMessage::text(LOCK)).await.unwrap();
            let reply = next_reply(client).await;
            if reply.kind == ReplyKind::Locked {
                return reply;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("lock was never released");
    }

    async fn lock_and_send(addr: SocketAddr, frame: &[u8]) -> Client {
        let mut client = connect(addr).await;
        client.send(WsMessage::text(LOCK)).await.unwrap();
        assert_eq!(next_reply(&mut client).await.kind, ReplyKind::Locked);
        client.send(WsMessage::binary(frame.to_vec())).await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_dropped_connection_releases_lock_and_saves_audio() {
        let dir = tempfile::tempdir().unwrap();
        let result = dir.path().join("result.dat");
        let (relay, addr) = spawn_server(result.clone()).await;

        let frame = [0u8, 0, 0, 0, 0, 0, 0, 63];
        let holder = lock_and_send(addr, &frame).await;

        let mut waiting = connect(addr).await;
        waiting.send(WsMessage::text(LOCK)).await.unwrap();
        assert_eq!(next_reply(&mut waiting).await.kind, ReplyKind::Error);

        // Vanish without a close handshake
        drop(holder);

        lock_eventually(&mut waiting).await;
        assert_eq!(std::fs::read(&result).unwrap(), frame.to_vec());
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_frame_releases_lock_and_saves_audio() {
        let dir = tempfile::tempdir().unwrap();
        let result = dir.path().join("result.dat");
        let (relay, addr) = spawn_server(result.clone()).await;

        let frame = [1u8, 1, 1, 1, 0, 0, 128, 191];
        let mut holder = lock_and_send(addr, &frame).await;
        holder.close(None).await.unwrap();

        let mut next = connect(addr).await;
        lock_eventually(&mut next).await;
        assert_eq!(std::fs::read(&result).unwrap(), frame.to_vec());
        relay.shutdown().await;
    }

    #[test]
    fn test_origin_matches_host_ignoring_port() {
        assert!(origin_matches_host("http://192.168.1.5:8000", "192.168.1.5:8001"));
        assert!(origin_matches_host("https://Relay.local", "relay.local:8001"));
        assert!(origin_matches_host("http://[::1]:8000", "[::1]:8001"));
        assert!(!origin_matches_host("http://evil.example:8000", "192.168.1.5:8001"));
        assert!(!origin_matches_host("null", "relay.local"));
    }

    #[test]
    fn test_missing_origin_is_allowed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("relay.local:8001"));
        assert!(origin_allowed(&headers));

        headers.insert(header::ORIGIN, HeaderValue::from_static("http://other.local"));
        assert!(!origin_allowed(&headers));
    }
}
