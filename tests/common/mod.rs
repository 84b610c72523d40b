#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use roomcast::{AppState, app, db::Store, protocol::ServerEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message as Frame};
use tower_http::cors::CorsLayer;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Users `1` and `2`, rooms `r1` and `r2`, user `1` a member of `r1`.
pub async fn seeded_state() -> AppState {
    let store = Store::in_memory().await.unwrap();
    store.migrate().await.unwrap();

    store.create_user(&"1".into(), "User 1").await.unwrap();
    store.create_user(&"2".into(), "User 2").await.unwrap();
    store.create_room(Some("r1".into()), "first", Some(&"1".into())).await.unwrap();
    store.create_room(Some("r2".into()), "second", None).await.unwrap();

    AppState::new(store)
}

pub async fn spawn_server(state: AppState) -> SocketAddr {
    spawn_router(app(state, CorsLayer::permissive())).await
}

pub async fn spawn_router(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn ws_connect(addr: SocketAddr) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

pub async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(Frame::text(text.to_owned())).await.unwrap();
}

pub async fn join(ws: &mut Ws, room: &str) {
    send_raw(ws, &serde_json::json!({"type": "join-room", "roomId": room}).to_string()).await;
    match next_event(ws, Duration::from_secs(5)).await {
        Some(ServerEvent::Joined { room_id }) => assert_eq!(room_id.as_str(), room),
        other => panic!("expected join ack, got {other:?}"),
    }
}

/// Next server event, or `None` if nothing arrives within `wait`.
pub async fn next_event(ws: &mut Ws, wait: Duration) -> Option<ServerEvent> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.ok()??.ok()?;
        if let Frame::Text(text) = frame {
            return Some(serde_json::from_str(text.as_str()).unwrap());
        }
    }
}

pub async fn post_message(addr: SocketAddr, user: &str, room: &str, content: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/messages"))
        .bearer_auth(user)
        .json(&serde_json::json!({"content": content, "roomId": room}))
        .send()
        .await
        .unwrap()
}
