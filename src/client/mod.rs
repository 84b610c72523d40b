//! A chat client bound to one room: history fetched once, live messages
//! merged as they arrive, sends reconciled against the broadcast echo.

mod api;
mod view;

use std::{sync::Arc, time::Duration};

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    net::TcpStream,
    sync::{RwLock, RwLockReadGuard, broadcast, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message as Frame};
use uuid::Uuid;

use crate::{
    db::{Message, RoomId, UserId},
    protocol::{ClientEvent, ServerEvent},
};

pub use api::ApiClient;
pub use view::{Applied, MessageView, Pending, ViewItem};

pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server responded {status}: {message}")]
    Api { status: reqwest::StatusCode, message: String },
    #[error("server rejected frame: {0}")]
    Rejected(String),
    #[error("not connected")]
    Disconnected,
    #[error("timed out")]
    Timeout,
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base HTTP address of the server, e.g. `http://localhost:3000`.
    pub server: String,
    pub user: UserId,
    pub room: RoomId,
}

/// Session state shared with the reader task.
struct Shared {
    view: RwLock<MessageView>,
    revision: watch::Sender<u64>,
    live: broadcast::Sender<Message>,
}

impl Shared {
    fn new() -> Self {
        Self {
            view: RwLock::new(MessageView::new()),
            revision: watch::channel(0).0,
            live: broadcast::channel(256).0,
        }
    }

    /// Live subscribers are notified while the view is still locked, so a
    /// snapshot taken under the lock never overlaps the live stream.
    async fn apply(&self, message: Message, client_token: Option<&str>) -> Applied {
        let mut view = self.view.write().await;
        let applied = view.apply(message.clone(), client_token);
        if applied != Applied::Duplicate {
            self.bump();
            let _ = self.live.send(message);
        }
        applied
    }

    async fn snapshot(&self) -> (Vec<Message>, broadcast::Receiver<Message>) {
        let view = self.view.read().await;
        (view.messages().cloned().collect(), self.live.subscribe())
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// One user's live view of one room.
///
/// The socket reader runs as a task owned by the session; dropping the
/// session stops it and releases the connection.
pub struct ChatSession {
    api: ApiClient,
    room: RoomId,
    shared: Arc<Shared>,
    state: watch::Receiver<ConnectionState>,
    sink: SplitSink<Socket, Frame>,
    reader: JoinHandle<()>,
}

impl ChatSession {
    /// Joins the room on the live channel, then loads its history.
    pub async fn open(config: SessionConfig) -> Result<ChatSession, ClientError> {
        let api = ApiClient::new(&config.server, config.user)?;

        let (socket, _) = tokio_tungstenite::connect_async(api.live_url()?.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let join = ClientEvent::JoinRoom {
            room_id: config.room.clone(),
        };
        sink.send(Frame::text(serde_json::to_string(&join)?)).await?;

        let shared = Arc::new(Shared::new());
        let early = tokio::time::timeout(JOIN_TIMEOUT, await_joined(&mut stream, &config.room))
            .await
            .map_err(|_| ClientError::Timeout)??;
        for (message, client_token) in early {
            shared.apply(message, client_token.as_deref()).await;
        }

        let (state_tx, state) = watch::channel(ConnectionState::Connected);
        let reader = tokio::spawn(read_loop(stream, config.room.clone(), Arc::clone(&shared), state_tx));

        let history = match api.messages(&config.room).await {
            Ok(history) => history,
            Err(err) => {
                reader.abort();
                return Err(err);
            }
        };
        let added = shared.view.write().await.merge_history(history);
        shared.bump();
        tracing::debug!(room_id = %config.room, added, "history loaded");

        Ok(ChatSession {
            api,
            room: config.room,
            shared,
            state,
            sink,
            reader,
        })
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn user(&self) -> &UserId {
        self.api.user()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Follows the transport state, e.g. for a connected indicator.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stored messages plus a subscription that continues exactly where the
    /// snapshot ends: each message appears in one of the two, never both.
    pub async fn follow(&self) -> (Vec<Message>, broadcast::Receiver<Message>) {
        self.shared.snapshot().await
    }

    pub async fn view(&self) -> RwLockReadGuard<'_, MessageView> {
        self.shared.view.read().await
    }

    /// Stored messages in timeline order.
    pub async fn messages(&self) -> Vec<Message> {
        self.view().await.messages().cloned().collect()
    }

    /// Shows the message immediately as pending, then stores it. Refused
    /// while disconnected.
    pub async fn send(&self, content: &str) -> Result<Message, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::Disconnected);
        }

        let token = Uuid::now_v7().to_string();
        self.shared.view.write().await.push_pending(Pending {
            token: token.clone(),
            user_id: self.user().clone(),
            content: content.to_owned(),
        });
        self.shared.bump();

        match self.api.send_message(&self.room, content, Some(&token)).await {
            Ok(message) => {
                self.shared.apply(message.clone(), Some(&token)).await;
                Ok(message)
            }
            Err(err) => {
                self.shared.view.write().await.discard_pending(&token);
                self.shared.bump();
                Err(err)
            }
        }
    }

    /// Waits until `check` holds for the view.
    pub async fn wait_for<F>(&self, timeout: Duration, check: F) -> Result<(), ClientError>
    where
        F: Fn(&MessageView) -> bool,
    {
        let mut revision = self.shared.revision.subscribe();
        let mut state = self.state.clone();

        let wait = async {
            loop {
                if check(&*self.shared.view.read().await) {
                    return Ok(());
                }
                if *state.borrow_and_update() == ConnectionState::Disconnected {
                    return Err(ClientError::Disconnected);
                }
                let alive = tokio::select! {
                    changed = revision.changed() => changed.is_ok(),
                    changed = state.changed() => changed.is_ok(),
                };
                if !alive {
                    return Err(ClientError::Disconnected);
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| ClientError::Timeout)?
    }

    /// Closes the socket gracefully.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.sink.send(Frame::Close(None)).await?;
        Ok(())
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

type JoinBacklog = Vec<(Message, Option<String>)>;

/// Reads frames until the server acknowledges the join. Room messages that
/// arrive before the ack are returned so they are not lost.
async fn await_joined(
    stream: &mut SplitStream<Socket>,
    room: &RoomId,
) -> Result<JoinBacklog, ClientError> {
    let mut backlog = Vec::new();
    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Frame::Text(text) => text,
            Frame::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ServerEvent>(text.as_str())? {
            ServerEvent::Joined { room_id } if &room_id == room => return Ok(backlog),
            ServerEvent::ChatMessage { data, client_token } if &data.room_id == room => {
                backlog.push((data, client_token));
            }
            ServerEvent::Error { error } => return Err(ClientError::Rejected(error)),
            _ => {}
        }
    }
    Err(ClientError::Disconnected)
}

async fn read_loop(
    mut stream: SplitStream<Socket>,
    room: RoomId,
    shared: Arc<Shared>,
    state: watch::Sender<ConnectionState>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Frame::Text(text)) => text,
            Ok(Frame::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(room_id = %room, error = %err, "live channel failed");
                break;
            }
        };

        match serde_json::from_str::<ServerEvent>(text.as_str()) {
            Ok(ServerEvent::ChatMessage { data, client_token }) if data.room_id == room => {
                shared.apply(data, client_token.as_deref()).await;
            }
            Ok(ServerEvent::Error { error }) => tracing::warn!(room_id = %room, error, "server reported error"),
            Ok(_) => {}
            Err(err) => tracing::warn!(room_id = %room, error = %err, "unreadable frame"),
        }
    }

    tracing::info!(room_id = %room, "disconnected");
    state.send_replace(ConnectionState::Disconnected);
}
