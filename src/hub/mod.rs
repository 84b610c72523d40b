mod membership;

use std::{collections::HashMap, fmt};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::{db::RoomId, protocol::ServerEvent};

pub use membership::Membership;

/// Identifies one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Outbound queue of a connection's write loop. Frames are serialized JSON.
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Outbound>,
    membership: Membership,
}

/// Fans events out to the connections joined to a room.
///
/// Connections and memberships share one lock: broadcasts iterate under the
/// read guard, joins and disconnects mutate under the write guard. Sends are
/// unbounded enqueues, so no guard is ever held across a network write.
#[derive(Default)]
pub struct Hub {
    registry: RwLock<Registry>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, conn: ConnectionId, sender: Outbound) {
        self.registry.write().await.connections.insert(conn, sender);
        tracing::debug!(conn_id = %conn, "connection registered");
    }

    /// Adds a registered connection to a room. Returns `true` only when the
    /// connection was not yet a member.
    pub async fn join(&self, conn: ConnectionId, room: RoomId) -> bool {
        let mut registry = self.registry.write().await;
        if !registry.connections.contains_key(&conn) {
            tracing::warn!(conn_id = %conn, room_id = %room, "join from unregistered connection ignored");
            return false;
        }

        let added = registry.membership.join(conn, room.clone());
        if added {
            tracing::info!(conn_id = %conn, room_id = %room, "joined room");
        }
        added
    }

    /// Forgets the connection and every room it had joined.
    pub async fn disconnect(&self, conn: ConnectionId) -> Vec<RoomId> {
        let mut registry = self.registry.write().await;
        registry.connections.remove(&conn);
        let left = registry.membership.leave_all(conn);
        tracing::info!(conn_id = %conn, rooms = left.len(), "connection closed");
        left
    }

    /// Best-effort delivery to every member of `room`. Closed queues are
    /// skipped. Returns how many connections the event was queued for.
    pub async fn broadcast(&self, room: &RoomId, event: &ServerEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(room_id = %room, error = %err, "could not serialize event");
                return 0;
            }
        };

        let registry = self.registry.read().await;
        let mut delivered = 0;
        for conn in registry.membership.members(room) {
            let Some(sender) = registry.connections.get(&conn) else {
                continue;
            };
            if sender.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(conn_id = %conn, room_id = %room, "skipping closed connection");
            }
        }

        tracing::debug!(room_id = %room, delivered, "broadcast");
        delivered
    }

    /// Sends an event to a single connection.
    pub async fn send_to(&self, conn: ConnectionId, event: &ServerEvent) -> bool {
        let Ok(frame) = serde_json::to_string(event) else {
            return false;
        };
        self.registry
            .read()
            .await
            .connections
            .get(&conn)
            .is_some_and(|sender| sender.send(frame).is_ok())
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }

    pub async fn member_count(&self, room: &RoomId) -> usize {
        self.registry.read().await.membership.member_count(room)
    }

    pub async fn room_count(&self) -> usize {
        self.registry.read().await.membership.room_count()
    }
}
