use std::collections::{HashMap, HashSet};

use crate::db::RoomId;

use super::ConnectionId;

/// Which live connections are joined to which rooms, indexed both ways.
#[derive(Debug, Default)]
pub struct Membership {
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the connection was already in the room.
    pub fn join(&mut self, conn: ConnectionId, room: RoomId) -> bool {
        let added = self.rooms.entry(room.clone()).or_default().insert(conn);
        if added {
            self.joined.entry(conn).or_default().insert(room);
        }
        added
    }

    /// Drops the connection from every room and returns the rooms it left.
    pub fn leave_all(&mut self, conn: ConnectionId) -> Vec<RoomId> {
        let Some(rooms) = self.joined.remove(&conn) else {
            return Vec::new();
        };

        for room in &rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&conn);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        rooms.into_iter().collect()
    }

    pub fn members(&self, room: &RoomId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(room).into_iter().flatten().copied()
    }

    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Rooms with at least one live member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_idempotent() {
        let mut membership = Membership::new();
        let conn = ConnectionId::new();

        assert!(membership.join(conn, "r1".into()));
        assert!(!membership.join(conn, "r1".into()));
        assert_eq!(membership.member_count(&"r1".into()), 1);
        assert_eq!(membership.room_count(), 1);
    }

    #[test]
    fn leave_all_clears_every_room() {
        let mut membership = Membership::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        membership.join(a, "r1".into());
        membership.join(a, "r2".into());
        membership.join(b, "r1".into());

        let mut left = membership.leave_all(a);
        left.sort();
        assert_eq!(left, vec![RoomId::from("r1"), RoomId::from("r2")]);

        assert_eq!(membership.members(&"r1".into()).collect::<Vec<_>>(), [b]);
        assert_eq!(membership.members(&"r2".into()).count(), 0);
        assert_eq!(membership.room_count(), 1);
        assert!(membership.leave_all(a).is_empty());
    }

    #[test]
    fn members_of_unknown_room_is_empty() {
        let membership = Membership::new();
        assert_eq!(membership.members(&"nowhere".into()).count(), 0);
    }
}
