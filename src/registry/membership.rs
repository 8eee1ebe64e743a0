//! Room membership table
//!
//! Holds the three views of who is where:
//! - `room → members`: which connections receive a room broadcast
//! - `connection → room` and `connection → user id`: the seat a connection holds
//!
//! The table itself is not synchronized; [`super::Registry`] wraps it in a lock.

use std::collections::{HashMap, HashSet};

use super::ConnectionId;

/// The room and identity a joined connection currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
struct Seat {
    room: String,
    user_id: String,
    /// Monotonic join order, used to pick a winner among duplicate user ids
    joined_seq: u64,
}

/// Membership state for every joined connection
#[derive(Debug, Default)]
pub struct Membership {
    /// Room name → member connections. Rooms stay here once created, even empty.
    rooms: HashMap<String, HashSet<ConnectionId>>,
    /// Connection → seat. Absent until the connection joins.
    seats: HashMap<ConnectionId, Seat>,
    next_seq: u64,
}

impl Membership {
    /// Create an empty table
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `conn` into `room` as `user_id`
    ///
    /// Any previous seat is vacated first. Returns the room that was left, if any.
    pub fn join(&mut self, conn: ConnectionId, room: &str, user_id: &str) -> Option<String> {
        let previous = self.leave(conn);

        self.next_seq += 1;
        self.rooms.entry(room.to_string()).or_default().insert(conn);
        self.seats.insert(
            conn,
            Seat {
                room: room.to_string(),
                user_id: user_id.to_string(),
                joined_seq: self.next_seq,
            },
        );

        previous
    }

    /// Vacate the seat held by `conn`
    ///
    /// Returns the room that was left, or `None` if the connection held no seat.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<String> {
        let seat = self.seats.remove(&conn)?;
        if let Some(members) = self.rooms.get_mut(&seat.room) {
            members.remove(&conn);
        }
        Some(seat.room)
    }

    /// Snapshot of the members of `room`; unknown rooms are empty
    pub fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Connection most recently joined under `user_id`
    pub fn find_by_user_id(&self, user_id: &str) -> Option<ConnectionId> {
        self.seats
            .iter()
            .filter(|(_, seat)| seat.user_id == user_id)
            .max_by_key(|(_, seat)| seat.joined_seq)
            .map(|(conn, _)| *conn)
    }

    /// Current room of `conn`
    pub fn room_of(&self, conn: ConnectionId) -> Option<&str> {
        self.seats.get(&conn).map(|seat| seat.room.as_str())
    }

    /// Current user id of `conn`
    pub fn user_of(&self, conn: ConnectionId) -> Option<&str> {
        self.seats.get(&conn).map(|seat| seat.user_id.as_str())
    }

    /// Names of every room ever joined, sorted
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every seat is mirrored by exactly one room membership and vice versa
    fn assert_consistent(table: &Membership) {
        for (conn, seat) in &table.seats {
            let holding: Vec<&String> = table
                .rooms
                .iter()
                .filter(|(_, members)| members.contains(conn))
                .map(|(name, _)| name)
                .collect();
            assert_eq!(holding, vec![&seat.room], "connection {} seated wrongly", conn);
        }
        for members in table.rooms.values() {
            for conn in members {
                assert!(table.seats.contains_key(conn), "dangling member {}", conn);
            }
        }
    }

    #[test]
    fn test_join_records_room_and_user() {
        let mut table = Membership::new();
        let a = ConnectionId::new();

        assert_eq!(table.join(a, "room1", "alice"), None);

        assert_eq!(table.room_of(a), Some("room1"));
        assert_eq!(table.user_of(a), Some("alice"));
        assert!(table.members_of("room1").contains(&a));
        assert_consistent(&table);
    }

    #[test]
    fn test_join_other_room_leaves_previous() {
        let mut table = Membership::new();
        let a = ConnectionId::new();
        table.join(a, "room1", "alice");

        let previous = table.join(a, "room2", "alice");

        assert_eq!(previous.as_deref(), Some("room1"));
        assert!(table.members_of("room1").is_empty());
        assert!(table.members_of("room2").contains(&a));
        assert_consistent(&table);
    }

    #[test]
    fn test_rejoin_can_change_user_id() {
        let mut table = Membership::new();
        let a = ConnectionId::new();
        table.join(a, "room1", "alice");
        table.join(a, "room1", "alicia");

        assert_eq!(table.find_by_user_id("alice"), None);
        assert_eq!(table.find_by_user_id("alicia"), Some(a));
        assert_eq!(table.members_of("room1").len(), 1);
        assert_consistent(&table);
    }

    #[test]
    fn test_repeated_join_is_stable() {
        let mut table = Membership::new();
        let a = ConnectionId::new();
        table.join(a, "room1", "alice");
        table.join(a, "room1", "alice");

        assert_eq!(table.members_of("room1").len(), 1);
        assert_eq!(table.room_of(a), Some("room1"));
        assert_eq!(table.user_of(a), Some("alice"));
        assert_consistent(&table);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut table = Membership::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        table.join(a, "room1", "alice");
        table.join(b, "room1", "bob");

        assert_eq!(table.leave(a).as_deref(), Some("room1"));
        let after_once = table.members_of("room1");
        assert_eq!(table.leave(a), None);

        assert_eq!(table.members_of("room1"), after_once);
        assert_eq!(table.room_of(a), None);
        assert_eq!(table.user_of(a), None);
        assert_consistent(&table);
    }

    #[test]
    fn test_leave_without_join_is_noop() {
        let mut table = Membership::new();
        assert_eq!(table.leave(ConnectionId::new()), None);
        assert!(table.room_names().is_empty());
    }

    #[test]
    fn test_empty_room_is_kept() {
        let mut table = Membership::new();
        let a = ConnectionId::new();
        table.join(a, "room1", "alice");
        table.leave(a);

        assert_eq!(table.room_names(), vec!["room1".to_string()]);
        assert!(table.members_of("room1").is_empty());
    }

    #[test]
    fn test_unknown_room_has_no_members() {
        let table = Membership::new();
        assert!(table.members_of("nowhere").is_empty());
    }

    #[test]
    fn test_duplicate_user_id_last_join_wins() {
        let mut table = Membership::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        table.join(first, "room1", "alice");
        table.join(second, "room2", "alice");

        assert_eq!(table.find_by_user_id("alice"), Some(second));

        // The earlier holder becomes resolvable again once the winner leaves
        table.leave(second);
        assert_eq!(table.find_by_user_id("alice"), Some(first));

        table.leave(first);
        assert_eq!(table.find_by_user_id("alice"), None);
    }

    #[test]
    fn test_single_room_invariant_over_mixed_sequence() {
        let mut table = Membership::new();
        let conns: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();
        let rooms = ["a", "b", "c"];

        for step in 0..60usize {
            let conn = conns[step % conns.len()];
            if step % 5 == 0 {
                table.leave(conn);
            } else {
                table.join(conn, rooms[(step * 7) % rooms.len()], "user");
            }
            assert_consistent(&table);
        }
    }
}
