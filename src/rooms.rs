use crate::session::SessionManager;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Created,
    Joined,
}

/// Result of a player leaving their room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_code: String,
    /// Members still in the room. Empty means the room was torn down.
    pub remaining: Vec<String>,
}

/// Room code to member set. A room is present only while it has members.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, BTreeSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, room_code: &str) -> bool {
        self.rooms.contains_key(room_code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn create_or_join(&mut self, room_code: &str, player_id: &str) -> JoinOutcome {
        match self.rooms.get_mut(room_code) {
            Some(members) => {
                members.insert(player_id.to_string());
                JoinOutcome::Joined
            }
            None => {
                self.rooms
                    .insert(room_code.to_string(), BTreeSet::from([player_id.to_string()]));
                JoinOutcome::Created
            }
        }
    }

    /// Remove the player from the room their session is bound to, clearing
    /// the binding. Returns `None` when the player wasn't in a room.
    pub fn leave(&mut self, player_id: &str, sessions: &mut SessionManager) -> Option<Departure> {
        let room_code = sessions.unbind(player_id)?;
        let members = self.rooms.get_mut(&room_code)?;
        members.remove(player_id);

        let remaining: Vec<String> = members.iter().cloned().collect();
        if remaining.is_empty() {
            self.rooms.remove(&room_code);
        }

        Some(Departure { room_code, remaining })
    }

    pub fn members_of(&self, room_code: &str) -> BTreeSet<String> {
        self.rooms.get(room_code).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    pub fn rooms(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.rooms.iter().map(|(code, members)| (code.as_str(), members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Join through the registry and bind the session, as the relay does.
    fn join(rooms: &mut RoomRegistry, sessions: &mut SessionManager, room: &str, player: &str) -> JoinOutcome {
        let outcome = rooms.create_or_join(room, player);
        sessions.bind(player, room);
        outcome
    }

    fn assert_consistent(rooms: &RoomRegistry, sessions: &SessionManager, players: &[&str]) {
        for (code, members) in rooms.rooms() {
            assert!(!members.is_empty(), "room {} is present but empty", code);
            for member in members {
                assert_eq!(sessions.room_of(member), Some(code));
            }
        }
        for player in players {
            if let Some(code) = sessions.room_of(player) {
                assert!(rooms.members_of(code).contains(*player));
            }
        }
    }

    #[test]
    fn first_join_creates_then_others_join() {
        let mut rooms = RoomRegistry::new();
        let mut sessions = SessionManager::new();

        assert_eq!(join(&mut rooms, &mut sessions, "R1", "a"), JoinOutcome::Created);
        assert_eq!(join(&mut rooms, &mut sessions, "R1", "b"), JoinOutcome::Joined);
        assert_eq!(join(&mut rooms, &mut sessions, "R1", "b"), JoinOutcome::Joined);

        assert_eq!(rooms.members_of("R1"), BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_consistent(&rooms, &sessions, &["a", "b"]);
    }

    #[test]
    fn last_member_leaving_tears_room_down() {
        let mut rooms = RoomRegistry::new();
        let mut sessions = SessionManager::new();
        join(&mut rooms, &mut sessions, "R1", "a");
        join(&mut rooms, &mut sessions, "R1", "b");

        let departure = rooms.leave("a", &mut sessions).unwrap();
        assert_eq!(departure.room_code, "R1");
        assert_eq!(departure.remaining, vec!["b".to_string()]);
        assert_consistent(&rooms, &sessions, &["a", "b"]);

        let departure = rooms.leave("b", &mut sessions).unwrap();
        assert!(departure.remaining.is_empty());
        assert!(!rooms.contains("R1"));
        assert!(rooms.members_of("R1").is_empty());
        assert!(rooms.is_empty());
        assert_consistent(&rooms, &sessions, &["a", "b"]);
    }

    #[test]
    fn leaving_without_a_room_is_a_no_op() {
        let mut rooms = RoomRegistry::new();
        let mut sessions = SessionManager::new();
        join(&mut rooms, &mut sessions, "R1", "a");

        assert_eq!(rooms.leave("stranger", &mut sessions), None);
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn unknown_room_has_no_members() {
        assert!(RoomRegistry::new().members_of("nope").is_empty());
    }
}
