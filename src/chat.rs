use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub user: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(anyhow::anyhow!("unknown role: {}", other)),
        }
    }
}

/// An edit to a chat message. `user` and `role` may be omitted, in which
/// case the stored values are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatEdit {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// A card-game event. The relay never looks inside `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub player_id: String,
    pub timestamp: i64,
    pub room_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn game_message_uses_wire_field_names() {
        let msg = GameMessage {
            id: "g1".into(),
            kind: "playCard".into(),
            data: json!({"card": "QH"}),
            player_id: "p1".into(),
            timestamp: 1700000000000,
            room_code: "R1".into(),
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "g1",
                "type": "playCard",
                "data": {"card": "QH"},
                "playerId": "p1",
                "timestamp": 1700000000000i64,
                "roomCode": "R1",
            })
        );
    }

    #[test]
    fn role_parses_lowercase_names_only() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!(Role::User.to_string(), "user");
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn chat_edit_allows_missing_author() {
        let edit: ChatEdit = serde_json::from_value(json!({"id": "m1", "content": "hi there"})).unwrap();
        assert_eq!(edit.user, None);
        assert_eq!(edit.role, None);
    }
}
