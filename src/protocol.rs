use crate::chat::{ChatEdit, ChatMessage, GameMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ROOM_NOT_FOUND: &str = "Room not found";
pub const SAVE_FAILED: &str = "Failed to save message";

/// Types the relay acts on. Anything else is relayed verbatim.
const HANDLED_TYPES: &[&str] = &["add", "update", "createRoom", "joinRoom", "gameMessage"];

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Add(ChatMessage),
    Update(ChatEdit),
    CreateRoom { room_code: String },
    JoinRoom { room_code: String },
    GameMessage {
        data: GameMessage,
        /// `data` exactly as the client sent it, unknown fields included.
        #[serde(skip)]
        payload: Value,
    },
    /// Unrecognized type; the raw frame goes to everyone.
    #[serde(skip)]
    Passthrough,
}

/// Frames sent by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    All { messages: Vec<ChatMessage> },
    RoomCreated { room_code: String },
    RoomJoined { room_code: String },
    PlayerJoined { player_id: String, room_code: String },
    PlayerLeft { player_id: String, room_code: String },
    GameMessage { data: Value },
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("invalid {kind} event: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("room code must not be empty")]
    EmptyRoomCode,

    #[error("update for unknown message {0} is missing user or role")]
    IncompleteChatEdit(String),
}

impl ProtocolError {
    /// Text reported back to the client in an `error` event.
    pub fn client_message(&self) -> String {
        match self {
            ProtocolError::Malformed(_) | ProtocolError::NotAnObject => "Malformed message".to_string(),
            ProtocolError::Invalid { kind, .. } => format!("Invalid {} message", kind),
            ProtocolError::EmptyRoomCode => "Room code must not be empty".to_string(),
            ProtocolError::IncompleteChatEdit(_) => "Message not found".to_string(),
        }
    }
}

impl ClientEvent {
    /// Classifies a text frame. Known types are parsed strictly; unknown or
    /// missing `type` yields [`ClientEvent::Passthrough`].
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame).map_err(ProtocolError::Malformed)?;

        let kind = match value.as_object() {
            Some(object) => object.get("type").and_then(Value::as_str).map(str::to_owned),
            None => return Err(ProtocolError::NotAnObject),
        };

        let Some(kind) = kind.filter(|k| HANDLED_TYPES.contains(&k.as_str())) else {
            return Ok(ClientEvent::Passthrough);
        };

        let raw_payload = (kind == "gameMessage").then(|| value["data"].clone());

        let mut event: ClientEvent =
            serde_json::from_value(value).map_err(|source| ProtocolError::Invalid { kind, source })?;

        if let (ClientEvent::GameMessage { payload, .. }, Some(raw)) = (&mut event, raw_payload) {
            *payload = raw;
        }

        match &event {
            ClientEvent::CreateRoom { room_code } | ClientEvent::JoinRoom { room_code }
                if room_code.trim().is_empty() =>
            {
                Err(ProtocolError::EmptyRoomCode)
            }
            _ => Ok(event),
        }
    }
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
