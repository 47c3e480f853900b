use crate::chat::{ChatMessage, GameMessage};
use crate::config::BroadcastScope;
use crate::history::MessageHistory;
use crate::protocol::{ClientEvent, ProtocolError, ServerEvent, ROOM_NOT_FOUND, SAVE_FAILED};
use crate::rooms::{Departure, JoinOutcome, RoomRegistry};
use crate::session::{ConnectionId, Outbox, SessionManager};
use anyhow::{anyhow, Result};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Connection events delivered by the transport.
#[derive(Debug)]
pub enum RelayCommand {
    Connect { id: ConnectionId, outbox: Outbox },
    Message { id: ConnectionId, frame: String },
    Disconnect { id: ConnectionId },
}

/// Cloneable sender side of the relay. The relay stops once every handle
/// has been dropped.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    pub async fn connect(&self, id: ConnectionId, outbox: Outbox) -> Result<()> {
        self.send(RelayCommand::Connect { id, outbox }).await
    }

    pub async fn message(&self, id: ConnectionId, frame: String) -> Result<()> {
        self.send(RelayCommand::Message { id, frame }).await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> Result<()> {
        self.send(RelayCommand::Disconnect { id }).await
    }

    async fn send(&self, command: RelayCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("relay is no longer running"))
    }
}

/// All state of one relay instance. Commands are handled one at a time, to
/// completion, by the task that owns it.
pub struct Relay {
    history: MessageHistory,
    rooms: RoomRegistry,
    sessions: SessionManager,
    scope: BroadcastScope,
}

impl Relay {
    pub fn new(history: MessageHistory, scope: BroadcastScope) -> Self {
        Self {
            history,
            rooms: RoomRegistry::new(),
            sessions: SessionManager::new(),
            scope,
        }
    }

    pub fn spawn(self, capacity: usize) -> (RelayHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(self.run(rx));
        (RelayHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RelayCommand>) {
        info!("Relay started ({:?} broadcast scope)", self.scope);
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        info!("Relay stopped");
    }

    pub async fn handle(&mut self, command: RelayCommand) {
        let result = match command {
            RelayCommand::Connect { id, outbox } => self.on_connect(id, outbox),
            RelayCommand::Message { id, frame } => self.on_message(&id, frame).await,
            RelayCommand::Disconnect { id } => self.on_close(&id),
        };

        if let Err(e) = result {
            error!("Relay failed to handle event: {:#}", e);
        }
    }

    /// Register the connection and send it the full chat history.
    pub fn on_connect(&mut self, id: ConnectionId, outbox: Outbox) -> Result<()> {
        self.sessions.connect(id.clone(), outbox);
        info!("Connection {} opened ({} live)", id, self.sessions.connection_count());

        self.reply(
            &id,
            ServerEvent::All {
                messages: self.history.chat_history().to_vec(),
            },
        )
    }

    pub async fn on_message(&mut self, id: &str, frame: String) -> Result<()> {
        if !self.sessions.is_connected(id) {
            warn!("Ignoring frame from unknown connection {}", id);
            return Ok(());
        }

        let event = match ClientEvent::parse(&frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Rejected frame from {}: {}", id, e);
                return self.reply(id, ServerEvent::error(e.client_message()));
            }
        };

        match event {
            ClientEvent::Add(msg) => self.save_chat(id, msg, &frame).await,

            ClientEvent::Update(edit) => {
                let message_id = edit.id.clone();
                match self.history.resolve_chat_edit(edit) {
                    Some(msg) => self.save_chat(id, msg, &frame).await,
                    None => {
                        let e = ProtocolError::IncompleteChatEdit(message_id);
                        warn!("Rejected frame from {}: {}", id, e);
                        self.reply(id, ServerEvent::error(e.client_message()))
                    }
                }
            }

            ClientEvent::CreateRoom { room_code } => {
                self.enter_room(id, &room_code)?;
                self.reply(id, ServerEvent::RoomCreated { room_code })
            }

            ClientEvent::JoinRoom { room_code } => {
                if !self.rooms.contains(&room_code) {
                    debug!("{} tried to join missing room {}", id, room_code);
                    return self.reply(id, ServerEvent::error(ROOM_NOT_FOUND));
                }

                self.enter_room(id, &room_code)?;
                self.reply(
                    id,
                    ServerEvent::RoomJoined {
                        room_code: room_code.clone(),
                    },
                )?;

                let joined = ServerEvent::PlayerJoined {
                    player_id: id.to_string(),
                    room_code,
                }
                .encode()?;
                self.sessions.broadcast(&joined, &[id]);
                Ok(())
            }

            ClientEvent::GameMessage { data, payload } => self.save_game(id, data, payload).await,

            ClientEvent::Passthrough => {
                self.sessions.broadcast(&frame, &[]);
                Ok(())
            }
        }
    }

    /// Take the player out of their room, tell whoever is left, and forget
    /// the connection.
    pub fn on_close(&mut self, id: &str) -> Result<()> {
        let result = match self.rooms.leave(id, &mut self.sessions) {
            Some(departure) => self.announce_departure(id, departure),
            None => Ok(()),
        };

        self.sessions.disconnect(id);
        info!("Connection {} closed ({} live)", id, self.sessions.connection_count());
        result
    }

    async fn save_chat(&mut self, id: &str, msg: ChatMessage, frame: &str) -> Result<()> {
        let message_id = msg.id.clone();
        match self.history.upsert_chat(msg).await {
            Ok(outcome) => {
                debug!("Chat message {} from {}: {:?}", message_id, id, outcome);
                self.sessions.broadcast(frame, &[]);
                Ok(())
            }
            Err(e) => {
                error!("Failed to save chat message {} from {}: {:#}", message_id, id, e);
                self.reply(id, ServerEvent::error(SAVE_FAILED))
            }
        }
    }

    /// Persist the typed message, then relay `payload` untouched.
    async fn save_game(&mut self, id: &str, msg: GameMessage, payload: Value) -> Result<()> {
        let message_id = msg.id.clone();
        let outbound = ServerEvent::GameMessage { data: payload }.encode()?;

        match self.history.upsert_game(msg).await {
            Ok(outcome) => debug!("Game message {} from {}: {:?}", message_id, id, outcome),
            Err(e) => {
                error!("Failed to save game message {} from {}: {:#}", message_id, id, e);
                return self.reply(id, ServerEvent::error(SAVE_FAILED));
            }
        }

        match self.scope {
            BroadcastScope::Server => self.sessions.broadcast(&outbound, &[id]),
            BroadcastScope::Room => match self.sessions.room_of(id) {
                Some(room_code) => {
                    let members = self.rooms.members_of(room_code);
                    self.sessions
                        .send_to_members(members.iter().map(String::as_str), &outbound, &[id]);
                }
                None => debug!("{} is not in a room, game message {} not relayed", id, message_id),
            },
        }

        Ok(())
    }

    /// Bind the player to `room_code`, leaving any other room first so a
    /// player is only ever a member of the room their session points at.
    fn enter_room(&mut self, id: &str, room_code: &str) -> Result<JoinOutcome> {
        let switching = self
            .sessions
            .room_of(id)
            .is_some_and(|current| current != room_code);

        if switching {
            if let Some(departure) = self.rooms.leave(id, &mut self.sessions) {
                self.announce_departure(id, departure)?;
            }
        }

        let outcome = self.rooms.create_or_join(room_code, id);
        self.sessions.bind(id, room_code);
        info!(
            "{} entered room {} ({:?}, {} rooms open)",
            id,
            room_code,
            outcome,
            self.rooms.len()
        );
        Ok(outcome)
    }

    fn announce_departure(&self, id: &str, departure: Departure) -> Result<()> {
        if departure.remaining.is_empty() {
            info!("Room {} closed", departure.room_code);
            return Ok(());
        }

        let left = ServerEvent::PlayerLeft {
            player_id: id.to_string(),
            room_code: departure.room_code,
        }
        .encode()?;

        match self.scope {
            BroadcastScope::Server => self.sessions.broadcast(&left, &[id]),
            BroadcastScope::Room => self.sessions.send_to_members(
                departure.remaining.iter().map(String::as_str),
                &left,
                &[id],
            ),
        }

        Ok(())
    }

    fn reply(&self, id: &str, event: ServerEvent) -> Result<()> {
        self.sessions.send_to(id, event.encode()?);
        Ok(())
    }
}
