use crate::chat::{ChatEdit, ChatMessage, GameMessage};
use crate::store::Store;
use anyhow::Result;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// In-memory mirror of the message log, kept in step with the [`Store`].
///
/// Every upsert writes to the store first and only touches the mirror once
/// the write has succeeded, so a failed write leaves both sides unchanged.
pub struct MessageHistory {
    store: Store,
    chats: Vec<ChatMessage>,
    chat_index: HashMap<String, usize>,
    games: Vec<GameMessage>,
    game_index: HashMap<String, usize>,
}

impl MessageHistory {
    pub async fn load(store: Store) -> Result<Self> {
        store.init().await?;
        let (chats, games) = store.load_all().await?;
        info!("Loaded {} chat messages and {} game messages", chats.len(), games.len());

        let chat_index = index_by_id(chats.iter().map(|m| m.id.as_str()));
        let game_index = index_by_id(games.iter().map(|m| m.id.as_str()));

        Ok(Self {
            store,
            chats,
            chat_index,
            games,
            game_index,
        })
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chats
    }

    #[cfg(test)]
    pub fn game_history(&self) -> &[GameMessage] {
        &self.games
    }

    fn chat(&self, id: &str) -> Option<&ChatMessage> {
        self.chat_index.get(id).map(|&i| &self.chats[i])
    }

    /// Fill in whatever an edit leaves out from the stored message.
    /// Returns `None` for an unknown id when the edit doesn't carry both
    /// author and role.
    pub fn resolve_chat_edit(&self, edit: ChatEdit) -> Option<ChatMessage> {
        let existing = self.chat(&edit.id);
        let user = edit.user.or_else(|| existing.map(|m| m.user.clone()))?;
        let role = edit.role.or_else(|| existing.map(|m| m.role))?;

        Some(ChatMessage {
            id: edit.id,
            content: edit.content,
            user,
            role,
        })
    }

    pub async fn upsert_chat(&mut self, msg: ChatMessage) -> Result<Upsert> {
        self.store.upsert_chat(&msg).await?;

        Ok(match self.chat_index.get(&msg.id) {
            Some(&i) => {
                self.chats[i] = msg;
                Upsert::Updated
            }
            None => {
                self.chat_index.insert(msg.id.clone(), self.chats.len());
                self.chats.push(msg);
                Upsert::Inserted
            }
        })
    }

    /// Only `data` is revised for an id that was seen before.
    pub async fn upsert_game(&mut self, msg: GameMessage) -> Result<Upsert> {
        self.store.upsert_game(&msg).await?;

        Ok(match self.game_index.get(&msg.id) {
            Some(&i) => {
                self.games[i].data = msg.data;
                Upsert::Updated
            }
            None => {
                self.game_index.insert(msg.id.clone(), self.games.len());
                self.games.push(msg);
                Upsert::Inserted
            }
        })
    }
}

fn index_by_id<'a>(ids: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    ids.enumerate().map(|(i, id)| (id.to_string(), i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use serde_json::json;

    fn chat(id: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            content: content.into(),
            user: "A".into(),
            role: Role::User,
        }
    }

    fn game(id: &str, data: serde_json::Value) -> GameMessage {
        GameMessage {
            id: id.into(),
            kind: "move".into(),
            data,
            player_id: "p1".into(),
            timestamp: 1,
            room_code: "R1".into(),
        }
    }

    async fn history() -> (Store, MessageHistory) {
        let store = Store::in_memory().await.unwrap();
        let history = MessageHistory::load(store.clone()).await.unwrap();
        (store, history)
    }

    #[tokio::test]
    async fn same_message_twice_is_one_entry() {
        let (_, mut history) = history().await;

        assert_eq!(history.upsert_chat(chat("m1", "hi")).await.unwrap(), Upsert::Inserted);
        assert_eq!(history.upsert_chat(chat("m1", "hi")).await.unwrap(), Upsert::Updated);

        assert_eq!(history.chat_history(), &[chat("m1", "hi")]);
    }

    #[tokio::test]
    async fn new_content_updates_in_place() {
        let (_, mut history) = history().await;
        history.upsert_chat(chat("m1", "hi")).await.unwrap();
        history.upsert_chat(chat("m2", "yo")).await.unwrap();

        history.upsert_chat(chat("m1", "hi there")).await.unwrap();

        assert_eq!(history.chat_history(), &[chat("m1", "hi there"), chat("m2", "yo")]);
    }

    #[tokio::test]
    async fn reload_replays_what_was_written() {
        let (store, mut history) = history().await;
        history.upsert_chat(chat("m1", "hi")).await.unwrap();
        history.upsert_chat(chat("m1", "edited")).await.unwrap();
        history.upsert_game(game("g1", json!(1))).await.unwrap();
        history.upsert_game(game("g1", json!(2))).await.unwrap();

        let reloaded = MessageHistory::load(store).await.unwrap();

        assert_eq!(reloaded.chat_history(), &[chat("m1", "edited")]);
        assert_eq!(reloaded.game_history(), &[game("g1", json!(2))]);
    }

    #[tokio::test]
    async fn game_update_keeps_original_attribution() {
        let (_, mut history) = history().await;
        history.upsert_game(game("g1", json!({"hand": 1}))).await.unwrap();

        let mut revised = game("g1", json!({"hand": 2}));
        revised.player_id = "someone-else".into();
        assert_eq!(history.upsert_game(revised).await.unwrap(), Upsert::Updated);

        assert_eq!(history.game_history(), &[game("g1", json!({"hand": 2}))]);
    }

    #[tokio::test]
    async fn failed_write_leaves_mirror_untouched() {
        let (store, mut history) = history().await;
        history.upsert_chat(chat("m1", "hi")).await.unwrap();

        sqlx::query("DROP TABLE messages").execute(store.pool()).await.unwrap();

        assert!(history.upsert_chat(chat("m1", "changed")).await.is_err());
        assert!(history.upsert_chat(chat("m2", "new")).await.is_err());
        assert_eq!(history.chat_history(), &[chat("m1", "hi")]);
    }

    #[tokio::test]
    async fn edit_resolution_fills_author_from_stored_row() {
        let (_, mut history) = history().await;
        let mut original = chat("m1", "hi");
        original.role = Role::Assistant;
        history.upsert_chat(original).await.unwrap();

        let resolved = history
            .resolve_chat_edit(ChatEdit {
                id: "m1".into(),
                content: "hi there".into(),
                user: None,
                role: None,
            })
            .unwrap();
        assert_eq!(resolved.user, "A");
        assert_eq!(resolved.role, Role::Assistant);
        assert_eq!(resolved.content, "hi there");

        let unknown = ChatEdit {
            id: "m9".into(),
            content: "?".into(),
            user: Some("B".into()),
            role: None,
        };
        assert!(history.resolve_chat_edit(unknown).is_none());
    }
}
