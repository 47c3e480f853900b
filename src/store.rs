use crate::chat::{ChatMessage, GameMessage, Role};
use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    ConnectOptions, Row, SqlitePool,
};
use std::{path::Path, str::FromStr};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// Open a private in-memory database. A single pooled connection keeps
    /// the data alive for as long as the store is.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Ok(Self { pool })
    }

    /// Initialize the database schema. Safe to run on every startup.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                user TEXT,
                role TEXT,
                content TEXT
            );

            CREATE TABLE IF NOT EXISTS game_messages (
                id TEXT PRIMARY KEY,
                type TEXT,
                data TEXT,
                playerId TEXT,
                timestamp INTEGER,
                roomCode TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Load every persisted chat and game message in insertion order.
    pub async fn load_all(&self) -> Result<(Vec<ChatMessage>, Vec<GameMessage>)> {
        let rows = sqlx::query("SELECT id, user, role, content FROM messages ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load chat messages")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let role: Option<String> = row.try_get("role")?;
            let role = match role.as_deref().map(Role::from_str) {
                Some(Ok(role)) => role,
                _ => {
                    warn!("Message {} has unreadable role {:?}, loading as user", id, role);
                    Role::User
                }
            };

            messages.push(ChatMessage {
                id,
                content: row.try_get::<Option<String>, _>("content")?.unwrap_or_default(),
                user: row.try_get::<Option<String>, _>("user")?.unwrap_or_default(),
                role,
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT id, type, data, playerId, timestamp, roomCode
            FROM game_messages
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load game messages")?;

        let mut game_messages = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let data: Option<String> = row.try_get("data")?;
            let data = match data {
                Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                    warn!("Game message {} has unreadable data ({}), loading it as text", id, e);
                    serde_json::Value::String(text)
                }),
                None => serde_json::Value::Null,
            };

            game_messages.push(GameMessage {
                id,
                kind: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                data,
                player_id: row.try_get::<Option<String>, _>("playerId")?.unwrap_or_default(),
                timestamp: row.try_get::<Option<i64>, _>("timestamp")?.unwrap_or_default(),
                room_code: row.try_get::<Option<String>, _>("roomCode")?.unwrap_or_default(),
            });
        }

        Ok((messages, game_messages))
    }

    /// Insert a chat message, or overwrite author, role and content of the
    /// row with the same id.
    pub async fn upsert_chat(&self, msg: &ChatMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, user, role, content)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user = excluded.user,
                role = excluded.role,
                content = excluded.content
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.user)
        .bind(msg.role.as_str())
        .bind(&msg.content)
        .execute(&self.pool)
        .await
        .context("Failed to save chat message")?;

        Ok(())
    }

    /// Insert a game message, or overwrite only `data` of the row with the
    /// same id.
    pub async fn upsert_game(&self, msg: &GameMessage) -> Result<()> {
        let data = serde_json::to_string(&msg.data).context("Failed to encode game data")?;

        sqlx::query(
            r#"
            INSERT INTO game_messages (id, type, data, playerId, timestamp, roomCode)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.kind)
        .bind(data)
        .bind(&msg.player_id)
        .bind(msg.timestamp)
        .bind(&msg.room_code)
        .execute(&self.pool)
        .await
        .context("Failed to save game message")?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
