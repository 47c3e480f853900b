use anyhow::{bail, Context, Result};
use std::{env, path::PathBuf, str::FromStr};

/// Who receives `gameMessage` and `playerLeft` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastScope {
    /// Every connection except the sender, whatever room it is in.
    #[default]
    Server,
    /// Only members of the sender's room, minus the sender.
    Room,
}

impl FromStr for BroadcastScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(BroadcastScope::Server),
            "room" => Ok(BroadcastScope::Room),
            other => bail!("unknown broadcast scope {:?}, expected \"server\" or \"room\"", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Database {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: Database,
    pub broadcast_scope: BroadcastScope,
    pub queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("RELAY_HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = match lookup("RELAY_PORT") {
            Some(port) => port.parse::<u16>().with_context(|| format!("Invalid RELAY_PORT {:?}", port))?,
            None => 3000,
        };

        // We default to ~/.card-relay/relay.db
        let database = match lookup("RELAY_DB_PATH") {
            Some(path) if path == ":memory:" => Database::Memory,
            Some(path) => Database::File(PathBuf::from(path)),
            None => {
                let home_dir = lookup("HOME").unwrap_or_else(|| ".".into());
                Database::File(PathBuf::from(home_dir).join(".card-relay").join("relay.db"))
            }
        };

        let broadcast_scope = match lookup("RELAY_BROADCAST_SCOPE") {
            Some(scope) => scope.parse::<BroadcastScope>().context("Invalid RELAY_BROADCAST_SCOPE")?,
            None => BroadcastScope::default(),
        };

        let queue_capacity = match lookup("RELAY_QUEUE_CAPACITY") {
            Some(cap) => cap
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .with_context(|| format!("Invalid RELAY_QUEUE_CAPACITY {:?}", cap))?,
            None => 1024,
        };

        Ok(Self {
            host,
            port,
            database,
            broadcast_scope,
            queue_capacity,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[("HOME", "/home/relay")]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(
            config.database,
            Database::File(PathBuf::from("/home/relay/.card-relay/relay.db"))
        );
        assert_eq!(config.broadcast_scope, BroadcastScope::Server);
        assert_eq!(config.queue_capacity, 1024);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("RELAY_HOST", "127.0.0.1"),
            ("RELAY_PORT", "1999"),
            ("RELAY_DB_PATH", ":memory:"),
            ("RELAY_BROADCAST_SCOPE", "Room"),
            ("RELAY_QUEUE_CAPACITY", "8"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:1999");
        assert_eq!(config.database, Database::Memory);
        assert_eq!(config.broadcast_scope, BroadcastScope::Room);
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("RELAY_PORT", "http")]).is_err());
        assert!(config(&[("RELAY_BROADCAST_SCOPE", "galaxy")]).is_err());
        assert!(config(&[("RELAY_QUEUE_CAPACITY", "0")]).is_err());
    }
}
