//! Server configuration. A single JSON file with every field optional;
//! absent fields keep their defaults so a bare `{}` is a valid config.

use arena_core::GameRules;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the config is looked for when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "server-config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Cadence of the snapshot broadcast.
    pub broadcast_interval_ms: u64,
    /// Cadence of the bullet / respawn simulation tick.
    pub tick_interval_ms: u64,
    /// Earliest respawn after a kill.
    pub respawn_delay_ms: u64,
    /// Reconnect window for disconnected players.
    pub disconnect_grace_ms: u64,
    /// Manhattan clearance required around a spawn point.
    pub spawn_clear_radius: i32,
    /// Board file used when `--board` is not given.
    pub board_path: PathBuf,
    /// Default tracing filter when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            broadcast_interval_ms: 250,
            tick_interval_ms: 50,
            respawn_delay_ms: 2_000,
            disconnect_grace_ms: 60_000,
            spawn_clear_radius: 3,
            board_path: PathBuf::from("boards/arena.json"),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The slice of the config the game model cares about.
    pub fn game_rules(&self) -> GameRules {
        GameRules {
            respawn_delay_ms: self.respawn_delay_ms,
            disconnect_grace_ms: self.disconnect_grace_ms,
            spawn_clear_radius: self.spawn_clear_radius,
        }
    }
}

/// Loads the configuration. An explicitly given path must exist; the
/// default path may be absent, in which case the compiled defaults apply.
pub fn load(explicit: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    match explicit {
        Some(path) => read_file(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                read_file(path)
            } else {
                Ok(ServerConfig::default())
            }
        }
    }
}

fn read_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.broadcast_interval_ms, 250);
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.respawn_delay_ms, 2_000);
        assert_eq!(config.disconnect_grace_ms, 60_000);
        assert_eq!(config.spawn_clear_radius, 3);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{ "port": 9000, "spawnClearRadius": 1 }"#)
            .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.spawn_clear_radius, 1);
        // Untouched fields keep their defaults.
        assert_eq!(config.broadcast_interval_ms, 250);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(load(Some(&path)), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ port: oops }").unwrap();
        assert!(matches!(load(Some(&path)), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn absent_default_path_falls_back_to_defaults() {
        // `load(None)` only reads DEFAULT_CONFIG_PATH when it exists in the
        // working directory; the test relies on it being absent here.
        if !Path::new(DEFAULT_CONFIG_PATH).exists() {
            let config = load(None).unwrap();
            assert_eq!(config.port, ServerConfig::default().port);
        }
    }
}
