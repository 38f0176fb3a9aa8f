//! Torneo configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, TorneoError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorneoConfig {
    /// Discord user id of the single designated operator.
    #[serde(default)]
    pub operator_id: String,
    /// Guild (server) the tournament runs in.
    #[serde(default)]
    pub guild_id: String,
    /// Prefix for chat commands.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub tournament: TournamentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_prefix() -> String {
    "!".into()
}

impl Default for TorneoConfig {
    fn default() -> Self {
        Self {
            operator_id: String::new(),
            guild_id: String::new(),
            command_prefix: default_prefix(),
            discord: DiscordConfig::default(),
            tournament: TournamentConfig::default(),
            scheduler: SchedulerConfig::default(),
            capture: CaptureConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl TorneoConfig {
    /// Load config from the default path (~/.torneo/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TorneoError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TorneoError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TorneoError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Torneo home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".torneo")
    }
}

/// Discord REST collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Channels to poll for commands and free-text triggers.
    #[serde(default)]
    pub watch_channels: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    2
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            watch_channels: Vec::new(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// One stage of the tournament: display name + how many of the top-ranked
/// participants survive advancement into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRule {
    pub number: u32,
    pub name: String,
    pub cutoff: usize,
}

/// Tournament structure: the stage number → rule mapping is static for the
/// lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentConfig {
    #[serde(default = "default_stages")]
    pub stages: Vec<StageRule>,
}

fn default_stages() -> Vec<StageRule> {
    vec![
        StageRule { number: 1, name: "Qualifiers".into(), cutoff: 16 },
        StageRule { number: 2, name: "Quarterfinals".into(), cutoff: 8 },
        StageRule { number: 3, name: "Semifinals".into(), cutoff: 4 },
        StageRule { number: 4, name: "Final".into(), cutoff: 2 },
    ]
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self { stages: default_stages() }
    }
}

impl TournamentConfig {
    /// Stage number → rule lookup map.
    pub fn rules(&self) -> BTreeMap<u32, StageRule> {
        self.stages.iter().map(|s| (s.number, s.clone())).collect()
    }
}

/// Notification scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-notification checks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_tick_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: default_tick_secs() }
    }
}

/// Capture session policy: per-await timeouts (60s for single prompts,
/// 300s for free-form bulk, 600s for delimited bulk), the closing
/// sentinel, and the bulk-trivia field delimiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_prompt_timeout")]
    pub prompt_timeout_secs: u64,
    #[serde(default = "default_joke_timeout")]
    pub joke_timeout_secs: u64,
    #[serde(default = "default_trivia_timeout")]
    pub trivia_timeout_secs: u64,
    /// Token that closes a bulk session.
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    /// Field separator for delimited bulk lines.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_prompt_timeout() -> u64 {
    60
}
fn default_joke_timeout() -> u64 {
    300
}
fn default_trivia_timeout() -> u64 {
    600
}
fn default_sentinel() -> String {
    "done".into()
}
fn default_delimiter() -> String {
    "::".into()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            prompt_timeout_secs: default_prompt_timeout(),
            joke_timeout_secs: default_joke_timeout(),
            trivia_timeout_secs: default_trivia_timeout(),
            sentinel: default_sentinel(),
            delimiter: default_delimiter(),
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared-secret bearer token. Empty disables auth (development only).
    #[serde(default)]
    pub api_token: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8720
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_token: String::new(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sqlite database path; `:memory:` for ephemeral runs.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.torneo/torneo.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = TorneoConfig::default();
        assert_eq!(cfg.command_prefix, "!");
        assert_eq!(cfg.scheduler.tick_secs, 60);
        assert_eq!(cfg.capture.prompt_timeout_secs, 60);
        assert_eq!(cfg.capture.joke_timeout_secs, 300);
        assert_eq!(cfg.capture.trivia_timeout_secs, 600);
        assert_eq!(cfg.tournament.rules().get(&1).unwrap().cutoff, 16);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: TorneoConfig = toml::from_str(
            r#"
            operator_id = "42"
            [gateway]
            port = 9000
            [[tournament.stages]]
            number = 1
            name = "Open"
            cutoff = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.operator_id, "42");
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.host, "127.0.0.1");
        assert_eq!(cfg.tournament.rules().get(&1).unwrap().cutoff, 4);
        // untouched sections fall back to defaults
        assert_eq!(cfg.capture.sentinel, "done");
    }
}
