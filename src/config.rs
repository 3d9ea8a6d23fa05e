use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::PlayerId;
use crate::registry::TagRegistry;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path to the tag registry tables
    pub registry_path: PathBuf,
    /// Bound of the event queue in front of the engine
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub game: GameConfig,
    /// Physical scan readers
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_queue_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// Pause after a round before the unconditional reset
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    /// Pause after each successful transfer
    #[serde(default = "default_step_delay")]
    pub step_delay_ms: u64,
    /// Per-call settlement timeout (0 = wait forever)
    #[serde(default = "default_settlement_timeout")]
    pub settlement_timeout_ms: u64,
}

fn default_settle_delay() -> u64 {
    2000
}

fn default_step_delay() -> u64 {
    500
}

fn default_settlement_timeout() -> u64 {
    30_000
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            step_delay_ms: default_step_delay(),
            settlement_timeout_ms: default_settlement_timeout(),
        }
    }
}

impl GameConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn settlement_timeout(&self) -> Option<Duration> {
        (self.settlement_timeout_ms > 0).then(|| Duration::from_millis(self.settlement_timeout_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Name used in logs and display routing (e.g. "reader1")
    pub name: String,
    /// Device path of the reader (e.g. /dev/ttyACM0), already configured for line mode
    pub device: PathBuf,
    /// Players seated at this reader; their status lines are shown here
    #[serde(default)]
    pub players: Vec<String>,
    /// Wait before reopening the device after EOF or a read error
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay() -> u64 {
    1000
}

impl ChannelConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn player_ids(&self) -> HashSet<PlayerId> {
        self.players.iter().map(|p| PlayerId::new(p.trim())).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Read confirm/reset keys from stdin
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    /// Log transfers, never touch a chain
    #[default]
    DryRun,
    /// Broadcast real EIP-1559 transfers
    Evm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    #[serde(default)]
    pub mode: SettlementMode,
    /// JSON-RPC endpoint (required in evm mode)
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Expected chain id (default: Sepolia)
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Player id -> env var holding that player's private key.
    /// Unlisted players use PRIVATE_KEY_<roster position, 1-based>.
    /// Ids match case-insensitively since the config loader lowercases keys.
    #[serde(default)]
    pub key_env: BTreeMap<String, String>,
    /// Category -> transfer value in ETH (missing categories transfer 0)
    #[serde(default)]
    pub resource_values: BTreeMap<String, String>,
}

fn default_chain_id() -> u64 {
    11_155_111
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            mode: SettlementMode::DryRun,
            rpc_url: None,
            chain_id: default_chain_id(),
            key_env: BTreeMap::new(),
            resource_values: BTreeMap::new(),
        }
    }
}

impl SettlementConfig {
    pub fn key_env_for(&self, player: &PlayerId, roster_index: usize) -> String {
        self.key_env
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(player.as_str()))
            .map(|(_, env_var)| env_var.clone())
            .unwrap_or_else(|| format!("PRIVATE_KEY_{}", roster_index + 1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    /// Push status lines to the reader displays
    #[serde(default = "default_true")]
    pub display: bool,
    /// Program used to play cue files (disabled when unset)
    #[serde(default)]
    pub audio_command: Option<String>,
    #[serde(default = "default_sounds_dir")]
    pub sounds_dir: PathBuf,
}

fn default_sounds_dir() -> PathBuf {
    PathBuf::from("sounds")
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            display: true,
            audio_command: None,
            sounds_dir: default_sounds_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files (console only when unset)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("registry_path", "config/registry.toml")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/venue.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TAGTRADE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TAGTRADE__SETTLEMENT__RPC_URL, etc.)
            .add_source(
                Environment::with_prefix("TAGTRADE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values on their own
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.queue_capacity == 0 {
            errors.push("queue_capacity must be positive".to_string());
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                errors.push(format!(
                    "channel for {} has an empty name",
                    channel.device.display()
                ));
            }
            if !names.insert(channel.name.as_str()) {
                errors.push(format!("duplicate channel name {}", channel.name));
            }
        }

        if self.settlement.mode == SettlementMode::Evm
            && self
                .settlement
                .rpc_url
                .as_deref()
                .map_or(true, |u| u.trim().is_empty())
        {
            errors.push("settlement.rpc_url is required in evm mode".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate the parts that refer to registry entries
    pub fn validate_against(&self, registry: &TagRegistry) -> Result<(), Vec<String>> {
        let mut errors = match self.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        for channel in &self.channels {
            for player in channel.player_ids() {
                if registry.player(&player).is_none() {
                    errors.push(format!(
                        "channel {} lists unknown player {}",
                        channel.name, player
                    ));
                }
            }
        }

        for player in self.settlement.key_env.keys() {
            let known = registry
                .roster()
                .iter()
                .any(|p| p.id.as_str().eq_ignore_ascii_case(player));
            if !known {
                errors.push(format!("settlement.key_env lists unknown player {player}"));
            }
        }

        if registry.roster().len() < 2 {
            errors.push("roster needs at least 2 players to trade".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            registry_path: PathBuf::from("config/registry.toml"),
            queue_capacity: 16,
            game: GameConfig::default(),
            channels: vec![ChannelConfig {
                name: "reader1".into(),
                device: PathBuf::from("/dev/null"),
                players: vec!["Player1".into(), "Player2".into()],
                reconnect_delay_ms: 1000,
            }],
            control: ControlConfig::default(),
            settlement: SettlementConfig::default(),
            feedback: FeedbackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
                registry_path = "tables.toml"

                [game]
                settle_delay_ms = 0

                [[channels]]
                name = "reader1"
                device = "/dev/ttyACM0"
                players = ["Player1", "Player2"]

                [settlement.resource_values]
                FIRE = "0.0001"
            "#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(cfg.registry_path, PathBuf::from("tables.toml"));
        assert_eq!(cfg.queue_capacity, 256);
        assert_eq!(cfg.game.settle_delay(), Duration::ZERO);
        assert_eq!(cfg.game.step_delay_ms, 500);
        assert_eq!(cfg.channels[0].reconnect_delay_ms, 1000);
        assert_eq!(cfg.settlement.mode, SettlementMode::DryRun);
        assert_eq!(cfg.settlement.chain_id, 11_155_111);
        assert!(cfg.control.enabled);
        assert!(cfg.feedback.display);
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut cfg = minimal();
        assert!(cfg.validate().is_ok());

        cfg.queue_capacity = 0;
        cfg.channels.push(cfg.channels[0].clone());
        cfg.settlement.mode = SettlementMode::Evm;

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_validate_against_registry() {
        let registry = TagRegistry::from_toml_str(
            r#"
                [[players]]
                id = "Player1"
                tag = "01"
            "#,
        )
        .unwrap();

        let errors = minimal().validate_against(&registry).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unknown player Player2")));
        assert!(errors.iter().any(|e| e.contains("at least 2 players")));
    }

    #[test]
    fn test_settlement_timeout_zero_disables() {
        let game = GameConfig {
            settlement_timeout_ms: 0,
            ..GameConfig::default()
        };
        assert!(game.settlement_timeout().is_none());
    }

    #[test]
    fn test_key_env_defaults_to_roster_position() {
        let mut settlement = SettlementConfig::default();
        settlement
            .key_env
            .insert("Player2".into(), "WALLET_B".into());

        assert_eq!(
            settlement.key_env_for(&PlayerId::new("Player1"), 0),
            "PRIVATE_KEY_1"
        );
        assert_eq!(
            settlement.key_env_for(&PlayerId::new("Player2"), 1),
            "WALLET_B"
        );
    }
}
