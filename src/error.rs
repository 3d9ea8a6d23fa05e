use thiserror::Error;

/// Main error type for the game coordinator
#[derive(Error, Debug)]
pub enum TagTradeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Registry parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // Settlement errors
    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    // Event queue errors
    #[error("Event channel closed: {0}")]
    Channel(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for TagTradeError
pub type Result<T> = std::result::Result<T, TagTradeError>;

/// Problems found while loading the tag tables. All of them are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Roster is empty")]
    EmptyRoster,

    #[error("Invalid tag identifier {tag:?} ({context})")]
    InvalidTag { tag: String, context: String },

    #[error("Duplicate player identity: {0}")]
    DuplicatePlayer(String),

    #[error("Tag {tag} assigned to both {first} and {second}")]
    DuplicateTag {
        tag: String,
        first: String,
        second: String,
    },

    #[error("Invalid resource category {0:?}")]
    InvalidCategory(String),
}

/// Failures of a single settlement call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    #[error("Missing signing key for {player} (env {env_var})")]
    MissingKey { player: String, env_var: String },

    #[error("Timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),
}
