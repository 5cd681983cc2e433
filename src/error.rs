//! Error types for configuration and topology loading.

use crate::HostId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("split horizon and poison reverse can't both be on")]
    ConflictingPolicies,

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("unknown router: {0}")]
    UnknownRouter(String),

    #[error("duplicate node name: {0}")]
    DuplicateName(String),

    #[error("no link between {0} and {1}")]
    NoSuchLink(String, String),

    #[error("link {0} <-> {1} is already up")]
    LinkAlreadyUp(String, String),

    #[error("unknown host: {0}")]
    UnknownHost(HostId),

    #[error("router task for {0} is not running")]
    RouterGone(String),
}
