//! Error types for configuration and channel definitions.

use std::path::PathBuf;

use crate::engine::events::ChannelId;

/// Faults that abort loading: unreadable or invalid files.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid channel definition {id}: {reason}")]
    InvalidDefinition { id: ChannelId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
