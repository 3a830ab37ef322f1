//! Static channel definitions, loaded from `chatchannels.toml`.

use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::engine::events::{CHANNEL_GUILD, CHANNEL_PARTY, CHANNEL_PRIVATE, ChannelId};
use crate::engine::validation::validate_channel_name;
use crate::error::ChatError;

/// Default location of the definitions file.
pub const DEFAULT_DEFINITIONS_PATH: &str = "data/chatchannels/chatchannels.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelDefinitions {
    /// Static channels in file order.
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelDefinition>,
    /// Hooks shared by every guild channel.
    #[serde(default)]
    pub guild: Option<GroupTemplate>,
    /// Hooks shared by every party channel.
    #[serde(default)]
    pub party: Option<GroupTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelDefinition {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub public: bool,
    /// Script file, relative to the scripts directory.
    #[serde(default)]
    pub script: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupTemplate {
    #[serde(default)]
    pub script: Option<String>,
}

impl ChannelDefinitions {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ChatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let defs = Self::parse(&contents, path)?;
        debug!(path = %path.display(), channels = defs.channels.len(), "read channel definitions");
        Ok(defs)
    }

    pub fn parse(contents: &str, origin: &Path) -> Result<Self, ChatError> {
        toml::from_str(contents).map_err(|source| ChatError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Every script file referenced, channel scripts first.
    pub fn scripts(&self) -> impl Iterator<Item = &str> {
        let channels = self.channels.iter().filter_map(|def| def.script.as_deref());
        let groups = [&self.guild, &self.party]
            .into_iter()
            .filter_map(|template| template.as_ref()?.script.as_deref());
        channels.chain(groups)
    }

    /// Ids must be unique and stay clear of the well-known ids and the
    /// private channel range. Names must be non-empty.
    pub fn validate(&self, private_ids: &Range<ChannelId>) -> Result<(), ChatError> {
        let mut seen = HashSet::new();
        for def in &self.channels {
            let invalid = |reason: String| ChatError::InvalidDefinition { id: def.id, reason };

            if matches!(def.id, CHANNEL_GUILD | CHANNEL_PARTY | CHANNEL_PRIVATE) {
                return Err(invalid("id is reserved for guild, party or private channels".into()));
            }
            if private_ids.contains(&def.id) {
                return Err(invalid(format!(
                    "id falls in the private channel range {}..{}",
                    private_ids.start, private_ids.end
                )));
            }
            if !seen.insert(def.id) {
                return Err(invalid("duplicate id".into()));
            }
            validate_channel_name(&def.name).map_err(invalid)?;
        }
        Ok(())
    }
}
