use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::definitions::DEFAULT_DEFINITIONS_PATH;
use crate::engine::chat_engine::EngineSettings;
use crate::engine::channel::GUILD_MOTD_DELAY;
use crate::engine::events::ChannelId;
use crate::engine::registry::{PRIVATE_CHANNEL_IDS, RegistrySettings};
use crate::engine::user_session::MAX_OUTBOUND_QUEUE;
use crate::engine::validation::MAX_MESSAGE_LENGTH;
use crate::error::ChatError;
use crate::hooks::ScriptLimits;

/// Default location of the server configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "gamechat.toml";

/// Top-level server configuration, loaded from gamechat.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub scripting: ScriptingSection,
    pub chat: ChatSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Channel definitions file.
    pub channels_file: PathBuf,
    /// Directory channel scripts are resolved against.
    pub scripts_dir: PathBuf,
    /// Log filter used when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            channels_file: DEFAULT_DEFINITIONS_PATH.into(),
            scripts_dir: "data/chatchannels/scripts".into(),
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScriptingSection {
    pub max_call_levels: usize,
    pub max_nested_calls: usize,
}

impl Default for ScriptingSection {
    fn default() -> Self {
        let limits = ScriptLimits::default();
        Self {
            max_call_levels: limits.max_call_levels,
            max_nested_calls: limits.max_nested_calls,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub guild_motd_delay_ms: u64,
    /// First id handed out to private channels.
    pub private_channel_first_id: ChannelId,
    /// Last usable private channel id, inclusive.
    pub private_channel_last_id: ChannelId,
    pub outbound_queue_size: usize,
    pub max_message_length: usize,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            guild_motd_delay_ms: GUILD_MOTD_DELAY.as_millis() as u64,
            private_channel_first_id: PRIVATE_CHANNEL_IDS.start,
            private_channel_last_id: PRIVATE_CHANNEL_IDS.end - 1,
            outbound_queue_size: MAX_OUTBOUND_QUEUE,
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ChatError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ChatError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            info!("No config file found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CHAT_CHANNELS_FILE") {
            self.server.channels_file = v.into();
        }
        if let Ok(v) = std::env::var("CHAT_SCRIPTS_DIR") {
            self.server.scripts_dir = v.into();
        }
        if let Ok(v) = std::env::var("CHAT_LOG") {
            self.server.log_filter = v;
        }
        if let Ok(v) = std::env::var("CHAT_MAX_CALL_LEVELS")
            && let Ok(levels) = v.parse()
        {
            self.scripting.max_call_levels = levels;
        }
    }

    fn validate(&self) -> Result<(), ChatError> {
        let chat = &self.chat;
        if chat.private_channel_first_id > chat.private_channel_last_id {
            return Err(ChatError::InvalidConfig(format!(
                "private channel range {}..={} is empty",
                chat.private_channel_first_id, chat.private_channel_last_id
            )));
        }
        if chat.private_channel_last_id == ChannelId::MAX {
            return Err(ChatError::InvalidConfig(
                "private channel range must not include the private placeholder id".into(),
            ));
        }
        if chat.private_channel_first_id <= 1 {
            return Err(ChatError::InvalidConfig(
                "private channel range must not include the guild or party id".into(),
            ));
        }
        if chat.outbound_queue_size == 0 {
            return Err(ChatError::InvalidConfig("outbound_queue_size must be positive".into()));
        }
        if self.scripting.max_nested_calls == 0 {
            return Err(ChatError::InvalidConfig("max_nested_calls must be positive".into()));
        }
        Ok(())
    }

    pub fn script_limits(&self) -> ScriptLimits {
        ScriptLimits {
            max_call_levels: self.scripting.max_call_levels,
            max_nested_calls: self.scripting.max_nested_calls,
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            private_ids: self.chat.private_channel_first_id..self.chat.private_channel_last_id + 1,
            guild_motd_delay: Duration::from_millis(self.chat.guild_motd_delay_ms),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_message_length: self.chat.max_message_length,
            outbound_queue_size: self.chat.outbound_queue_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(contents: &str) -> ServerConfig {
        let config: ServerConfig = toml::from_str(contents).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn defaults_match_engine_constants() {
        let config = ServerConfig::default();
        let registry = config.registry_settings();
        assert_eq!(registry.private_ids, PRIVATE_CHANNEL_IDS);
        assert_eq!(registry.guild_motd_delay, GUILD_MOTD_DELAY);
        assert_eq!(config.script_limits(), ScriptLimits::default());
        assert_eq!(config.engine_settings().max_message_length, MAX_MESSAGE_LENGTH);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = parse(
            r#"
            [chat]
            guild_motd_delay_ms = 500
            private_channel_first_id = 200
            private_channel_last_id = 299

            [scripting]
            max_call_levels = 32
            "#,
        );
        assert_eq!(config.registry_settings().private_ids, 200..300);
        assert_eq!(config.registry_settings().guild_motd_delay, Duration::from_millis(500));
        assert_eq!(config.scripting.max_call_levels, 32);
        assert_eq!(config.scripting.max_nested_calls, ScriptLimits::default().max_nested_calls);
        assert_eq!(config.server.channels_file, PathBuf::from(DEFAULT_DEFINITIONS_PATH));
    }

    #[test]
    fn invalid_private_ranges_are_rejected() {
        for chat in [
            "private_channel_first_id = 300\nprivate_channel_last_id = 200",
            "private_channel_first_id = 100\nprivate_channel_last_id = 65535",
            "private_channel_first_id = 1\nprivate_channel_last_id = 50",
        ] {
            let config: ServerConfig = toml::from_str(&format!("[chat]\n{chat}")).unwrap();
            assert!(matches!(config.validate(), Err(ChatError::InvalidConfig(_))), "{chat}");
        }
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chat.outbound_queue_size, MAX_OUTBOUND_QUEUE);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gamechat.toml");
        std::fs::write(&path, "[chat\n").unwrap();
        assert!(matches!(ServerConfig::load(&path), Err(ChatError::Parse { .. })));
    }
}
