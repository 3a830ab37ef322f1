use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::definitions::ChannelDefinitions;
use crate::error::ChatError;

use super::events::{CHANNEL_PRIVATE, ChannelId, ChatEvent, MessageClass, SpeakClass};
use super::player::{ChannelClient, Guid, PlayerId, PlayerRef, Sex};
use super::registry::ChannelRegistry;
use super::user_session::{MAX_OUTBOUND_QUEUE, PlayerSession};
use super::validation;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_message_length: usize,
    pub outbound_queue_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_message_length: validation::MAX_MESSAGE_LENGTH,
            outbound_queue_size: MAX_OUTBOUND_QUEUE,
        }
    }
}

/// Connected players, shared with transport tasks.
#[derive(Clone, Default)]
pub struct SessionDirectory {
    sessions: Arc<DashMap<PlayerId, Arc<PlayerSession>>>,
    /// Lowercased name -> player id, for invitations by name.
    name_to_player: Arc<DashMap<String, PlayerId>>,
}

impl SessionDirectory {
    pub fn get(&self, id: PlayerId) -> Option<Arc<PlayerSession>> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    /// Case-insensitive lookup by character name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<PlayerSession>> {
        let id = *self.name_to_player.get(&name.to_lowercase())?;
        self.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn insert(&self, session: Arc<PlayerSession>) {
        self.name_to_player
            .insert(session.name.to_lowercase(), session.id);
        self.sessions.insert(session.id, session);
    }

    fn remove(&self, id: PlayerId) -> Option<Arc<PlayerSession>> {
        let (_, session) = self.sessions.remove(&id)?;
        self.name_to_player
            .remove_if(&session.name.to_lowercase(), |_, owner| *owner == id);
        Some(session)
    }
}

/// Player-facing chat actions on top of the channel registry.
///
/// Driven from the simulation tick: every mutating action takes `&mut self`.
pub struct ChatEngine {
    directory: SessionDirectory,
    registry: ChannelRegistry,
    settings: EngineSettings,
}

impl ChatEngine {
    pub fn new(registry: ChannelRegistry, settings: EngineSettings) -> Self {
        Self {
            directory: SessionDirectory::default(),
            registry,
            settings,
        }
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.registry
    }

    // ── Definitions ─────────────────────────────────────────────────

    pub fn load_definitions(&mut self, defs: &ChannelDefinitions) -> Result<(), ChatError> {
        self.registry.load_definitions(defs)
    }

    /// Re-read the definitions file and apply it in place.
    pub fn reload_channels(&mut self, path: impl AsRef<Path>) -> Result<(), ChatError> {
        let path = path.as_ref();
        let defs = ChannelDefinitions::load(path)?;
        self.registry.load_definitions(&defs)?;
        info!(path = %path.display(), "chat channels reloaded");
        Ok(())
    }

    // ── Session management ──────────────────────────────────────────

    /// Register a player. Returns the session and its outbound event receiver.
    pub fn connect(
        &mut self,
        id: PlayerId,
        guid: Guid,
        name: impl Into<String>,
        sex: Sex,
    ) -> Result<(Arc<PlayerSession>, mpsc::Receiver<ChatEvent>), String> {
        let name = name.into();
        validation::validate_player_name(&name)?;

        // A reconnecting player replaces the stale session.
        if self.directory.get(id).is_some() {
            info!(%id, %name, "replacing stale session for reconnecting player");
            self.disconnect(id);
        }
        if let Some(stale) = self.directory.find_by_name(&name) {
            info!(id = %stale.id, %name, "replacing stale session with the same name");
            self.disconnect(stale.id);
        }

        let (session, rx) =
            PlayerSession::with_queue(id, guid, name, sex, self.settings.outbound_queue_size);
        let session = Arc::new(session);
        self.directory.insert(session.clone());

        info!(%id, %guid, name = %session.name, "player connected");
        Ok((session, rx))
    }

    /// Remove a player from every channel and forget the session.
    pub fn disconnect(&mut self, id: PlayerId) -> bool {
        let Some(session) = self.directory.remove(id) else {
            return false;
        };

        self.registry.remove_user_from_all_channels(session.as_ref());
        info!(%id, name = %session.name, "player disconnected");
        true
    }

    // ── Channel actions ─────────────────────────────────────────────

    /// Join a channel and reply with its current state.
    pub fn open_channel(&mut self, player_id: PlayerId, channel_id: ChannelId) -> bool {
        let Some(session) = self.directory.get(player_id) else {
            return false;
        };
        let player: PlayerRef = session.clone();

        let Some(channel) = self.registry.add_user_to_channel(&player, channel_id) else {
            debug!(player = %session.name, channel_id, "open channel refused");
            return false;
        };
        let (id, name, members) = (channel.id(), channel.name().to_string(), channel.member_names());
        let invited = self.registry.invited_names(id);

        session.send(ChatEvent::ChannelOpened {
            channel_id: id,
            name,
            members,
            invited,
        });
        true
    }

    pub fn close_channel(&mut self, player_id: PlayerId, channel_id: ChannelId) -> bool {
        let Some(session) = self.directory.get(player_id) else {
            return false;
        };
        self.registry
            .remove_user_from_channel(session.as_ref(), channel_id)
    }

    /// Create the player's private channel and join it as owner.
    pub fn create_private_channel(&mut self, player_id: PlayerId) -> Option<ChannelId> {
        let session = self.directory.get(player_id)?;
        let player: PlayerRef = session.clone();

        let channel = self.registry.create_channel(player.as_ref(), CHANNEL_PRIVATE)?;
        if !channel.add_user(&player) {
            warn!(player = %session.name, channel_id = channel.id(), "owner could not join own private channel");
        }

        let (channel_id, name) = (channel.id(), channel.name().to_string());
        session.send(ChatEvent::PrivateChannelCreated { channel_id, name });
        Some(channel_id)
    }

    /// Invite an online player to the caller's private channel.
    pub fn invite_to_private_channel(&mut self, player_id: PlayerId, target_name: &str) -> bool {
        let Some((session, target)) = self.private_channel_target(player_id, target_name) else {
            return false;
        };
        let target: PlayerRef = target;

        let Some(channel) = self.registry.get_private_channel_mut(session.as_ref()) else {
            return false;
        };
        channel.invite_player(session.as_ref(), &target)
    }

    /// Revoke an online player's invitation to the caller's private channel.
    pub fn exclude_from_private_channel(&mut self, player_id: PlayerId, target_name: &str) -> bool {
        let Some((session, target)) = self.private_channel_target(player_id, target_name) else {
            return false;
        };

        let Some(channel) = self.registry.get_private_channel_mut(session.as_ref()) else {
            return false;
        };
        channel.exclude_player(session.as_ref(), target.as_ref())
    }

    /// Resolve the caller and the named target of an invite or exclude.
    /// Self-targets are refused; unknown names get a failure notice.
    fn private_channel_target(
        &self,
        player_id: PlayerId,
        target_name: &str,
    ) -> Option<(Arc<PlayerSession>, Arc<PlayerSession>)> {
        let session = self.directory.get(player_id)?;
        if validation::validate_player_name(target_name).is_err() {
            return None;
        }

        let Some(target) = self.directory.find_by_name(target_name) else {
            session.send_text_message(MessageClass::Failure, "A player with this name is not online.");
            return None;
        };
        if target.id == session.id {
            return None;
        }
        Some((session, target))
    }

    /// Reply with the channels this player may open.
    pub fn request_channels(&mut self, player_id: PlayerId) -> bool {
        let Some(session) = self.directory.get(player_id) else {
            return false;
        };
        let channels = self.registry.get_channel_list(session.as_ref());
        session.send(ChatEvent::ChannelList { channels })
    }

    pub fn say_in_channel(
        &self,
        player_id: PlayerId,
        channel_id: ChannelId,
        class: SpeakClass,
        text: &str,
    ) -> bool {
        let Some(session) = self.directory.get(player_id) else {
            return false;
        };
        if let Err(reason) = validation::validate_message(text, self.settings.max_message_length) {
            debug!(player = %session.name, channel_id, %reason, "message rejected");
            return false;
        }
        self.registry
            .talk_to_channel(session.as_ref(), class, text, channel_id)
    }

    /// Close every channel. Sessions stay registered.
    pub fn shutdown(&mut self) {
        self.registry.teardown();
        info!(sessions = self.directory.len(), "chat engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::definitions::ChannelDefinition;
    use crate::engine::events::ChannelEventKind;
    use crate::engine::registry::RegistrySettings;
    use crate::engine::scheduler::ManualScheduler;
    use crate::engine::test_support::drain_events;
    use crate::hooks::{HookGateway, ScriptLimits};

    fn engine() -> ChatEngine {
        let gateway = Arc::new(HookGateway::new(".", ScriptLimits::default()));
        let registry = ChannelRegistry::new(
            gateway,
            Arc::new(ManualScheduler::new()),
            RegistrySettings::default(),
        );
        let mut engine = ChatEngine::new(registry, EngineSettings::default());
        engine
            .load_definitions(&ChannelDefinitions {
                channels: vec![ChannelDefinition {
                    id: 5,
                    name: "Trade".into(),
                    public: false,
                    script: None,
                }],
                ..Default::default()
            })
            .unwrap();
        engine
    }

    fn connect(
        engine: &mut ChatEngine,
        id: u32,
        name: &str,
    ) -> (Arc<PlayerSession>, mpsc::Receiver<ChatEvent>) {
        engine
            .connect(PlayerId(id), Guid(id), name, Sex::Male)
            .unwrap()
    }

    #[test]
    fn test_connect_and_lookup_by_name() {
        let mut engine = engine();
        let (alice, _rx) = connect(&mut engine, 1, "Alice");

        assert_eq!(engine.directory().len(), 1);
        assert_eq!(engine.directory().find_by_name("aLiCe").map(|s| s.id), Some(alice.id));
        assert!(engine.connect(PlayerId(2), Guid(2), "bad_name!", Sex::Male).is_err());
    }

    #[test]
    fn test_reconnect_replaces_stale_session() {
        let mut engine = engine();
        let (_old, _rx_old) = connect(&mut engine, 1, "Alice");
        engine.open_channel(PlayerId(1), 5);

        let (_new, _rx_new) = connect(&mut engine, 1, "Alice");
        assert_eq!(engine.directory().len(), 1);
        assert_eq!(engine.registry().get_channel_by_id(5).unwrap().member_count(), 0);
    }

    #[test]
    fn test_open_channel_replies_with_members() {
        let mut engine = engine();
        let (_alice, mut rx_a) = connect(&mut engine, 1, "Alice");
        let (_bob, mut rx_b) = connect(&mut engine, 2, "Bob");

        assert!(engine.open_channel(PlayerId(1), 5));
        assert!(engine.open_channel(PlayerId(2), 5));
        assert!(!engine.open_channel(PlayerId(2), 5));
        assert!(!engine.open_channel(PlayerId(2), 42));

        let events = drain_events(&mut rx_b);
        assert!(matches!(
            &events[..],
            [ChatEvent::ChannelOpened { channel_id: 5, members, invited, .. }]
                if members == &vec!["Alice".to_string(), "Bob".to_string()] && invited.is_empty()
        ));

        let events = drain_events(&mut rx_a);
        assert!(matches!(
            &events[1],
            ChatEvent::ChannelEvent { event: ChannelEventKind::Join, player_name, .. } if player_name == "Bob"
        ));
    }

    #[test]
    fn test_say_validates_text() {
        let mut engine = engine();
        let (_alice, mut rx) = connect(&mut engine, 1, "Alice");
        engine.open_channel(PlayerId(1), 5);
        drain_events(&mut rx);

        assert!(!engine.say_in_channel(PlayerId(1), 5, SpeakClass::ChannelY, "   "));
        assert!(!engine.say_in_channel(PlayerId(1), 5, SpeakClass::ChannelY, &"a".repeat(256)));
        assert!(engine.say_in_channel(PlayerId(1), 5, SpeakClass::ChannelY, "wts sword"));
        assert_eq!(drain_events(&mut rx).len(), 1);
    }

    #[test]
    fn test_private_channel_flow() {
        let mut engine = engine();
        let (alice, mut rx_a) = connect(&mut engine, 1, "Alice");
        let (_bob, mut rx_b) = connect(&mut engine, 2, "Bob");

        assert_eq!(engine.create_private_channel(PlayerId(1)), None);
        alice.set_premium(true);
        let id = engine.create_private_channel(PlayerId(1)).unwrap();
        assert!(matches!(
            &drain_events(&mut rx_a)[..],
            [ChatEvent::PrivateChannelCreated { channel_id, name }]
                if *channel_id == id && name == "Alice's Channel"
        ));

        assert!(!engine.invite_to_private_channel(PlayerId(1), "Alice"));
        assert!(engine.invite_to_private_channel(PlayerId(1), "bob"));
        assert!(engine.open_channel(PlayerId(2), id));

        let events = drain_events(&mut rx_b);
        assert!(matches!(
            events.last(),
            Some(ChatEvent::ChannelOpened { members, .. }) if members.len() == 2
        ));

        assert!(engine.exclude_from_private_channel(PlayerId(1), "Bob"));
        assert!(!engine.open_channel(PlayerId(2), id));
    }

    #[test]
    fn test_invite_unknown_name_notifies_failure() {
        let mut engine = engine();
        let (alice, mut rx) = connect(&mut engine, 1, "Alice");
        alice.set_premium(true);
        engine.create_private_channel(PlayerId(1)).unwrap();
        drain_events(&mut rx);

        assert!(!engine.invite_to_private_channel(PlayerId(1), "Nobody"));
        assert!(matches!(
            &drain_events(&mut rx)[..],
            [ChatEvent::TextMessage { class: MessageClass::Failure, .. }]
        ));
    }

    #[test]
    fn test_request_channels() {
        let mut engine = engine();
        let (_alice, mut rx) = connect(&mut engine, 1, "Alice");

        assert!(engine.request_channels(PlayerId(1)));
        match &drain_events(&mut rx)[..] {
            [ChatEvent::ChannelList { channels }] => {
                assert_eq!(channels.iter().map(|c| c.id).collect::<Vec<_>>(), vec![5]);
            }
            other => panic!("expected channel list, got {other:?}"),
        }
    }

    #[test]
    fn test_disconnect_cleans_up() {
        let mut engine = engine();
        let (alice, _rx_a) = connect(&mut engine, 1, "Alice");
        let (_bob, mut rx_b) = connect(&mut engine, 2, "Bob");
        alice.set_premium(true);
        let id = engine.create_private_channel(PlayerId(1)).unwrap();
        engine.invite_to_private_channel(PlayerId(1), "Bob");
        engine.open_channel(PlayerId(2), id);
        engine.open_channel(PlayerId(1), 5);
        drain_events(&mut rx_b);

        assert!(engine.disconnect(PlayerId(1)));
        assert!(!engine.disconnect(PlayerId(1)));
        assert!(engine.directory().find_by_name("Alice").is_none());
        assert!(engine.registry().get_private_channel(alice.as_ref()).is_none());
        assert!(!engine.registry().get_channel_by_id(5).unwrap().has_user(alice.id));

        let events = drain_events(&mut rx_b);
        assert!(events
            .iter()
            .any(|e| matches!(e, ChatEvent::ClosePrivate { channel_id } if *channel_id == id)));
    }

    #[test]
    fn test_reload_channels_from_file() {
        let mut engine = engine();
        let (_alice, _rx) = connect(&mut engine, 1, "Alice");
        engine.open_channel(PlayerId(1), 5);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatchannels.toml");
        std::fs::write(
            &path,
            "[[channel]]\nid = 5\nname = \"Market\"\n\n[[channel]]\nid = 6\nname = \"Quests\"\n",
        )
        .unwrap();

        engine.reload_channels(&path).unwrap();
        let trade = engine.registry().get_channel_by_id(5).unwrap();
        assert_eq!(trade.name(), "Market");
        assert!(trade.has_user(PlayerId(1)));

        std::fs::write(&path, "[[channel]]\nid = 0\nname = \"Bad\"\n").unwrap();
        assert!(matches!(
            engine.reload_channels(&path),
            Err(ChatError::InvalidDefinition { id: 0, .. })
        ));
        assert!(engine.registry().get_channel_by_id(6).is_some());
    }

    #[test]
    fn test_shutdown_closes_private_channels() {
        let mut engine = engine();
        let (alice, mut rx) = connect(&mut engine, 1, "Alice");
        alice.set_premium(true);
        let id = engine.create_private_channel(PlayerId(1)).unwrap();
        drain_events(&mut rx);

        engine.shutdown();
        assert!(matches!(
            &drain_events(&mut rx)[..],
            [ChatEvent::ClosePrivate { channel_id }] if *channel_id == id
        ));
        assert_eq!(engine.directory().len(), 1);
    }
}
