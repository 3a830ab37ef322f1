use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::definitions::ChannelDefinitions;
use crate::error::ChatError;
use crate::hooks::{ChannelHooks, HookGateway, PassThrough};

use super::channel::{ChatChannel, GUILD_MOTD_DELAY};
use super::events::{
    CHANNEL_GUILD, CHANNEL_PARTY, CHANNEL_PRIVATE, ChannelId, ChannelListing, SpeakClass,
};
use super::player::{ChatPlayer, GuildId, GuildInfo, PartyId, PlayerRef};
use super::private_channel::PrivateChannel;
use super::scheduler::Scheduler;

/// Ids handed out to private channels.
pub const PRIVATE_CHANNEL_IDS: Range<ChannelId> = 100..10000;

/// Name of the channel list entry that offers to open a private channel.
pub const PRIVATE_PLACEHOLDER_NAME: &str = "Private Chat Channel";

/// Name given to every party channel.
pub const PARTY_CHANNEL_NAME: &str = "Party";

/// The catalog a channel lives in, with its key there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Static(ChannelId),
    Guild(GuildId),
    Party(PartyId),
    Private(ChannelId),
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub private_ids: Range<ChannelId>,
    pub guild_motd_delay: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            private_ids: PRIVATE_CHANNEL_IDS,
            guild_motd_delay: GUILD_MOTD_DELAY,
        }
    }
}

/// Catalog of every chat channel, resolving channel ids per requesting player.
///
/// Not synchronized: the simulation tick owns it and calls in one action at a time.
pub struct ChannelRegistry {
    /// Channels from the definitions file, keyed by id.
    normal_channels: BTreeMap<ChannelId, ChatChannel>,
    guild_channels: HashMap<GuildId, ChatChannel>,
    party_channels: HashMap<PartyId, ChatChannel>,
    private_channels: BTreeMap<ChannelId, PrivateChannel>,
    gateway: Arc<HookGateway>,
    scheduler: Arc<dyn Scheduler>,
    settings: RegistrySettings,
    guild_hooks: Arc<dyn ChannelHooks>,
    party_hooks: Arc<dyn ChannelHooks>,
}

impl ChannelRegistry {
    pub fn new(
        gateway: Arc<HookGateway>,
        scheduler: Arc<dyn Scheduler>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            normal_channels: BTreeMap::new(),
            guild_channels: HashMap::new(),
            party_channels: HashMap::new(),
            private_channels: BTreeMap::new(),
            gateway,
            scheduler,
            settings,
            guild_hooks: Arc::new(PassThrough),
            party_hooks: Arc::new(PassThrough),
        }
    }

    // ── Definitions ─────────────────────────────────────────────────

    /// Create or update static channels from definitions.
    ///
    /// Existing channels keep their members, who are re-added under the new
    /// hooks. A script that fails to load keeps the previous binding.
    pub fn load_definitions(&mut self, defs: &ChannelDefinitions) -> Result<(), ChatError> {
        defs.validate(&self.settings.private_ids)?;

        let mut created = 0;
        let mut updated = 0;
        for def in &defs.channels {
            let hooks = self.load_hooks(def.script.as_deref());

            if let Some(channel) = self.normal_channels.get_mut(&def.id) {
                channel.set_name(def.name.clone());
                channel.set_public(def.public);
                if let Some(hooks) = hooks {
                    channel.set_hooks(hooks);
                }

                for member in channel.take_members() {
                    if !channel.add_user(&member) {
                        info!(player = member.name(), channel = %def.name, "member not re-admitted after reload");
                    }
                }
                updated += 1;
                continue;
            }

            let mut channel = ChatChannel::new(def.id, def.name.clone()).with_public(def.public);
            if let Some(hooks) = hooks {
                channel = channel.with_hooks(hooks);
            }
            self.normal_channels.insert(def.id, channel);
            created += 1;
        }

        let guild_script = defs.guild.as_ref().and_then(|t| t.script.as_deref());
        if let Some(hooks) = self.load_hooks(guild_script) {
            self.set_guild_hooks(hooks);
        }
        let party_script = defs.party.as_ref().and_then(|t| t.script.as_deref());
        if let Some(hooks) = self.load_hooks(party_script) {
            self.set_party_hooks(hooks);
        }

        info!(created, updated, total = self.normal_channels.len(), "loaded chat channels");
        Ok(())
    }

    /// `None` when the script could not be loaded; the failure is logged.
    fn load_hooks(&self, script: Option<&str>) -> Option<Arc<dyn ChannelHooks>> {
        let Some(file) = script else {
            return Some(Arc::new(PassThrough));
        };
        match self.gateway.load_script(file) {
            Ok(hooks) => Some(Arc::new(hooks)),
            Err(e) => {
                warn!(script = file, error = %e, "can not load channel script");
                None
            }
        }
    }

    /// Hooks for guild channels, including ones already created.
    pub fn set_guild_hooks(&mut self, hooks: Arc<dyn ChannelHooks>) {
        for channel in self.guild_channels.values_mut() {
            channel.set_hooks(hooks.clone());
        }
        self.guild_hooks = hooks;
    }

    /// Hooks for party channels, including ones already created.
    pub fn set_party_hooks(&mut self, hooks: Arc<dyn ChannelHooks>) {
        for channel in self.party_channels.values_mut() {
            channel.set_hooks(hooks.clone());
        }
        self.party_hooks = hooks;
    }

    // ── Resolution ──────────────────────────────────────────────────

    /// Find the catalog entry `channel_id` refers to for this player.
    pub fn resolve(&self, player: &dyn ChatPlayer, channel_id: ChannelId) -> Option<ChannelKey> {
        match channel_id {
            CHANNEL_GUILD => {
                let guild = player.guild()?;
                self.guild_channels
                    .contains_key(&guild.id)
                    .then_some(ChannelKey::Guild(guild.id))
            }
            CHANNEL_PARTY => {
                let party = player.party()?;
                self.party_channels
                    .contains_key(&party)
                    .then_some(ChannelKey::Party(party))
            }
            id => {
                if let Some(channel) = self.normal_channels.get(&id) {
                    return channel.can_join(player).then_some(ChannelKey::Static(id));
                }
                self.private_channels
                    .get(&id)
                    .filter(|channel| channel.is_invited(player.guid()))
                    .map(|_| ChannelKey::Private(id))
            }
        }
    }

    pub fn channel(&self, key: ChannelKey) -> Option<&ChatChannel> {
        match key {
            ChannelKey::Static(id) => self.normal_channels.get(&id),
            ChannelKey::Guild(id) => self.guild_channels.get(&id),
            ChannelKey::Party(id) => self.party_channels.get(&id),
            ChannelKey::Private(id) => self.private_channels.get(&id).map(|c| &**c),
        }
    }

    pub fn channel_mut(&mut self, key: ChannelKey) -> Option<&mut ChatChannel> {
        match key {
            ChannelKey::Static(id) => self.normal_channels.get_mut(&id),
            ChannelKey::Guild(id) => self.guild_channels.get_mut(&id),
            ChannelKey::Party(id) => self.party_channels.get_mut(&id),
            ChannelKey::Private(id) => self.private_channels.get_mut(&id).map(|c| &mut **c),
        }
    }

    pub fn get_channel(&self, player: &dyn ChatPlayer, channel_id: ChannelId) -> Option<&ChatChannel> {
        let key = self.resolve(player, channel_id)?;
        self.channel(key)
    }

    pub fn get_channel_mut(
        &mut self,
        player: &dyn ChatPlayer,
        channel_id: ChannelId,
    ) -> Option<&mut ChatChannel> {
        let key = self.resolve(player, channel_id)?;
        self.channel_mut(key)
    }

    /// A static channel, without the `canJoin` gate.
    pub fn get_channel_by_id(&self, channel_id: ChannelId) -> Option<&ChatChannel> {
        self.normal_channels.get(&channel_id)
    }

    pub fn get_guild_channel_by_id(&self, guild_id: GuildId) -> Option<&ChatChannel> {
        self.guild_channels.get(&guild_id)
    }

    /// The private channel this player owns.
    pub fn get_private_channel(&self, player: &dyn ChatPlayer) -> Option<&PrivateChannel> {
        let guid = player.guid();
        self.private_channels.values().find(|c| c.owner() == guid)
    }

    pub fn get_private_channel_mut(&mut self, player: &dyn ChatPlayer) -> Option<&mut PrivateChannel> {
        let guid = player.guid();
        self.private_channels.values_mut().find(|c| c.owner() == guid)
    }

    /// Invitations of the private channel with this id; empty for any other channel.
    pub fn invited_names(&self, channel_id: ChannelId) -> Vec<String> {
        self.private_channels
            .get(&channel_id)
            .map(PrivateChannel::invited_names)
            .unwrap_or_default()
    }

    pub fn static_channels(&self) -> impl Iterator<Item = &ChatChannel> {
        self.normal_channels.values()
    }

    pub fn private_channel_count(&self) -> usize {
        self.private_channels.len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Create the guild, party or private channel `channel_id` stands for.
    /// Fails if the player can already resolve one.
    pub fn create_channel(
        &mut self,
        player: &dyn ChatPlayer,
        channel_id: ChannelId,
    ) -> Option<&mut ChatChannel> {
        if self.get_channel(player, channel_id).is_some() {
            return None;
        }

        match channel_id {
            CHANNEL_GUILD => {
                let guild = player.guild()?;
                let channel = ChatChannel::new(CHANNEL_GUILD, guild.name.clone())
                    .with_hooks(self.guild_hooks.clone())
                    .with_guild_motd(self.scheduler.clone(), self.settings.guild_motd_delay);
                info!(guild_id = %guild.id, guild = %guild.name, "guild channel created");
                Some(self.guild_channels.entry(guild.id).or_insert(channel))
            }
            CHANNEL_PARTY => {
                let party = player.party()?;
                let channel = ChatChannel::new(CHANNEL_PARTY, PARTY_CHANNEL_NAME)
                    .with_hooks(self.party_hooks.clone());
                info!(party_id = %party, "party channel created");
                Some(self.party_channels.entry(party).or_insert(channel))
            }
            CHANNEL_PRIVATE => self.create_private_channel(player).map(|c| &mut **c),
            _ => None,
        }
    }

    /// One private channel per premium player, in the first free id.
    fn create_private_channel(&mut self, player: &dyn ChatPlayer) -> Option<&mut PrivateChannel> {
        if !player.is_premium() || self.get_private_channel(player).is_some() {
            return None;
        }

        let Some(id) = self
            .settings
            .private_ids
            .clone()
            .find(|id| !self.private_channels.contains_key(id))
        else {
            warn!(player = player.name(), "no free private channel id");
            return None;
        };

        let channel = PrivateChannel::new(id, format!("{}'s Channel", player.name()), player.guid());
        info!(channel_id = id, owner = player.name(), "private channel created");
        Some(self.private_channels.entry(id).or_insert(channel))
    }

    /// Remove the guild or party channel of the player's current group, or
    /// the private channel with this id after closing it for its members.
    pub fn delete_channel(&mut self, player: &dyn ChatPlayer, channel_id: ChannelId) -> bool {
        match channel_id {
            CHANNEL_GUILD => {
                let Some(guild) = player.guild() else {
                    return false;
                };
                if self.guild_channels.remove(&guild.id).is_none() {
                    return false;
                }
                info!(guild_id = %guild.id, "guild channel deleted");
            }
            CHANNEL_PARTY => {
                let Some(party) = player.party() else {
                    return false;
                };
                if self.party_channels.remove(&party).is_none() {
                    return false;
                }
                info!(party_id = %party, "party channel deleted");
            }
            id => {
                let Some(channel) = self.private_channels.remove(&id) else {
                    return false;
                };
                channel.close_channel();
                info!(channel_id = id, owner = %channel.owner(), "private channel deleted");
            }
        }
        true
    }

    // ── Membership ──────────────────────────────────────────────────

    pub fn add_user_to_channel(
        &mut self,
        player: &PlayerRef,
        channel_id: ChannelId,
    ) -> Option<&ChatChannel> {
        let channel = self.get_channel_mut(player.as_ref(), channel_id)?;
        if channel.add_user(player) {
            Some(channel)
        } else {
            None
        }
    }

    /// Leave a channel. An owner leaving their private channel deletes it.
    pub fn remove_user_from_channel(&mut self, player: &dyn ChatPlayer, channel_id: ChannelId) -> bool {
        let Some(key) = self.resolve(player, channel_id) else {
            return false;
        };
        let Some(channel) = self.channel_mut(key) else {
            return false;
        };
        if !channel.remove_user(player) {
            return false;
        }

        if let ChannelKey::Private(id) = key
            && self
                .private_channels
                .get(&id)
                .is_some_and(|c| c.owner() == player.guid())
        {
            self.delete_channel(player, id);
        }
        true
    }

    /// Forget a disconnecting player everywhere. Only the private channel the
    /// player owns is closed and deleted.
    pub fn remove_user_from_all_channels(&mut self, player: &dyn ChatPlayer) {
        for channel in self.normal_channels.values_mut() {
            channel.remove_user(player);
        }
        for channel in self.party_channels.values_mut() {
            channel.remove_user(player);
        }
        for channel in self.guild_channels.values_mut() {
            channel.remove_user(player);
        }

        let guid = player.guid();
        let mut owned = Vec::new();
        for (id, channel) in self.private_channels.iter_mut() {
            channel.remove_invite(guid);
            channel.remove_user(player);
            if channel.owner() == guid {
                owned.push(*id);
            }
        }

        for id in owned {
            if let Some(channel) = self.private_channels.remove(&id) {
                channel.close_channel();
                info!(channel_id = id, owner = player.name(), "private channel closed on owner logout");
            }
        }
    }

    // ── Queries & speech ────────────────────────────────────────────

    /// Channels offered to the player, in dialog order: guild, party, static,
    /// then private. Guild and party channels are created on demand.
    pub fn get_channel_list(&mut self, player: &dyn ChatPlayer) -> Vec<ChannelListing> {
        let mut list = Vec::new();

        if player.guild().is_some() {
            list.extend(self.group_listing(player, CHANNEL_GUILD));
        }
        if player.party().is_some() {
            list.extend(self.group_listing(player, CHANNEL_PARTY));
        }

        list.extend(
            self.normal_channels
                .values()
                .filter(|channel| channel.can_join(player))
                .map(ChatChannel::listing),
        );

        let guid = player.guid();
        let mut has_private = false;
        for channel in self.private_channels.values() {
            if channel.is_invited(guid) {
                list.push(channel.listing());
            }
            if channel.owner() == guid {
                has_private = true;
            }
        }

        if !has_private && player.is_premium() {
            list.insert(
                0,
                ChannelListing {
                    id: CHANNEL_PRIVATE,
                    name: PRIVATE_PLACEHOLDER_NAME.to_string(),
                },
            );
        }
        list
    }

    fn group_listing(&mut self, player: &dyn ChatPlayer, channel_id: ChannelId) -> Option<ChannelListing> {
        if let Some(channel) = self.get_channel(player, channel_id) {
            return Some(channel.listing());
        }
        self.create_channel(player, channel_id)
            .map(|channel| channel.listing())
    }

    /// Speak in a channel after classification normalisation and `onSpeak`.
    pub fn talk_to_channel(
        &self,
        player: &dyn ChatPlayer,
        class: SpeakClass,
        text: &str,
        channel_id: ChannelId,
    ) -> bool {
        let Some(key) = self.resolve(player, channel_id) else {
            return false;
        };
        let Some(channel) = self.channel(key) else {
            return false;
        };

        let class = normalize_speak_class(key, player.guild().as_ref(), class);
        let Some(class) = channel.on_speak(player, class, text) else {
            return false;
        };
        channel.talk(player, class, text)
    }

    /// Close every private channel and drop all channels and pending timers.
    pub fn teardown(&mut self) {
        for channel in self.private_channels.values() {
            channel.close_channel();
        }
        self.scheduler.cancel_all();

        let total = self.normal_channels.len()
            + self.guild_channels.len()
            + self.party_channels.len()
            + self.private_channels.len();
        self.normal_channels.clear();
        self.guild_channels.clear();
        self.party_channels.clear();
        self.private_channels.clear();
        info!(total, "chat channels torn down");
    }
}

/// Guild speech is officer or member speech by rank; party and private
/// speech is always plain channel speech.
pub fn normalize_speak_class(key: ChannelKey, guild: Option<&GuildInfo>, class: SpeakClass) -> SpeakClass {
    match key {
        ChannelKey::Guild(_) => {
            if guild.is_some_and(GuildInfo::is_officer) {
                SpeakClass::ChannelO
            } else {
                SpeakClass::ChannelY
            }
        }
        ChannelKey::Party(_) | ChannelKey::Private(_) => SpeakClass::ChannelY,
        ChannelKey::Static(_) => class,
    }
}
