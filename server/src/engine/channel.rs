use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::hooks::{ChannelHooks, PassThrough};

use super::events::{CHANNEL_GUILD, ChannelEventKind, ChannelId, ChannelListing, SpeakClass};
use super::player::{ChatPlayer, GuildId, PlayerId, PlayerRef, WeakPlayer};
use super::scheduler::Scheduler;

/// Delay between joining the guild channel and receiving the guild's MOTD.
pub const GUILD_MOTD_DELAY: Duration = Duration::from_millis(150);

/// Author label of the guild message of the day.
pub const GUILD_MOTD_AUTHOR: &str = "Message of the Day";

struct GuildMotd {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
}

/// In-memory state for a single channel.
pub struct ChatChannel {
    id: ChannelId,
    name: String,
    /// Public channels do not announce joins and leaves.
    public: bool,
    /// Currently joined players. The session manager owns the players.
    members: HashMap<PlayerId, WeakPlayer>,
    hooks: Arc<dyn ChannelHooks>,
    guild_motd: Option<GuildMotd>,
}

impl ChatChannel {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            public: false,
            members: HashMap::new(),
            hooks: Arc::new(PassThrough),
            guild_motd: None,
        }
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ChannelHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Deliver the guild MOTD to players joining this channel. Only takes
    /// effect on the guild channel id.
    pub fn with_guild_motd(mut self, scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        self.guild_motd = Some(GuildMotd { scheduler, delay });
        self
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn listing(&self) -> ChannelListing {
        ChannelListing {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn hooks_name(&self) -> &str {
        self.hooks.name()
    }

    pub fn has_user(&self, player: PlayerId) -> bool {
        self.members.contains_key(&player)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Names of members still connected, sorted.
    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .values()
            .filter_map(|weak| weak.upgrade())
            .map(|player| player.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_public(&mut self, public: bool) {
        self.public = public;
    }

    pub(crate) fn set_hooks(&mut self, hooks: Arc<dyn ChannelHooks>) {
        self.hooks = hooks;
    }

    /// Empty the membership, returning the members still alive.
    pub(crate) fn take_members(&mut self) -> Vec<PlayerRef> {
        self.members
            .drain()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    /// Add a player. Fails if already a member or `onJoin` refuses.
    pub fn add_user(&mut self, player: &PlayerRef) -> bool {
        if self.members.contains_key(&player.id()) {
            return false;
        }

        if !self.execute_on_join(player.as_ref()) {
            return false;
        }

        if self.id == CHANNEL_GUILD {
            self.schedule_guild_motd(player);
        }

        if !self.public {
            self.broadcast_event(player.name(), ChannelEventKind::Join);
        }

        self.members.insert(player.id(), Arc::downgrade(player));
        debug!(player = player.name(), channel = %self.name, channel_id = self.id, "joined channel");
        true
    }

    /// Remove a player. `onLeave` runs after the removal and cannot undo it.
    pub fn remove_user(&mut self, player: &dyn ChatPlayer) -> bool {
        if self.members.remove(&player.id()).is_none() {
            return false;
        }

        if !self.public {
            self.broadcast_event(player.name(), ChannelEventKind::Leave);
        }

        if let Err(e) = self.hooks.on_leave(player) {
            error!(player = player.name(), channel = %self.name, error = %e, "onLeave hook failed");
        }

        debug!(player = player.name(), channel = %self.name, channel_id = self.id, "left channel");
        true
    }

    /// Deliver speech to every member, including the speaker.
    pub fn talk(&self, from: &dyn ChatPlayer, class: SpeakClass, text: &str) -> bool {
        if !self.members.contains_key(&from.id()) {
            return false;
        }

        for member in self.live_members() {
            member.send_to_channel(from, class, text, self.id);
        }
        true
    }

    /// Deliver a system message without a speaker to every member.
    pub fn send_to_all(&self, text: &str, class: SpeakClass) {
        for member in self.live_members() {
            member.send_channel_message("", text, class, self.id);
        }
    }

    /// Whether the channel resolves for this player. Hook failures deny.
    pub fn can_join(&self, player: &dyn ChatPlayer) -> bool {
        match self.hooks.can_join(player) {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(player = player.name(), channel = %self.name, error = %e, "canJoin hook failed");
                false
            }
        }
    }

    /// The classification to deliver with, or `None` if speech is refused.
    pub fn on_speak(
        &self,
        player: &dyn ChatPlayer,
        class: SpeakClass,
        text: &str,
    ) -> Option<SpeakClass> {
        match self.hooks.on_speak(player, class, text) {
            Ok(verdict) => verdict.apply(class),
            Err(e) => {
                error!(player = player.name(), ?class, channel = %self.name, error = %e, "onSpeak hook failed");
                None
            }
        }
    }

    fn execute_on_join(&self, player: &dyn ChatPlayer) -> bool {
        match self.hooks.on_join(player) {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(player = player.name(), channel = %self.name, error = %e, "onJoin hook failed");
                false
            }
        }
    }

    pub(crate) fn broadcast_event(&self, player_name: &str, event: ChannelEventKind) {
        for member in self.live_members() {
            member.send_channel_event(self.id, player_name, event);
        }
    }

    pub(crate) fn live_members(&self) -> impl Iterator<Item = PlayerRef> + '_ {
        self.members.iter().filter_map(|(member_id, weak)| {
            let member = weak.upgrade();
            if member.is_none() {
                warn!(%member_id, channel = %self.name, "channel member no longer connected");
            }
            member
        })
    }

    fn schedule_guild_motd(&self, player: &PlayerRef) {
        let Some(motd) = &self.guild_motd else {
            return;
        };
        let Some(guild) = player.guild() else {
            return;
        };
        if guild.motd.is_empty() {
            return;
        }

        let weak = Arc::downgrade(player);
        motd.scheduler.schedule_once(
            motd.delay,
            Box::new(move || send_guild_motd(&weak, guild.id)),
        );
    }
}

/// Best effort: nothing is sent if the player disconnected or changed guild.
fn send_guild_motd(player: &WeakPlayer, guild_id: GuildId) {
    let Some(player) = player.upgrade() else {
        return;
    };
    let Some(guild) = player.guild() else {
        return;
    };
    if guild.id != guild_id || guild.motd.is_empty() {
        return;
    }
    player.send_channel_message(GUILD_MOTD_AUTHOR, &guild.motd, SpeakClass::ChannelR1, CHANNEL_GUILD);
}

impl fmt::Debug for ChatChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatChannel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("public", &self.public)
            .field("members", &self.members.len())
            .field("hooks", &self.hooks.name())
            .finish()
    }
}
