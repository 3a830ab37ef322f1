use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::info;

use super::channel::ChatChannel;
use super::events::{ChannelEventKind, ChannelId, MessageClass};
use super::player::{ChatPlayer, Guid, PlayerRef, WeakPlayer};

/// An invite-only channel owned by a single player.
///
/// Derefs to [`ChatChannel`] for membership and speech.
#[derive(Debug)]
pub struct PrivateChannel {
    channel: ChatChannel,
    owner: Guid,
    invites: HashMap<Guid, WeakPlayer>,
}

impl PrivateChannel {
    pub fn new(id: ChannelId, name: impl Into<String>, owner: Guid) -> Self {
        Self {
            channel: ChatChannel::new(id, name),
            owner,
            invites: HashMap::new(),
        }
    }

    pub fn owner(&self) -> Guid {
        self.owner
    }

    /// The owner is always invited.
    pub fn is_invited(&self, guid: Guid) -> bool {
        guid == self.owner || self.invites.contains_key(&guid)
    }

    pub fn remove_invite(&mut self, guid: Guid) -> bool {
        self.invites.remove(&guid).is_some()
    }

    /// Names of invited players still connected, sorted. The owner is not listed.
    pub fn invited_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .invites
            .values()
            .filter_map(|weak| weak.upgrade())
            .map(|player| player.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Invite a player. Inviting someone already invited changes nothing and
    /// sends nothing. Returns whether a new invitation was recorded.
    pub fn invite_player(&mut self, inviter: &dyn ChatPlayer, invitee: &PlayerRef) -> bool {
        if self.is_invited(invitee.guid()) {
            return false;
        }
        self.invites.insert(invitee.guid(), Arc::downgrade(invitee));

        invitee.send_text_message(
            MessageClass::PartyManagement,
            &format!(
                "{} invites you to {} private chat channel.",
                inviter.name(),
                inviter.sex().possessive()
            ),
        );
        inviter.send_text_message(
            MessageClass::PartyManagement,
            &format!("{} has been invited.", invitee.name()),
        );

        self.channel
            .broadcast_event(invitee.name(), ChannelEventKind::Invite);

        info!(channel_id = self.channel.id(), inviter = inviter.name(), invitee = invitee.name(), "private channel invite");
        true
    }

    /// Revoke an invitation, removing the player from the channel as well.
    /// Returns false if the player was not invited.
    pub fn exclude_player(&mut self, excluder: &dyn ChatPlayer, excludee: &dyn ChatPlayer) -> bool {
        if !self.remove_invite(excludee.guid()) {
            return false;
        }

        self.channel.remove_user(excludee);

        excluder.send_text_message(
            MessageClass::PartyManagement,
            &format!("{} has been excluded.", excludee.name()),
        );
        excludee.send_close_private(self.channel.id());

        self.channel
            .broadcast_event(excludee.name(), ChannelEventKind::Exclude);

        info!(channel_id = self.channel.id(), excluder = excluder.name(), excludee = excludee.name(), "private channel exclude");
        true
    }

    /// Tell every member the channel is closing. State is left as is; the
    /// owner of this value drops it afterwards.
    pub fn close_channel(&self) {
        for member in self.channel.live_members() {
            member.send_close_private(self.channel.id());
        }
    }
}

impl Deref for PrivateChannel {
    type Target = ChatChannel;

    fn deref(&self) -> &ChatChannel {
        &self.channel
    }
}

impl DerefMut for PrivateChannel {
    fn deref_mut(&mut self) -> &mut ChatChannel {
        &mut self.channel
    }
}
