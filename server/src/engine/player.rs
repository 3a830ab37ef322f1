use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use super::events::{ChannelEventKind, ChannelId, MessageClass, SpeakClass};

/// Session-scoped creature id. Keys channel membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// Persistent character id. Keys invitations and private channel ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Guid(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuildId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId(pub u32);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_inner!(PlayerId, Guid, GuildId, PartyId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    /// Possessive pronoun used in invitation texts.
    pub fn possessive(self) -> &'static str {
        match self {
            Sex::Female => "her",
            Sex::Male => "his",
        }
    }
}

/// Guild rank level at or below which a member speaks as a regular member.
pub const GUILD_BASE_RANK_LEVEL: u8 = 1;

/// Snapshot of a player's current guild, owned by the guild subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    pub rank_level: u8,
    /// Message of the day. Empty when the guild has none.
    pub motd: String,
}

impl GuildInfo {
    /// Officers and leaders speak with the elevated channel classification.
    pub fn is_officer(&self) -> bool {
        self.rank_level > GUILD_BASE_RANK_LEVEL
    }
}

/// Outbound deliveries the channel subsystem decides on. The transport that
/// implements this owns framing and the actual send.
pub trait ChannelClient: Send + Sync {
    fn send_channel_event(&self, channel_id: ChannelId, player_name: &str, event: ChannelEventKind);

    /// A message spoken by `from` in a channel.
    fn send_to_channel(
        &self,
        from: &dyn ChatPlayer,
        class: SpeakClass,
        text: &str,
        channel_id: ChannelId,
    );

    /// A system message in a channel, with a free-form author label.
    fn send_channel_message(&self, author: &str, text: &str, class: SpeakClass, channel_id: ChannelId);

    fn send_close_private(&self, channel_id: ChannelId);

    fn send_text_message(&self, class: MessageClass, text: &str);
}

/// Identity and group lookups for a connected player. Guild, party and
/// premium state are owned elsewhere and may change between calls.
pub trait ChatPlayer: ChannelClient {
    fn id(&self) -> PlayerId;
    fn guid(&self) -> Guid;
    fn name(&self) -> &str;
    fn sex(&self) -> Sex;
    fn guild(&self) -> Option<GuildInfo>;
    fn party(&self) -> Option<PartyId>;
    fn is_premium(&self) -> bool;
}

/// Shared handle to a connected player. The session manager holds the
/// strong reference; channels only keep [`WeakPlayer`]s.
pub type PlayerRef = Arc<dyn ChatPlayer>;

pub type WeakPlayer = Weak<dyn ChatPlayer>;
