use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use super::events::{ChannelEventKind, ChannelId, ChatEvent, MessageClass, SpeakClass};
use super::player::{ChannelClient, ChatPlayer, Guid, GuildInfo, PartyId, PlayerId, Sex};

/// Maximum queued outbound events per session (prevents memory exhaustion from slow clients).
pub const MAX_OUTBOUND_QUEUE: usize = 1024;

/// A connected player. The transport drains the outbound queue; the guild and
/// party subsystems update group identity as it changes.
#[derive(Debug)]
pub struct PlayerSession {
    pub id: PlayerId,
    pub guid: Guid,
    pub name: String,
    pub sex: Sex,
    guild: RwLock<Option<GuildInfo>>,
    party: RwLock<Option<PartyId>>,
    premium: AtomicBool,
    /// Send outbound events to this session's write loop (bounded to prevent memory exhaustion).
    outbound: mpsc::Sender<ChatEvent>,
    pub connected_at: DateTime<Utc>,
}

impl PlayerSession {
    pub fn new(
        id: PlayerId,
        guid: Guid,
        name: String,
        sex: Sex,
        outbound: mpsc::Sender<ChatEvent>,
    ) -> Self {
        Self {
            id,
            guid,
            name,
            sex,
            guild: RwLock::new(None),
            party: RwLock::new(None),
            premium: AtomicBool::new(false),
            outbound,
            connected_at: Utc::now(),
        }
    }

    /// Create a session together with the receiving end of its outbound queue.
    pub fn with_queue(
        id: PlayerId,
        guid: Guid,
        name: impl Into<String>,
        sex: Sex,
        queue_size: usize,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (Self::new(id, guid, name.into(), sex, tx), rx)
    }

    pub fn set_guild(&self, guild: Option<GuildInfo>) {
        *self.guild.write() = guild;
    }

    pub fn set_party(&self, party: Option<PartyId>) {
        *self.party.write() = party;
    }

    pub fn set_premium(&self, premium: bool) {
        self.premium.store(premium, Ordering::Relaxed);
    }

    /// Send an event to this session. Returns false if the channel is closed
    /// or the outbound queue is full (slow clients drop events rather than block).
    pub fn send(&self, event: ChatEvent) -> bool {
        let sent = self.outbound.try_send(event).is_ok();
        if !sent {
            warn!(player = %self.name, "dropped outbound chat event");
        }
        sent
    }
}

impl ChannelClient for PlayerSession {
    fn send_channel_event(&self, channel_id: ChannelId, player_name: &str, event: ChannelEventKind) {
        self.send(ChatEvent::ChannelEvent {
            channel_id,
            player_name: player_name.to_string(),
            event,
        });
    }

    fn send_to_channel(
        &self,
        from: &dyn ChatPlayer,
        class: SpeakClass,
        text: &str,
        channel_id: ChannelId,
    ) {
        self.send(ChatEvent::ChannelMessage {
            id: Uuid::new_v4(),
            channel_id,
            from: from.name().to_string(),
            class,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn send_channel_message(&self, author: &str, text: &str, class: SpeakClass, channel_id: ChannelId) {
        self.send(ChatEvent::ChannelMessage {
            id: Uuid::new_v4(),
            channel_id,
            from: author.to_string(),
            class,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn send_close_private(&self, channel_id: ChannelId) {
        self.send(ChatEvent::ClosePrivate { channel_id });
    }

    fn send_text_message(&self, class: MessageClass, text: &str) {
        self.send(ChatEvent::TextMessage {
            class,
            text: text.to_string(),
        });
    }
}

impl ChatPlayer for PlayerSession {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn guid(&self) -> Guid {
        self.guid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sex(&self) -> Sex {
        self.sex
    }

    fn guild(&self) -> Option<GuildInfo> {
        self.guild.read().clone()
    }

    fn party(&self) -> Option<PartyId> {
        *self.party.read()
    }

    fn is_premium(&self) -> bool {
        self.premium.load(Ordering::Relaxed)
    }
}
