use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric channel id as seen by clients.
pub type ChannelId = u16;

/// Unique identifier for a delivered channel message.
pub type MessageId = Uuid;

/// Resolves to the requesting player's guild channel.
pub const CHANNEL_GUILD: ChannelId = 0x00;
/// Resolves to the requesting player's party channel.
pub const CHANNEL_PARTY: ChannelId = 0x01;
/// Placeholder id used to request creation of a private channel.
pub const CHANNEL_PRIVATE: ChannelId = 0xFFFF;

/// Classification attached to spoken text. The discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SpeakClass {
    Say = 1,
    Whisper = 2,
    Yell = 3,
    ChannelManager = 6,
    /// Regular channel speech (yellow).
    ChannelY = 7,
    /// Guild officer speech (orange).
    ChannelO = 8,
    Broadcast = 13,
    /// Highlighted system text (red), used for the guild message of the day.
    ChannelR1 = 14,
}

impl SpeakClass {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for SpeakClass {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => SpeakClass::Say,
            2 => SpeakClass::Whisper,
            3 => SpeakClass::Yell,
            6 => SpeakClass::ChannelManager,
            7 => SpeakClass::ChannelY,
            8 => SpeakClass::ChannelO,
            13 => SpeakClass::Broadcast,
            14 => SpeakClass::ChannelR1,
            other => return Err(other),
        })
    }
}

/// Classification of out-of-channel text messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    PartyManagement,
    Failure,
}

/// Membership change broadcast to the other members of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventKind {
    Join,
    Leave,
    Invite,
    Exclude,
}

/// One entry of the channel selection dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelListing {
    pub id: ChannelId,
    pub name: String,
}

/// Event delivered to a single player session. Transports serialize these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Someone joined, left, was invited to or excluded from a channel.
    ChannelEvent {
        channel_id: ChannelId,
        player_name: String,
        event: ChannelEventKind,
    },

    /// Text spoken in a channel.
    ChannelMessage {
        id: MessageId,
        channel_id: ChannelId,
        from: String,
        class: SpeakClass,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A private channel was closed for this player.
    ClosePrivate { channel_id: ChannelId },

    /// Plain text message outside of any channel.
    TextMessage { class: MessageClass, text: String },

    /// The channel was opened for this player (sent on join).
    ChannelOpened {
        channel_id: ChannelId,
        name: String,
        members: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        invited: Vec<String>,
    },

    /// The player's new private channel.
    PrivateChannelCreated { channel_id: ChannelId, name: String },

    /// Response to a channel list request.
    ChannelList { channels: Vec<ChannelListing> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_class_wire_values_round_trip() {
        for class in [
            SpeakClass::Say,
            SpeakClass::ChannelY,
            SpeakClass::ChannelO,
            SpeakClass::ChannelR1,
        ] {
            assert_eq!(SpeakClass::try_from(class.as_u8() as i64), Ok(class));
        }
        assert_eq!(SpeakClass::try_from(99), Err(99));
    }

    #[test]
    fn chat_event_is_tagged() {
        let event = ChatEvent::ChannelEvent {
            channel_id: 5,
            player_name: "Bob".into(),
            event: ChannelEventKind::Join,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "channel_event");
        assert_eq!(json["event"], "join");
        assert_eq!(json["channel_id"], 5);
    }

    #[test]
    fn channel_opened_omits_empty_invites() {
        let event = ChatEvent::ChannelOpened {
            channel_id: 3,
            name: "World Chat".into(),
            members: vec!["Alice".into()],
            invited: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("invited").is_none());
    }
}
