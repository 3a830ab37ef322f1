//! Shared helpers for unit tests.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::events::ChatEvent;
use super::player::{Guid, GuildId, GuildInfo, PartyId, PlayerId, PlayerRef, Sex};
use super::user_session::PlayerSession;

/// A session whose guid equals its player id.
pub fn test_player(id: u32, name: &str) -> (Arc<PlayerSession>, mpsc::Receiver<ChatEvent>) {
    let (session, rx) = PlayerSession::with_queue(PlayerId(id), Guid(id), name, Sex::Female, 256);
    (Arc::new(session), rx)
}

pub fn player_ref(session: &Arc<PlayerSession>) -> PlayerRef {
    session.clone()
}

pub fn guild(id: u32, rank_level: u8, motd: &str) -> GuildInfo {
    GuildInfo {
        id: GuildId(id),
        name: format!("Guild {id}"),
        rank_level,
        motd: motd.to_string(),
    }
}

pub fn join_party(session: &PlayerSession, id: u32) {
    session.set_party(Some(PartyId(id)));
}

/// Drain all pending events from a receiver.
pub fn drain_events(rx: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
