//! Core hook types and traits.

use std::path::PathBuf;

use crate::engine::events::SpeakClass;
use crate::engine::player::ChatPlayer;

/// Points in a channel's lifecycle where a script can be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before a channel is resolved for a player.
    CanJoin,
    /// Before a player is added to the membership.
    OnJoin,
    /// After a player was removed. The result is informational.
    OnLeave,
    /// Before speech is delivered; may rewrite the classification.
    OnSpeak,
}

impl HookPoint {
    pub const ALL: [HookPoint; 4] = [
        HookPoint::CanJoin,
        HookPoint::OnJoin,
        HookPoint::OnLeave,
        HookPoint::OnSpeak,
    ];

    /// Name of the script function backing this hook point.
    pub fn entry_point(self) -> &'static str {
        match self {
            HookPoint::CanJoin => "canJoin",
            HookPoint::OnJoin => "onJoin",
            HookPoint::OnLeave => "onLeave",
            HookPoint::OnSpeak => "onSpeak",
        }
    }
}

/// Outcome of an `onSpeak` evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakVerdict {
    Deny,
    Allow,
    /// Allow, but deliver with a different classification.
    AllowAs(SpeakClass),
}

impl SpeakVerdict {
    /// The classification to deliver with, or `None` when speech is denied.
    pub fn apply(self, class: SpeakClass) -> Option<SpeakClass> {
        match self {
            SpeakVerdict::Deny => None,
            SpeakVerdict::Allow => Some(class),
            SpeakVerdict::AllowAs(rewritten) => Some(rewritten),
        }
    }
}

/// Hook evaluation errors. Channels log these and treat them as denial.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("call stack overflow: too many nested script calls (limit {limit})")]
    CallStackOverflow { limit: usize },

    #[error("{entry_point} in {script} exceeded the script call depth")]
    CallDepthExceeded {
        script: String,
        entry_point: &'static str,
    },

    #[error("{entry_point} in {script} failed: {reason}")]
    Execution {
        script: String,
        entry_point: &'static str,
        reason: String,
    },

    #[error("{entry_point} in {script} returned {found}, expected {expected}")]
    UnexpectedReturn {
        script: String,
        entry_point: &'static str,
        found: String,
        expected: &'static str,
    },

    #[error("failed to compile {script}: {reason}")]
    Compile { script: String, reason: String },

    #[error("failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type HookResult<T> = Result<T, HookError>;

/// The four channel policy callbacks.
///
/// Every method defaults to allowing, so an implementation only overrides the
/// points it cares about and [`PassThrough`] overrides none.
pub trait ChannelHooks: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    fn can_join(&self, _player: &dyn ChatPlayer) -> HookResult<bool> {
        Ok(true)
    }

    fn on_join(&self, _player: &dyn ChatPlayer) -> HookResult<bool> {
        Ok(true)
    }

    fn on_leave(&self, _player: &dyn ChatPlayer) -> HookResult<bool> {
        Ok(true)
    }

    fn on_speak(
        &self,
        _player: &dyn ChatPlayer,
        _class: SpeakClass,
        _text: &str,
    ) -> HookResult<SpeakVerdict> {
        Ok(SpeakVerdict::Allow)
    }
}

/// Binding for channels without a script.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ChannelHooks for PassThrough {
    fn name(&self) -> &str {
        "pass-through"
    }
}
