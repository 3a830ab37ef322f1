//! Channel policy hooks.
//!
//! A channel consults four optional callbacks:
//!
//! - **canJoin**: whether the channel resolves for a player at all
//! - **onJoin**: whether a player may become a member
//! - **onLeave**: notification after a player left
//! - **onSpeak**: whether speech is delivered, optionally reclassified
//!
//! Channels hold one [`ChannelHooks`] binding. Unscripted channels use
//! [`PassThrough`]; scripted ones use [`ScriptHooks`] compiled by the shared
//! [`HookGateway`]. Evaluation failures are fail-closed at the channel.

pub mod hook;
pub mod script;

pub use hook::{ChannelHooks, HookError, HookPoint, HookResult, PassThrough, SpeakVerdict};
pub use script::{HookGateway, ScriptHooks, ScriptLimits};
