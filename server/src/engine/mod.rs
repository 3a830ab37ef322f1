pub mod channel;
pub mod chat_engine;
pub mod events;
pub mod player;
pub mod private_channel;
pub mod registry;
pub mod scheduler;
pub mod user_session;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;
