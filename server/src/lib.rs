pub mod config;
pub mod definitions;
pub mod engine;
pub mod error;
pub mod hooks;
