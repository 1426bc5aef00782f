// Discord layer - commands, event handlers and the chat platform adapter.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "moderation/mod.rs"]
pub mod moderation;

// Re-export command types for convenience
pub use commands::{Data, Error};
