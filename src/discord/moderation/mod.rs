// Discord adapter for the moderation core.

pub mod artifact_events;
pub mod events;
pub mod serenity_platform;

pub use serenity_platform::SerenityPlatform;
