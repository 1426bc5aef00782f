// Core moderation module - scanning, takedown and undo for shared chats.

pub mod likelihood;
pub mod moderation_models;
pub mod notice;
pub mod permission_gate;
pub mod pipeline;
pub mod platform;
pub mod providers;
pub mod quota_ledger;
pub mod restore_reaper;
pub mod scan_orchestrator;
pub mod snapshot_store;
pub mod takedown;

#[cfg(test)]
pub mod testing;

pub use likelihood::*;
pub use moderation_models::*;
pub use permission_gate::*;
pub use pipeline::*;
pub use platform::*;
pub use providers::*;
pub use quota_ledger::*;
pub use restore_reaper::*;
pub use scan_orchestrator::*;
pub use snapshot_store::*;
pub use takedown::*;
