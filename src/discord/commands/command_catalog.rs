// Discord commands module.
// Each feature gets its own command file.

use std::sync::Arc;

use crate::core::moderation::{ModerationPipeline, QuotaLedger, RestoreReaper, ScanOrchestrator};
use crate::infra::moderation::SqliteModerationStore;

pub mod help;

pub mod quota;

/// Shared services handed to every command and event handler.
pub struct Data {
    pub pipeline: Arc<ModerationPipeline<SqliteModerationStore, SqliteModerationStore>>,
    pub reaper: Arc<RestoreReaper<SqliteModerationStore>>,
}

impl Data {
    pub fn orchestrator(&self) -> &Arc<ScanOrchestrator<SqliteModerationStore>> {
        self.pipeline.orchestrator()
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger<SqliteModerationStore>> {
        self.orchestrator().ledger()
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
