// Moderation pipeline - gate, evaluate and enforce for one inbound event.
//
// Groups where the bot cannot moderate get a single advisory per event and
// nothing is scanned. Private chats are always scanned and answered.

use std::sync::Arc;
use std::time::Duration;

use super::moderation_models::{ArtifactEvent, ArtifactKind};
use super::notice;
use super::permission_gate::PermissionGate;
use super::platform::{bounded, ChatPlatform};
use super::quota_ledger::QuotaStore;
use super::scan_orchestrator::{Evaluation, ScanOrchestrator};
use super::snapshot_store::SnapshotStore;
use super::takedown::{Enforcement, TakedownManager};

/// What the pipeline did for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub evaluations: Vec<(ArtifactKind, Evaluation)>,
    pub enforcements: Vec<Enforcement>,
    pub advisory_sent: bool,
}

impl PipelineReport {
    pub fn taken_down(&self) -> bool {
        self.enforcements
            .iter()
            .any(|e| matches!(e, Enforcement::TakenDown { .. }))
    }
}

pub struct ModerationPipeline<Q: QuotaStore, S: SnapshotStore> {
    orchestrator: Arc<ScanOrchestrator<Q>>,
    takedown: Arc<TakedownManager<S>>,
    gate: Arc<PermissionGate>,
    platform: Arc<dyn ChatPlatform>,
    platform_timeout: Duration,
}

impl<Q: QuotaStore, S: SnapshotStore> ModerationPipeline<Q, S> {
    pub fn new(
        orchestrator: Arc<ScanOrchestrator<Q>>,
        takedown: Arc<TakedownManager<S>>,
        gate: Arc<PermissionGate>,
        platform: Arc<dyn ChatPlatform>,
        platform_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            takedown,
            gate,
            platform,
            platform_timeout,
        }
    }

    pub fn orchestrator(&self) -> &Arc<ScanOrchestrator<Q>> {
        &self.orchestrator
    }

    pub async fn handle_artifact_event(&self, event: &ArtifactEvent) -> PipelineReport {
        let mut report = PipelineReport::default();
        if event.artifacts.is_empty() {
            return report;
        }

        if !self.gate.can_moderate(&event.conversation).await {
            self.send_advisory(event, &mut report).await;
            return report;
        }

        for artifact in &event.artifacts {
            let evaluation = self.orchestrator.evaluate(artifact).await;
            let enforcement = self.takedown.enforce(event, artifact, &evaluation).await;
            report.evaluations.push((artifact.kind(), evaluation));

            // Once the message is gone, or can't be touched, the rest of it
            // needs no further scanning.
            let stop = match &enforcement {
                Enforcement::TakenDown { .. } | Enforcement::DeletionRejected => true,
                Enforcement::NotPermitted => {
                    self.send_advisory(event, &mut report).await;
                    true
                }
                Enforcement::NoAction | Enforcement::Replied => false,
            };
            report.enforcements.push(enforcement);
            if stop {
                break;
            }
        }

        report
    }

    async fn send_advisory(&self, event: &ArtifactEvent, report: &mut PipelineReport) {
        if report.advisory_sent {
            return;
        }
        let chat_id = event.conversation.id;
        match bounded(
            self.platform_timeout,
            self.platform
                .reply(chat_id, event.message_id, notice::ADMIN_ADVISORY),
        )
        .await
        {
            Ok(()) => report.advisory_sent = true,
            Err(e) => tracing::warn!(chat_id, "Failed to send admin advisory: {}", e),
        }
    }
}
