// Takedown manager - removes unsafe messages and leaves an undoable notice.
//
// Order of a group takedown:
//   1. re-check bot rights (they may have been revoked since the scan)
//   2. copy the media while the original still exists
//   3. persist the snapshot, so Undo can never race ahead of it
//   4. delete the original
//   5. post the notice with an Undo control
//
// A snapshot write failure still removes the message, but the notice goes
// out without Undo because there is nothing to restore from. A delete that
// times out may still have happened, so it keeps the snapshot and the notice.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use super::moderation_models::{
    Artifact, ArtifactEvent, ArtifactSource, ModerationConfig, PreservedMedia, Snapshot,
};
use super::notice;
use super::permission_gate::PermissionGate;
use super::platform::{bounded, ChatPlatform, Control, PlatformError};
use super::scan_orchestrator::{Evaluation, Finding};
use super::snapshot_store::SnapshotStore;

/// When to attach the cosmetic "Support" control to bot messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SupportPolicy {
    Always,
    Never,
    /// Attach with this probability, clamped to `0.0..=1.0`.
    Probability(f64),
}

impl SupportPolicy {
    pub fn roll(&self) -> bool {
        match *self {
            SupportPolicy::Always => true,
            SupportPolicy::Never => false,
            SupportPolicy::Probability(p) if p.is_nan() => false,
            SupportPolicy::Probability(p) => rand::thread_rng().gen_bool(p.clamp(0.0, 1.0)),
        }
    }

    /// `controls` followed by a Support control if the roll says so.
    pub fn decorate(&self, mut controls: Vec<Control>) -> Vec<Control> {
        if self.roll() {
            controls.push(Control::Support);
        }
        controls
    }
}

/// What the manager did about one artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Enforcement {
    /// Nothing to do: safe, unchecked or too large in a group.
    NoAction,
    /// Private chat: the verdict was sent back as a reply.
    Replied,
    /// The original was deleted. `notice_id` is `None` if posting the
    /// notice failed.
    TakenDown {
        notice_id: Option<u64>,
        undo_available: bool,
    },
    /// The bot lacks rights in the group. Nothing was deleted.
    NotPermitted,
    /// The platform refused or failed the delete.
    DeletionRejected,
}

pub struct TakedownManager<S: SnapshotStore> {
    store: Arc<S>,
    platform: Arc<dyn ChatPlatform>,
    gate: Arc<PermissionGate>,
    snapshot_lifetime: Duration,
    platform_timeout: Duration,
    support: SupportPolicy,
    max_media_bytes: u64,
}

impl<S: SnapshotStore> TakedownManager<S> {
    pub fn new(
        store: Arc<S>,
        platform: Arc<dyn ChatPlatform>,
        gate: Arc<PermissionGate>,
        snapshot_lifetime: Duration,
        platform_timeout: Duration,
        support: SupportPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            gate,
            snapshot_lifetime,
            platform_timeout,
            support,
            max_media_bytes: ModerationConfig::default().max_file_bytes,
        }
    }

    /// Largest attachment copied into a snapshot. Bigger files are
    /// restored from their platform reference only.
    pub fn with_media_limit(mut self, max_bytes: u64) -> Self {
        self.max_media_bytes = max_bytes;
        self
    }

    /// Act on the evaluation of one artifact from `event`.
    pub async fn enforce(
        &self,
        event: &ArtifactEvent,
        artifact: &Artifact,
        evaluation: &Evaluation,
    ) -> Enforcement {
        if !event.conversation.is_group() {
            return self.reply_verdict(event, artifact, evaluation).await;
        }

        match evaluation.finding() {
            Some(finding) if evaluation.is_unsafe() => {
                self.take_down(event, artifact, finding).await
            }
            _ => Enforcement::NoAction,
        }
    }

    async fn reply_verdict(
        &self,
        event: &ArtifactEvent,
        artifact: &Artifact,
        evaluation: &Evaluation,
    ) -> Enforcement {
        let text = notice::private_verdict(artifact, evaluation);
        let chat_id = event.conversation.id;
        if let Err(e) = bounded(
            self.platform_timeout,
            self.platform.reply(chat_id, event.message_id, &text),
        )
        .await
        {
            tracing::warn!(chat_id, message_id = event.message_id, "Failed to send verdict: {}", e);
        }
        Enforcement::Replied
    }

    async fn take_down(
        &self,
        event: &ArtifactEvent,
        artifact: &Artifact,
        finding: &Finding,
    ) -> Enforcement {
        let chat_id = event.conversation.id;
        let message_id = event.message_id;

        if !self.gate.can_moderate(&event.conversation).await {
            tracing::info!(chat_id, message_id, "Unsafe artifact but bot lacks rights");
            return Enforcement::NotPermitted;
        }

        let mut snapshot = Snapshot::capture(event, artifact, Utc::now(), self.snapshot_lifetime);
        snapshot.preserved = self.preserve(chat_id, artifact).await;
        let undo_available = match self.store.put(&snapshot).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(chat_id, message_id, "Failed to store snapshot: {}", e);
                false
            }
        };

        match bounded(
            self.platform_timeout,
            self.platform.delete_message(chat_id, message_id),
        )
        .await
        {
            Ok(()) => {}
            Err(PlatformError::Timeout) => {
                tracing::warn!(chat_id, message_id, "Delete timed out, assuming it went through");
            }
            Err(e) => {
                tracing::warn!(chat_id, message_id, "Failed to delete unsafe message: {}", e);
                if undo_available {
                    if let Err(e) = self.store.take(chat_id, message_id, Utc::now()).await {
                        tracing::warn!(chat_id, message_id, "Failed to drop orphan snapshot: {}", e);
                    }
                }
                if matches!(e, PlatformError::NotPermitted) {
                    if let Err(e) = bounded(
                        self.platform_timeout,
                        self.platform.reply(chat_id, message_id, notice::DELETE_REJECTED),
                    )
                    .await
                    {
                        tracing::warn!(chat_id, message_id, "Failed to report rejected delete: {}", e);
                    }
                }
                return Enforcement::DeletionRejected;
            }
        }

        let text = notice::takedown_notice(artifact, finding, &event.sender_name);
        let controls = if undo_available {
            vec![Control::Undo { message_id }]
        } else {
            Vec::new()
        };
        let controls = self.support.decorate(controls);

        match bounded(
            self.platform_timeout,
            self.platform.send_message(chat_id, &text, &controls),
        )
        .await
        {
            Ok(notice_id) => {
                tracing::info!(
                    chat_id,
                    message_id,
                    notice_id,
                    kind = %artifact.kind(),
                    "Took down unsafe message"
                );
                Enforcement::TakenDown {
                    notice_id: Some(notice_id),
                    undo_available,
                }
            }
            Err(e) => {
                // The message is already gone; the snapshot stays until expiry.
                tracing::error!(chat_id, message_id, "Failed to post takedown notice: {}", e);
                Enforcement::TakenDown {
                    notice_id: None,
                    undo_available,
                }
            }
        }
    }

    /// Copy the flagged media so an Undo does not depend on the original
    /// attachment surviving the delete.
    async fn preserve(&self, chat_id: u64, artifact: &Artifact) -> Option<PreservedMedia> {
        let media = artifact.media()?;
        if media.size_bytes > self.max_media_bytes {
            tracing::debug!(chat_id, size = media.size_bytes, "Media too large to preserve");
            return None;
        }
        if let ArtifactSource::Inline(data) = &media.source {
            return Some(PreservedMedia {
                file_name: media.file_ref.clone(),
                data: data.clone(),
            });
        }

        match bounded(
            self.platform_timeout,
            self.platform.fetch_media(&media.file_ref, self.max_media_bytes),
        )
        .await
        {
            Ok(preserved) => Some(preserved),
            Err(e) => {
                tracing::warn!(chat_id, "Could not copy media before takedown: {}", e);
                None
            }
        }
    }
}
