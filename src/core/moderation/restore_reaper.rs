// Restore and reaper - handles Undo/Delete controls and expires old snapshots.
//
// Undo consumes the snapshot with an atomic take, so two admins pressing
// Undo at once produce exactly one repost. The repost happens before the
// notice is removed; if the repost fails the snapshot is put back and the
// notice offers Undo again.
//
// A press that finds no snapshot marks the notice expired, then looks again:
// a concurrent press may have put a snapshot back after a failed repost, and
// the notice must not claim expiry while a restore is still possible.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::moderation_models::{ArtifactKind, Conversation, Snapshot};
use super::notice;
use super::permission_gate::PermissionGate;
use super::platform::{bounded, ChatPlatform, Control, PlatformError, RepostContent};
use super::snapshot_store::{SnapshotStore, StoreError};
use super::takedown::SupportPolicy;

// ============================================================================
// CALLBACKS
// ============================================================================

/// A decoded control payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Undo { message_id: u64 },
    Delete { message_id: u64 },
}

/// Decode `undo,<id>` / `delete,<id>`. Anything else is `None`.
pub fn parse_callback(data: &str) -> Option<CallbackAction> {
    let (action, id) = data.split_once(',')?;
    let message_id = id.trim().parse::<u64>().ok()?;
    match action.trim() {
        "undo" => Some(CallbackAction::Undo { message_id }),
        "delete" => Some(CallbackAction::Delete { message_id }),
        _ => None,
    }
}

/// A control press as delivered by the platform.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub conversation: Conversation,
    pub actor_id: u64,
    /// The bot message carrying the pressed control.
    pub source_message_id: u64,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// Malformed payload or the actor is not allowed to press it.
    Ignored,
    Restored { repost_id: u64 },
    /// The snapshot was gone or expired; the notice now says so.
    Expired,
    Deleted,
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Snapshot store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Failed to repost restored message: {0}")]
    RepostFailed(PlatformError),
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct RestoreReaper<S: SnapshotStore> {
    store: Arc<S>,
    platform: Arc<dyn ChatPlatform>,
    gate: Arc<PermissionGate>,
    platform_timeout: Duration,
    support: SupportPolicy,
}

impl<S: SnapshotStore + 'static> RestoreReaper<S> {
    pub fn new(
        store: Arc<S>,
        platform: Arc<dyn ChatPlatform>,
        gate: Arc<PermissionGate>,
        platform_timeout: Duration,
        support: SupportPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            gate,
            platform_timeout,
            support,
        }
    }

    /// Dispatch a control press. Only chat admins may press controls in
    /// groups; anyone else is ignored without a reply.
    pub async fn handle_callback(
        &self,
        event: &CallbackEvent,
    ) -> Result<CallbackOutcome, RestoreError> {
        let Some(action) = parse_callback(&event.data) else {
            tracing::debug!(data = %event.data, "Ignoring malformed callback payload");
            return Ok(CallbackOutcome::Ignored);
        };

        if !self
            .gate
            .is_moderator(&event.conversation, event.actor_id)
            .await
        {
            tracing::debug!(
                chat_id = event.conversation.id,
                actor_id = event.actor_id,
                "Ignoring control press from non-admin"
            );
            return Ok(CallbackOutcome::Ignored);
        }

        match action {
            CallbackAction::Undo { message_id } => {
                self.undo(event.conversation.id, event.source_message_id, message_id, Utc::now())
                    .await
            }
            CallbackAction::Delete { .. } => {
                self.delete_permanently(event.conversation.id, event.source_message_id)
                    .await;
                Ok(CallbackOutcome::Deleted)
            }
        }
    }

    /// Restore the message removed as `message_id`, replacing the notice
    /// `notice_id` with a repost of the original content.
    pub async fn undo(
        &self,
        chat_id: u64,
        notice_id: u64,
        message_id: u64,
        now: DateTime<Utc>,
    ) -> Result<CallbackOutcome, RestoreError> {
        let Some(snapshot) = self.store.take(chat_id, message_id, now).await? else {
            self.mark_expired(chat_id, notice_id, message_id, now).await;
            return Ok(CallbackOutcome::Expired);
        };

        let content = repost_content(&snapshot);
        let controls = self
            .support
            .decorate(vec![Control::DeletePermanently { message_id }]);

        let repost_id = match bounded(
            self.platform_timeout,
            self.platform.repost(chat_id, &content, &controls),
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(chat_id, message_id, "Repost failed, keeping snapshot: {}", e);
                match self.store.put(&snapshot).await {
                    Ok(()) => self.offer_retry(chat_id, notice_id, message_id).await,
                    Err(put_err) => {
                        tracing::error!(chat_id, message_id, "Failed to restore snapshot: {}", put_err)
                    }
                }
                return Err(RestoreError::RepostFailed(e));
            }
        };

        if let Err(e) = bounded(
            self.platform_timeout,
            self.platform.delete_message(chat_id, notice_id),
        )
        .await
        {
            tracing::debug!(chat_id, notice_id, "Could not remove takedown notice: {}", e);
        }

        tracing::info!(chat_id, message_id, repost_id, "Restored message");
        Ok(CallbackOutcome::Restored { repost_id })
    }

    async fn mark_expired(&self, chat_id: u64, notice_id: u64, message_id: u64, now: DateTime<Utc>) {
        match bounded(
            self.platform_timeout,
            self.platform.edit_message(chat_id, notice_id, notice::EXPIRED, &[]),
        )
        .await
        {
            Ok(()) | Err(PlatformError::NotFound) | Err(PlatformError::NotPermitted) => {}
            Err(e) => tracing::warn!(chat_id, notice_id, "Failed to mark notice expired: {}", e),
        }

        match self.store.get(chat_id, message_id).await {
            Ok(Some(snapshot)) if !snapshot.is_expired(now) => {
                tracing::debug!(chat_id, message_id, "Snapshot came back during expiry, re-offering Undo");
                self.offer_retry(chat_id, notice_id, message_id).await;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(chat_id, message_id, "Snapshot re-check failed: {}", e),
        }
    }

    /// Put the Undo control back on the notice after a failed restore.
    async fn offer_retry(&self, chat_id: u64, notice_id: u64, message_id: u64) {
        let controls = self.support.decorate(vec![Control::Undo { message_id }]);
        if let Err(e) = bounded(
            self.platform_timeout,
            self.platform
                .edit_message(chat_id, notice_id, notice::RESTORE_FAILED, &controls),
        )
        .await
        {
            tracing::warn!(chat_id, notice_id, "Failed to re-offer Undo: {}", e);
        }
    }

    /// Remove a restored message for good. Already-gone messages are fine.
    pub async fn delete_permanently(&self, chat_id: u64, message_id: u64) {
        match bounded(
            self.platform_timeout,
            self.platform.delete_message(chat_id, message_id),
        )
        .await
        {
            Ok(()) | Err(PlatformError::NotFound) => {}
            Err(e) => tracing::warn!(chat_id, message_id, "Permanent delete failed: {}", e),
        }
    }

    /// Drop every snapshot that expired before `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let removed = self.store.purge_expired(now).await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired snapshots");
        }
        Ok(removed)
    }

    /// Run `sweep` every `interval` until the task is dropped.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        // `interval` panics on a zero period.
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(Utc::now()).await {
                tracing::error!("Snapshot sweep failed: {}", e);
            }
        }
    }
}

fn repost_content(snapshot: &Snapshot) -> RepostContent {
    let text = snapshot.original_text.as_deref();
    match (&snapshot.artifact_ref, snapshot.artifact_kind) {
        (Some(file_ref), Some(kind)) if kind != ArtifactKind::Url => RepostContent::Media {
            kind,
            file_ref: file_ref.clone(),
            preserved: snapshot.preserved.clone(),
            caption: notice::restored_caption(&snapshot.sender_name, text),
        },
        _ => RepostContent::Text(notice::restored_caption(&snapshot.sender_name, text)),
    }
}
