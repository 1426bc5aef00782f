// Chat platform port - the narrow set of platform operations moderation needs.
//
// Every call can fail with "not found" or "not permitted"; callers treat
// those as recoverable. `bounded` wraps a call with a timeout so a slow
// platform never stalls a handling task.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::moderation_models::{ArtifactKind, PreservedMedia};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Message or chat not found")]
    NotFound,

    #[error("Action not permitted")]
    NotPermitted,

    #[error("Platform call timed out")]
    Timeout,

    #[error("Platform error: {0}")]
    Other(String),
}

/// Inline controls attached to bot messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Restore the removed message with the given id.
    Undo { message_id: u64 },
    /// Remove a restored message for good.
    DeletePermanently { message_id: u64 },
    /// Cosmetic link to support the project.
    Support,
}

impl Control {
    pub fn label(&self) -> &'static str {
        match self {
            Control::Undo { .. } => "Undo",
            Control::DeletePermanently { .. } => "Delete (cannot be undone)",
            Control::Support => "Support Group Defender",
        }
    }

    /// Callback payload, or `None` for controls that are plain links.
    pub fn callback_data(&self) -> Option<String> {
        match self {
            Control::Undo { message_id } => Some(format!("undo,{message_id}")),
            Control::DeletePermanently { message_id } => Some(format!("delete,{message_id}")),
            Control::Support => None,
        }
    }
}

/// What to post back when a snapshot is restored.
#[derive(Debug, Clone, PartialEq)]
pub enum RepostContent {
    Media {
        kind: ArtifactKind,
        file_ref: String,
        /// Bytes copied before the takedown. Preferred over `file_ref`
        /// when present.
        preserved: Option<PreservedMedia>,
        caption: String,
    },
    Text(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn delete_message(&self, chat_id: u64, message_id: u64) -> Result<(), PlatformError>;

    /// Post a message with controls. Returns the new message id.
    async fn send_message(
        &self,
        chat_id: u64,
        text: &str,
        controls: &[Control],
    ) -> Result<u64, PlatformError>;

    /// Reply to a message without controls.
    async fn reply(&self, chat_id: u64, message_id: u64, text: &str) -> Result<(), PlatformError>;

    /// Replace the text of a bot message. Its controls become `controls`.
    async fn edit_message(
        &self,
        chat_id: u64,
        message_id: u64,
        text: &str,
        controls: &[Control],
    ) -> Result<(), PlatformError>;

    /// Download the media behind `file_ref` while it still exists. Fails
    /// rather than returning more than `max_bytes`.
    async fn fetch_media(
        &self,
        file_ref: &str,
        max_bytes: u64,
    ) -> Result<PreservedMedia, PlatformError>;

    /// Repost previously removed content. Returns the new message id.
    async fn repost(
        &self,
        chat_id: u64,
        content: &RepostContent,
        controls: &[Control],
    ) -> Result<u64, PlatformError>;

    /// Whether the bot itself may delete messages in the chat.
    async fn bot_can_moderate(&self, chat_id: u64) -> Result<bool, PlatformError>;

    /// Whether `user_id` is an admin or owner of the chat.
    async fn is_admin(&self, chat_id: u64, user_id: u64) -> Result<bool, PlatformError>;
}

/// Run a platform call under a timeout, mapping expiry to `PlatformError::Timeout`.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, PlatformError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(PlatformError::Timeout),
    }
}
