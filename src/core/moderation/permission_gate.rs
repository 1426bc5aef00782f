// Permission gate - decides whether moderation actions may touch a chat.
//
// Always asks the platform at the point of action. Rights can be revoked
// between receiving a message and acting on it, so nothing is cached.

use std::sync::Arc;
use std::time::Duration;

use super::moderation_models::{Conversation, ConversationKind};
use super::platform::{bounded, ChatPlatform};

pub struct PermissionGate {
    platform: Arc<dyn ChatPlatform>,
    timeout: Duration,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn ChatPlatform>, timeout: Duration) -> Self {
        Self { platform, timeout }
    }

    /// True for private chats and for groups where the bot can delete
    /// messages. A failed check counts as "no": moderation is aborted
    /// rather than attempted blind.
    pub async fn can_moderate(&self, conversation: &Conversation) -> bool {
        match conversation.kind {
            ConversationKind::Private => true,
            ConversationKind::Group => {
                match bounded(self.timeout, self.platform.bot_can_moderate(conversation.id)).await
                {
                    Ok(allowed) => allowed,
                    Err(e) => {
                        tracing::warn!(
                            chat_id = conversation.id,
                            "Permission check failed, treating as not permitted: {}",
                            e
                        );
                        false
                    }
                }
            }
        }
    }

    /// Whether `user_id` may trigger Undo/Delete. Private chats have no one
    /// to gate against.
    pub async fn is_moderator(&self, conversation: &Conversation, user_id: u64) -> bool {
        match conversation.kind {
            ConversationKind::Private => true,
            ConversationKind::Group => {
                match bounded(self.timeout, self.platform.is_admin(conversation.id, user_id)).await
                {
                    Ok(is_admin) => is_admin,
                    Err(e) => {
                        tracing::debug!(
                            chat_id = conversation.id,
                            user_id,
                            "Admin lookup failed: {}",
                            e
                        );
                        false
                    }
                }
            }
        }
    }
}
