// Serenity-backed implementation of the moderation chat platform port.
//
// A "chat" is a Discord channel id. Admin checks resolve channel permissions
// from the cache, fetching the member over HTTP when the cache misses.

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

use crate::core::moderation::{
    ChatPlatform, Control, PlatformError, PreservedMedia, RepostContent,
};

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    support_url: Option<String>,
}

impl SerenityPlatform {
    pub fn new(
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        support_url: Option<String>,
    ) -> Self {
        Self {
            http,
            cache,
            support_url,
        }
    }

    fn components(&self, controls: &[Control]) -> Vec<serenity::CreateActionRow> {
        let buttons: Vec<serenity::CreateButton> = controls
            .iter()
            .filter_map(|control| match (control, control.callback_data()) {
                (Control::Support, _) => self
                    .support_url
                    .as_ref()
                    .map(|url| serenity::CreateButton::new_link(url).label(control.label())),
                (Control::Undo { .. }, Some(data)) => Some(
                    serenity::CreateButton::new(data)
                        .label(control.label())
                        .style(serenity::ButtonStyle::Primary),
                ),
                (_, Some(data)) => Some(
                    serenity::CreateButton::new(data)
                        .label(control.label())
                        .style(serenity::ButtonStyle::Danger),
                ),
                (_, None) => None,
            })
            .collect();

        if buttons.is_empty() {
            Vec::new()
        } else {
            vec![serenity::CreateActionRow::Buttons(buttons)]
        }
    }

    async fn permissions(
        &self,
        chat_id: u64,
        user_id: serenity::UserId,
    ) -> Result<Option<serenity::Permissions>, PlatformError> {
        let channel = serenity::ChannelId::new(chat_id)
            .to_channel(&self.http)
            .await
            .map_err(map_error)?;
        let Some(channel) = channel.guild() else {
            return Ok(None);
        };

        let cached = self
            .cache
            .member(channel.guild_id, user_id)
            .map(|m| serenity::Member::clone(&m));
        let member = match cached {
            Some(member) => member,
            None => channel
                .guild_id
                .member(&self.http, user_id)
                .await
                .map_err(map_error)?,
        };

        // Cache guards are not Send, so resolve them before any await.
        let permissions = self
            .cache
            .guild(channel.guild_id)
            .map(|guild| guild.user_permissions_in(&channel, &member));
        match permissions {
            Some(permissions) => Ok(Some(permissions)),
            None => Err(PlatformError::Other("guild not in cache".to_string())),
        }
    }
}

fn map_error(e: serenity::Error) -> PlatformError {
    if let serenity::Error::Http(http) = &e {
        match http.status_code().map(|status| status.as_u16()) {
            Some(404) => return PlatformError::NotFound,
            Some(403) => return PlatformError::NotPermitted,
            _ => {}
        }
    }
    PlatformError::Other(e.to_string())
}

/// Where a reposted attachment comes from. Discord purges the CDN copy of a
/// deleted message, so preserved bytes win whenever they exist.
#[derive(Debug, PartialEq)]
enum MediaSource<'a> {
    Preserved(&'a PreservedMedia),
    Remote(&'a str),
}

fn media_source<'a>(preserved: Option<&'a PreservedMedia>, file_ref: &'a str) -> MediaSource<'a> {
    match preserved {
        Some(media) => MediaSource::Preserved(media),
        None => MediaSource::Remote(file_ref),
    }
}

fn preserved_attachment(media: &PreservedMedia) -> serenity::CreateAttachment {
    serenity::CreateAttachment::bytes(media.data.clone(), media.file_name.clone())
}

fn can_delete(permissions: serenity::Permissions) -> bool {
    permissions.administrator() || permissions.manage_messages()
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn delete_message(&self, chat_id: u64, message_id: u64) -> Result<(), PlatformError> {
        serenity::ChannelId::new(chat_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(map_error)
    }

    async fn send_message(
        &self,
        chat_id: u64,
        text: &str,
        controls: &[Control],
    ) -> Result<u64, PlatformError> {
        let message = serenity::CreateMessage::new()
            .content(text)
            .components(self.components(controls));
        let sent = serenity::ChannelId::new(chat_id)
            .send_message(&self.http, message)
            .await
            .map_err(map_error)?;
        Ok(sent.id.get())
    }

    async fn reply(&self, chat_id: u64, message_id: u64, text: &str) -> Result<(), PlatformError> {
        let channel = serenity::ChannelId::new(chat_id);
        let message = serenity::CreateMessage::new()
            .content(text)
            .reference_message((channel, serenity::MessageId::new(message_id)));
        channel
            .send_message(&self.http, message)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: u64,
        message_id: u64,
        text: &str,
        controls: &[Control],
    ) -> Result<(), PlatformError> {
        serenity::ChannelId::new(chat_id)
            .edit_message(
                &self.http,
                serenity::MessageId::new(message_id),
                serenity::EditMessage::new()
                    .content(text)
                    .components(self.components(controls)),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn fetch_media(
        &self,
        file_ref: &str,
        max_bytes: u64,
    ) -> Result<PreservedMedia, PlatformError> {
        let attachment = serenity::CreateAttachment::url(&self.http, file_ref)
            .await
            .map_err(map_error)?;
        if attachment.data.len() as u64 > max_bytes {
            return Err(PlatformError::Other(format!(
                "media is {} bytes, limit is {}",
                attachment.data.len(),
                max_bytes
            )));
        }
        Ok(PreservedMedia {
            file_name: attachment.filename,
            data: attachment.data,
        })
    }

    async fn repost(
        &self,
        chat_id: u64,
        content: &RepostContent,
        controls: &[Control],
    ) -> Result<u64, PlatformError> {
        let message = match content {
            RepostContent::Media {
                file_ref,
                preserved,
                caption,
                ..
            } => {
                let attachment = match media_source(preserved.as_ref(), file_ref) {
                    MediaSource::Preserved(media) => preserved_attachment(media),
                    MediaSource::Remote(url) => serenity::CreateAttachment::url(&self.http, url)
                        .await
                        .map_err(map_error)?,
                };
                serenity::CreateMessage::new()
                    .content(caption)
                    .add_file(attachment)
            }
            RepostContent::Text(text) => serenity::CreateMessage::new().content(text),
        };

        let sent = serenity::ChannelId::new(chat_id)
            .send_message(&self.http, message.components(self.components(controls)))
            .await
            .map_err(map_error)?;
        Ok(sent.id.get())
    }

    async fn bot_can_moderate(&self, chat_id: u64) -> Result<bool, PlatformError> {
        let bot_id = self.cache.current_user().id;
        Ok(self
            .permissions(chat_id, bot_id)
            .await?
            .map(can_delete)
            .unwrap_or(false))
    }

    async fn is_admin(&self, chat_id: u64, user_id: u64) -> Result<bool, PlatformError> {
        Ok(self
            .permissions(chat_id, serenity::UserId::new(user_id))
            .await?
            .map(can_delete)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderators_need_manage_messages_or_administrator() {
        assert!(can_delete(serenity::Permissions::MANAGE_MESSAGES));
        assert!(can_delete(serenity::Permissions::ADMINISTRATOR));
        assert!(!can_delete(
            serenity::Permissions::SEND_MESSAGES | serenity::Permissions::ATTACH_FILES
        ));
    }

    #[test]
    fn repost_prefers_preserved_bytes_over_the_cdn_url() {
        let url = "https://cdn.discordapp.com/attachments/1/2/setup.exe";
        let media = PreservedMedia {
            file_name: "setup.exe".into(),
            data: b"MZ\x90\x00".to_vec(),
        };

        assert_eq!(media_source(Some(&media), url), MediaSource::Preserved(&media));
        assert_eq!(media_source(None, url), MediaSource::Remote(url));

        let attachment = preserved_attachment(&media);
        assert_eq!(attachment.filename, "setup.exe");
        assert_eq!(attachment.data, media.data);
    }
}
