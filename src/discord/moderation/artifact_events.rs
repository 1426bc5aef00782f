// Turns Discord messages into platform-agnostic artifact events.
//
// Attachments become media artifacts pointing at their CDN URL; links in the
// text become URL artifacts with a media type guessed from the path.

use poise::serenity_prelude as serenity;
use regex::Regex;
use reqwest::Url;
use std::sync::OnceLock;

use crate::core::moderation::{
    Artifact, ArtifactEvent, ArtifactSource, Conversation, Link, MediaFile,
};

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").expect("link pattern is valid")
    })
}

/// Links found in `text`, with `http://` added where the scheme is missing.
pub fn extract_links(text: &str) -> Vec<Link> {
    let mut links: Vec<Link> = Vec::new();
    for found in link_pattern().find_iter(text) {
        let raw = found
            .as_str()
            .trim_end_matches(|c: char| ".,)!?;:'\"".contains(c));
        let url = if raw.to_ascii_lowercase().starts_with("http") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };
        if links.iter().any(|l| l.url == url) {
            continue;
        }
        links.push(Link {
            media_type: guess_media_type(&url),
            url,
            size_bytes: None,
        });
    }
    links
}

/// Media type guessed from the URL path. Web pages are not media.
fn guess_media_type(url: &str) -> Option<String> {
    let path = Url::parse(url).ok()?.path().to_string();
    let guess = mime_guess::from_path(&path).first()?;
    if guess.type_() == mime_guess::mime::TEXT {
        return None;
    }
    Some(guess.essence_str().to_string())
}

/// Classify one attachment by its declared (or guessed) media type.
pub fn attachment_artifact(
    filename: &str,
    url: &str,
    size_bytes: u64,
    content_type: Option<&str>,
) -> Artifact {
    let media_type = content_type
        .map(str::to_string)
        .or_else(|| {
            mime_guess::from_path(filename)
                .first()
                .map(|m| m.essence_str().to_string())
        });

    let media = MediaFile {
        file_ref: url.to_string(),
        source: ArtifactSource::Remote(url.to_string()),
        size_bytes,
        media_type: media_type.clone(),
    };

    match media_type.as_deref().and_then(|m| m.split('/').next()) {
        Some("image") => Artifact::Photo(media),
        Some("audio") => Artifact::Audio(media),
        Some("video") => Artifact::Video(media),
        _ => Artifact::File(media),
    }
}

/// Build the event for `msg`, or `None` if it carries nothing to check.
pub fn artifact_event(msg: &serenity::Message) -> Option<ArtifactEvent> {
    let mut artifacts: Vec<Artifact> = msg
        .attachments
        .iter()
        .map(|a| {
            attachment_artifact(&a.filename, &a.url, u64::from(a.size), a.content_type.as_deref())
        })
        .collect();
    artifacts.extend(extract_links(&msg.content).into_iter().map(Artifact::Url));

    if artifacts.is_empty() {
        return None;
    }

    let chat_id = msg.channel_id.get();
    let conversation = if msg.guild_id.is_some() {
        Conversation::group(chat_id)
    } else {
        Conversation::private(chat_id)
    };
    let raw_text = Some(msg.content.clone()).filter(|t| !t.trim().is_empty());

    Some(ArtifactEvent {
        conversation,
        message_id: msg.id.get(),
        sender_name: msg.author.name.clone(),
        artifacts,
        raw_text,
    })
}
