// Moderation domain models - artifacts, conversations, snapshots and policy.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts messages into these before calling the core.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::likelihood::Likelihood;

// ============================================================================
// ARTIFACTS
// ============================================================================

/// The storage tag for an artifact. Snapshots persist this so a restore
/// knows which kind of repost to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A generic document/file attachment.
    File,
    Photo,
    Audio,
    Video,
    Url,
}

impl ArtifactKind {
    /// Stable string used in storage and notices.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::File => "file",
            ArtifactKind::Photo => "photo",
            ArtifactKind::Audio => "audio",
            ArtifactKind::Video => "video",
            ArtifactKind::Url => "url",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" | "document" => Some(ArtifactKind::File),
            "photo" => Some(ArtifactKind::Photo),
            "audio" => Some(ArtifactKind::Audio),
            "video" => Some(ArtifactKind::Video),
            "url" => Some(ArtifactKind::Url),
            _ => None,
        }
    }

    /// Human-readable noun used in notices ("I deleted a document ...").
    pub fn display_name(&self) -> &'static str {
        match self {
            ArtifactKind::File => "document",
            ArtifactKind::Photo => "photo",
            ArtifactKind::Audio => "audio file",
            ArtifactKind::Video => "video",
            ArtifactKind::Url => "link",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the artifact's bytes come from. Exactly one of the two is ever
/// present, which the enum enforces.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactSource {
    /// Bytes already in memory.
    Inline(Vec<u8>),
    /// A location the scanning provider can fetch itself.
    Remote(String),
}

/// A media attachment (document, photo, audio or video).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    /// Platform-side reference used to repost the file after an Undo.
    pub file_ref: String,
    pub source: ArtifactSource,
    pub size_bytes: u64,
    /// Declared MIME type, if the platform supplied one.
    pub media_type: Option<String>,
}

impl MediaFile {
    pub fn declares_image(&self) -> bool {
        self.media_type
            .as_deref()
            .map(|m| m.starts_with("image"))
            .unwrap_or(false)
    }
}

/// A link found in message text.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub url: String,
    /// MIME type guessed from the URL path, if any.
    pub media_type: Option<String>,
    /// Content length if it is known up front.
    pub size_bytes: Option<u64>,
}

impl Link {
    pub fn points_to_media(&self) -> bool {
        self.media_type.is_some()
    }

    pub fn points_to_image(&self) -> bool {
        self.media_type
            .as_deref()
            .map(|m| m.starts_with("image"))
            .unwrap_or(false)
    }
}

/// Something submitted for safety evaluation. The variant carries the
/// kind-specific payload so every consumer has to handle every kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    File(MediaFile),
    Photo(MediaFile),
    Audio(MediaFile),
    Video(MediaFile),
    Url(Link),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::File(_) => ArtifactKind::File,
            Artifact::Photo(_) => ArtifactKind::Photo,
            Artifact::Audio(_) => ArtifactKind::Audio,
            Artifact::Video(_) => ArtifactKind::Video,
            Artifact::Url(_) => ArtifactKind::Url,
        }
    }

    /// The platform reference to repost from, for media artifacts.
    pub fn media(&self) -> Option<&MediaFile> {
        match self {
            Artifact::File(m) | Artifact::Photo(m) | Artifact::Audio(m) | Artifact::Video(m) => {
                Some(m)
            }
            Artifact::Url(_) => None,
        }
    }

    pub fn file_ref(&self) -> Option<&str> {
        match self {
            Artifact::File(m) | Artifact::Photo(m) | Artifact::Audio(m) | Artifact::Video(m) => {
                Some(&m.file_ref)
            }
            Artifact::Url(_) => None,
        }
    }

    /// Photos are image-only and skip the malware tier; everything else is
    /// malware scanned first.
    pub fn requires_malware_scan(&self) -> bool {
        match self {
            Artifact::Photo(_) => false,
            Artifact::File(_) | Artifact::Audio(_) | Artifact::Video(_) | Artifact::Url(_) => true,
        }
    }

    /// Whether the artifact is, or declares itself to be, an image.
    pub fn is_image(&self) -> bool {
        match self {
            Artifact::Photo(_) => true,
            Artifact::File(m) | Artifact::Audio(m) | Artifact::Video(m) => m.declares_image(),
            Artifact::Url(link) => link.points_to_image(),
        }
    }

    pub fn size_bytes(&self) -> Option<u64> {
        match self {
            Artifact::File(m) | Artifact::Photo(m) | Artifact::Audio(m) | Artifact::Video(m) => {
                Some(m.size_bytes)
            }
            Artifact::Url(link) => link.size_bytes,
        }
    }
}

// ============================================================================
// CONVERSATIONS & EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationKind {
    /// One-to-one chat with the bot. Nothing is ever deleted here.
    Private,
    /// Group or channel where the bot can moderate.
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversation {
    pub id: u64,
    pub kind: ConversationKind,
}

impl Conversation {
    pub fn private(id: u64) -> Self {
        Self {
            id,
            kind: ConversationKind::Private,
        }
    }

    pub fn group(id: u64) -> Self {
        Self {
            id,
            kind: ConversationKind::Group,
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::Group
    }
}

/// A normalized inbound message carrying one or more artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactEvent {
    pub conversation: Conversation,
    pub message_id: u64,
    pub sender_name: String,
    pub artifacts: Vec<Artifact>,
    /// Text of the message, kept so an Undo can repost it.
    pub raw_text: Option<String>,
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// A copy of removed media, taken before the delete. Platforms that drop a
/// message's attachments along with the message can only repost from this.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PreservedMedia {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for PreservedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreservedMedia")
            .field("file_name", &self.file_name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A takedown record that makes a removal reversible until it expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub chat_id: u64,
    pub message_id: u64,
    pub sender_name: String,
    pub artifact_ref: Option<String>,
    pub artifact_kind: Option<ArtifactKind>,
    pub original_text: Option<String>,
    pub preserved: Option<PreservedMedia>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot of `event` whose removal was triggered by `flagged`.
    pub fn capture(
        event: &ArtifactEvent,
        flagged: &Artifact,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        let expires_at = ChronoDuration::from_std(lifetime)
            .ok()
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            chat_id: event.conversation.id,
            message_id: event.message_id,
            sender_name: event.sender_name.clone(),
            artifact_ref: flagged.file_ref().map(str::to_string),
            artifact_kind: Some(flagged.kind()),
            original_text: event.raw_text.clone(),
            preserved: None,
            created_at: now,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// ============================================================================
// POLICY
// ============================================================================

/// Monthly budget and threshold for one content-safety provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBudget {
    pub provider: String,
    /// A provider may be selected while its counter is `<= monthly_limit`.
    pub monthly_limit: u64,
    /// Scores at or above this normalized likelihood are unsafe.
    pub threshold: Likelihood,
}

/// Moderation policy. Every limit here is a policy parameter supplied by
/// configuration, not a constant of the algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Artifacts above this size are not scanned at all.
    pub max_file_bytes: u64,
    /// Images above this size are never sent to content-safety providers.
    pub content_safety_max_bytes: u64,
    /// How long a takedown can be undone.
    pub snapshot_lifetime: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
    /// Bound on each scanning provider call.
    pub provider_timeout: Duration,
    /// Bound on each chat platform call.
    pub platform_timeout: Duration,
    /// Content-safety providers in preference order.
    pub content_safety: Vec<ProviderBudget>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 20 * 1024 * 1024,          // platform download ceiling
            content_safety_max_bytes: 4 * 1024 * 1024, // vision APIs reject larger images
            snapshot_lifetime: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(24 * 60 * 60),
            provider_timeout: Duration::from_secs(20),
            platform_timeout: Duration::from_secs(20),
            content_safety: vec![
                ProviderBudget {
                    provider: "gcp".to_string(),
                    monthly_limit: 950,
                    threshold: Likelihood::Likely,
                },
                ProviderBudget {
                    provider: "azure".to_string(),
                    monthly_limit: 4950,
                    threshold: Likelihood::Likely,
                },
            ],
        }
    }
}
