// User-facing text for moderation outcomes.
//
// Kept apart from the services so wording changes never touch the
// takedown or restore logic.

use super::moderation_models::{Artifact, ArtifactKind};
use super::providers::ThreatLevel;
use super::scan_orchestrator::{Evaluation, Finding, SkipReason, TierOutcome};

pub const ADMIN_ADVISORY: &str = "Set me as a group admin with permission to delete messages \
     so that I can start checking files and links like this.";

pub const DELETE_REJECTED: &str = "I was not able to delete this unsafe message. \
     Make sure I'm allowed to delete messages in this chat.";

pub const EXPIRED: &str = "This message has expired and can no longer be restored.";

pub const RESTORE_FAILED: &str = "I couldn't restore this message. Press Undo to try again.";

pub const GREETING: &str = "Hello everyone! I am Group Defender. Make me an admin with \
     permission to delete messages so that I can start defending this group.";

fn threat_verb(threat: ThreatLevel) -> &'static str {
    match threat {
        ThreatLevel::Suspicious => "may contain",
        ThreatLevel::Infected | ThreatLevel::Clean => "contains",
    }
}

/// Text of the replacement notice posted after a takedown in a group.
pub fn takedown_notice(artifact: &Artifact, finding: &Finding, sender: &str) -> String {
    match finding {
        Finding::Malware { threat, .. } => match artifact.kind() {
            ArtifactKind::Url => format!(
                "I deleted a message with a link that {} threats (sent by {}).",
                threat_verb(*threat),
                sender
            ),
            kind => format!(
                "I deleted a {} that {} a virus or malware (sent by {}).",
                kind.display_name(),
                threat_verb(*threat),
                sender
            ),
        },
        Finding::ContentSafety {
            category,
            likelihood,
            ..
        } => {
            let subject = match artifact.kind() {
                ArtifactKind::Photo => "a photo",
                ArtifactKind::Url => "a message with a link to a photo",
                _ => "an image file",
            };
            format!(
                "I deleted {} that's {} to contain {} content (sent by {}).",
                subject, likelihood, category, sender
            )
        }
    }
}

/// Inline reply for a private chat describing every tier's result.
pub fn private_verdict(artifact: &Artifact, evaluation: &Evaluation) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Artifact::Url(link) = artifact {
        parts.push(format!("{}\n⬆", link.url));
    }

    match &evaluation.malware {
        TierOutcome::Flagged(Finding::Malware { threat, .. }) => {
            let what = if artifact.kind() == ArtifactKind::Url {
                "threats"
            } else {
                "a virus or malware"
            };
            parts.push(format!(
                "I think it {} {}, don't download or open it.",
                threat_verb(*threat),
                what
            ));
            return parts.join(" ");
        }
        TierOutcome::Passed { .. } => {
            parts.push("I think it doesn't contain threats.".to_string());
        }
        TierOutcome::TooLarge => {
            parts.push(format!(
                "Your {} is too large for me to check for threats.",
                artifact.kind().display_name()
            ));
        }
        TierOutcome::Skipped(reason) => {
            parts.push(format!(
                "I couldn't check it for threats ({}).",
                skip_phrase(reason)
            ));
        }
        TierOutcome::Flagged(_) | TierOutcome::NotApplicable => {}
    }

    let first_tier_ran = !matches!(evaluation.malware, TierOutcome::NotApplicable);
    match &evaluation.content_safety {
        TierOutcome::Flagged(Finding::ContentSafety {
            category,
            likelihood,
            ..
        }) => {
            let lead = if first_tier_ran { "But I think" } else { "I think" };
            parts.push(format!(
                "{} it's {} to contain {} content.",
                lead, likelihood, category
            ));
        }
        TierOutcome::Passed { .. } => {
            let lead = if first_tier_ran { "And I think" } else { "I think" };
            parts.push(format!(
                "{} it doesn't contain any inappropriate content.",
                lead
            ));
        }
        TierOutcome::TooLarge => {
            if first_tier_ran {
                parts.push("But it's too large for me to check for inappropriate content.".into());
            } else {
                parts.push(format!(
                    "Your {} is too large for me to check.",
                    artifact.kind().display_name()
                ));
            }
        }
        TierOutcome::Skipped(reason) => {
            parts.push(format!(
                "Checking for inappropriate content is {}.",
                match reason {
                    SkipReason::QuotaExhausted => "temporarily unavailable",
                    SkipReason::ProviderFailed(_) => "failing right now, try again later",
                    SkipReason::NotConfigured => "not available",
                }
            ));
        }
        TierOutcome::Flagged(_) | TierOutcome::NotApplicable => {}
    }

    parts.join(" ")
}

fn skip_phrase(reason: &SkipReason) -> &'static str {
    match reason {
        SkipReason::QuotaExhausted => "scanning is temporarily unavailable",
        SkipReason::ProviderFailed(_) => "the scanner didn't respond, try again later",
        SkipReason::NotConfigured => "no scanner is available",
    }
}

/// Caption for a restored media message.
pub fn restored_caption(sender: &str, text: Option<&str>) -> String {
    match text {
        Some(text) if !text.trim().is_empty() => format!("{} sent this:\n{}", sender, text),
        _ => format!("{} sent this.", sender),
    }
}
