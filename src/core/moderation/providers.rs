// Scanning provider ports.
//
// The core defines WHAT a scanner must answer; the infra layer wraps the
// actual vendor APIs. Two families exist: malware scanners (files and link
// reputation) and content-safety scanners (images).

use async_trait::async_trait;
use thiserror::Error;

use super::likelihood::{Likelihood, NativeScore, SafetyCategory};
use super::moderation_models::ArtifactSource;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not decode provider response: {0}")]
    Decode(String),

    #[error("Provider did not finish the scan (status: {0})")]
    Incomplete(String),

    #[error("Provider call timed out")]
    Timeout,

    #[error("Input not supported by this provider: {0}")]
    Unsupported(&'static str),
}

/// What a provider is asked to look at. Borrowed so bytes are read once per
/// call and never copied between tiers.
#[derive(Debug, Clone, Copy)]
pub enum ScanInput<'a> {
    Bytes {
        data: &'a [u8],
        media_type: Option<&'a str>,
    },
    Url(&'a str),
}

impl<'a> ScanInput<'a> {
    pub fn from_source(source: &'a ArtifactSource, media_type: Option<&'a str>) -> Self {
        match source {
            ArtifactSource::Inline(data) => ScanInput::Bytes { data, media_type },
            ArtifactSource::Remote(url) => ScanInput::Url(url),
        }
    }
}

// ============================================================================
// MALWARE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatLevel {
    Clean,
    /// The provider raised a warning ("may contain").
    Suspicious,
    /// The provider confirmed a match ("contains").
    Infected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MalwareReport {
    pub threat: ThreatLevel,
    /// Signature or threat-type names reported by the provider.
    pub matches: Vec<String>,
}

impl MalwareReport {
    pub fn clean() -> Self {
        Self {
            threat: ThreatLevel::Clean,
            matches: Vec::new(),
        }
    }

    pub fn is_safe(&self) -> bool {
        self.threat == ThreatLevel::Clean
    }
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    /// Short identifier used in logs and verdicts.
    fn name(&self) -> &str;

    async fn scan(&self, input: ScanInput<'_>) -> Result<MalwareReport, ScanError>;
}

// ============================================================================
// CONTENT SAFETY
// ============================================================================

/// Raw per-category scores from one content-safety call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSafetyReport {
    pub scores: Vec<(SafetyCategory, NativeScore)>,
}

impl ContentSafetyReport {
    pub fn normalized(&self) -> Vec<(SafetyCategory, Likelihood)> {
        self.scores
            .iter()
            .map(|(category, score)| (*category, score.normalize()))
            .collect()
    }
}

#[async_trait]
pub trait ContentSafetyScanner: Send + Sync {
    /// Must match the provider name used in the quota ledger.
    fn name(&self) -> &str;

    async fn scan(&self, input: ScanInput<'_>) -> Result<ContentSafetyReport, ScanError>;
}
