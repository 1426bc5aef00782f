// Scan orchestrator - runs the malware and content-safety tiers for one artifact.
//
// Evaluation is strictly linear:
//   NotStarted -> MalwareChecked -> (ShortCircuitUnsafe | ContentSafetyChecked) -> Done
//
// There are no retries inside an evaluation. A provider error or timeout
// degrades that tier to "skipped" and the evaluation carries on, so a slow
// vendor can never hold a message handler hostage.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::likelihood::{most_severe, Likelihood, SafetyCategory};
use super::moderation_models::{Artifact, ArtifactKind, ModerationConfig, ProviderBudget};
use super::providers::{
    ContentSafetyReport, ContentSafetyScanner, MalwareReport, MalwareScanner, ScanError,
    ScanInput, ThreatLevel,
};
use super::quota_ledger::{QuotaLedger, QuotaStore};

// ============================================================================
// RESULTS
// ============================================================================

/// Why a tier did not produce a verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Every provider for the tier has used its monthly budget.
    QuotaExhausted,
    /// The provider failed or timed out.
    ProviderFailed(String),
    /// No provider is configured for the tier.
    NotConfigured,
}

/// What made an artifact unsafe.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    Malware {
        provider: String,
        threat: ThreatLevel,
        matches: Vec<String>,
    },
    ContentSafety {
        provider: String,
        category: SafetyCategory,
        likelihood: Likelihood,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    /// The tier does not apply to this artifact (or was short-circuited).
    NotApplicable,
    Passed {
        provider: String,
    },
    Flagged(Finding),
    /// The artifact exceeds the tier's byte ceiling and was not submitted.
    TooLarge,
    Skipped(SkipReason),
}

impl TierOutcome {
    fn finding(&self) -> Option<&Finding> {
        match self {
            TierOutcome::Flagged(finding) => Some(finding),
            _ => None,
        }
    }
}

/// Overall safety, kept as more than a boolean so "too large" and "could
/// not check" are never mistaken for safe or unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    Safe,
    Unsafe,
    TooLarge,
    Unchecked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub kind: ArtifactKind,
    pub malware: TierOutcome,
    pub content_safety: TierOutcome,
}

impl Evaluation {
    pub fn finding(&self) -> Option<&Finding> {
        self.malware
            .finding()
            .or_else(|| self.content_safety.finding())
    }

    pub fn safety(&self) -> Safety {
        let tiers = [&self.malware, &self.content_safety];
        if tiers.iter().any(|t| matches!(t, TierOutcome::Flagged(_))) {
            Safety::Unsafe
        } else if tiers.iter().any(|t| matches!(t, TierOutcome::TooLarge)) {
            Safety::TooLarge
        } else if tiers.iter().any(|t| matches!(t, TierOutcome::Skipped(_)))
            || tiers.iter().all(|t| matches!(t, TierOutcome::NotApplicable))
        {
            Safety::Unchecked
        } else {
            Safety::Safe
        }
    }

    pub fn is_unsafe(&self) -> bool {
        self.safety() == Safety::Unsafe
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct ScanOrchestrator<S: QuotaStore> {
    ledger: Arc<QuotaLedger<S>>,
    config: ModerationConfig,
    file_scanner: Option<Arc<dyn MalwareScanner>>,
    link_scanner: Option<Arc<dyn MalwareScanner>>,
    content_scanners: Vec<Arc<dyn ContentSafetyScanner>>,
}

impl<S: QuotaStore> ScanOrchestrator<S> {
    pub fn new(ledger: Arc<QuotaLedger<S>>, config: ModerationConfig) -> Self {
        Self {
            ledger,
            config,
            file_scanner: None,
            link_scanner: None,
            content_scanners: Vec::new(),
        }
    }

    /// Scanner for file contents (by bytes or by URL).
    pub fn with_file_scanner(mut self, scanner: Arc<dyn MalwareScanner>) -> Self {
        self.file_scanner = Some(scanner);
        self
    }

    /// Reputation scanner for links.
    pub fn with_link_scanner(mut self, scanner: Arc<dyn MalwareScanner>) -> Self {
        self.link_scanner = Some(scanner);
        self
    }

    /// Register a content-safety backend. Its name must match a budget in
    /// the config for it to ever be selected.
    pub fn with_content_scanner(mut self, scanner: Arc<dyn ContentSafetyScanner>) -> Self {
        self.content_scanners.push(scanner);
        self
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger<S>> {
        &self.ledger
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Evaluate one artifact. Never fails: every provider problem is
    /// folded into the returned tiers.
    pub async fn evaluate(&self, artifact: &Artifact) -> Evaluation {
        let kind = artifact.kind();

        let malware = if artifact.requires_malware_scan() {
            self.check_malware(artifact).await
        } else {
            TierOutcome::NotApplicable
        };

        // A confirmed threat preempts content-safety to avoid a wasted paid call.
        if matches!(malware, TierOutcome::Flagged(_)) {
            return Evaluation {
                kind,
                malware,
                content_safety: TierOutcome::NotApplicable,
            };
        }

        let content_safety = if artifact.is_image() {
            self.check_content_safety(artifact).await
        } else {
            TierOutcome::NotApplicable
        };

        Evaluation {
            kind,
            malware,
            content_safety,
        }
    }

    // ------------------------------------------------------------------------
    // Malware tier
    // ------------------------------------------------------------------------

    async fn check_malware(&self, artifact: &Artifact) -> TierOutcome {
        if artifact
            .size_bytes()
            .is_some_and(|size| size > self.config.max_file_bytes)
        {
            return TierOutcome::TooLarge;
        }

        // Collect (scanner, input) pairs in the order they should run.
        let mut steps: Vec<(&Arc<dyn MalwareScanner>, ScanInput<'_>)> = Vec::new();
        match artifact {
            Artifact::File(media)
            | Artifact::Photo(media)
            | Artifact::Audio(media)
            | Artifact::Video(media) => {
                if let Some(scanner) = &self.file_scanner {
                    steps.push((
                        scanner,
                        ScanInput::from_source(&media.source, media.media_type.as_deref()),
                    ));
                }
            }
            Artifact::Url(link) => {
                if let Some(scanner) = &self.link_scanner {
                    steps.push((scanner, ScanInput::Url(&link.url)));
                }
                if link.points_to_media() {
                    if let Some(scanner) = &self.file_scanner {
                        steps.push((scanner, ScanInput::Url(&link.url)));
                    }
                }
            }
        }

        if steps.is_empty() {
            return TierOutcome::Skipped(SkipReason::NotConfigured);
        }

        let mut outcome = TierOutcome::NotApplicable;
        for (scanner, input) in steps {
            let result = with_timeout(self.config.provider_timeout, scanner.scan(input)).await;
            match result {
                Ok(report) if !report.is_safe() => {
                    tracing::info!(
                        provider = scanner.name(),
                        kind = %artifact.kind(),
                        matches = ?report.matches,
                        "Malware scan flagged artifact"
                    );
                    return TierOutcome::Flagged(malware_finding(scanner.name(), report));
                }
                Ok(_) => {
                    if !matches!(outcome, TierOutcome::Skipped(_)) {
                        outcome = TierOutcome::Passed {
                            provider: scanner.name().to_string(),
                        };
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        provider = scanner.name(),
                        kind = %artifact.kind(),
                        "Malware scan skipped: {}",
                        e
                    );
                    outcome = TierOutcome::Skipped(SkipReason::ProviderFailed(e.to_string()));
                }
            }
        }
        outcome
    }

    // ------------------------------------------------------------------------
    // Content-safety tier
    // ------------------------------------------------------------------------

    async fn check_content_safety(&self, artifact: &Artifact) -> TierOutcome {
        if artifact
            .size_bytes()
            .is_some_and(|size| size > self.config.content_safety_max_bytes)
        {
            return TierOutcome::TooLarge;
        }

        let Some(input) = content_input(artifact) else {
            return TierOutcome::NotApplicable;
        };

        // Only budgets with a registered backend may be charged.
        let candidates: Vec<ProviderBudget> = self
            .config
            .content_safety
            .iter()
            .filter(|b| self.content_scanner(&b.provider).is_some())
            .cloned()
            .collect();
        if candidates.is_empty() {
            return TierOutcome::Skipped(SkipReason::NotConfigured);
        }

        let Some(budget) = self.ledger.try_acquire(&candidates, Utc::now()).await else {
            tracing::warn!(
                kind = %artifact.kind(),
                "All content-safety providers are over their monthly limit, skipping"
            );
            return TierOutcome::Skipped(SkipReason::QuotaExhausted);
        };
        let Some(scanner) = self.content_scanner(&budget.provider) else {
            return TierOutcome::Skipped(SkipReason::NotConfigured);
        };

        match with_timeout(self.config.provider_timeout, scanner.scan(input)).await {
            Ok(report) => judge_content(budget, &report),
            Err(e) => {
                tracing::warn!(
                    provider = %budget.provider,
                    kind = %artifact.kind(),
                    "Content-safety scan skipped: {}",
                    e
                );
                TierOutcome::Skipped(SkipReason::ProviderFailed(e.to_string()))
            }
        }
    }

    fn content_scanner(&self, provider: &str) -> Option<&Arc<dyn ContentSafetyScanner>> {
        self.content_scanners.iter().find(|s| s.name() == provider)
    }
}

fn content_input(artifact: &Artifact) -> Option<ScanInput<'_>> {
    match artifact {
        Artifact::File(media)
        | Artifact::Photo(media)
        | Artifact::Audio(media)
        | Artifact::Video(media) => Some(ScanInput::from_source(
            &media.source,
            media.media_type.as_deref(),
        )),
        Artifact::Url(link) if link.points_to_image() => Some(ScanInput::Url(&link.url)),
        Artifact::Url(_) => None,
    }
}

fn malware_finding(provider: &str, report: MalwareReport) -> Finding {
    Finding::Malware {
        provider: provider.to_string(),
        threat: report.threat,
        matches: report.matches,
    }
}

/// Apply a provider's threshold to its normalized scores.
fn judge_content(budget: &ProviderBudget, report: &ContentSafetyReport) -> TierOutcome {
    let normalized = report.normalized();
    match most_severe(&normalized) {
        Some((category, likelihood)) if likelihood >= budget.threshold => {
            tracing::info!(
                provider = %budget.provider,
                category = %category,
                likelihood = %likelihood,
                "Content-safety scan flagged artifact"
            );
            TierOutcome::Flagged(Finding::ContentSafety {
                provider: budget.provider.clone(),
                category,
                likelihood,
            })
        }
        _ => TierOutcome::Passed {
            provider: budget.provider.clone(),
        },
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T, ScanError>>,
) -> Result<T, ScanError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ScanError::Timeout))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::likelihood::NativeScore;
    use crate::core::moderation::moderation_models::{ArtifactSource, Link, MediaFile};
    use crate::core::moderation::quota_ledger::QuotaPeriod;
    use crate::core::moderation::testing::{FakeContentScanner, FakeMalwareScanner, MemoryQuotaStore};

    fn document(size: u64, media_type: &str) -> Artifact {
        Artifact::File(MediaFile {
            file_ref: "doc-1".into(),
            source: ArtifactSource::Inline(vec![0u8; 16]),
            size_bytes: size,
            media_type: Some(media_type.into()),
        })
    }

    fn photo(size: u64) -> Artifact {
        Artifact::Photo(MediaFile {
            file_ref: "photo-1".into(),
            source: ArtifactSource::Remote("https://cdn.example/p.jpg".into()),
            size_bytes: size,
            media_type: Some("image/jpeg".into()),
        })
    }

    struct Harness {
        store: MemoryQuotaStore,
        files: Arc<FakeMalwareScanner>,
        links: Arc<FakeMalwareScanner>,
        gcp: Arc<FakeContentScanner>,
        azure: Arc<FakeContentScanner>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MemoryQuotaStore::default(),
                files: Arc::new(FakeMalwareScanner::clean("attachment_scanner")),
                links: Arc::new(FakeMalwareScanner::clean("safe_browsing")),
                gcp: Arc::new(FakeContentScanner::new(
                    "gcp",
                    vec![(SafetyCategory::Adult, NativeScore::Ordinal(1))],
                )),
                azure: Arc::new(FakeContentScanner::new(
                    "azure",
                    vec![(SafetyCategory::Adult, NativeScore::Probability(0.01))],
                )),
            }
        }

        fn orchestrator(&self) -> ScanOrchestrator<MemoryQuotaStore> {
            self.orchestrator_with_timeout(ModerationConfig::default().provider_timeout)
        }

        fn orchestrator_with_timeout(
            &self,
            provider_timeout: Duration,
        ) -> ScanOrchestrator<MemoryQuotaStore> {
            let config = ModerationConfig {
                provider_timeout,
                content_safety: vec![
                    ProviderBudget {
                        provider: "gcp".into(),
                        monthly_limit: 950,
                        threshold: Likelihood::Likely,
                    },
                    ProviderBudget {
                        provider: "azure".into(),
                        monthly_limit: 4950,
                        threshold: Likelihood::Likely,
                    },
                ],
                ..ModerationConfig::default()
            };
            ScanOrchestrator::new(Arc::new(QuotaLedger::new(self.store.clone())), config)
                .with_file_scanner(self.files.clone())
                .with_link_scanner(self.links.clone())
                .with_content_scanner(self.gcp.clone())
                .with_content_scanner(self.azure.clone())
        }
    }

    #[tokio::test]
    async fn malware_match_short_circuits_content_safety() {
        let h = Harness::new();
        h.files.set_report(MalwareReport {
            threat: ThreatLevel::Infected,
            matches: vec!["EICAR".into()],
        });

        let eval = h.orchestrator().evaluate(&document(100, "image/png")).await;

        assert_eq!(eval.safety(), Safety::Unsafe);
        assert!(matches!(eval.finding(), Some(Finding::Malware { .. })));
        assert_eq!(h.files.calls(), 1);
        assert_eq!(h.gcp.calls(), 0);
        assert_eq!(h.azure.calls(), 0);
    }

    #[tokio::test]
    async fn oversized_photo_is_too_large_and_never_scanned() {
        let h = Harness::new();
        let eval = h.orchestrator().evaluate(&photo(10 * 1024 * 1024)).await;

        assert_eq!(eval.safety(), Safety::TooLarge);
        assert_eq!(eval.content_safety, TierOutcome::TooLarge);
        assert_eq!(h.files.calls(), 0);
        assert_eq!(h.gcp.calls(), 0);
        assert_eq!(h.azure.calls(), 0);
        let period = QuotaPeriod::containing(Utc::now());
        assert_eq!(h.store.get("gcp", period), 0, "no quota charged");
    }

    #[tokio::test]
    async fn exhausted_primary_falls_back_to_secondary_thresholds() {
        let h = Harness::new();
        let period = QuotaPeriod::containing(Utc::now());
        h.store.set("gcp", period, 951);
        h.azure
            .set_scores(vec![(SafetyCategory::Racy, NativeScore::Probability(0.62))]);

        let eval = h.orchestrator().evaluate(&photo(1024)).await;

        assert_eq!(h.gcp.calls(), 0);
        assert_eq!(h.azure.calls(), 1);
        assert_eq!(h.store.get("azure", period), 1);
        assert_eq!(
            eval.finding(),
            Some(&Finding::ContentSafety {
                provider: "azure".into(),
                category: SafetyCategory::Racy,
                likelihood: Likelihood::Likely,
            })
        );
    }

    #[tokio::test]
    async fn all_quotas_exhausted_is_unchecked_not_safe() {
        let h = Harness::new();
        let period = QuotaPeriod::containing(Utc::now());
        h.store.set("gcp", period, 5000);
        h.store.set("azure", period, 5000);

        let eval = h.orchestrator().evaluate(&photo(1024)).await;

        assert_eq!(
            eval.content_safety,
            TierOutcome::Skipped(SkipReason::QuotaExhausted)
        );
        assert_eq!(eval.safety(), Safety::Unchecked);
    }

    #[tokio::test]
    async fn provider_error_degrades_tier_without_retry() {
        let h = Harness::new();
        h.files.fail_with("503 Service Unavailable");

        let eval = h.orchestrator().evaluate(&document(100, "image/png")).await;

        assert!(matches!(eval.malware, TierOutcome::Skipped(SkipReason::ProviderFailed(_))));
        assert_eq!(h.files.calls(), 1);
        // Content safety still runs after a skipped malware tier.
        assert_eq!(h.gcp.calls(), 1);
        assert_eq!(eval.safety(), Safety::Unchecked);
    }

    #[tokio::test]
    async fn slow_providers_time_out_into_skipped_tiers() {
        let h = Harness::new();
        h.files.set_delay(Duration::from_secs(5));
        h.gcp.set_delay(Duration::from_secs(5));

        let eval = h
            .orchestrator_with_timeout(Duration::from_millis(50))
            .evaluate(&document(100, "image/png"))
            .await;

        assert!(matches!(eval.malware, TierOutcome::Skipped(SkipReason::ProviderFailed(_))));
        assert!(matches!(
            eval.content_safety,
            TierOutcome::Skipped(SkipReason::ProviderFailed(_))
        ));
        assert_eq!(eval.safety(), Safety::Unchecked);
        assert!(!eval.is_unsafe());
        assert_eq!(h.azure.calls(), 0);
    }

    #[tokio::test]
    async fn clean_document_is_safe_without_content_scan() {
        let h = Harness::new();
        let eval = h
            .orchestrator()
            .evaluate(&document(100, "application/pdf"))
            .await;

        assert_eq!(eval.safety(), Safety::Safe);
        assert_eq!(eval.content_safety, TierOutcome::NotApplicable);
        assert_eq!(h.gcp.calls(), 0);
    }

    #[tokio::test]
    async fn image_link_runs_reputation_file_and_content_checks() {
        let h = Harness::new();
        let link = Artifact::Url(Link {
            url: "http://img.example/cat.png".into(),
            media_type: Some("image/png".into()),
            size_bytes: None,
        });

        let eval = h.orchestrator().evaluate(&link).await;

        assert_eq!(eval.safety(), Safety::Safe);
        assert_eq!(h.links.calls(), 1);
        assert_eq!(h.files.calls(), 1);
        assert_eq!(h.gcp.calls(), 1);
    }

    #[tokio::test]
    async fn flagged_link_reputation_skips_file_scan() {
        let h = Harness::new();
        h.links.set_report(MalwareReport {
            threat: ThreatLevel::Infected,
            matches: vec!["SOCIAL_ENGINEERING".into()],
        });
        let link = Artifact::Url(Link {
            url: "http://phish.example/setup.exe".into(),
            media_type: Some("application/octet-stream".into()),
            size_bytes: None,
        });

        let eval = h.orchestrator().evaluate(&link).await;

        assert_eq!(eval.safety(), Safety::Unsafe);
        assert_eq!(h.files.calls(), 0);
    }

    #[tokio::test]
    async fn score_below_threshold_passes() {
        let h = Harness::new();
        h.gcp
            .set_scores(vec![(SafetyCategory::Violence, NativeScore::Ordinal(3))]);

        let eval = h.orchestrator().evaluate(&photo(1024)).await;

        assert_eq!(
            eval.content_safety,
            TierOutcome::Passed {
                provider: "gcp".into()
            }
        );
    }
}
