// Startup configuration, read from the environment (and `.env` if present).

use anyhow::{anyhow, Context as _};
use std::str::FromStr;
use std::time::Duration;

use crate::core::moderation::{Likelihood, ModerationConfig, ProviderBudget, SupportPolicy};

/// One year. Snapshots older than this would outlive any sensible Undo.
const MAX_LIFETIME_HOURS: u64 = 24 * 365;
/// One day, for sweep and call timeouts alike.
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub database_url: String,
    pub scanner_token: Option<String>,
    pub safe_browsing_key: Option<String>,
    pub gcp_vision_key: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_key: Option<String>,
    pub support_url: Option<String>,
    pub support: SupportPolicy,
    pub moderation: ModerationConfig,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = var("DISCORD_TOKEN")
            .ok_or_else(|| anyhow!("Missing DISCORD_TOKEN environment variable!"))?;

        let defaults = ModerationConfig::default();
        let lifetime_hours = bounded_or(&var, "MSG_LIFETIME_HOURS", 24, MAX_LIFETIME_HOURS)?;
        let snapshot_lifetime = lifetime_hours
            .checked_mul(60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow!("MSG_LIFETIME_HOURS is too large"))?;
        let sweep_interval = match var("SWEEP_INTERVAL_SECS") {
            Some(raw) => {
                let secs = parse("SWEEP_INTERVAL_SECS", &raw)?;
                Duration::from_secs(in_range("SWEEP_INTERVAL_SECS", secs, MAX_INTERVAL_SECS)?)
            }
            None => snapshot_lifetime,
        };

        let moderation = ModerationConfig {
            max_file_bytes: parse_or(&var, "MAX_FILE_BYTES", defaults.max_file_bytes)?,
            content_safety_max_bytes: parse_or(
                &var,
                "CONTENT_SAFETY_MAX_BYTES",
                defaults.content_safety_max_bytes,
            )?,
            snapshot_lifetime,
            sweep_interval,
            provider_timeout: Duration::from_secs(bounded_or(
                &var,
                "PROVIDER_TIMEOUT_SECS",
                20,
                MAX_INTERVAL_SECS,
            )?),
            platform_timeout: Duration::from_secs(bounded_or(
                &var,
                "PLATFORM_TIMEOUT_SECS",
                20,
                MAX_INTERVAL_SECS,
            )?),
            content_safety: vec![
                ProviderBudget {
                    provider: "gcp".to_string(),
                    monthly_limit: parse_or(&var, "GCP_MONTHLY_LIMIT", 950)?,
                    threshold: parse_or(&var, "GCP_THRESHOLD", Likelihood::Likely)?,
                },
                ProviderBudget {
                    provider: "azure".to_string(),
                    monthly_limit: parse_or(&var, "AZURE_MONTHLY_LIMIT", 4950)?,
                    threshold: parse_or(&var, "AZURE_THRESHOLD", Likelihood::Likely)?,
                },
            ],
        };

        let probability: f64 = parse_or(&var, "SUPPORT_BUTTON_PROBABILITY", 0.5)?;

        Ok(Self {
            discord_token,
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "data/group_defender.db".to_string()),
            scanner_token: var("SCANNER_TOKEN"),
            safe_browsing_key: var("SAFE_BROWSING_KEY"),
            gcp_vision_key: var("GCP_VISION_KEY"),
            azure_endpoint: var("AZURE_ENDPOINT"),
            azure_key: var("AZURE_KEY"),
            support_url: var("SUPPORT_URL"),
            support: SupportPolicy::Probability(probability),
            moderation,
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("{}", e))
        .with_context(|| format!("Invalid value for {key}: {raw:?}"))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

/// Parse a positive count no larger than `max`.
fn bounded_or(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
    max: u64,
) -> anyhow::Result<u64> {
    in_range(key, parse_or(var, key, default)?, max)
}

fn in_range(key: &str, value: u64, max: u64) -> anyhow::Result<u64> {
    if value == 0 || value > max {
        return Err(anyhow!("{key} must be between 1 and {max}, got {value}"));
    }
    Ok(value)
}
