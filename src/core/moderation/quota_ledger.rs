// Quota ledger - shares monthly call budgets across content-safety providers.
//
// Counters are keyed by (provider, year, month). A new month simply uses a
// new key, so there is no reset step. Increments happen inside the store as
// one self-contained transaction; the ledger never caches a count.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};

use super::moderation_models::ProviderBudget;
use super::snapshot_store::StoreError;

/// A calendar month in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuotaPeriod {
    pub year: i32,
    pub month: u32,
}

impl QuotaPeriod {
    pub fn containing(time: DateTime<Utc>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
        }
    }
}

impl std::fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Trait for persisting per-provider monthly call counters.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// In one transaction: read the counter for (provider, period), treating a
    /// missing counter as 0; if it is `<= limit`, increment it and return the
    /// new count. Returns `None` without writing when the counter is over
    /// the limit.
    async fn try_increment(
        &self,
        provider: &str,
        period: QuotaPeriod,
        limit: u64,
    ) -> Result<Option<u64>, StoreError>;

    /// Current count for (provider, period); 0 if none exists.
    async fn count(&self, provider: &str, period: QuotaPeriod) -> Result<u64, StoreError>;
}

/// One provider's usage for the current period, for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaUsage {
    pub provider: String,
    pub period: QuotaPeriod,
    pub count: u64,
    pub limit: u64,
}

pub struct QuotaLedger<S: QuotaStore> {
    store: S,
}

impl<S: QuotaStore> QuotaLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Pick the first provider in preference order that still has budget,
    /// and charge one call to it.
    ///
    /// Returns `None` when every candidate is exhausted. A storage failure
    /// only marks that one provider as unavailable for this call.
    pub async fn try_acquire<'a>(
        &self,
        candidates: &'a [ProviderBudget],
        now: DateTime<Utc>,
    ) -> Option<&'a ProviderBudget> {
        let period = QuotaPeriod::containing(now);

        for candidate in candidates {
            match self
                .store
                .try_increment(&candidate.provider, period, candidate.monthly_limit)
                .await
            {
                Ok(Some(count)) => {
                    tracing::debug!(
                        provider = %candidate.provider,
                        period = %period,
                        count,
                        limit = candidate.monthly_limit,
                        "Quota acquired"
                    );
                    return Some(candidate);
                }
                Ok(None) => {
                    tracing::debug!(
                        provider = %candidate.provider,
                        period = %period,
                        "Provider quota exhausted"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %candidate.provider,
                        "Quota ledger unavailable, skipping provider: {}",
                        e
                    );
                }
            }
        }

        None
    }

    /// Read-only usage for each budgeted provider in the month containing `now`.
    pub async fn usage(
        &self,
        budgets: &[ProviderBudget],
        now: DateTime<Utc>,
    ) -> Result<Vec<QuotaUsage>, StoreError> {
        let period = QuotaPeriod::containing(now);
        let mut usage = Vec::with_capacity(budgets.len());
        for budget in budgets {
            let count = self.store.count(&budget.provider, period).await?;
            usage.push(QuotaUsage {
                provider: budget.provider.clone(),
                period,
                count,
                limit: budget.monthly_limit,
            });
        }
        Ok(usage)
    }
}
