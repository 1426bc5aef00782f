// In-memory doubles for the moderation ports, shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::likelihood::{NativeScore, SafetyCategory};
use super::moderation_models::{PreservedMedia, Snapshot};
use super::platform::{ChatPlatform, Control, PlatformError, RepostContent};
use super::providers::{
    ContentSafetyReport, ContentSafetyScanner, MalwareReport, MalwareScanner, ScanError,
    ScanInput,
};
use super::quota_ledger::{QuotaPeriod, QuotaStore};
use super::snapshot_store::{SnapshotStore, StoreError};

// ============================================================================
// STORES
// ============================================================================

#[derive(Clone, Default)]
pub struct MemoryQuotaStore {
    counters: Arc<DashMap<(String, QuotaPeriod), u64>>,
    failing: Arc<DashSet<String>>,
}

impl MemoryQuotaStore {
    pub fn set(&self, provider: &str, period: QuotaPeriod, count: u64) {
        self.counters.insert((provider.to_string(), period), count);
    }

    pub fn get(&self, provider: &str, period: QuotaPeriod) -> u64 {
        self.counters
            .get(&(provider.to_string(), period))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn fail_provider(&self, provider: &str) {
        self.failing.insert(provider.to_string());
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn try_increment(
        &self,
        provider: &str,
        period: QuotaPeriod,
        limit: u64,
    ) -> Result<Option<u64>, StoreError> {
        if self.failing.contains(provider) {
            return Err(StoreError::Backend("injected failure".into()));
        }
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut count = self
            .counters
            .entry((provider.to_string(), period))
            .or_insert(0);
        if *count <= limit {
            *count += 1;
            Ok(Some(*count))
        } else {
            Ok(None)
        }
    }

    async fn count(&self, provider: &str, period: QuotaPeriod) -> Result<u64, StoreError> {
        Ok(self.get(provider, period))
    }
}

#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: Arc<DashMap<(u64, u64), Snapshot>>,
    failing: Arc<AtomicBool>,
}

impl MemorySnapshotStore {
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn contains(&self, chat_id: u64, message_id: u64) -> bool {
        self.snapshots.contains_key(&(chat_id, message_id))
    }

    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.check()?;
        self.snapshots
            .insert((snapshot.chat_id, snapshot.message_id), snapshot.clone());
        Ok(())
    }

    async fn get(&self, chat_id: u64, message_id: u64) -> Result<Option<Snapshot>, StoreError> {
        self.check()?;
        Ok(self.snapshots.get(&(chat_id, message_id)).map(|s| s.clone()))
    }

    async fn take(
        &self,
        chat_id: u64,
        message_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Snapshot>, StoreError> {
        self.check()?;
        Ok(self
            .snapshots
            .remove(&(chat_id, message_id))
            .map(|(_, s)| s)
            .filter(|s| !s.is_expired(now)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check()?;
        let before = self.snapshots.len();
        self.snapshots.retain(|_, s| !s.is_expired(now));
        Ok((before - self.snapshots.len()) as u64)
    }
}

// ============================================================================
// SCANNERS
// ============================================================================

pub struct FakeMalwareScanner {
    name: String,
    report: Mutex<Result<MalwareReport, String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl FakeMalwareScanner {
    pub fn clean(name: &str) -> Self {
        Self {
            name: name.to_string(),
            report: Mutex::new(Ok(MalwareReport::clean())),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_report(&self, report: MalwareReport) {
        *self.report.lock().unwrap() = Ok(report);
    }

    pub fn fail_with(&self, message: &str) {
        *self.report.lock().unwrap() = Err(message.to_string());
    }

    /// Sleep this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MalwareScanner for FakeMalwareScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, _input: ScanInput<'_>) -> Result<MalwareReport, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.report
            .lock()
            .unwrap()
            .clone()
            .map_err(ScanError::Http)
    }
}

pub struct FakeContentScanner {
    name: String,
    scores: Mutex<Vec<(SafetyCategory, NativeScore)>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl FakeContentScanner {
    pub fn new(name: &str, scores: Vec<(SafetyCategory, NativeScore)>) -> Self {
        Self {
            name: name.to_string(),
            scores: Mutex::new(scores),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_scores(&self, scores: Vec<(SafetyCategory, NativeScore)>) {
        *self.scores.lock().unwrap() = scores;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSafetyScanner for FakeContentScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, _input: ScanInput<'_>) -> Result<ContentSafetyReport, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(ContentSafetyReport {
            scores: self.scores.lock().unwrap().clone(),
        })
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: u64,
    pub message_id: u64,
    pub text: String,
    pub controls: Vec<Control>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub chat_id: u64,
    pub message_id: u64,
    pub text: String,
    pub controls: Vec<Control>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repost {
    pub chat_id: u64,
    pub content: RepostContent,
    pub controls: Vec<Control>,
}

/// Records every platform call. Message ids handed out start at 1000.
pub struct MockPlatform {
    next_id: AtomicU64,
    bot_admin: AtomicBool,
    permission_checks_fail: AtomicBool,
    admins: DashSet<(u64, u64)>,
    existing: DashSet<(u64, u64)>,
    rejected_deletes: DashSet<(u64, u64)>,
    delete_timeouts: DashSet<(u64, u64)>,
    media: DashMap<String, Vec<u8>>,
    repost_fails: AtomicBool,
    repost_delay: Mutex<Duration>,
    replies_fail: AtomicBool,
    deleted: Mutex<Vec<(u64, u64)>>,
    sent: Mutex<Vec<SentMessage>>,
    replies: Mutex<Vec<(u64, u64, String)>>,
    edits: Mutex<Vec<Edit>>,
    reposts: Mutex<Vec<Repost>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            bot_admin: AtomicBool::new(true),
            permission_checks_fail: AtomicBool::new(false),
            admins: DashSet::new(),
            existing: DashSet::new(),
            rejected_deletes: DashSet::new(),
            delete_timeouts: DashSet::new(),
            media: DashMap::new(),
            repost_fails: AtomicBool::new(false),
            repost_delay: Mutex::new(Duration::ZERO),
            replies_fail: AtomicBool::new(false),
            deleted: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            reposts: Mutex::new(Vec::new()),
        }
    }
}

impl MockPlatform {
    pub fn set_bot_admin(&self, admin: bool) {
        self.bot_admin.store(admin, Ordering::SeqCst);
    }

    pub fn fail_permission_checks(&self) {
        self.permission_checks_fail.store(true, Ordering::SeqCst);
    }

    pub fn add_admin(&self, chat_id: u64, user_id: u64) {
        self.admins.insert((chat_id, user_id));
    }

    /// Mark a message as present so deleting or editing it succeeds.
    pub fn add_message(&self, chat_id: u64, message_id: u64) {
        self.existing.insert((chat_id, message_id));
    }

    /// Make deletion of this message fail with `NotPermitted`.
    pub fn reject_delete(&self, chat_id: u64, message_id: u64) {
        self.rejected_deletes.insert((chat_id, message_id));
    }

    /// Make deletion of this message report `Timeout` after it went through.
    pub fn time_out_delete(&self, chat_id: u64, message_id: u64) {
        self.delete_timeouts.insert((chat_id, message_id));
    }

    pub fn fail_replies(&self) {
        self.replies_fail.store(true, Ordering::SeqCst);
    }

    /// Serve `data` for `file_ref` until the test ends.
    pub fn add_media(&self, file_ref: &str, data: &[u8]) {
        self.media.insert(file_ref.to_string(), data.to_vec());
    }

    /// Make every repost fail, after `delay`.
    pub fn fail_reposts(&self, delay: Duration) {
        *self.repost_delay.lock().unwrap() = delay;
        self.repost_fails.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reposts(&self) -> Vec<Repost> {
        self.reposts.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(u64, u64)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(u64, u64, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }

    fn allocate(&self, chat_id: u64) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.existing.insert((chat_id, id));
        id
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn delete_message(&self, chat_id: u64, message_id: u64) -> Result<(), PlatformError> {
        if self.rejected_deletes.contains(&(chat_id, message_id)) {
            return Err(PlatformError::NotPermitted);
        }
        if self.existing.remove(&(chat_id, message_id)).is_none() {
            return Err(PlatformError::NotFound);
        }
        self.deleted.lock().unwrap().push((chat_id, message_id));
        if self.delete_timeouts.contains(&(chat_id, message_id)) {
            return Err(PlatformError::Timeout);
        }
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: u64,
        text: &str,
        controls: &[Control],
    ) -> Result<u64, PlatformError> {
        let message_id = self.allocate(chat_id);
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            controls: controls.to_vec(),
        });
        Ok(message_id)
    }

    async fn reply(&self, chat_id: u64, message_id: u64, text: &str) -> Result<(), PlatformError> {
        if self.replies_fail.load(Ordering::SeqCst) {
            return Err(PlatformError::Other("send failed".into()));
        }
        self.replies
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: u64,
        message_id: u64,
        text: &str,
        controls: &[Control],
    ) -> Result<(), PlatformError> {
        if !self.existing.contains(&(chat_id, message_id)) {
            return Err(PlatformError::NotFound);
        }
        self.edits.lock().unwrap().push(Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            controls: controls.to_vec(),
        });
        Ok(())
    }

    async fn fetch_media(
        &self,
        file_ref: &str,
        max_bytes: u64,
    ) -> Result<PreservedMedia, PlatformError> {
        let data = self
            .media
            .get(file_ref)
            .map(|d| d.clone())
            .ok_or(PlatformError::NotFound)?;
        if data.len() as u64 > max_bytes {
            return Err(PlatformError::Other("media too large".into()));
        }
        Ok(PreservedMedia {
            file_name: file_ref.to_string(),
            data,
        })
    }

    async fn repost(
        &self,
        chat_id: u64,
        content: &RepostContent,
        controls: &[Control],
    ) -> Result<u64, PlatformError> {
        let delay = *self.repost_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.repost_fails.load(Ordering::SeqCst) {
            return Err(PlatformError::Other("upload failed".into()));
        }
        let message_id = self.allocate(chat_id);
        self.reposts.lock().unwrap().push(Repost {
            chat_id,
            content: content.clone(),
            controls: controls.to_vec(),
        });
        Ok(message_id)
    }

    async fn bot_can_moderate(&self, _chat_id: u64) -> Result<bool, PlatformError> {
        if self.permission_checks_fail.load(Ordering::SeqCst) {
            return Err(PlatformError::Other("lookup failed".into()));
        }
        Ok(self.bot_admin.load(Ordering::SeqCst))
    }

    async fn is_admin(&self, chat_id: u64, user_id: u64) -> Result<bool, PlatformError> {
        if self.permission_checks_fail.load(Ordering::SeqCst) {
            return Err(PlatformError::Other("lookup failed".into()));
        }
        Ok(self.admins.contains(&(chat_id, user_id)))
    }
}
