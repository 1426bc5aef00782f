// Moderation infrastructure - SQLite persistence and scanning vendor clients.

pub mod attachment_scanner;
pub mod azure_moderator;
pub mod connect;
pub mod gcp_vision;
mod http;
pub mod safe_browsing;
pub mod sqlite_store;

pub use attachment_scanner::AttachmentScannerClient;
pub use azure_moderator::AzureModeratorClient;
pub use connect::{connect_with_retry, RetryPolicy};
pub use gcp_vision::GcpVisionClient;
pub use safe_browsing::SafeBrowsingClient;
pub use sqlite_store::SqliteModerationStore;
