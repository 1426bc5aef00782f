// Shared reqwest plumbing for the scanning clients.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::core::moderation::ScanError;

pub const USER_AGENT: &str = "GroupDefender/1.0";

/// Every scanning client carries its own request timeout on top of the
/// orchestrator's outer bound.
pub fn build_client(timeout: Duration) -> Result<Client, ScanError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ScanError::Http(e.to_string()))
}

pub fn transport(e: reqwest::Error) -> ScanError {
    if e.is_timeout() {
        ScanError::Timeout
    } else {
        ScanError::Http(e.to_string())
    }
}

/// Decode a JSON body, turning non-2xx responses into `ScanError::Status`.
pub async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ScanError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ScanError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| ScanError::Decode(e.to_string()))
}
