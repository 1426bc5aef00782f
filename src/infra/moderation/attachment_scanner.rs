// Attachment scanner client - malware scanning for files, by upload or URL.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{build_client, read_json, transport};
use crate::core::moderation::{MalwareReport, MalwareScanner, ScanError, ScanInput, ThreatLevel};

const DEFAULT_BASE_URL: &str = "https://beta.attachmentscanner.com/v0.1/scans";

pub struct AttachmentScannerClient {
    client: Client,
    url: String,
    token: String,
}

impl AttachmentScannerClient {
    pub fn new(token: String, timeout: Duration) -> Result<Self, ScanError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: DEFAULT_BASE_URL.to_string(),
            token,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ApiScan {
    status: String,
    #[serde(default)]
    matches: Vec<Value>,
}

fn match_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("signature")
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// `ok` is clean, `found` is a confirmed match, `warning` is suspicious.
/// `pending` and `failed` mean the scan did not finish.
fn map_scan(scan: ApiScan) -> Result<MalwareReport, ScanError> {
    let threat = match scan.status.as_str() {
        "ok" => ThreatLevel::Clean,
        "found" => ThreatLevel::Infected,
        "warning" => ThreatLevel::Suspicious,
        other => return Err(ScanError::Incomplete(other.to_string())),
    };
    Ok(MalwareReport {
        threat,
        matches: scan.matches.iter().map(match_name).collect(),
    })
}

#[async_trait]
impl MalwareScanner for AttachmentScannerClient {
    fn name(&self) -> &str {
        "attachment_scanner"
    }

    async fn scan(&self, input: ScanInput<'_>) -> Result<MalwareReport, ScanError> {
        let request = self.client.post(&self.url).bearer_auth(&self.token);
        let request = match input {
            ScanInput::Bytes { data, media_type } => {
                let mut part = Part::bytes(data.to_vec()).file_name("upload");
                if let Some(media_type) = media_type {
                    part = part
                        .mime_str(media_type)
                        .map_err(|e| ScanError::Http(e.to_string()))?;
                }
                request.multipart(Form::new().part("file", part))
            }
            ScanInput::Url(url) => request.json(&json!({ "url": url })),
        };

        let resp = request.send().await.map_err(transport)?;
        let scan: ApiScan = read_json(resp).await?;
        map_scan(scan)
    }
}
