// Google Cloud Vision client - SafeSearch detection on an ordinal scale.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{build_client, read_json, transport};
use crate::core::moderation::{
    ContentSafetyReport, ContentSafetyScanner, NativeScore, SafetyCategory, ScanError, ScanInput,
};

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

pub struct GcpVisionClient {
    client: Client,
    api_key: String,
}

impl GcpVisionClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ScanError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    safe_search_annotation: Option<SafeSearch>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SafeSearch {
    #[serde(default)]
    adult: String,
    #[serde(default)]
    spoof: String,
    #[serde(default)]
    medical: String,
    #[serde(default)]
    violence: String,
    #[serde(default)]
    racy: String,
}

/// The Vision likelihood enum as an ordinal 0-5.
fn ordinal(value: &str) -> u8 {
    match value {
        "VERY_UNLIKELY" => 1,
        "UNLIKELY" => 2,
        "POSSIBLE" => 3,
        "LIKELY" => 4,
        "VERY_LIKELY" => 5,
        _ => 0,
    }
}

fn map_annotation(response: AnnotateResponse) -> Result<ContentSafetyReport, ScanError> {
    let image = response
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| ScanError::Decode("empty responses array".to_string()))?;

    if let Some(error) = image.error {
        return Err(ScanError::Http(error.message));
    }
    let safe = image
        .safe_search_annotation
        .ok_or_else(|| ScanError::Decode("missing safeSearchAnnotation".to_string()))?;

    Ok(ContentSafetyReport {
        scores: vec![
            (SafetyCategory::Adult, NativeScore::Ordinal(ordinal(&safe.adult))),
            (SafetyCategory::Spoof, NativeScore::Ordinal(ordinal(&safe.spoof))),
            (SafetyCategory::Medical, NativeScore::Ordinal(ordinal(&safe.medical))),
            (SafetyCategory::Violence, NativeScore::Ordinal(ordinal(&safe.violence))),
            (SafetyCategory::Racy, NativeScore::Ordinal(ordinal(&safe.racy))),
        ],
    })
}

fn image_payload(input: ScanInput<'_>) -> Value {
    match input {
        ScanInput::Bytes { data, .. } => json!({ "content": STANDARD.encode(data) }),
        ScanInput::Url(url) => json!({ "source": { "imageUri": url } }),
    }
}

#[async_trait]
impl ContentSafetyScanner for GcpVisionClient {
    fn name(&self) -> &str {
        "gcp"
    }

    async fn scan(&self, input: ScanInput<'_>) -> Result<ContentSafetyReport, ScanError> {
        let body = json!({
            "requests": [{
                "image": image_payload(input),
                "features": [{ "type": "SAFE_SEARCH_DETECTION" }],
            }]
        });

        let resp = self
            .client
            .post(ANNOTATE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let response: AnnotateResponse = read_json(resp).await?;
        map_annotation(response)
    }
}
