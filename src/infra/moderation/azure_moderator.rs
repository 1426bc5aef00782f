// Azure Content Moderator client - image evaluation with probability scores.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::http::{build_client, read_json, transport};
use crate::core::moderation::{
    ContentSafetyReport, ContentSafetyScanner, NativeScore, SafetyCategory, ScanError, ScanInput,
};

const EVALUATE_PATH: &str = "contentmoderator/moderate/v1.0/ProcessImage/Evaluate";

pub struct AzureModeratorClient {
    client: Client,
    url: String,
    key: String,
}

impl AzureModeratorClient {
    /// `endpoint` is the resource base URL, e.g. `https://westus.api.cognitive.microsoft.com`.
    pub fn new(endpoint: &str, key: String, timeout: Duration) -> Result<Self, ScanError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: format!("{}/{}", endpoint.trim_end_matches('/'), EVALUATE_PATH),
            key,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Evaluation {
    adult_classification_score: f64,
    racy_classification_score: f64,
}

fn map_evaluation(evaluation: Evaluation) -> ContentSafetyReport {
    ContentSafetyReport {
        scores: vec![
            (
                SafetyCategory::Adult,
                NativeScore::Probability(evaluation.adult_classification_score),
            ),
            (
                SafetyCategory::Racy,
                NativeScore::Probability(evaluation.racy_classification_score),
            ),
        ],
    }
}

#[async_trait]
impl ContentSafetyScanner for AzureModeratorClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn scan(&self, input: ScanInput<'_>) -> Result<ContentSafetyReport, ScanError> {
        let request = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", &self.key);

        let request = match input {
            ScanInput::Bytes { data, media_type } => request
                .header(CONTENT_TYPE, media_type.unwrap_or("image/jpeg"))
                .body(data.to_vec()),
            ScanInput::Url(url) => {
                request.json(&json!({ "DataRepresentation": "URL", "Value": url }))
            }
        };

        let resp = request.send().await.map_err(transport)?;
        let evaluation: Evaluation = read_json(resp).await?;
        Ok(map_evaluation(evaluation))
    }
}
