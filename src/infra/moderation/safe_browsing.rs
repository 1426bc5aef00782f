// Safe Browsing client - link reputation lookups.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::http::{build_client, read_json, transport};
use crate::core::moderation::{MalwareReport, MalwareScanner, ScanError, ScanInput, ThreatLevel};

const LOOKUP_URL: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";

const THREAT_TYPES: [&str; 4] = [
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
];

pub struct SafeBrowsingClient {
    client: Client,
    api_key: String,
}

impl SafeBrowsingClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ScanError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiLookup {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMatch {
    threat_type: String,
}

fn map_lookup(lookup: ApiLookup) -> MalwareReport {
    if lookup.matches.is_empty() {
        return MalwareReport::clean();
    }
    let mut matches: Vec<String> = lookup.matches.into_iter().map(|m| m.threat_type).collect();
    matches.dedup();
    MalwareReport {
        threat: ThreatLevel::Infected,
        matches,
    }
}

#[async_trait]
impl MalwareScanner for SafeBrowsingClient {
    fn name(&self) -> &str {
        "safe_browsing"
    }

    async fn scan(&self, input: ScanInput<'_>) -> Result<MalwareReport, ScanError> {
        let ScanInput::Url(url) = input else {
            return Err(ScanError::Unsupported("link reputation needs a URL"));
        };

        let body = json!({
            "client": { "clientId": "group-defender", "clientVersion": env!("CARGO_PKG_VERSION") },
            "threatInfo": {
                "threatTypes": THREAT_TYPES,
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL"],
                "threatEntries": [{ "url": url }],
            }
        });

        let resp = self
            .client
            .post(LOOKUP_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let lookup: ApiLookup = read_json(resp).await?;
        Ok(map_lookup(lookup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_is_clean() {
        let lookup: ApiLookup = serde_json::from_str("{}").unwrap();
        assert!(map_lookup(lookup).is_safe());
    }

    #[test]
    fn matches_are_infected_with_threat_types() {
        let lookup: ApiLookup = serde_json::from_value(serde_json::json!({
            "matches": [
                { "threatType": "SOCIAL_ENGINEERING", "threat": { "url": "http://x.example" } }
            ]
        }))
        .unwrap();
        let report = map_lookup(lookup);
        assert_eq!(report.threat, ThreatLevel::Infected);
        assert_eq!(report.matches, vec!["SOCIAL_ENGINEERING".to_string()]);
    }
}
