//! Update manifests
//!
//! A manifest is a small JSON document describing the latest release of
//! one component. It is served either as a raw file or wrapped in a
//! content-hosting API envelope (`{"content": "<base64>", "encoding": "base64"}`).

use base64::Engine as _;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::UpdateError;
use super::version;
use crate::engine::config::UpdateSettings;

/// How a manifest is wrapped on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestTransport {
    /// The response body is the manifest JSON itself
    #[default]
    Raw,
    /// The response body is a content API envelope with a base64 payload
    ContentApi,
}

/// Remote description of the latest available release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub latest_version: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub changelog_url: String,
    #[serde(default)]
    pub release_notes: String,
    /// Hex-encoded SHA-256 of the artifact; empty disables verification
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size_mb: u64,
    /// Forces the update, the user may not skip it
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentEnvelope {
    content: String,
    #[serde(default)]
    encoding: String,
}

impl UpdateManifest {
    /// Parse a raw manifest document
    pub fn from_json(body: &[u8]) -> Result<Self, UpdateError> {
        serde_json::from_slice(body)
            .map_err(|e| UpdateError::Decode(format!("invalid manifest JSON: {}", e)))
    }

    /// Unwrap a content API envelope and parse the manifest inside it
    pub fn from_content_envelope(body: &[u8]) -> Result<Self, UpdateError> {
        let envelope: ContentEnvelope = serde_json::from_slice(body)
            .map_err(|e| UpdateError::Decode(format!("invalid content envelope: {}", e)))?;

        if !envelope.encoding.is_empty() && envelope.encoding != "base64" {
            return Err(UpdateError::Decode(format!(
                "unsupported content encoding: {}",
                envelope.encoding
            )));
        }

        // Content APIs wrap the payload at 60-76 columns.
        let compact: String = envelope
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| UpdateError::Decode(format!("invalid base64 payload: {}", e)))?;

        Self::from_json(&decoded)
    }

    /// Decode a response body according to its transport
    pub fn decode(body: &[u8], transport: ManifestTransport) -> Result<Self, UpdateError> {
        match transport {
            ManifestTransport::Raw => Self::from_json(body),
            ManifestTransport::ContentApi => Self::from_content_envelope(body),
        }
    }

    /// Bullet points (`-`, `*`, `•`) from the release notes
    pub fn changes(&self) -> Vec<String> {
        parse_release_notes(&self.release_notes)
    }

    /// Whether moving off `current` is mandatory, either because the
    /// release is flagged as required or because `current` is older than
    /// `minimum_version`.
    pub fn is_required_for(&self, current: &str) -> bool {
        self.is_required
            || self
                .minimum_version
                .as_deref()
                .is_some_and(|min| version::is_newer(min, current))
    }
}

/// Extract bullet-list entries from free-form release notes.
pub fn parse_release_notes(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter_map(|line| {
            let mut chars = line.chars();
            match chars.next() {
                Some('-' | '*' | '•') => {
                    let item = chars.as_str().trim();
                    (!item.is_empty()).then(|| item.to_string())
                }
                _ => None,
            }
        })
        .collect()
}

/// Fetches manifests with a short, bounded timeout
pub struct ManifestFetcher {
    client: reqwest::Client,
}

impl ManifestFetcher {
    pub fn new(settings: &UpdateSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.check_timeout())
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch and decode the manifest at `url`. No retries.
    pub async fn fetch(
        &self,
        url: &str,
        transport: ManifestTransport,
    ) -> Result<UpdateManifest, UpdateError> {
        debug!(url, ?transport, "Fetching manifest");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(UpdateError::from_request)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UpdateError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(UpdateError::from_request)?;
        let manifest = UpdateManifest::decode(&body, transport)?;

        info!(url, latest_version = %manifest.latest_version, "Manifest fetched");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "latest_version": "1.2.0",
        "release_date": "2025-12-30",
        "download_url": "https://example.com/app.exe",
        "changelog_url": "https://example.com/changelog",
        "release_notes": "text",
        "sha256": "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        "size_mb": 16,
        "is_required": false
    }"#;

    #[test]
    fn test_parse_raw_manifest() {
        let manifest = UpdateManifest::from_json(MANIFEST.as_bytes()).unwrap();
        assert_eq!(manifest.latest_version, "1.2.0");
        assert_eq!(manifest.size_mb, 16);
        assert!(!manifest.is_required);
        assert!(manifest.minimum_version.is_none());
    }

    #[test]
    fn test_minimal_manifest() {
        let manifest = UpdateManifest::from_json(br#"{"latest_version":"1.0.0"}"#).unwrap();
        assert_eq!(manifest.latest_version, "1.0.0");
        assert!(manifest.download_url.is_empty());
        assert!(manifest.sha256.is_empty());
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let result = UpdateManifest::from_json(b"{not json");
        assert!(matches!(result, Err(UpdateError::Decode(_))));
    }

    #[test]
    fn test_content_envelope_with_wrapped_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(MANIFEST);
        // Wrap like a content API does
        let wrapped: Vec<String> = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        let body = serde_json::json!({
            "content": wrapped.join("\n"),
            "encoding": "base64",
        });

        let manifest = UpdateManifest::decode(
            body.to_string().as_bytes(),
            ManifestTransport::ContentApi,
        )
        .unwrap();
        assert_eq!(manifest.latest_version, "1.2.0");
        assert_eq!(manifest.download_url, "https://example.com/app.exe");
    }

    #[test]
    fn test_bad_base64_is_decode_error() {
        let body = br#"{"content": "!!!not base64!!!", "encoding": "base64"}"#;
        let result = UpdateManifest::decode(body, ManifestTransport::ContentApi);
        assert!(matches!(result, Err(UpdateError::Decode(_))));
    }

    #[test]
    fn test_unsupported_encoding() {
        let body = br#"{"content": "{}", "encoding": "utf-8"}"#;
        let result = UpdateManifest::decode(body, ManifestTransport::ContentApi);
        assert!(matches!(result, Err(UpdateError::Decode(_))));
    }

    #[test]
    fn test_minimum_version_forces_update() {
        let manifest = UpdateManifest::from_json(
            br#"{"latest_version":"2.0.0","minimum_version":"1.5.0","release_notes":"- A\n- B"}"#,
        )
        .unwrap();
        assert!(manifest.is_required_for("1.4.9"));
        assert!(!manifest.is_required_for("1.5.0"));
        assert_eq!(manifest.changes(), vec!["A", "B"]);

        let flagged = UpdateManifest::from_json(br#"{"latest_version":"2.0.0","is_required":true}"#)
            .unwrap();
        assert!(flagged.is_required_for("1.9.0"));
    }

    #[test]
    fn test_parse_release_notes() {
        let notes = "Release 1.2.0\n\n- Faster PDF export\n* Fixed crash on startup\r\n\
                     • New templates\n-\nplain line";
        assert_eq!(
            parse_release_notes(notes),
            vec!["Faster PDF export", "Fixed crash on startup", "New templates"]
        );
    }
}
