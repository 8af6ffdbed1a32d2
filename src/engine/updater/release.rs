//! Release information from the releases repository
//!
//! Read-only lookups against the GitHub REST API used to show what a new
//! version contains: the latest published release, the most recent commits
//! and whether the API is reachable at all.

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::error::UpdateError;
use super::manifest::parse_release_notes;
use crate::engine::config::UpdateSettings;

const GITHUB_JSON: &str = "application/vnd.github+json";
const PING_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
    commit: GitHubCommitDetail,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetail {
    message: String,
    author: Option<GitHubCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitAuthor {
    name: String,
    date: String,
}

/// The latest published release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub name: String,
    pub release_date: String,
    pub release_notes: String,
    pub changelog_url: String,
    pub changes: Vec<String>,
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    /// First line of the commit message
    pub summary: String,
    pub author: String,
    pub date: String,
    pub url: String,
}

impl CommitInfo {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub connected: bool,
    pub repository: String,
    pub branch: String,
    pub releases_url: String,
}

impl From<GitHubRelease> for ReleaseInfo {
    fn from(release: GitHubRelease) -> Self {
        let notes = release.body.unwrap_or_default();
        Self {
            changes: parse_release_notes(&notes),
            name: release.name.unwrap_or_else(|| release.tag_name.clone()),
            version: release.tag_name,
            release_date: release.published_at.unwrap_or_default(),
            release_notes: notes,
            changelog_url: release.html_url,
            assets: release
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    download_url: a.browser_download_url,
                    size: a.size,
                })
                .collect(),
        }
    }
}

impl From<GitHubCommit> for CommitInfo {
    fn from(commit: GitHubCommit) -> Self {
        let summary = commit
            .commit
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        let (author, date) = match commit.commit.author {
            Some(a) => (a.name, a.date),
            None => (String::new(), String::new()),
        };
        Self {
            sha: commit.sha,
            summary,
            author,
            date,
            url: commit.html_url,
        }
    }
}

/// Client for the releases repository, bounded by the check timeout
pub struct ReleaseClient {
    client: reqwest::Client,
    settings: UpdateSettings,
}

impl ReleaseClient {
    pub fn new(settings: &UpdateSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.check_timeout())
            .build()
            .unwrap_or_default();
        Self {
            client,
            settings: settings.clone(),
        }
    }

    pub async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
        let url = format!("{}/releases/latest", self.settings.repository_api_url());
        let release: GitHubRelease = self.get_json(&url).await?;
        info!(version = %release.tag_name, "Latest release fetched");
        Ok(release.into())
    }

    /// Most recent commits on the configured branch, newest first
    pub async fn recent_commits(&self, limit: usize) -> Result<Vec<CommitInfo>, UpdateError> {
        let url = format!(
            "{}/commits?sha={}&per_page={}",
            self.settings.repository_api_url(),
            self.settings.branch,
            limit
        );
        let commits: Vec<GitHubCommit> = self.get_json(&url).await?;
        debug!(count = commits.len(), "Commits fetched");
        Ok(commits.into_iter().take(limit).map(CommitInfo::from).collect())
    }

    /// Ping the API. Never fails; an unreachable API reports `connected: false`.
    pub async fn status(&self) -> RepositoryStatus {
        let connected = match self
            .client
            .head(&self.settings.github_api_url)
            .timeout(PING_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "GitHub API unreachable");
                false
            }
        };

        RepositoryStatus {
            connected,
            repository: self.settings.repository.clone(),
            branch: self.settings.branch.clone(),
            releases_url: self.settings.releases_page_url(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, UpdateError> {
        debug!(url, "GitHub API request");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, GITHUB_JSON)
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
        serde_json::from_slice(&body)
            .map_err(|e| UpdateError::Decode(format!("unexpected GitHub response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_mapping() {
        let release: GitHubRelease = serde_json::from_str(
            r#"{
                "tag_name": "v1.2.0",
                "name": null,
                "body": "Highlights\n- Faster export\n- New templates",
                "published_at": "2025-12-30T10:00:00Z",
                "html_url": "https://github.com/nash87/cv-manager-releases/releases/tag/v1.2.0",
                "assets": [{
                    "name": "cv-manager.exe",
                    "browser_download_url": "https://example.com/cv-manager.exe",
                    "size": 16777216
                }]
            }"#,
        )
        .unwrap();

        let info = ReleaseInfo::from(release);
        assert_eq!(info.version, "v1.2.0");
        assert_eq!(info.name, "v1.2.0");
        assert_eq!(info.changes, vec!["Faster export", "New templates"]);
        assert_eq!(info.assets[0].size, 16777216);
    }

    #[test]
    fn test_commit_summary_is_first_line() {
        let commit: GitHubCommit = serde_json::from_str(
            r#"{
                "sha": "0123456789abcdef",
                "commit": {
                    "message": "Release 1.2.0\n\nLonger description",
                    "author": {"name": "CV Manager Team", "date": "2025-12-30T10:00:00Z"}
                },
                "html_url": "https://example.com/commit"
            }"#,
        )
        .unwrap();

        let info = CommitInfo::from(commit);
        assert_eq!(info.summary, "Release 1.2.0");
        assert_eq!(info.short_sha(), "0123456");
        assert_eq!(info.author, "CV Manager Team");
    }
}
