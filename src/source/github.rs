//! GitHub contents API source.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{ContentSource, SourceFile};
use crate::error::{PressroomError, Result};
use crate::types::{CONTENT_EXTENSION, CONTENT_ROOT};

const API_BASE: &str = "https://api.github.com";

/// Content source backed by the GitHub REST contents API
pub struct GithubSource {
    client: reqwest::Client,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Debug, Deserialize)]
struct FileContents {
    content: Option<String>,
    encoding: Option<String>,
}

impl GithubSource {
    pub fn new(owner: &str, repo: &str, branch: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("pressroom/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            API_BASE, self.owner, self.repo, path, self.branch
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        Ok(response)
    }

    fn decode_contents(file: FileContents, path: &str) -> Result<String> {
        match file.encoding.as_deref() {
            Some("base64") => {
                let compact: String = file
                    .content
                    .unwrap_or_default()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                let bytes = BASE64.decode(compact).map_err(|e| {
                    PressroomError::Upstream(format!("bad base64 for {}: {}", path, e))
                })?;
                String::from_utf8(bytes).map_err(|e| {
                    PressroomError::Upstream(format!("non-utf8 content in {}: {}", path, e))
                })
            }
            _ => Ok(file.content.unwrap_or_default()),
        }
    }
}

#[async_trait]
impl ContentSource for GithubSource {
    async fn list_content_files(&self, content_type: &str) -> Result<Vec<SourceFile>> {
        let path = format!("{}/{}", CONTENT_ROOT, content_type);
        let response = self.get(&self.contents_url(&path)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let entries: Vec<ContentsEntry> = response.json().await?;
                Ok(entries
                    .into_iter()
                    .filter(|e| e.entry_type == "file" && e.name.ends_with(CONTENT_EXTENSION))
                    .map(|e| SourceFile {
                        name: e.name,
                        path: e.path,
                        size: e.size,
                    })
                    .collect())
            }
            status => Err(PressroomError::Upstream(format!(
                "listing {} failed: HTTP {}",
                path, status
            ))),
        }
    }

    async fn get_file_content(&self, path: &str) -> Result<Option<String>> {
        let response = self.get(&self.contents_url(path)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let file: FileContents = response.json().await?;
                Ok(Some(Self::decode_contents(file, path)?))
            }
            status => Err(PressroomError::Upstream(format!(
                "fetching {} failed: HTTP {}",
                path, status
            ))),
        }
    }

    async fn create_file(&self, path: &str, content: &str, message: &str) -> Result<()> {
        if self.get_file_content(path).await?.is_some() {
            return Err(PressroomError::AlreadyExists(path.to_string()));
        }

        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            API_BASE, self.owner, self.repo, path
        );
        let body = json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
            "branch": self.branch,
        });

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!("created {} on {}", path, self.branch);
                Ok(())
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                Err(PressroomError::AlreadyExists(path.to_string()))
            }
            status => Err(PressroomError::Upstream(format!(
                "creating {} failed: HTTP {}",
                path, status
            ))),
        }
    }
}
