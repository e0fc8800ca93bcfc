//! Source adapter: git-hosted content listing and retrieval.
//!
//! The sync engine only ever sees the `ContentSource` trait; the GitHub
//! implementation talks to the contents API and the fixture implementation
//! backs tests and local dry runs.

mod fixture;
mod github;

pub use fixture::FixtureSource;
pub use github::GithubSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{CONTENT_EXTENSION, CONTENT_ROOT};

/// A file listed from the content repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub path: String,
    pub size: u64,
}

/// Read/write access to the git-hosted content tree
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List content files for one type. A missing directory is an empty
    /// list, not an error.
    async fn list_content_files(&self, content_type: &str) -> Result<Vec<SourceFile>>;

    /// Fetch one file's decoded text. `None` when the file does not exist;
    /// network/5xx failures surface as `Upstream` errors.
    async fn get_file_content(&self, path: &str) -> Result<Option<String>>;

    /// Create a new file. Fails with `AlreadyExists` when the path is taken.
    async fn create_file(&self, path: &str, content: &str, message: &str) -> Result<()>;
}

/// One commit of a push webhook payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushCommit {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

/// Push webhook payload, reduced to the fields the sync trigger needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

impl PushEvent {
    /// Whether this push targets the given branch
    pub fn is_branch(&self, branch: &str) -> bool {
        self.git_ref == format!("refs/heads/{}", branch)
    }
}

/// Deduplicated union of added/modified/removed content paths across all
/// commits of a push. Paths outside the content root or without the source
/// extension are dropped.
pub fn changed_content_paths(event: &PushEvent) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut paths = Vec::new();

    for commit in &event.commits {
        for path in commit
            .added
            .iter()
            .chain(commit.modified.iter())
            .chain(commit.removed.iter())
        {
            if !is_content_path(path) {
                continue;
            }
            if seen.insert(path.clone()) {
                paths.push(path.clone());
            }
        }
    }
    paths
}

fn is_content_path(path: &str) -> bool {
    path.starts_with(&format!("{}/", CONTENT_ROOT)) && path.ends_with(CONTENT_EXTENSION)
}
