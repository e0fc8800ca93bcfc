//! In-memory content source for tests and local dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ContentSource, SourceFile};
use crate::error::{PressroomError, Result};
use crate::types::{CONTENT_EXTENSION, CONTENT_ROOT};

/// Content source over an in-memory path → markdown map
#[derive(Default)]
pub struct FixtureSource {
    files: RwLock<BTreeMap<String, String>>,
    /// When set, every operation fails with an upstream error (outage tests)
    unavailable: RwLock<bool>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one file, e.g. `("content/notes/a.md", "---\ntitle: A\n---\n...")`
    pub fn insert(&self, path: &str, content: &str) {
        self.files
            .write()
            .insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.files.write().remove(path);
    }

    /// Toggle simulated upstream outage
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.read() {
            return Err(PressroomError::Upstream("source unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentSource for FixtureSource {
    async fn list_content_files(&self, content_type: &str) -> Result<Vec<SourceFile>> {
        self.check_available()?;
        let prefix = format!("{}/{}/", CONTENT_ROOT, content_type);
        Ok(self
            .files
            .read()
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix) && path.ends_with(CONTENT_EXTENSION))
            .map(|(path, content)| SourceFile {
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                path: path.clone(),
                size: content.len() as u64,
            })
            .collect())
    }

    async fn get_file_content(&self, path: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.files.read().get(path).cloned())
    }

    async fn create_file(&self, path: &str, content: &str, _message: &str) -> Result<()> {
        self.check_available()?;
        let mut files = self.files.write();
        if files.contains_key(path) {
            return Err(PressroomError::AlreadyExists(path.to_string()));
        }
        files.insert(path.to_string(), content.to_string());
        Ok(())
    }
}
