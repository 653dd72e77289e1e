//! Filesystem-backed effect pack

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;
use crate::EffectSource;

/// Effect pack rooted at a local directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a resource name below the root, refusing anything that would
    /// escape it
    fn resolve(&self, resource: &str) -> Result<PathBuf, FetchError> {
        let rel = Path::new(resource);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if resource.is_empty() || escapes {
            return Err(FetchError::InvalidResource(resource.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl EffectSource for DirectorySource {
    async fn fetch_text(&self, resource: &str) -> Result<String, FetchError> {
        let path = self.resolve(resource)?;
        debug!(path = %path.display(), "reading resource");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FetchError::io(resource, &e))
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
