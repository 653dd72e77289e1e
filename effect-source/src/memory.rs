//! In-memory effect pack

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::FetchError;
use crate::EffectSource;

/// Effect pack held in a map of resource name to content
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(resource, content)` pairs
    pub fn from_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source = Self::new();
        for (k, v) in files {
            source.insert(k, v);
        }
        source
    }

    /// Add or replace a resource
    pub fn insert(&self, resource: impl Into<String>, content: impl Into<String>) {
        self.files.write().insert(resource.into(), content.into());
    }

    /// Remove a resource, returning its previous content
    pub fn remove(&self, resource: &str) -> Option<String> {
        self.files.write().remove(resource)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl EffectSource for MemorySource {
    async fn fetch_text(&self, resource: &str) -> Result<String, FetchError> {
        self.files
            .read()
            .get(resource)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(resource.to_string()))
    }

    fn location(&self) -> String {
        format!("memory ({} resources)", self.len())
    }
}
