//! Fetch layer for LED effect packs
//!
//! An effect pack is a tree of small text resources addressed by relative
//! names (`runtime.rhai`, `chase/logic.rhai`, `chase/ui.json`, ...). This crate
//! provides a unified interface for retrieving them from different backends:
//!
//! - Directory (local filesystem checkout of a pack)
//! - Memory (in-process map, used by tests and embedders)
//! - HTTP (behind the `http` feature)

pub mod error;
pub mod types;

mod directory;
#[cfg(feature = "http")]
mod http;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use directory::DirectorySource;
pub use error::FetchError;
#[cfg(feature = "http")]
pub use http::HttpSource;
pub use memory::MemorySource;
pub use types::{paths, validate_id, EffectManifest, EffectMeta};

/// Source of effect pack resources
///
/// Implementations must treat a missing resource as `FetchError::NotFound`
/// and any other non-OK outcome as a distinct error; they never return
/// partial content.
#[async_trait]
pub trait EffectSource: Send + Sync {
    /// Fetch a resource as UTF-8 text
    async fn fetch_text(&self, resource: &str) -> Result<String, FetchError>;

    /// Human-readable location of this source (for logs and error messages)
    fn location(&self) -> String;
}

/// Fetch a resource and decode it as JSON
pub async fn fetch_json<T: DeserializeOwned>(
    source: &dyn EffectSource,
    resource: &str,
) -> Result<T, FetchError> {
    let text = source.fetch_text(resource).await?;
    serde_json::from_str(&text).map_err(|e| FetchError::Decode {
        resource: resource.to_string(),
        message: e.to_string(),
    })
}

/// Open a source from a location string.
///
/// `http://` and `https://` locations need the `http` feature; anything else
/// is treated as a directory path.
pub fn open_source(location: &str) -> Result<Arc<dyn EffectSource>, FetchError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        #[cfg(feature = "http")]
        {
            return Ok(Arc::new(HttpSource::new(location)?));
        }
        #[cfg(not(feature = "http"))]
        {
            return Err(FetchError::Unsupported(format!(
                "{location} (built without the `http` feature)"
            )));
        }
    }
    Ok(Arc::new(DirectorySource::new(location)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_json_decodes() {
        let source = MemorySource::new();
        source.insert("manifest.json", r#"{"effects": ["blink", "wave"]}"#);
        let manifest: EffectManifest = fetch_json(&source, paths::MANIFEST).await.unwrap();
        assert_eq!(manifest.effects, vec!["blink", "wave"]);
    }

    #[tokio::test]
    async fn test_fetch_json_malformed() {
        let source = MemorySource::new();
        source.insert("manifest.json", "{not json");
        let err = fetch_json::<EffectManifest>(&source, paths::MANIFEST)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert_eq!(err.resource(), Some("manifest.json"));
    }

    #[test]
    fn test_open_source_directory() {
        let source = open_source("/tmp/some-pack").unwrap();
        assert_eq!(source.location(), "/tmp/some-pack");
    }

    #[cfg(not(feature = "http"))]
    #[test]
    fn test_open_source_http_without_feature() {
        let err = open_source("https://example.com/effects").err().unwrap();
        assert!(matches!(err, FetchError::Unsupported(_)));
    }
}
