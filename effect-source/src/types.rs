//! Effect pack resource layout and record types

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Well-known resource names inside an effect pack
pub mod paths {
    /// List of effect ids available in the pack
    pub const MANIFEST: &str = "manifest.json";
    /// Shared support library (color + machine helpers)
    pub const RUNTIME: &str = "runtime.rhai";

    pub fn meta(effect_id: &str) -> String {
        format!("{effect_id}/meta.json")
    }

    pub fn logic(effect_id: &str) -> String {
        format!("{effect_id}/logic.rhai")
    }

    /// Declarative UI specification
    pub fn ui_spec(effect_id: &str) -> String {
        format!("{effect_id}/ui.json")
    }

    /// Imperative UI script
    pub fn ui_script(effect_id: &str) -> String {
        format!("{effect_id}/ui.rhai")
    }
}

/// Effect metadata record (`<id>/meta.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectMeta {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl EffectMeta {
    /// Resolved id, falling back to the id the record was requested under
    pub fn id_or<'a>(&'a self, requested: &'a str) -> &'a str {
        self.id.as_deref().unwrap_or(requested)
    }
}

/// Pack manifest (`manifest.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectManifest {
    #[serde(default)]
    pub effects: Vec<String>,
}

/// Check that an id names a single path segment.
///
/// Ids are spliced into resource paths, so separators and parent
/// references are rejected.
pub fn validate_id(id: &str) -> Result<(), FetchError> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(FetchError::InvalidResource(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(paths::meta("chase"), "chase/meta.json");
        assert_eq!(paths::logic("chase"), "chase/logic.rhai");
        assert_eq!(paths::ui_spec("wave"), "wave/ui.json");
        assert_eq!(paths::ui_script("wave"), "wave/ui.rhai");
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("rainbow").is_ok());
        assert!(validate_id("ring_20-v2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("..").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("../etc").is_err());
    }

    #[test]
    fn test_meta_id_fallback() {
        let meta: EffectMeta =
            serde_json::from_str(r#"{"name": "Chase", "description": "Dots"}"#).unwrap();
        assert_eq!(meta.id_or("chase"), "chase");

        let meta: EffectMeta = serde_json::from_str(r#"{"id": "c2", "name": "Chase"}"#).unwrap();
        assert_eq!(meta.id_or("chase"), "c2");
        assert!(meta.description.is_empty());
    }
}
