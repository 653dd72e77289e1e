//! Command handlers for the CLI application.
//!
//! - `effect`: pack inspection (list, show, check)
//! - `preview`: running effects (run, preview)

pub mod effect;
pub mod preview;

use std::sync::Arc;

use anyhow::Context;
use effect_source::{open_source, EffectSource};
use led_preview::config::PreviewConfig;
use led_preview::loader::{CachingChecker, EffectLoader, StrictChecker};

/// Result type for command handlers
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Effect pack named by the config
pub fn effects_source(config: &PreviewConfig) -> anyhow::Result<Arc<dyn EffectSource>> {
    open_source(&config.effects_root)
        .with_context(|| format!("open effect pack {}", config.effects_root))
}

/// Device pack named by the config
pub fn devices_source(config: &PreviewConfig) -> anyhow::Result<Arc<dyn EffectSource>> {
    open_source(&config.devices_root)
        .with_context(|| format!("open device pack {}", config.devices_root))
}

/// Loader over the configured pack, type-checking when `check` is set
pub fn loader(config: &PreviewConfig, check: bool) -> anyhow::Result<EffectLoader> {
    let loader = EffectLoader::new(effects_source(config)?);
    Ok(if check {
        loader.with_checker(Arc::new(CachingChecker::new(StrictChecker)))
    } else {
        loader
    })
}
