//! CLI command handlers for inspecting the effect pack.

use effect_source::{fetch_json, paths, EffectMeta};
use led_preview::config::PreviewConfig;
use led_preview::effect::registry::effect_registry;
use led_preview::loader::UiMode;
use led_preview::ui::StateRecord;
use tracing::warn;

use super::CommandResult;

/// List pack effects and compiled-in builtins.
pub async fn list(config: &PreviewConfig) -> CommandResult {
    let loader = super::loader(config, false)?;

    println!("Effects (from {}):", loader.source().location());
    println!();
    println!("{:<12} {:<20} Description", "Id", "Name");
    println!("{}", "-".repeat(60));

    match loader.manifest().await {
        Ok(manifest) => {
            for id in &manifest.effects {
                let meta =
                    fetch_json::<EffectMeta>(loader.source().as_ref(), &paths::meta(id)).await;
                match meta {
                    Ok(meta) => println!("{:<12} {:<20} {}", id, meta.name, meta.description),
                    Err(e) => println!("{:<12} {:<20} ({e})", id, "-"),
                }
            }
        }
        Err(e) => warn!(error = %e, "no effect manifest"),
    }

    println!();
    println!("Builtins:");
    for factory in effect_registry().all() {
        println!(
            "{:<12} {:<20} {}",
            factory.id(),
            factory.name(),
            factory.description()
        );
    }

    Ok(())
}

/// Show metadata, panel availability and the compiled panel of an effect.
pub async fn show(config: &PreviewConfig, id: &str, mode: UiMode) -> CommandResult {
    let loader = super::loader(config, false)?;
    let loaded = loader
        .load(id, mode)
        .await
        .map_err(|e| format!("{}: {e}", e.kind()))?;

    println!("Effect: {}", loaded.id());
    println!("Name: {}", loaded.meta.name);
    if !loaded.meta.description.is_empty() {
        println!("Description: {}", loaded.meta.description);
    }
    println!("Entry: {}", loaded.factory.entry());

    let source = loader.source().as_ref();
    let available = |found: bool| if found { "yes" } else { "no" };
    let json = source.fetch_text(&paths::ui_spec(id)).await.is_ok();
    let script = source.fetch_text(&paths::ui_script(id)).await.is_ok();
    println!("UI modes: json {}, script {}", available(json), available(script));

    let speed = loaded.panel.speed_config();
    println!("Speed: {}-{} ms (default {})", speed.min, speed.max, speed.default);

    let state = StateRecord::new(loaded.panel.initial_state());
    let tree = loaded
        .panel
        .build(&state)
        .map_err(|e| format!("build panel: {e}"))?;

    println!();
    println!("Panel ({}):", loaded.panel.mode());
    for line in tree.outline() {
        println!("  {line}");
    }

    let controls = tree.controls();
    if !controls.is_empty() {
        println!();
        println!("Controls:");
        for control in controls {
            println!(
                "  {:<14} {:<22} {}..{} step {}{}",
                control.label, control.path, control.min, control.max, control.step, control.unit
            );
        }
    }

    Ok(())
}

/// Load an effect with type checking and print the diagnostics.
pub async fn check(config: &PreviewConfig, id: &str, mode: UiMode) -> CommandResult {
    let loader = super::loader(config, true)?;
    match loader.load(id, mode).await {
        Ok(loaded) => {
            for diagnostic in &loaded.diagnostics {
                println!("{diagnostic}");
            }
            println!("{}: ok ({} warning(s))", loaded.id(), loaded.diagnostics.len());
            Ok(())
        }
        Err(e) => {
            for diagnostic in e.diagnostics() {
                println!("{diagnostic}");
            }
            Err(format!("{id}: {}: {e}", e.kind()).into())
        }
    }
}
