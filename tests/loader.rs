//! Integration tests for the effect loader over the bundled `effects/` pack.
//!
//! These go through the directory source, the sandbox and the script
//! factories, and compare the loaded effects with the compiled-in ones.

use std::sync::Arc;

use effect_source::{DirectorySource, FetchError};
use led_preview::effect::registry::effect_registry;
use led_preview::effect::{EffectConfig, EffectFactory, EffectMachine};
use led_preview::loader::{CachingChecker, EffectLoader, LoadError, StrictChecker, UiMode};
use serde_json::json;

fn loader() -> EffectLoader {
    let source = DirectorySource::new(concat!(env!("CARGO_MANIFEST_DIR"), "/effects"));
    EffectLoader::new(Arc::new(source))
}

fn running(factory: &dyn EffectFactory, config: &EffectConfig) -> EffectMachine {
    let mut machine = factory.create(config).unwrap();
    assert!(machine.start());
    machine
}

// ── Every pack effect loads and runs ──

#[tokio::test]
async fn every_manifest_effect_loads_declarative() {
    let loader = loader();
    let manifest = loader.manifest().await.unwrap();
    assert_eq!(manifest.effects, ["blink", "chase", "rainbow", "wave"]);

    for id in &manifest.effects {
        let loaded = loader.load(id, UiMode::Json).await.unwrap();
        assert_eq!(loaded.id(), id);

        let mut machine = running(loaded.factory.as_ref(), &EffectConfig::default());
        machine.tick().unwrap();
        assert_eq!(machine.leds().len(), 60, "{id}");
        assert!(!machine.leds().lit().is_empty(), "{id} painted nothing");
    }
}

#[tokio::test]
async fn script_panels_load_imperative() {
    let loader = loader();
    for id in ["chase", "rainbow", "wave"] {
        let loaded = loader.load(id, UiMode::Script).await.unwrap();
        assert_eq!(loaded.panel.mode(), UiMode::Script);
        assert!(loaded.panel.rebuilds_on_change());
    }
}

#[tokio::test]
async fn missing_meta_id_falls_back_to_requested() {
    let loaded = loader().load("rainbow", UiMode::Json).await.unwrap();
    assert_eq!(loaded.meta.id.as_deref(), Some("rainbow"));
    assert_eq!(loaded.meta.name, "Rainbow");
}

// ── Exact frames ──

#[tokio::test]
async fn chase_points_are_evenly_spaced() {
    let loaded = loader().load("chase", UiMode::Json).await.unwrap();
    let mut machine = running(loaded.factory.as_ref(), &EffectConfig::with_led_count(20));
    assert_eq!(machine.speed(), 80);

    machine.tick().unwrap();
    assert_eq!(machine.leds().lit(), vec![0, 10]);
    machine.tick().unwrap();
    assert_eq!(machine.leds().lit(), vec![1, 11]);
    assert_eq!(machine.leds().get(1).unwrap().to_hex(), "fbbf24");
}

#[tokio::test]
async fn wave_wraps_around_the_strip() {
    let loaded = loader().load("wave", UiMode::Json).await.unwrap();
    let mut machine = running(loaded.factory.as_ref(), &EffectConfig::with_led_count(6));

    machine.tick().unwrap();
    assert_eq!(machine.leds().lit(), vec![0, 1, 2, 3, 4]);
    machine.tick().unwrap();
    assert_eq!(machine.leds().lit(), vec![1, 2, 3, 4, 5]);
    machine.tick().unwrap();
    assert_eq!(machine.leds().lit(), vec![0, 2, 3, 4, 5]);
}

#[tokio::test]
async fn scripts_match_builtins_frame_for_frame() {
    let loader = loader();
    let config = EffectConfig::with_led_count(12)
        .param("color", json!({ "mode": "hsv", "h": 200, "s": 0.5, "v": 1 }));

    for id in ["blink", "chase", "rainbow", "wave"] {
        let loaded = loader.load(id, UiMode::Json).await.unwrap();
        let builtin = effect_registry().find(id).unwrap();

        let mut script = running(loaded.factory.as_ref(), &config);
        let mut native = running(builtin.as_ref(), &config);
        assert_eq!(script.speed(), native.speed(), "{id}");

        for frame in 0..8 {
            script.tick().unwrap();
            native.tick().unwrap();
            assert_eq!(script.leds(), native.leds(), "{id} frame {frame}");
        }
    }
}

#[tokio::test]
async fn scripts_and_builtins_agree_on_colors() {
    let loaded = loader().load("blink", UiMode::Json).await.unwrap();
    let builtin = effect_registry().find("blink").unwrap();
    let config = EffectConfig::with_led_count(2);

    let rejected = [
        json!({ "mode": "rgb", "r": 300, "g": -1, "b": 10 }),
        json!({ "mode": "rgb", "r": 10, "g": 10, "b": 256 }),
        json!({ "r": 10, "g": 10, "b": 10 }),
        json!({ "mode": "rgb", "r": 10, "g": 10 }),
        json!({ "mode": "cmyk", "c": 1 }),
        json!("red"),
    ];
    for color in &rejected {
        let mut script = running(loaded.factory.as_ref(), &config);
        let mut native = running(builtin.as_ref(), &config);
        assert!(script.set_config("color", color).is_err(), "script accepted {color}");
        assert!(native.set_config("color", color).is_err(), "builtin accepted {color}");

        let with_color = config.clone().param("color", color.clone());
        assert!(loaded.factory.create(&with_color).is_err(), "script created with {color}");
        assert!(builtin.create(&with_color).is_err(), "builtin created with {color}");
    }

    let accepted = [
        json!({ "mode": "rgb", "r": 12.6, "g": 0, "b": 255 }),
        json!({ "kind": "rgb", "r": 1, "g": 2, "b": 3 }),
        json!({ "mode": "hsv", "h": 30, "s": 1, "v": 2 }),
    ];
    for color in &accepted {
        let mut script = running(loaded.factory.as_ref(), &config);
        let mut native = running(builtin.as_ref(), &config);
        script.set_config("color", color).unwrap();
        native.set_config("color", color).unwrap();
        script.tick().unwrap();
        native.tick().unwrap();
        assert_eq!(script.leds(), native.leds(), "{color}");
    }
}

#[tokio::test]
async fn fractional_counts_truncate_like_builtins() {
    let loaded = loader().load("chase", UiMode::Json).await.unwrap();
    let builtin = effect_registry().find("chase").unwrap();
    let config = EffectConfig::with_led_count(20).param("chaseCount", json!(2.6));

    let mut script = running(loaded.factory.as_ref(), &config);
    let mut native = running(builtin.as_ref(), &config);
    script.tick().unwrap();
    native.tick().unwrap();
    assert_eq!(script.leds().lit(), vec![0, 10]);
    assert_eq!(script.leds(), native.leds());

    script.set_config("chaseCount", &json!(3.9)).unwrap();
    native.set_config("chaseCount", &json!(3.9)).unwrap();
    script.tick().unwrap();
    native.tick().unwrap();
    assert_eq!(script.leds(), native.leds());
}

#[tokio::test]
async fn stop_resets_script_state() {
    let loaded = loader().load("chase", UiMode::Json).await.unwrap();
    let mut machine = running(loaded.factory.as_ref(), &EffectConfig::with_led_count(20));
    machine.tick().unwrap();
    machine.tick().unwrap();
    machine.stop().unwrap();
    assert!(machine.leds().lit().is_empty());

    machine.start();
    machine.tick().unwrap();
    assert_eq!(machine.leds().lit(), vec![0, 10]);
}

#[tokio::test]
async fn script_config_updates_reach_state() {
    let loaded = loader().load("chase", UiMode::Json).await.unwrap();
    let mut machine = running(loaded.factory.as_ref(), &EffectConfig::with_led_count(12));
    machine.set_config("chaseCount", &json!(3)).unwrap();
    machine.tick().unwrap();
    assert_eq!(machine.leds().lit(), vec![0, 4, 8]);

    assert!(machine.set_config("chaseCount", &json!(0)).is_err());
}

// ── Failures ──

#[tokio::test]
async fn unknown_effect_is_fetch_error() {
    let err = loader().load("sparkle", UiMode::Json).await.unwrap_err();
    assert!(matches!(err, LoadError::Fetch(FetchError::NotFound(_))));
    assert_eq!(err.kind(), "FetchError");
}

#[tokio::test]
async fn missing_ui_script_is_fetch_error() {
    let err = loader().load("blink", UiMode::Script).await.unwrap_err();
    assert_eq!(err.kind(), "FetchError");
}

#[tokio::test]
async fn path_like_ids_are_rejected() {
    let err = loader().load("../effects", UiMode::Json).await.unwrap_err();
    assert_eq!(err.kind(), "FetchError");
}

#[tokio::test]
async fn bundled_effects_pass_the_strict_checker() {
    let loader = loader().with_checker(Arc::new(CachingChecker::new(StrictChecker)));
    for id in ["blink", "chase", "rainbow", "wave"] {
        let loaded = loader.load(id, UiMode::Json).await.unwrap();
        assert!(loaded.diagnostics.iter().all(|d| !d.is_error()), "{id}");
    }
}
