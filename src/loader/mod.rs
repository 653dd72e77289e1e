//! Runtime effect loader.
//!
//! Loading an effect by id runs four stages, each with its own terminal error:
//!
//! 1. **Fetch** the metadata, the shared `runtime.rhai` support library, the
//!    effect's `logic.rhai` and its panel (`ui.json` or `ui.rhai`) in parallel
//!    through an [`EffectSource`]. Any failure is a [`LoadError::Fetch`] and
//!    nothing is compiled.
//! 2. **Check** (optional) the combined source with a [`TypeChecker`].
//!    Error-severity diagnostics are a [`LoadError::TypeCheck`].
//! 3. **Compile** each source in order (runtime, logic, panel script) into one
//!    unit in a fresh [`sandbox`]. Parse failures, or logic that defines no
//!    functions, are a [`LoadError::Compile`].
//! 4. **Execute and extract**: top-level statements run once against the
//!    injected `host` and `exports` values, then the factory (and in script
//!    mode the panel function) is looked up. A missing entry point is a
//!    [`LoadError::Extraction`].
//!
//! No effect machine exists until the caller invokes the returned factory.

pub mod sandbox;
pub mod script;
pub mod typecheck;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use effect_source::{
    fetch_json, paths, validate_id, EffectManifest, EffectMeta, EffectSource, FetchError,
};
use rhai::{Map, AST};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ui::{BridgeConfig, SpeedConfig, StateRecord, UiSpec, UiSpecError, WidgetTree};
pub use script::{ScriptFactory, ScriptPanel, ScriptUnit};
pub use typecheck::{CachingChecker, Diagnostic, Severity, StrictChecker, TypeChecker};

/// Terminal failure of one load attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Compile failed: {0}")]
    Compile(String),

    #[error("Missing export: {0}")]
    Extraction(String),

    #[error("Type check failed with {} error(s)", count_errors(.0))]
    TypeCheck(Vec<Diagnostic>),
}

fn count_errors(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}

impl LoadError {
    /// Displayable category of the failure
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "FetchError",
            Self::Compile(_) => "CompileError",
            Self::Extraction(_) => "ExtractionError",
            Self::TypeCheck(_) => "TypeCheckError",
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::TypeCheck(d) => d,
            _ => &[],
        }
    }
}

/// Where an effect's control panel comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    /// `ui.json` panel description
    #[default]
    #[serde(alias = "declarative")]
    Json,
    /// `ui.rhai` script with a `render(state)` function
    #[serde(alias = "imperative")]
    Script,
}

impl UiMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for UiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" | "declarative" => Ok(Self::Json),
            "script" | "imperative" => Ok(Self::Script),
            other => Err(format!("unknown ui mode '{other}' (expected json or script)")),
        }
    }
}

/// A loaded control panel
#[derive(Debug, Clone)]
pub enum Panel {
    Spec(UiSpec),
    Script(ScriptPanel),
}

impl Panel {
    pub fn mode(&self) -> UiMode {
        match self {
            Self::Spec(_) => UiMode::Json,
            Self::Script(_) => UiMode::Script,
        }
    }

    pub fn initial_state(&self) -> Value {
        match self {
            Self::Spec(spec) => spec.state.clone(),
            Self::Script(panel) => panel.state.clone(),
        }
    }

    pub fn bridge_config(&self) -> Option<BridgeConfig> {
        match self {
            Self::Spec(spec) => spec.bridge.clone(),
            Self::Script(panel) => panel.bridge.clone(),
        }
    }

    pub fn speed_config(&self) -> SpeedConfig {
        match self {
            Self::Spec(spec) => spec.speed_config(),
            Self::Script(panel) => panel.speed.unwrap_or_default(),
        }
    }

    /// Whether the widget tree depends on state beyond its bindings
    pub fn rebuilds_on_change(&self) -> bool {
        matches!(self, Self::Script(_))
    }

    pub fn build(&self, state: &StateRecord) -> Result<WidgetTree, UiSpecError> {
        match self {
            Self::Spec(spec) => spec.compile(),
            Self::Script(panel) => panel.build(state),
        }
    }
}

/// Result of a successful load
#[derive(Debug, Clone)]
pub struct LoadedEffect {
    pub meta: EffectMeta,
    pub factory: Arc<ScriptFactory>,
    pub panel: Panel,
    /// Warnings reported by the checker, if one ran
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadedEffect {
    pub fn id(&self) -> &str {
        self.meta.id.as_deref().unwrap_or_default()
    }
}

/// One named piece of the combined unit
struct Segment {
    name: String,
    text: String,
}

/// Loads effects from an [`EffectSource`]
#[derive(Clone)]
pub struct EffectLoader {
    source: Arc<dyn EffectSource>,
    checker: Option<Arc<dyn TypeChecker>>,
}

impl EffectLoader {
    pub fn new(source: Arc<dyn EffectSource>) -> Self {
        Self {
            source,
            checker: None,
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn TypeChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn source(&self) -> &Arc<dyn EffectSource> {
        &self.source
    }

    /// Effect ids listed in the pack's `manifest.json`
    pub async fn manifest(&self) -> Result<EffectManifest, LoadError> {
        Ok(fetch_json(self.source.as_ref(), paths::MANIFEST).await?)
    }

    pub async fn load(&self, effect_id: &str, mode: UiMode) -> Result<LoadedEffect, LoadError> {
        validate_id(effect_id)?;
        let source = self.source.as_ref();
        let meta_path = paths::meta(effect_id);
        let logic_path = paths::logic(effect_id);
        let ui_path = match mode {
            UiMode::Json => paths::ui_spec(effect_id),
            UiMode::Script => paths::ui_script(effect_id),
        };

        let (mut meta, runtime, logic, ui) = tokio::try_join!(
            fetch_json::<EffectMeta>(source, &meta_path),
            source.fetch_text(paths::RUNTIME),
            source.fetch_text(&logic_path),
            source.fetch_text(&ui_path),
        )?;
        meta.id = Some(meta.id_or(effect_id).to_string());
        debug!(effect_id, %mode, location = %source.location(), "fetched effect sources");

        let mut segments = vec![
            Segment {
                name: paths::RUNTIME.to_string(),
                text: runtime,
            },
            Segment {
                name: logic_path,
                text: logic,
            },
        ];
        let ui_text = match mode {
            UiMode::Json => Some(ui),
            UiMode::Script => {
                segments.push(Segment {
                    name: ui_path.clone(),
                    text: ui,
                });
                None
            }
        };

        let diagnostics = self.type_check(&segments).await?;

        let engine = sandbox::engine();
        let ast = compile_segments(&engine, &segments)?;
        let mut scope = sandbox::scope(effect_id, mode);
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| LoadError::Extraction(format!("module body failed: {e}")))?;
        let exports = scope.get_value::<Map>(sandbox::EXPORTS).unwrap_or_default();
        let unit = Arc::new(ScriptUnit::new(engine, ast));

        let factory = extract_factory(&meta, effect_id, &unit, &exports)?;
        let panel = match ui_text {
            Some(text) => load_spec(&ui_path, &text)?,
            None => extract_panel(&unit, &exports)?,
        };

        info!(effect_id, name = %meta.name, mode = %panel.mode(), "loaded effect");
        Ok(LoadedEffect {
            meta,
            factory: Arc::new(factory),
            panel,
            diagnostics,
        })
    }

    async fn type_check(&self, segments: &[Segment]) -> Result<Vec<Diagnostic>, LoadError> {
        let Some(checker) = &self.checker else {
            return Ok(Vec::new());
        };
        let combined = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        match checker.check(&combined).await {
            Ok(diagnostics) if diagnostics.iter().any(Diagnostic::is_error) => {
                Err(LoadError::TypeCheck(diagnostics))
            }
            Ok(diagnostics) => {
                for d in &diagnostics {
                    debug!(diagnostic = %d, "type check");
                }
                Ok(diagnostics)
            }
            Err(e) => {
                warn!("type checker unavailable, skipping: {e}");
                Ok(Vec::new())
            }
        }
    }
}

fn compile_segments(engine: &rhai::Engine, segments: &[Segment]) -> Result<AST, LoadError> {
    let mut unit: Option<AST> = None;
    for segment in segments {
        let ast = engine.compile(&segment.text).map_err(|e| {
            LoadError::Compile(format!(
                "{} line {}: {}",
                segment.name,
                e.1.line().unwrap_or(0),
                e.0
            ))
        })?;
        if segment.name.ends_with("logic.rhai") && ast.iter_functions().next().is_none() {
            return Err(LoadError::Compile(format!(
                "{} defines no functions",
                segment.name
            )));
        }
        unit = Some(match unit {
            None => ast,
            Some(prev) => prev.merge(&ast),
        });
    }
    unit.ok_or_else(|| LoadError::Compile("nothing to compile".to_string()))
}

fn export_name(exports: &Map, key: &str, default: &str) -> Result<String, LoadError> {
    match exports.get(key) {
        None => Ok(default.to_string()),
        Some(v) if v.is_unit() => Ok(default.to_string()),
        Some(v) => v
            .clone()
            .into_string()
            .map_err(|_| LoadError::Extraction(format!("exports.{key} must be a function name"))),
    }
}

fn extract_factory(
    meta: &EffectMeta,
    effect_id: &str,
    unit: &Arc<ScriptUnit>,
    exports: &Map,
) -> Result<ScriptFactory, LoadError> {
    let entry = export_name(exports, "factory", script::hooks::FACTORY)?;
    if !unit.has_fn(&entry, 1) {
        return Err(LoadError::Extraction(format!(
            "no effect factory: expected fn {entry}(config)"
        )));
    }
    if !unit.has_fn(script::hooks::TICK, 1) {
        return Err(LoadError::Extraction(format!(
            "no frame hook: expected fn {}(led_count)",
            script::hooks::TICK
        )));
    }
    Ok(ScriptFactory::new(
        meta.id_or(effect_id),
        meta.name.clone(),
        meta.description.clone(),
        entry,
        Arc::clone(unit),
    ))
}

fn load_spec(path: &str, text: &str) -> Result<Panel, LoadError> {
    let spec = UiSpec::from_json(text).map_err(|e| LoadError::Compile(format!("{path}: {e}")))?;
    spec.compile()
        .map_err(|e| LoadError::Compile(format!("{path}: {e}")))?;
    Ok(Panel::Spec(spec))
}

fn export_value<T: serde::de::DeserializeOwned>(
    exports: &Map,
    key: &str,
) -> Result<Option<T>, LoadError> {
    match exports.get(key) {
        None => Ok(None),
        Some(v) if v.is_unit() => Ok(None),
        Some(v) => rhai::serde::from_dynamic::<T>(v)
            .map(Some)
            .map_err(|e| LoadError::Extraction(format!("exports.{key}: {e}"))),
    }
}

fn extract_panel(unit: &Arc<ScriptUnit>, exports: &Map) -> Result<Panel, LoadError> {
    let entry = export_name(exports, "panel", script::hooks::PANEL)?;
    if !unit.has_fn(&entry, 1) {
        return Err(LoadError::Extraction(format!(
            "no panel component: expected fn {entry}(state)"
        )));
    }

    let mut panel = ScriptPanel::new(entry, Arc::clone(unit));
    if let Some(state) = export_value::<Value>(exports, "state")? {
        panel.state = state;
    }
    panel.bridge = export_value::<BridgeConfig>(exports, "bridge")?;
    panel.speed = export_value::<SpeedConfig>(exports, "speed")?;

    // Render once so a broken panel fails the load rather than the session
    panel
        .build(&StateRecord::new(panel.state.clone()))
        .map_err(|e| LoadError::Extraction(e.to_string()))?;
    Ok(Panel::Script(panel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectConfig, EffectFactory, MachineStatus};
    use effect_source::MemorySource;
    use serde_json::json;

    const RUNTIME: &str = r#"
        fn blank(n) { blob(n * 3, 0) }
        fn paint_led(i, rgb) {
            let o = i * 3;
            this[o] = rgb[0];
            this[o + 1] = rgb[1];
            this[o + 2] = rgb[2];
        }
    "#;

    const LOGIC: &str = r#"
        fn create_effect(config) {
            let n = if config.ledCount == () { 20 } else { config.ledCount };
            #{ led_count: n, speed: 50, state: #{ position: 0, color: [9, 8, 7] } }
        }
        fn on_tick(n) {
            let buf = blank(n);
            buf.paint_led(this.position, this.color);
            this.position = (this.position + 1) % n;
            buf
        }
        fn on_reset() { this.position = 0; }
        fn on_set_config(key, value) {
            if key == "color" { this.color = [value.r, value.g, value.b]; }
        }
    "#;

    const SPEC: &str = r#"{
        "root": "main",
        "elements": {
            "main": { "type": "Card", "props": { "title": "Dot" }, "children": [] }
        },
        "state": { "effect": {} }
    }"#;

    fn pack() -> MemorySource {
        MemorySource::from_files([
            ("runtime.rhai", RUNTIME),
            ("dot/meta.json", r#"{"name": "Dot", "description": "One LED"}"#),
            ("dot/logic.rhai", LOGIC),
            ("dot/ui.json", SPEC),
        ])
    }

    fn loader(source: MemorySource) -> EffectLoader {
        EffectLoader::new(Arc::new(source))
    }

    #[tokio::test]
    async fn test_load_and_run() {
        let loaded = loader(pack()).load("dot", UiMode::Json).await.unwrap();
        assert_eq!(loaded.id(), "dot");
        assert_eq!(loaded.factory.name(), "Dot");

        let mut machine = loaded
            .factory
            .create(&EffectConfig::with_led_count(5))
            .unwrap();
        assert_eq!(machine.leds().len(), 15);
        assert_eq!(machine.speed(), 50);

        machine.start();
        machine.tick().unwrap();
        machine.tick().unwrap();
        assert_eq!(machine.leds().lit(), vec![1]);

        machine
            .set_config("color", &json!({"mode": "rgb", "r": 1, "g": 2, "b": 3}))
            .unwrap();
        machine.tick().unwrap();
        assert_eq!(&machine.leds()[6..9], &[1, 2, 3]);

        machine.stop().unwrap();
        assert_eq!(machine.status(), MachineStatus::Idle);
        machine.start();
        machine.tick().unwrap();
        assert_eq!(machine.leds().lit(), vec![0]);
    }

    #[tokio::test]
    async fn test_machines_do_not_share_state() {
        let loaded = loader(pack()).load("dot", UiMode::Json).await.unwrap();
        let mut a = loaded.factory.create(&EffectConfig::default()).unwrap();
        let mut b = loaded.factory.create(&EffectConfig::default()).unwrap();
        a.start();
        b.start();
        a.tick().unwrap();
        a.tick().unwrap();
        b.tick().unwrap();
        assert_eq!(a.leds().lit(), vec![1]);
        assert_eq!(b.leds().lit(), vec![0]);
    }

    #[tokio::test]
    async fn test_missing_resource_is_fetch_error() {
        let source = pack();
        source.remove("runtime.rhai");
        let err = loader(source).load("dot", UiMode::Json).await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch(FetchError::NotFound(_))));
        assert_eq!(err.kind(), "FetchError");
    }

    #[tokio::test]
    async fn test_empty_logic_is_compile_error() {
        let source = pack();
        source.insert("dot/logic.rhai", "// nothing here\n");
        let err = loader(source).load("dot", UiMode::Json).await.unwrap_err();
        assert_eq!(err.kind(), "CompileError");
    }

    #[tokio::test]
    async fn test_syntax_error_names_segment() {
        let source = pack();
        source.insert("dot/logic.rhai", "fn create_effect(config) {\n  let = 1;\n}\n");
        match loader(source).load("dot", UiMode::Json).await.unwrap_err() {
            LoadError::Compile(msg) => assert!(msg.starts_with("dot/logic.rhai line 2"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_factory_is_extraction_error() {
        let source = pack();
        source.insert("dot/logic.rhai", "fn make(config) { #{} }\nfn on_tick(n) { blank(n) }");
        let err = loader(source).load("dot", UiMode::Json).await.unwrap_err();
        assert!(matches!(err, LoadError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_renamed_factory_export() {
        let source = pack();
        source.insert(
            "dot/logic.rhai",
            r#"
            exports.factory = "make";
            fn make(config) { #{ led_count: 3, speed: 10, state: #{} } }
            fn on_tick(n) { blank(n) }
            "#,
        );
        let loaded = loader(source).load("dot", UiMode::Json).await.unwrap();
        assert_eq!(loaded.factory.entry(), "make");
        let machine = loaded.factory.create(&EffectConfig::default()).unwrap();
        assert_eq!(machine.led_count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_ui_spec_is_compile_error() {
        let source = pack();
        source.insert(
            "dot/ui.json",
            r#"{"root": "a", "elements": {"a": {"type": "Button"}}}"#,
        );
        let err = loader(source).load("dot", UiMode::Json).await.unwrap_err();
        assert_eq!(err.kind(), "CompileError");
    }

    #[tokio::test]
    async fn test_script_panel() {
        let source = pack();
        source.insert(
            "dot/ui.rhai",
            r#"
            exports.state = #{ effect: #{ speed: 50 } };
            exports.bridge = #{ scaleKeys: #{ level: 0.5 } };
            fn render(state) {
                ui::stack(#{}, [
                    ui::slider(#{ label: "Speed", min: 20, max: 500, value: ui::bind("/effect/speed") }),
                    ui::text(#{ text: "speed " + state.effect.speed })
                ])
            }
            "#,
        );
        let loaded = loader(source).load("dot", UiMode::Script).await.unwrap();
        assert_eq!(loaded.panel.mode(), UiMode::Script);
        assert_eq!(loaded.panel.initial_state(), json!({ "effect": { "speed": 50 } }));
        assert_eq!(
            loaded.panel.bridge_config().unwrap().scale_keys["level"],
            json!(0.5)
        );

        let state = StateRecord::new(loaded.panel.initial_state());
        let tree = loaded.panel.build(&state).unwrap();
        assert_eq!(tree.controls().len(), 1);
        assert!(tree.render(&state).iter().any(|l| l.text == "speed 50"));
    }

    #[tokio::test]
    async fn test_script_panel_without_render() {
        let source = pack();
        source.insert("dot/ui.rhai", "fn draw(state) { ui::text(#{ text: \"x\" }) }");
        let err = loader(source).load("dot", UiMode::Script).await.unwrap_err();
        assert_eq!(err.kind(), "ExtractionError");
    }

    #[tokio::test]
    async fn test_type_check_blocks_load() {
        let source = pack();
        source.insert(
            "dot/logic.rhai",
            format!("{LOGIC}\nfn broken() {{ undefined_name }}\n"),
        );
        let err = loader(source)
            .with_checker(Arc::new(StrictChecker))
            .load("dot", UiMode::Json)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TypeCheckError");
        assert_eq!(err.diagnostics().len(), 1);
    }
}
