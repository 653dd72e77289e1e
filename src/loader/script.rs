// Script-backed effects and panels
// Adapts functions of a compiled rhai unit to the Effect and panel interfaces

use std::fmt;
use std::sync::Arc;

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Map, Scope, AST, INT};
use serde_json::Value;
use tracing::trace;

use crate::effect::{Effect, EffectConfig, EffectError, EffectFactory, EffectMachine, LedBuffer};
use crate::ui::{BridgeConfig, SpeedConfig, StateRecord, UiSpec, UiSpecError, WidgetTree};

/// Hook names looked up on a loaded unit
pub mod hooks {
    pub const FACTORY: &str = "create_effect";
    pub const TICK: &str = "on_tick";
    pub const RESET: &str = "on_reset";
    pub const SET_CONFIG: &str = "on_set_config";
    pub const PANEL: &str = "render";
}

/// A compiled unit and the engine that compiled it
pub struct ScriptUnit {
    engine: Engine,
    ast: AST,
}

impl ScriptUnit {
    pub fn new(engine: Engine, ast: AST) -> Self {
        Self { engine, ast }
    }

    /// Whether the unit defines `name` taking exactly `arity` parameters
    pub fn has_fn(&self, name: &str, arity: usize) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }

    /// Names of all script functions, in definition order
    pub fn functions(&self) -> Vec<String> {
        self.ast.iter_functions().map(|f| f.name.to_string()).collect()
    }

    /// Call a function with a fresh scope. Top-level statements are not re-run.
    pub fn call(
        &self,
        name: &str,
        this: Option<&mut Dynamic>,
        args: impl FuncArgs,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        let mut scope = Scope::new();
        let mut options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        if let Some(this) = this {
            options = options.bind_this_ptr(this);
        }
        self.engine
            .call_fn_with_options(options, &mut scope, &self.ast, name, args)
    }
}

impl fmt::Debug for ScriptUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptUnit")
            .field("functions", &self.functions())
            .finish()
    }
}

/// Effect factory backed by a script's `create_effect(config)`
#[derive(Debug, Clone)]
pub struct ScriptFactory {
    id: String,
    name: String,
    description: String,
    entry: String,
    unit: Arc<ScriptUnit>,
}

impl ScriptFactory {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        entry: impl Into<String>,
        unit: Arc<ScriptUnit>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            entry: entry.into(),
            unit,
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn unit(&self) -> &Arc<ScriptUnit> {
        &self.unit
    }
}

impl EffectFactory for ScriptFactory {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn create(&self, config: &EffectConfig) -> Result<EffectMachine, EffectError> {
        let arg = rhai::serde::to_dynamic(config).map_err(|e| EffectError::hook("create", e))?;
        let created = self
            .unit
            .call(&self.entry, None, (arg,))
            .map_err(|e| EffectError::hook("create", e))?;
        let mut created = created.try_cast::<Map>().ok_or_else(|| {
            EffectError::hook("create", format!("{} must return a machine map", self.entry))
        })?;

        let led_count = positive_int(&created, "led_count")?;
        let speed = positive_int(&created, "speed")?;
        let state = created.remove("state").unwrap_or_else(|| Dynamic::from_map(Map::new()));

        let effect = ScriptEffect {
            has_reset: self.unit.has_fn(hooks::RESET, 0),
            has_set_config: self.unit.has_fn(hooks::SET_CONFIG, 2),
            unit: Arc::clone(&self.unit),
            state,
        };
        Ok(EffectMachine::new(
            &self.id,
            led_count as usize,
            speed as u64,
            Box::new(effect),
        ))
    }
}

fn positive_int(map: &Map, key: &str) -> Result<INT, EffectError> {
    let value = map
        .get(key)
        .ok_or_else(|| EffectError::hook("create", format!("machine has no '{key}'")))?;
    let n = if let Ok(n) = value.as_int() {
        n
    } else if let Ok(f) = value.as_float() {
        f.trunc() as INT
    } else {
        return Err(EffectError::hook(
            "create",
            format!("'{key}' must be a number, got {}", value.type_name()),
        ));
    };
    if n < 1 {
        return Err(EffectError::hook("create", format!("'{key}' must be positive, got {n}")));
    }
    Ok(n)
}

/// One machine's script state. Hooks run with `this` bound to it.
struct ScriptEffect {
    unit: Arc<ScriptUnit>,
    state: Dynamic,
    has_reset: bool,
    has_set_config: bool,
}

impl Effect for ScriptEffect {
    fn on_tick(&mut self, led_count: usize) -> Result<LedBuffer, EffectError> {
        let frame = self
            .unit
            .call(hooks::TICK, Some(&mut self.state), (led_count as INT,))
            .map_err(|e| EffectError::hook("on_tick", e))?;
        let type_name = frame.type_name();
        let bytes = frame.into_blob().map_err(|_| {
            EffectError::hook("on_tick", format!("expected a blob frame, got {type_name}"))
        })?;
        Ok(LedBuffer::from_bytes(bytes))
    }

    fn on_reset(&mut self) -> Result<(), EffectError> {
        if !self.has_reset {
            return Ok(());
        }
        self.unit
            .call(hooks::RESET, Some(&mut self.state), ())
            .map(|_| ())
            .map_err(|e| EffectError::hook("on_reset", e))
    }

    fn on_set_config(&mut self, key: &str, value: &Value) -> Result<(), EffectError> {
        if !self.has_set_config {
            trace!(key, "script has no on_set_config hook");
            return Ok(());
        }
        let value = rhai::serde::to_dynamic(value).map_err(|e| EffectError::invalid(key, e))?;
        self.unit
            .call(
                hooks::SET_CONFIG,
                Some(&mut self.state),
                (key.to_string(), value),
            )
            .map(|_| ())
            .map_err(|e| EffectError::hook("on_set_config", e))
    }
}

/// Imperative control panel: `render(state)` returns a `ui::*` node tree
#[derive(Debug, Clone)]
pub struct ScriptPanel {
    entry: String,
    unit: Arc<ScriptUnit>,
    pub state: Value,
    pub bridge: Option<BridgeConfig>,
    pub speed: Option<SpeedConfig>,
}

impl ScriptPanel {
    pub fn new(entry: impl Into<String>, unit: Arc<ScriptUnit>) -> Self {
        Self {
            entry: entry.into(),
            unit,
            state: serde_json::json!({ "effect": {} }),
            bridge: None,
            speed: None,
        }
    }

    /// Run the panel function against `state` and flatten its node tree
    pub fn spec(&self, state: &StateRecord) -> Result<UiSpec, UiSpecError> {
        let arg = rhai::serde::to_dynamic(state.as_value())
            .map_err(|e| UiSpecError::Render(e.to_string()))?;
        let node = self
            .unit
            .call(&self.entry, None, (arg,))
            .map_err(|e| UiSpecError::Render(e.to_string()))?;
        let node: Value =
            rhai::serde::from_dynamic(&node).map_err(|e| UiSpecError::Render(e.to_string()))?;
        let mut spec = UiSpec::from_node_tree(&node, state.as_value().clone())?;
        spec.bridge = self.bridge.clone();
        spec.speed = self.speed;
        Ok(spec)
    }

    pub fn build(&self, state: &StateRecord) -> Result<WidgetTree, UiSpecError> {
        self.spec(state)?.compile()
    }
}
