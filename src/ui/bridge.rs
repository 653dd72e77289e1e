// Binding bridge
// Maps panel state edits onto effect machine configuration calls

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::color::TaggedColor;
use crate::effect::{number, EffectError};
use crate::scheduler::Scheduler;

/// State namespace the bridge listens to (`/effect/<key>`)
pub const NAMESPACE: &str = "effect";

/// Optional bridge behavior declared by a panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Keys that together form the composite `color` (hue/saturation/brightness)
    #[serde(default)]
    pub color_keys: Vec<String>,
    /// Factor applied to a key's value before it reaches the machine
    #[serde(default)]
    pub scale_keys: Map<String, Value>,
}

impl BridgeConfig {
    fn scale_for(&self, key: &str) -> Option<f64> {
        self.scale_keys.get(key).and_then(Value::as_f64)
    }
}

/// Immutable panel state. Every edit produces a new record, so consumers can
/// detect changes with [`StateRecord::ptr_eq`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord(Arc<Value>);

impl StateRecord {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    /// Look up a slash-separated path (`/effect/hue`)
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.pointer(path)
    }

    /// Number stored under `<namespace>/<key>`
    pub fn effect_number(&self, key: &str) -> Option<f64> {
        self.0.get(NAMESPACE)?.get(key)?.as_f64()
    }

    /// New record with `/<namespace>/<key>` set to `value`
    pub fn with_effect_value(&self, key: &str, value: Value) -> Self {
        let mut root = match self.0.as_ref() {
            Value::Object(m) => m.clone(),
            _ => Map::new(),
        };
        let mut ns = match root.remove(NAMESPACE) {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        ns.insert(key.to_string(), value);
        root.insert(NAMESPACE.to_string(), Value::Object(ns));
        Self::new(Value::Object(root))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl Default for StateRecord {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

/// The machine-facing side of the bridge
pub trait MachineControl {
    /// Speed control entry point (may reschedule a running timer)
    fn change_speed(&self, ms: f64) -> Result<(), EffectError>;

    fn set_config(&self, key: &str, value: &Value) -> Result<(), EffectError>;
}

impl MachineControl for Scheduler {
    fn change_speed(&self, ms: f64) -> Result<(), EffectError> {
        if !ms.is_finite() || ms <= 0.0 {
            return Err(EffectError::invalid("speed", format!("{ms} is not a positive interval")));
        }
        self.set_speed(ms.round() as u64);
        Ok(())
    }

    fn set_config(&self, key: &str, value: &Value) -> Result<(), EffectError> {
        Scheduler::set_config(self, key, value)
    }
}

/// What the bridge did with an edit
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeAction {
    /// Path outside the namespace or too short
    Ignored,
    Speed(f64),
    Color(TaggedColor),
    Config { key: String, value: Value },
}

/// Translates `(path, value)` panel edits into machine calls
#[derive(Debug, Clone)]
pub struct BindingBridge {
    config: BridgeConfig,
    state: StateRecord,
}

impl BindingBridge {
    pub fn new(initial: Value, config: Option<BridgeConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
            state: StateRecord::new(initial),
        }
    }

    pub fn state(&self) -> &StateRecord {
        &self.state
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Overwrite `/effect/<key>` without calling the machine
    pub fn write_back(&mut self, key: &str, value: Value) {
        self.state = self.state.with_effect_value(key, value);
    }

    /// Apply one edit.
    ///
    /// Only `/effect/<key>[/...]` paths are handled. State is replaced before
    /// the machine is called, so a rejected value still shows in the panel.
    pub fn apply<C>(&mut self, control: &C, path: &str, value: Value) -> Result<BridgeAction, EffectError>
    where
        C: MachineControl + ?Sized,
    {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 || segments[0] != NAMESPACE {
            trace!(path, "ignoring state edit");
            return Ok(BridgeAction::Ignored);
        }
        let key = segments[1];
        self.state = self.state.with_effect_value(key, value.clone());

        if key == "speed" {
            let ms = number(key, &value)?;
            debug!(speed_ms = ms, "bridge speed change");
            control.change_speed(ms)?;
            return Ok(BridgeAction::Speed(ms));
        }

        if self.config.color_keys.iter().any(|k| k == key) {
            let h = self.state.effect_number("hue").unwrap_or(0.0);
            let s = self.state.effect_number("saturation").unwrap_or(100.0);
            let b = self.state.effect_number("brightness").unwrap_or(100.0);
            let color = TaggedColor::hsv(h, s / 100.0, b / 100.0);
            debug!(key, ?color, "bridge color change");
            control.set_config("color", &color.to_value())?;
            return Ok(BridgeAction::Color(color));
        }

        let value = match (self.config.scale_for(key), value.as_f64()) {
            (Some(scale), Some(n)) => serde_json::Number::from_f64(n * scale)
                .map(Value::Number)
                .unwrap_or(value),
            _ => value,
        };
        debug!(key, %value, "bridge config change");
        control.set_config(key, &value)?;
        Ok(BridgeAction::Config {
            key: key.to_string(),
            value,
        })
    }
}
