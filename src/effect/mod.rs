//! LED effect engine.
//!
//! An effect is a small state machine that computes one frame of LED colors per
//! tick. The generic lifecycle (idle/running/paused, speed, LED buffer) lives in
//! [`EffectMachine`]; the per-effect behavior plugs in through the [`Effect`]
//! trait, either as a compiled-in builtin or as a sandboxed script loaded at
//! runtime.
//!
//! # Example
//!
//! ```
//! use led_preview::effect::{registry::effect_registry, EffectConfig};
//!
//! let factory = effect_registry().find("chase").unwrap();
//! let mut machine = factory.create(&EffectConfig::with_led_count(20)).unwrap();
//! machine.start();
//! machine.tick().unwrap();
//! assert_eq!(machine.leds().len(), 60);
//! ```

pub mod builtin;
mod machine;
pub mod preview;
pub mod registry;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

use crate::color::{self, ColorError, Rgb};

pub use machine::EffectMachine;

/// LED count used when a config does not name one (or names zero)
pub const DEFAULT_LED_COUNT: usize = 20;

// ── Errors ───────────────────────────────────────────────────────────

/// Failure raised by an effect hook or by the machine around it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    #[error("{hook} hook failed: {message}")]
    Hook { hook: &'static str, message: String },

    #[error("Effect produced {actual} bytes, expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    #[error("Invalid value for '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    #[error(transparent)]
    Color(#[from] ColorError),
}

impl EffectError {
    pub fn hook(hook: &'static str, message: impl fmt::Display) -> Self {
        Self::Hook {
            hook,
            message: message.to_string(),
        }
    }

    pub fn invalid(key: &str, message: impl fmt::Display) -> Self {
        Self::InvalidConfig {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

// ── LED buffer ───────────────────────────────────────────────────────

/// Flat RGB byte buffer, LED `i` at offset `i * 3`
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LedBuffer(Vec<u8>);

impl LedBuffer {
    /// Zeroed buffer for `led_count` LEDs
    pub fn blank(led_count: usize) -> Self {
        Self(vec![0; led_count * 3])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn led_count(&self) -> usize {
        self.0.len() / 3
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        let o = index.checked_mul(3)?;
        let px = self.0.get(o..o + 3)?;
        Some(Rgb::new(px[0], px[1], px[2]))
    }

    /// Paint one LED; out-of-range indices are ignored
    pub fn set(&mut self, index: usize, color: Rgb) {
        let o = index * 3;
        if let Some(px) = self.0.get_mut(o..o + 3) {
            px.copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    pub fn fill(&mut self, color: Rgb) {
        for px in self.0.chunks_exact_mut(3) {
            px.copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = Rgb> + '_ {
        self.0.chunks_exact(3).map(|p| Rgb::new(p[0], p[1], p[2]))
    }

    /// Indices of LEDs that are not black
    pub fn lit(&self) -> Vec<usize> {
        self.pixels()
            .enumerate()
            .filter(|(_, c)| c.is_lit())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Space-separated hex triplets, one per LED
    pub fn to_hex(&self) -> String {
        self.pixels()
            .map(Rgb::to_hex)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Deref for LedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for LedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedBuffer[{}]({})", self.led_count(), self.to_hex())
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Lifecycle state of an effect machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        })
    }
}

// ── Effect hooks ─────────────────────────────────────────────────────

/// Per-effect behavior driven by an [`EffectMachine`]
pub trait Effect: Send {
    /// Compute one frame. Must return a complete buffer of `led_count * 3` bytes.
    fn on_tick(&mut self, led_count: usize) -> Result<LedBuffer, EffectError>;

    /// Restore effect-local counters to their initial values
    fn on_reset(&mut self) -> Result<(), EffectError> {
        Ok(())
    }

    /// Apply an effect-specific parameter. Unknown keys are ignored.
    fn on_set_config(&mut self, _key: &str, _value: &Value) -> Result<(), EffectError> {
        Ok(())
    }
}

/// Constructor for effect machines, registered by effect id
pub trait EffectFactory: Send + Sync {
    fn id(&self) -> &str;

    /// User-facing display name
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn create(&self, config: &EffectConfig) -> Result<EffectMachine, EffectError>;
}

// ── Factory config ───────────────────────────────────────────────────

/// Options passed to an effect factory
///
/// Zero or missing `ledCount`/`speed` fall back to defaults. Effect-specific
/// keys (`color`, `chaseCount`, ...) are kept verbatim in `params`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u64>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl EffectConfig {
    pub fn with_led_count(led_count: usize) -> Self {
        Self {
            led_count: Some(led_count),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn led_count(&self) -> usize {
        self.led_count
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_LED_COUNT)
    }

    pub fn speed_or(&self, default: u64) -> u64 {
        self.speed.filter(|&s| s > 0).unwrap_or(default)
    }

    /// Positive integer parameter, zero/absent falls back to `default`
    pub fn count_or(&self, key: &str, default: usize) -> Result<usize, EffectError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) if v.as_f64() == Some(0.0) => Ok(default),
            Some(v) => positive_count(key, v),
        }
    }

    /// Numeric parameter, zero/absent falls back to `default`
    pub fn number_or(&self, key: &str, default: f64) -> Result<f64, EffectError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => number(key, v).map(|n| if n == 0.0 { default } else { n }),
        }
    }

    /// Numeric parameter where only absence falls back to `default`
    pub fn number_present_or(&self, key: &str, default: f64) -> Result<f64, EffectError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => number(key, v),
        }
    }

    pub fn color_or(&self, key: &str, default: Rgb) -> Result<Rgb, EffectError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => Ok(color::value_to_rgb(v)?),
        }
    }
}

/// Interpret a config value as a finite number
pub fn number(key: &str, value: &Value) -> Result<f64, EffectError> {
    value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| EffectError::invalid(key, format!("expected a number, got {value}")))
}

/// Interpret a config value as a count of at least one
pub fn positive_count(key: &str, value: &Value) -> Result<usize, EffectError> {
    let n = number(key, value)?.trunc();
    if n >= 1.0 {
        Ok(n as usize)
    } else {
        Err(EffectError::invalid(key, format!("expected a positive count, got {value}")))
    }
}
