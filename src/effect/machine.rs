// Generic effect lifecycle
// Wraps an Effect's hooks with idle/running/paused state and the LED buffer

use serde_json::Value;
use tracing::debug;

use super::{number, Effect, EffectError, LedBuffer, MachineStatus};

/// Effect state machine
///
/// Owns its LED buffer exclusively. The buffer length is fixed at
/// `led_count * 3` for the lifetime of the machine; ticks and `stop` replace it
/// wholesale rather than resizing it.
pub struct EffectMachine {
    effect_id: String,
    status: MachineStatus,
    speed: u64,
    led_count: usize,
    leds: LedBuffer,
    effect: Box<dyn Effect>,
}

impl EffectMachine {
    pub fn new(
        effect_id: impl Into<String>,
        led_count: usize,
        speed: u64,
        effect: Box<dyn Effect>,
    ) -> Self {
        Self {
            effect_id: effect_id.into(),
            status: MachineStatus::Idle,
            speed: speed.max(1),
            led_count,
            leds: LedBuffer::blank(led_count),
            effect,
        }
    }

    pub fn effect_id(&self) -> &str {
        &self.effect_id
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    /// Tick interval in milliseconds
    pub fn speed(&self) -> u64 {
        self.speed
    }

    pub fn led_count(&self) -> usize {
        self.led_count
    }

    pub fn leds(&self) -> &LedBuffer {
        &self.leds
    }

    /// idle -> running. Returns whether the status changed.
    pub fn start(&mut self) -> bool {
        self.transition(MachineStatus::Idle, MachineStatus::Running)
    }

    /// running -> paused
    pub fn pause(&mut self) -> bool {
        self.transition(MachineStatus::Running, MachineStatus::Paused)
    }

    /// paused -> running
    pub fn resume(&mut self) -> bool {
        self.transition(MachineStatus::Paused, MachineStatus::Running)
    }

    fn transition(&mut self, from: MachineStatus, to: MachineStatus) -> bool {
        if self.status != from {
            return false;
        }
        debug!(effect_id = %self.effect_id, %from, %to, "status change");
        self.status = to;
        true
    }

    /// Return to idle from any state.
    ///
    /// The reset hook runs and the buffer is re-zeroed even when the hook
    /// fails; its error is returned afterwards.
    pub fn stop(&mut self) -> Result<(), EffectError> {
        debug!(effect_id = %self.effect_id, from = %self.status, "stop");
        self.status = MachineStatus::Idle;
        let reset = self.effect.on_reset();
        self.leds = LedBuffer::blank(self.led_count);
        reset
    }

    /// Compute one frame if running.
    ///
    /// Returns `Ok(false)` without touching the buffer when not running. A
    /// frame of the wrong length is rejected and the previous buffer kept.
    pub fn tick(&mut self) -> Result<bool, EffectError> {
        if self.status != MachineStatus::Running {
            return Ok(false);
        }
        let frame = self.effect.on_tick(self.led_count)?;
        let expected = self.led_count * 3;
        if frame.len() != expected {
            return Err(EffectError::BufferLength {
                expected,
                actual: frame.len(),
            });
        }
        self.leds = frame;
        Ok(true)
    }

    /// Set the tick interval. Intervals are at least 1 ms.
    pub fn set_speed(&mut self, ms: u64) {
        self.speed = ms.max(1);
    }

    /// `speed` maps to [`set_speed`](Self::set_speed); other keys go to the
    /// effect's config hook.
    pub fn set_config(&mut self, key: &str, value: &Value) -> Result<(), EffectError> {
        if key == "speed" {
            let ms = number(key, value)?;
            if ms <= 0.0 {
                return Err(EffectError::invalid(key, "speed must be positive"));
            }
            self.set_speed(ms.round() as u64);
            return Ok(());
        }
        self.effect.on_set_config(key, value)
    }
}

impl std::fmt::Debug for EffectMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectMachine")
            .field("effect_id", &self.effect_id)
            .field("status", &self.status)
            .field("speed", &self.speed)
            .field("led_count", &self.led_count)
            .finish_non_exhaustive()
    }
}
