// Preview session
// One effect machine with its scheduler, panel and binding bridge, torn down together

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::device::DeviceConfig;
use crate::effect::{EffectConfig, EffectError, EffectFactory, LedBuffer, MachineStatus};
use crate::loader::{LoadedEffect, Panel};
use crate::scheduler::{Scheduler, TickErrorPolicy};
use crate::ui::{
    BindingBridge, BridgeAction, Control, MachineControl, PanelLine, SpeedConfig, StateRecord,
    UiSpecError, WidgetTree,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error(transparent)]
    Panel(#[from] UiSpecError),

    #[error("No control at index {0}")]
    NoControl(usize),
}

/// How a session sizes and drives its machine
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// LED count when no device is given (0 means the effect default)
    pub led_count: usize,
    pub device: Option<DeviceConfig>,
    pub policy: TickErrorPolicy,
}

impl SessionOptions {
    /// Device strips win over an explicit count
    pub fn resolved_led_count(&self) -> usize {
        match &self.device {
            Some(device) => device.led_count(),
            None => self.led_count,
        }
    }
}

/// Speed edits from the panel are clamped to the declared range
struct SessionControl<'a> {
    scheduler: &'a Scheduler,
    speed: SpeedConfig,
}

impl MachineControl for SessionControl<'_> {
    fn change_speed(&self, ms: f64) -> Result<(), EffectError> {
        if !ms.is_finite() || ms <= 0.0 {
            return Err(EffectError::invalid("speed", format!("{ms} is not a positive interval")));
        }
        let clamped = self.speed.clamp(ms);
        debug!(requested = ms, speed_ms = clamped, "session speed change");
        self.scheduler.set_speed(clamped);
        Ok(())
    }

    fn set_config(&self, key: &str, value: &Value) -> Result<(), EffectError> {
        self.scheduler.set_config(key, value)
    }
}

pub struct PreviewSession {
    effect_id: String,
    name: String,
    scheduler: Scheduler,
    bridge: BindingBridge,
    panel: Option<Panel>,
    tree: Option<WidgetTree>,
    rendered: StateRecord,
    speed: SpeedConfig,
    device: Option<DeviceConfig>,
}

impl PreviewSession {
    /// Session for an effect produced by the loader
    pub fn from_loaded(loaded: &LoadedEffect, options: SessionOptions) -> Result<Self, SessionError> {
        Self::new(loaded.factory.as_ref(), Some(loaded.panel.clone()), options)
    }

    /// Session for any factory, optionally with a panel
    pub fn new(
        factory: &dyn EffectFactory,
        panel: Option<Panel>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let initial = panel
            .as_ref()
            .map(Panel::initial_state)
            .unwrap_or_else(|| json!({}));
        let state = StateRecord::new(initial.clone());

        let mut config = EffectConfig::default();
        let led_count = options.resolved_led_count();
        if led_count > 0 {
            config.led_count = Some(led_count);
        }
        // A panel that shows a speed starts the machine at that speed
        config.speed = state
            .effect_number("speed")
            .filter(|ms| *ms >= 1.0)
            .map(|ms| ms.round() as u64);

        let machine = factory.create(&config)?;
        info!(
            effect_id = factory.id(),
            leds = machine.led_count(),
            speed_ms = machine.speed(),
            "session created"
        );

        let tree = panel.as_ref().map(|p| p.build(&state)).transpose()?;
        let speed = panel.as_ref().map(Panel::speed_config).unwrap_or_default();
        let bridge_config = panel.as_ref().and_then(Panel::bridge_config);

        Ok(Self {
            effect_id: factory.id().to_string(),
            name: factory.name().to_string(),
            scheduler: Scheduler::with_policy(machine, options.policy),
            bridge: BindingBridge::new(initial, bridge_config),
            panel,
            tree,
            rendered: state,
            speed,
            device: options.device,
        })
    }

    pub fn effect_id(&self) -> &str {
        &self.effect_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn device(&self) -> Option<&DeviceConfig> {
        self.device.as_ref()
    }

    pub fn speed_range(&self) -> SpeedConfig {
        self.speed
    }

    pub fn status(&self) -> MachineStatus {
        self.scheduler.status()
    }

    pub fn speed(&self) -> u64 {
        self.scheduler.speed()
    }

    pub fn leds(&self) -> LedBuffer {
        self.scheduler.leds()
    }

    pub fn state(&self) -> &StateRecord {
        self.bridge.state()
    }

    /// Start when idle, stop otherwise
    pub fn toggle_run(&self) -> Result<MachineStatus, EffectError> {
        if self.status() == MachineStatus::Idle {
            self.scheduler.start();
        } else {
            self.scheduler.stop()?;
        }
        Ok(self.status())
    }

    /// Apply one panel edit through the bridge
    pub fn edit(&mut self, path: &str, value: Value) -> Result<BridgeAction, SessionError> {
        let control = SessionControl {
            scheduler: &self.scheduler,
            speed: self.speed,
        };
        let result = self.bridge.apply(&control, path, value);
        if let Ok(BridgeAction::Speed(_)) = result {
            let running = self.speed();
            if self.state().effect_number("speed") != Some(running as f64) {
                self.bridge.write_back("speed", json!(running));
            }
        }
        self.refresh_panel()?;
        Ok(result?)
    }

    /// Step the speed by `delta_ms` within the panel's range
    pub fn nudge_speed(&mut self, delta_ms: i64) -> Result<BridgeAction, SessionError> {
        let next = self.speed.clamp(self.speed() as f64 + delta_ms as f64);
        self.edit("/effect/speed", json!(next))
    }

    pub fn controls(&self) -> Vec<Control> {
        self.tree.as_ref().map(WidgetTree::controls).unwrap_or_default()
    }

    /// Move control `index` by `steps` of its step size
    pub fn adjust_control(&mut self, index: usize, steps: i32) -> Result<BridgeAction, SessionError> {
        let control = self
            .controls()
            .into_iter()
            .nth(index)
            .ok_or(SessionError::NoControl(index))?;
        let current = self
            .state()
            .get(&control.path)
            .and_then(Value::as_f64)
            .unwrap_or(control.min);
        self.edit(&control.path, number_value(control.adjust(current, steps)))
    }

    /// Panel lines rendered against the current state
    pub fn panel_lines(&self) -> Vec<PanelLine> {
        self.tree
            .as_ref()
            .map(|tree| tree.render(self.bridge.state()))
            .unwrap_or_default()
    }

    // Script panels are re-run when the state record changes
    fn refresh_panel(&mut self) -> Result<(), UiSpecError> {
        let state = self.bridge.state();
        if state.ptr_eq(&self.rendered) {
            return Ok(());
        }
        if let Some(panel) = self.panel.as_ref().filter(|p| p.rebuilds_on_change()) {
            self.tree = Some(panel.build(state)?);
        }
        self.rendered = state.clone();
        Ok(())
    }

    /// Stop the machine and cancel its timer
    pub fn close(self) -> Result<(), EffectError> {
        debug!(effect_id = %self.effect_id, "closing session");
        self.scheduler.stop()
    }
}

/// Whole numbers stay integers in the state record
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}
