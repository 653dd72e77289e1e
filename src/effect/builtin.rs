// Builtin effects
// Compiled-in Blink, Chase, Rainbow and Wave, each with an explicit state struct

use serde_json::Value;

use super::{
    number, positive_count, Effect, EffectConfig, EffectError, EffectFactory, EffectMachine,
    LedBuffer,
};
use crate::color::{self, hsv_to_rgb, Rgb};

/// Blink effect - all LEDs toggle on/off in unison each tick
#[derive(Debug, Clone, PartialEq)]
pub struct BlinkEffect {
    pub color: Rgb,
    on: bool,
}

impl BlinkEffect {
    pub const DEFAULT_SPEED: u64 = 200;
    pub const DEFAULT_COLOR: Rgb = Rgb::new(217, 70, 239);

    pub fn new(color: Rgb) -> Self {
        Self { color, on: false }
    }

    pub fn from_config(cfg: &EffectConfig) -> Result<Self, EffectError> {
        Ok(Self::new(cfg.color_or("color", Self::DEFAULT_COLOR)?))
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Effect for BlinkEffect {
    fn on_tick(&mut self, led_count: usize) -> Result<LedBuffer, EffectError> {
        self.on = !self.on;
        let mut buf = LedBuffer::blank(led_count);
        if self.on {
            buf.fill(self.color);
        }
        Ok(buf)
    }

    fn on_reset(&mut self) -> Result<(), EffectError> {
        self.on = false;
        Ok(())
    }

    fn on_set_config(&mut self, key: &str, value: &Value) -> Result<(), EffectError> {
        if key == "color" {
            self.color = color::value_to_rgb(value)?;
        }
        Ok(())
    }
}

/// Chase effect - evenly spaced LEDs run around the strip
#[derive(Debug, Clone, PartialEq)]
pub struct ChaseEffect {
    pub color: Rgb,
    pub chase_count: usize,
    position: usize,
}

impl ChaseEffect {
    pub const DEFAULT_SPEED: u64 = 80;
    pub const DEFAULT_COLOR: Rgb = Rgb::new(251, 191, 36);
    pub const DEFAULT_CHASE_COUNT: usize = 2;

    pub fn new(color: Rgb, chase_count: usize) -> Self {
        Self {
            color,
            chase_count: chase_count.max(1),
            position: 0,
        }
    }

    pub fn from_config(cfg: &EffectConfig) -> Result<Self, EffectError> {
        Ok(Self::new(
            cfg.color_or("color", Self::DEFAULT_COLOR)?,
            cfg.count_or("chaseCount", Self::DEFAULT_CHASE_COUNT)?,
        ))
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl Effect for ChaseEffect {
    fn on_tick(&mut self, led_count: usize) -> Result<LedBuffer, EffectError> {
        let mut buf = LedBuffer::blank(led_count);
        if led_count == 0 {
            return Ok(buf);
        }
        let gap = led_count / self.chase_count;
        for i in 0..self.chase_count {
            buf.set((self.position + gap * i) % led_count, self.color);
        }
        self.position = (self.position + 1) % led_count;
        Ok(buf)
    }

    fn on_reset(&mut self) -> Result<(), EffectError> {
        self.position = 0;
        Ok(())
    }

    fn on_set_config(&mut self, key: &str, value: &Value) -> Result<(), EffectError> {
        match key {
            "color" => self.color = color::value_to_rgb(value)?,
            "chaseCount" => self.chase_count = positive_count(key, value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Rainbow effect - each LED gets a hue offset that cycles forward each tick
#[derive(Debug, Clone, PartialEq)]
pub struct RainbowEffect {
    pub hue_step: f64,
    pub hue_spread: f64,
    pub saturation: f64,
    pub brightness: f64,
    offset: f64,
}

impl RainbowEffect {
    pub const DEFAULT_SPEED: u64 = 100;
    pub const DEFAULT_HUE_STEP: f64 = 10.0;
    pub const DEFAULT_HUE_SPREAD: f64 = 18.0;

    pub fn from_config(cfg: &EffectConfig) -> Result<Self, EffectError> {
        Ok(Self {
            hue_step: cfg.number_or("hueStep", Self::DEFAULT_HUE_STEP)?,
            hue_spread: cfg.number_or("hueSpread", Self::DEFAULT_HUE_SPREAD)?,
            saturation: cfg.number_present_or("saturation", 1.0)?,
            brightness: cfg.number_present_or("brightness", 1.0)?,
            offset: 0.0,
        })
    }

    /// Current hue offset in degrees, in [0, 360)
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Hue of LED `index` for the next frame
    pub fn hue_at(&self, index: usize) -> f64 {
        (index as f64 * self.hue_spread + self.offset).rem_euclid(360.0)
    }
}

impl Default for RainbowEffect {
    fn default() -> Self {
        Self {
            hue_step: Self::DEFAULT_HUE_STEP,
            hue_spread: Self::DEFAULT_HUE_SPREAD,
            saturation: 1.0,
            brightness: 1.0,
            offset: 0.0,
        }
    }
}

impl Effect for RainbowEffect {
    fn on_tick(&mut self, led_count: usize) -> Result<LedBuffer, EffectError> {
        let mut buf = LedBuffer::blank(led_count);
        for i in 0..led_count {
            buf.set(i, hsv_to_rgb(self.hue_at(i), self.saturation, self.brightness));
        }
        self.offset = (self.offset + self.hue_step).rem_euclid(360.0);
        Ok(buf)
    }

    fn on_reset(&mut self) -> Result<(), EffectError> {
        self.offset = 0.0;
        Ok(())
    }

    fn on_set_config(&mut self, key: &str, value: &Value) -> Result<(), EffectError> {
        match key {
            "hueStep" => self.hue_step = number(key, value)?,
            "hueSpread" => self.hue_spread = number(key, value)?,
            "saturation" => self.saturation = number(key, value)?,
            "brightness" => self.brightness = number(key, value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Wave effect - a run of adjacent LEDs slides along the strip
#[derive(Debug, Clone, PartialEq)]
pub struct WaveEffect {
    pub color: Rgb,
    pub wave_width: usize,
    position: usize,
}

impl WaveEffect {
    pub const DEFAULT_SPEED: u64 = 100;
    pub const DEFAULT_COLOR: Rgb = Rgb::new(52, 211, 153);
    pub const DEFAULT_WAVE_WIDTH: usize = 5;

    pub fn new(color: Rgb, wave_width: usize) -> Self {
        Self {
            color,
            wave_width,
            position: 0,
        }
    }

    pub fn from_config(cfg: &EffectConfig) -> Result<Self, EffectError> {
        Ok(Self::new(
            cfg.color_or("color", Self::DEFAULT_COLOR)?,
            cfg.count_or("waveWidth", Self::DEFAULT_WAVE_WIDTH)?,
        ))
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Start the next frame at `position` (wrapped into the strip on tick)
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }
}

impl Effect for WaveEffect {
    fn on_tick(&mut self, led_count: usize) -> Result<LedBuffer, EffectError> {
        let mut buf = LedBuffer::blank(led_count);
        if led_count == 0 {
            return Ok(buf);
        }
        for i in 0..self.wave_width {
            buf.set((self.position + i) % led_count, self.color);
        }
        self.position = (self.position + 1) % led_count;
        Ok(buf)
    }

    fn on_reset(&mut self) -> Result<(), EffectError> {
        self.position = 0;
        Ok(())
    }

    fn on_set_config(&mut self, key: &str, value: &Value) -> Result<(), EffectError> {
        match key {
            "color" => self.color = color::value_to_rgb(value)?,
            "waveWidth" => self.wave_width = positive_count(key, value)?,
            _ => {}
        }
        Ok(())
    }
}

// ── Factories ────────────────────────────────────────────────────────

type BuildFn = fn(&EffectConfig) -> Result<(Box<dyn Effect>, u64), EffectError>;

/// Factory for a compiled-in effect
pub struct BuiltinFactory {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    build: BuildFn,
}

impl EffectFactory for BuiltinFactory {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn create(&self, config: &EffectConfig) -> Result<EffectMachine, EffectError> {
        let (effect, default_speed) = (self.build)(config)?;
        Ok(EffectMachine::new(
            self.id,
            config.led_count(),
            config.speed_or(default_speed),
            effect,
        ))
    }
}

fn build_blink(cfg: &EffectConfig) -> Result<(Box<dyn Effect>, u64), EffectError> {
    let effect = BlinkEffect::from_config(cfg)?;
    Ok((Box::new(effect), BlinkEffect::DEFAULT_SPEED))
}

fn build_chase(cfg: &EffectConfig) -> Result<(Box<dyn Effect>, u64), EffectError> {
    let effect = ChaseEffect::from_config(cfg)?;
    Ok((Box::new(effect), ChaseEffect::DEFAULT_SPEED))
}

fn build_rainbow(cfg: &EffectConfig) -> Result<(Box<dyn Effect>, u64), EffectError> {
    let effect = RainbowEffect::from_config(cfg)?;
    Ok((Box::new(effect), RainbowEffect::DEFAULT_SPEED))
}

fn build_wave(cfg: &EffectConfig) -> Result<(Box<dyn Effect>, u64), EffectError> {
    let effect = WaveEffect::from_config(cfg)?;
    Ok((Box::new(effect), WaveEffect::DEFAULT_SPEED))
}

/// All builtin effect factories
pub fn builtins() -> Vec<BuiltinFactory> {
    vec![
        BuiltinFactory {
            id: "blink",
            name: "Blink",
            description: "All LEDs toggle on/off in unison",
            build: build_blink,
        },
        BuiltinFactory {
            id: "chase",
            name: "Chase",
            description: "Evenly spaced LEDs chase around the ring",
            build: build_chase,
        },
        BuiltinFactory {
            id: "rainbow",
            name: "Rainbow",
            description: "A rotating rainbow across every LED",
            build: build_rainbow,
        },
        BuiltinFactory {
            id: "wave",
            name: "Wave",
            description: "A band of adjacent LEDs slides along the strip",
            build: build_wave,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::MachineStatus;
    use serde_json::json;

    #[test]
    fn test_blink_first_tick_paints() {
        let mut blink = BlinkEffect::new(BlinkEffect::DEFAULT_COLOR);
        let frame = blink.on_tick(20).unwrap();
        assert_eq!(frame.lit().len(), 20);
        assert_eq!(frame.get(0), Some(Rgb::new(217, 70, 239)));

        let frame = blink.on_tick(20).unwrap();
        assert!(frame.lit().is_empty());

        blink.on_tick(20).unwrap();
        blink.on_reset().unwrap();
        assert!(!blink.is_on());
    }

    #[test]
    fn test_chase_positions() {
        let mut chase = ChaseEffect::new(ChaseEffect::DEFAULT_COLOR, 2);
        assert_eq!(chase.on_tick(20).unwrap().lit(), vec![0, 10]);
        assert_eq!(chase.on_tick(20).unwrap().lit(), vec![1, 11]);
        assert_eq!(chase.position(), 2);

        chase.on_reset().unwrap();
        assert_eq!(chase.position(), 0);
    }

    #[test]
    fn test_chase_wraps() {
        let mut chase = ChaseEffect::new(Rgb::new(1, 1, 1), 3);
        for _ in 0..19 {
            chase.on_tick(20).unwrap();
        }
        // gap = 6: 19, 25 % 20 = 5, 31 % 20 = 11
        assert_eq!(chase.on_tick(20).unwrap().lit(), vec![5, 11, 19]);
        assert_eq!(chase.position(), 0);
    }

    #[test]
    fn test_chase_set_config() {
        let mut chase = ChaseEffect::new(ChaseEffect::DEFAULT_COLOR, 2);
        chase.on_set_config("chaseCount", &json!(4)).unwrap();
        chase
            .on_set_config("color", &json!({"mode": "hsv", "h": 0, "s": 1, "v": 1}))
            .unwrap();
        let frame = chase.on_tick(20).unwrap();
        assert_eq!(frame.lit(), vec![0, 5, 10, 15]);
        assert_eq!(frame.get(5), Some(Rgb::new(255, 0, 0)));

        assert!(chase.on_set_config("chaseCount", &json!(0)).is_err());
        assert!(chase.on_set_config("unknown", &json!(1)).is_ok());
    }

    #[test]
    fn test_wave_wraps_around() {
        let mut wave = WaveEffect::new(WaveEffect::DEFAULT_COLOR, 5).with_position(17);
        let frame = wave.on_tick(20).unwrap();
        assert_eq!(frame.lit(), vec![0, 1, 17, 18, 19]);
        assert_eq!(wave.position(), 18);
    }

    #[test]
    fn test_rainbow_hues() {
        let mut rainbow = RainbowEffect::default();
        assert_eq!(rainbow.hue_at(0), 0.0);
        assert_eq!(rainbow.hue_at(1), 18.0);

        let frame = rainbow.on_tick(20).unwrap();
        assert_eq!(frame.get(0), Some(hsv_to_rgb(0.0, 1.0, 1.0)));
        assert_eq!(frame.get(1), Some(hsv_to_rgb(18.0, 1.0, 1.0)));
        assert_eq!(rainbow.offset(), 10.0);
        assert_eq!(rainbow.hue_at(0), 10.0);

        let frame = rainbow.on_tick(20).unwrap();
        assert_eq!(frame.get(0), Some(hsv_to_rgb(10.0, 1.0, 1.0)));
    }

    #[test]
    fn test_rainbow_offset_wraps() {
        let mut rainbow = RainbowEffect::default();
        for _ in 0..36 {
            rainbow.on_tick(4).unwrap();
        }
        assert_eq!(rainbow.offset(), 0.0);
    }

    #[test]
    fn test_rainbow_config_defaults() {
        let cfg = EffectConfig::default()
            .param("hueStep", 0)
            .param("saturation", 0.5);
        let rainbow = RainbowEffect::from_config(&cfg).unwrap();
        assert_eq!(rainbow.hue_step, 10.0);
        assert_eq!(rainbow.hue_spread, 18.0);
        assert_eq!(rainbow.saturation, 0.5);
        assert_eq!(rainbow.brightness, 1.0);
    }

    #[test]
    fn test_builtin_factories() {
        let factories = builtins();
        let ids: Vec<_> = factories.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["blink", "chase", "rainbow", "wave"]);

        let chase = &factories[1];
        let machine = chase.create(&EffectConfig::default()).unwrap();
        assert_eq!(machine.led_count(), 20);
        assert_eq!(machine.speed(), 80);
        assert_eq!(machine.status(), MachineStatus::Idle);

        let machine = chase
            .create(&EffectConfig::with_led_count(30).param("chaseCount", 3))
            .unwrap();
        assert_eq!(machine.leds().len(), 90);
    }

    #[test]
    fn test_machine_stop_resets_chase() {
        let factories = builtins();
        let mut machine = factories[1].create(&EffectConfig::default()).unwrap();
        machine.start();
        machine.tick().unwrap();
        machine.tick().unwrap();
        assert_eq!(machine.leds().lit(), vec![1, 11]);

        machine.stop().unwrap();
        assert!(machine.leds().lit().is_empty());
        machine.start();
        machine.tick().unwrap();
        assert_eq!(machine.leds().lit(), vec![0, 10]);
    }
}
