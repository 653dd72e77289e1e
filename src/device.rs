// Device geometry
// Strip layout and LED coordinates read by visualizers

use std::collections::{BTreeMap, HashSet};

use effect_source::{fetch_json, validate_id, EffectSource, FetchError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors loading a device description
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid device config: {0}")]
    Validation(String),
}

/// Device manifest (`devices/manifest.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceManifest {
    #[serde(default)]
    pub devices: Vec<String>,
}

impl DeviceManifest {
    /// The only device, when exactly one is listed
    pub fn auto_select(&self) -> Option<&str> {
        match self.devices.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLed {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStrip {
    pub id: String,
    pub name: String,
    pub led_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub leds: Vec<DeviceLed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotorGuard {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_origin() -> String {
    "center".to_string()
}

/// Device description (`devices/<id>/config.json`)
///
/// Coordinates use a center origin with y pointing up, in `coordinate_unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_unit")]
    pub coordinate_unit: String,
    pub canvas: Canvas,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotor_guards: Option<BTreeMap<String, RotorGuard>>,
    pub strips: Vec<DeviceStrip>,
}

fn default_unit() -> String {
    "mm".to_string()
}

/// An LED placed on the canvas, addressed by its offset in the shared buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedPlacement {
    pub buffer_index: usize,
    pub x: f64,
    pub y: f64,
}

impl DeviceConfig {
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        let config: DeviceConfig =
            serde_json::from_str(json).map_err(|e| DeviceError::Validation(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Total LEDs across all strips; the preview buffer is sized from this
    pub fn led_count(&self) -> usize {
        self.strips.iter().map(|s| s.led_count).sum()
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.strips.is_empty() {
            return Err(DeviceError::Validation(format!("{} has no strips", self.id)));
        }
        if self.canvas.width <= 0.0 || self.canvas.height <= 0.0 {
            return Err(DeviceError::Validation(format!(
                "{} canvas must have a positive size",
                self.id
            )));
        }
        for strip in &self.strips {
            let mut seen = HashSet::new();
            for led in &strip.leds {
                if led.index >= strip.led_count {
                    return Err(DeviceError::Validation(format!(
                        "strip {} LED index {} out of range (ledCount {})",
                        strip.id, led.index, strip.led_count
                    )));
                }
                if !seen.insert(led.index) {
                    return Err(DeviceError::Validation(format!(
                        "strip {} places LED {} twice",
                        strip.id, led.index
                    )));
                }
                if let (Some(guard), Some(guards)) = (&led.guard, &self.rotor_guards) {
                    if !guards.contains_key(guard) {
                        return Err(DeviceError::Validation(format!(
                            "strip {} LED {} references unknown guard {guard}",
                            strip.id, led.index
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// All placed LEDs. Strips are laid out back to back in the buffer.
    pub fn placements(&self) -> Vec<LedPlacement> {
        let mut out = Vec::new();
        let mut offset = 0;
        for strip in &self.strips {
            for led in &strip.leds {
                out.push(LedPlacement {
                    buffer_index: offset + led.index,
                    x: led.x,
                    y: led.y,
                });
            }
            offset += strip.led_count;
        }
        out
    }

    /// Map a canvas coordinate to a `(col, row)` cell of a `cols x rows` grid
    /// (top-left origin, rows growing downward)
    pub fn to_cell(&self, x: f64, y: f64, cols: u16, rows: u16) -> (u16, u16) {
        let fx = (x / self.canvas.width + 0.5).clamp(0.0, 1.0);
        let fy = (0.5 - y / self.canvas.height).clamp(0.0, 1.0);
        let col = (fx * (cols.saturating_sub(1)) as f64).round() as u16;
        let row = (fy * (rows.saturating_sub(1)) as f64).round() as u16;
        (col, row)
    }
}

/// Load the device manifest
pub async fn load_manifest(source: &dyn EffectSource) -> Result<DeviceManifest, DeviceError> {
    Ok(fetch_json(source, "manifest.json").await?)
}

/// Load and validate one device description
pub async fn load_device(source: &dyn EffectSource, id: &str) -> Result<DeviceConfig, DeviceError> {
    validate_id(id)?;
    let config: DeviceConfig = fetch_json(source, &format!("{id}/config.json")).await?;
    config.validate()?;
    debug!(device = %config.id, leds = config.led_count(), "loaded device");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use effect_source::MemorySource;
    use serde_json::json;

    fn two_strips() -> DeviceConfig {
        serde_json::from_value(json!({
            "id": "quad",
            "name": "Quad",
            "description": "Two arms",
            "coordinateUnit": "mm",
            "canvas": { "width": 200, "height": 100, "origin": "center" },
            "rotorGuards": { "front": { "cx": 0, "cy": 40, "radius": 10 } },
            "strips": [
                { "id": "a", "name": "Arm A", "ledCount": 3,
                  "leds": [{ "index": 0, "x": -100, "y": 50 }, { "index": 2, "x": 0, "y": 0, "guard": "front" }] },
                { "id": "b", "name": "Arm B", "ledCount": 2,
                  "leds": [{ "index": 1, "x": 100, "y": -50 }] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_led_count_sums_strips() {
        let device = two_strips();
        assert_eq!(device.led_count(), 5);
        assert!(device.validate().is_ok());
    }

    #[test]
    fn test_placements_offset_by_strip() {
        let indices: Vec<_> = two_strips()
            .placements()
            .iter()
            .map(|p| p.buffer_index)
            .collect();
        assert_eq!(indices, vec![0, 2, 4]);
    }

    #[test]
    fn test_to_cell() {
        let device = two_strips();
        assert_eq!(device.to_cell(-100.0, 50.0, 21, 11), (0, 0));
        assert_eq!(device.to_cell(0.0, 0.0, 21, 11), (10, 5));
        assert_eq!(device.to_cell(100.0, -50.0, 21, 11), (20, 10));
    }

    #[test]
    fn test_validation() {
        let mut device = two_strips();
        device.strips[0].leds[0].index = 3;
        assert!(matches!(device.validate(), Err(DeviceError::Validation(_))));

        let mut device = two_strips();
        device.strips[0].leds[1].guard = Some("rear".into());
        assert!(device.validate().is_err());

        let mut device = two_strips();
        device.strips[1].leds.push(DeviceLed {
            index: 1,
            x: 0.0,
            y: 0.0,
            guard: None,
        });
        assert!(device.validate().is_err());
    }

    #[test]
    fn test_manifest_auto_select() {
        let one = DeviceManifest {
            devices: vec!["ring-20".into()],
        };
        assert_eq!(one.auto_select(), Some("ring-20"));
        let two = DeviceManifest {
            devices: vec!["a".into(), "b".into()],
        };
        assert_eq!(two.auto_select(), None);
    }

    #[tokio::test]
    async fn test_load_device() {
        let source = MemorySource::new();
        source.insert("manifest.json", r#"{"devices": ["quad"]}"#);
        source.insert(
            "quad/config.json",
            serde_json::to_string(&two_strips()).unwrap(),
        );

        let manifest = load_manifest(&source).await.unwrap();
        let id = manifest.auto_select().unwrap();
        let device = load_device(&source, id).await.unwrap();
        assert_eq!(device.name, "Quad");

        let err = load_device(&source, "missing").await.unwrap_err();
        assert!(matches!(err, DeviceError::Fetch(FetchError::NotFound(_))));
    }
}
