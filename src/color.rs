// Color model
// Tagged colors (RGB or HSV) and conversion to flat RGB triplets

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised when interpreting a color value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    #[error("Invalid color kind: {0}")]
    InvalidColorKind(String),

    #[error("Malformed color: {0}")]
    Malformed(String),
}

/// RGB color triplet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_lit(self) -> bool {
        self != Self::BLACK
    }

    pub fn to_hex(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Rgb> for (u8, u8, u8) {
    fn from(c: Rgb) -> Self {
        (c.r, c.g, c.b)
    }
}

/// Convert HSV to RGB
/// h: hue in degrees, any value (normalized into [0, 360))
/// s: saturation (0-1)
/// v: value/brightness (0-1)
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let h = h.rem_euclid(360.0);
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    Rgb::new(channel(r + m), channel(g + m), channel(b + m))
}

fn channel(f: f64) -> u8 {
    (f * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Color tagged with its representation.
///
/// Wire format is `{"mode": "rgb", "r", "g", "b"}` or
/// `{"mode": "hsv", "h", "s", "v"}`; `kind` is accepted in place of `mode`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TaggedColor {
    Rgb { r: u8, g: u8, b: u8 },
    Hsv { h: f64, s: f64, v: f64 },
}

impl TaggedColor {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::Rgb { r, g, b }
    }

    pub fn hsv(h: f64, s: f64, v: f64) -> Self {
        Self::Hsv { h, s, v }
    }

    /// Interpret a JSON value as a tagged color
    pub fn from_value(value: &Value) -> Result<Self, ColorError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ColorError::Malformed(format!("expected an object, got {value}")))?;
        let tag = obj
            .get("mode")
            .or_else(|| obj.get("kind"))
            .and_then(Value::as_str)
            .ok_or_else(|| ColorError::Malformed("missing color mode".to_string()))?;

        let num = |field: &str| {
            obj.get(field)
                .and_then(Value::as_f64)
                .ok_or_else(|| ColorError::Malformed(format!("{tag} color missing '{field}'")))
        };

        match tag {
            "rgb" => {
                let byte = |field: &str| {
                    let n = num(field)?;
                    if (0.0..=255.0).contains(&n) {
                        Ok(n.round() as u8)
                    } else {
                        Err(ColorError::Malformed(format!(
                            "channel '{field}' out of range: {n}"
                        )))
                    }
                };
                Ok(Self::Rgb {
                    r: byte("r")?,
                    g: byte("g")?,
                    b: byte("b")?,
                })
            }
            "hsv" => Ok(Self::Hsv {
                h: num("h")?,
                s: num("s")?,
                v: num("v")?,
            }),
            other => Err(ColorError::InvalidColorKind(other.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl<'de> Deserialize<'de> for TaggedColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl From<Rgb> for TaggedColor {
    fn from(c: Rgb) -> Self {
        Self::rgb(c.r, c.g, c.b)
    }
}

/// Convert a tagged color to RGB; RGB input passes through unchanged
pub fn to_rgb(color: &TaggedColor) -> Rgb {
    match *color {
        TaggedColor::Hsv { h, s, v } => hsv_to_rgb(h, s, v),
        TaggedColor::Rgb { r, g, b } => Rgb::new(r, g, b),
    }
}

/// Convert an untyped color value to RGB
pub fn value_to_rgb(value: &Value) -> Result<Rgb, ColorError> {
    TaggedColor::from_value(value).map(|c| to_rgb(&c))
}
