use std::fmt;
use std::str::FromStr;

use raqote::SolidSource;
use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Error, Result};

/// Non-premultiplied RGBA colour with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const YELLOW: Color = Color::rgb(1.0, 1.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Color { r, g, b, a: 1.0 }
    }

    /// Per-channel linear interpolation in RGB space.
    pub fn lerp(&self, other: &Color, t: f64) -> Color {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }

    fn channel_byte(value: f64) -> u8 {
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            Self::channel_byte(self.r),
            Self::channel_byte(self.g),
            Self::channel_byte(self.b),
            Self::channel_byte(self.a),
        ]
    }

    /// Paint source for raqote with the layer opacity folded into alpha.
    pub fn to_solid_source(&self, opacity: f64) -> SolidSource {
        let [r, g, b, _] = self.to_rgba8();
        let a = Self::channel_byte(self.a * opacity);
        SolidSource::from_unpremultiplied_argb(a, r, g, b)
    }

    /// CSS notation understood by MapLibre.
    pub fn to_css(&self) -> String {
        let [r, g, b, a] = self.to_rgba8();
        if a == 255 {
            format!("#{:02x}{:02x}{:02x}", r, g, b)
        } else {
            format!("rgba({}, {}, {}, {})", r, g, b, self.a.clamp(0.0, 1.0))
        }
    }
}

fn parse_hex_byte(string: &str) -> Result<f64> {
    let byte = u8::from_str_radix(string, 16)
        .map_err(|_| Error::from(format!("Invalid hex byte {string:?}")))?;
    Ok(f64::from(byte) / 255.0)
}

impl FromStr for Color {
    type Err = Error;

    /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` and
    /// `rgba(r, g, b, a)`.
    fn from_str(string: &str) -> Result<Self> {
        let string = string.trim();
        if let Some(hex) = string.strip_prefix('#') {
            if !hex.is_ascii() {
                return Err(format!("Invalid colour {string:?}").into());
            }
            return match hex.len() {
                3 => {
                    let digit = |i: usize| parse_hex_byte(&hex[i..i + 1].repeat(2));
                    Ok(Color::rgb(digit(0)?, digit(1)?, digit(2)?))
                },
                6 | 8 => Ok(Color {
                    r: parse_hex_byte(&hex[0..2])?,
                    g: parse_hex_byte(&hex[2..4])?,
                    b: parse_hex_byte(&hex[4..6])?,
                    a: if hex.len() == 8 { parse_hex_byte(&hex[6..8])? } else { 1.0 },
                }),
                _ => Err(format!("Invalid colour {string:?}").into()),
            };
        }

        let re = Regex::new(
            r"^rgba?\(\s*(?<r>\d{1,3})\s*,\s*(?<g>\d{1,3})\s*,\s*(?<b>\d{1,3})\s*(,\s*(?<a>[0-9.]+)\s*)?\)$",
        )?;
        let caps = re
            .captures(string)
            .ok_or_else(|| Error::from(format!("Invalid colour {string:?}")))?;
        let channel = |name: &str| -> Result<f64> {
            let value: u8 = caps[name]
                .parse()
                .map_err(|_| Error::from(format!("Channel out of range in {string:?}")))?;
            Ok(f64::from(value) / 255.0)
        };
        let a = match caps.name("a") {
            Some(alpha) => alpha
                .as_str()
                .parse::<f64>()
                .map_err(|_| Error::from(format!("Invalid alpha in {string:?}")))?,
            None => 1.0,
        };
        Ok(Color { r: channel("r")?, g: channel("g")?, b: channel("b")?, a: a.clamp(0.0, 1.0) })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

struct ColorVisitor;

impl Visitor<'_> for ColorVisitor {
    type Value = Color;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a CSS colour such as '#ff0000' or 'rgb(255, 0, 0)'")
    }

    fn visit_str<E>(self, string: &str) -> std::result::Result<Self::Value, E> where E: de::Error {
        string
            .parse()
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(string), &self))
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
        where D: Deserializer<'de> {
        deserializer.deserialize_str(ColorVisitor)
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where S: Serializer {
        serializer.serialize_str(&self.to_css())
    }
}
