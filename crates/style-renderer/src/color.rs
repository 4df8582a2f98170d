//! Colour parsing and 8-bit channel conversion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output channel of an RGBA image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
            Channel::Alpha => "alpha",
        }
    }

    pub fn is_alpha(&self) -> bool {
        matches!(self, Channel::Alpha)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RGB colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0)
    }

    /// Parse `#RRGGBB`, `#RGB` or a CSS colour name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.strip_prefix('#') {
            Some(hex) => parse_hex(hex),
            None => named_color(s),
        }
    }

    /// Intensity of one channel; alpha is not part of an RGB colour.
    pub fn channel(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Red => Some(self.r),
            Channel::Green => Some(self.g),
            Channel::Blue => Some(self.b),
            Channel::Alpha => None,
        }
    }

    pub fn to_u8(&self) -> [u8; 3] {
        [
            unit_to_byte(self.r),
            unit_to_byte(self.g),
            unit_to_byte(self.b),
        ]
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.is_ascii() {
        return None;
    }
    let component = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Rgb::from_u8(
            component(&hex[0..2])?,
            component(&hex[2..4])?,
            component(&hex[4..6])?,
        )),
        3 => {
            let r = component(&hex[0..1])?;
            let g = component(&hex[1..2])?;
            let b = component(&hex[2..3])?;
            Some(Rgb::from_u8(r * 17, g * 17, b * 17))
        }
        _ => None,
    }
}

/// CSS colour names (`darkgreen`, `saddlebrown`, ...) and functional
/// notation such as `rgb(0, 128, 0)`.
fn named_color(name: &str) -> Option<Rgb> {
    let color = colorgrad::Color::from_html(name.to_lowercase()).ok()?;
    Some(Rgb::new(color.r, color.g, color.b))
}

/// Convert a `[0, 1]` intensity to a byte. Non-finite values map to 0.
#[inline]
pub fn unit_to_byte(value: f64) -> u8 {
    to_byte(value * 255.0)
}

/// Round an already-scaled `[0, 255]` value to a byte, clamping out-of-range
/// values. Non-finite values map to 0.
#[inline]
pub fn to_byte(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(Rgb::parse("#FF0000").unwrap().to_u8(), [255, 0, 0]);
        assert_eq!(Rgb::parse("#00ff00").unwrap().to_u8(), [0, 255, 0]);
        assert_eq!(Rgb::parse("#111111").unwrap().to_u8(), [17, 17, 17]);
        assert_eq!(Rgb::parse("#fff").unwrap().to_u8(), [255, 255, 255]);
        assert!(Rgb::parse("#GGGGGG").is_none());
        assert!(Rgb::parse("#FF00").is_none());
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(Rgb::parse("navy").unwrap().to_u8(), [0, 0, 128]);
        assert_eq!(Rgb::parse("Grey").unwrap().to_u8(), [128, 128, 128]);
        assert_eq!(Rgb::parse("darkgreen").unwrap().to_u8(), [0, 100, 0]);
        assert_eq!(Rgb::parse("SaddleBrown").unwrap().to_u8(), [139, 69, 19]);
        assert!(Rgb::parse("octarine").is_none());
    }

    #[test]
    fn test_to_byte_clamps_and_handles_nan() {
        assert_eq!(to_byte(127.5), 128);
        assert_eq!(to_byte(-4.0), 0);
        assert_eq!(to_byte(300.0), 255);
        assert_eq!(to_byte(f64::NAN), 0);
        assert_eq!(unit_to_byte(1.0), 255);
    }
}
