//! RGB color values for the status board.
//!
//! Colors arrive as hex triplets from configuration (`#RRGGBB`, the leading
//! `#` is optional) and are scaled by the global brightness before being
//! handed to the strip driver.

use std::fmt;

/// An 8-bit-per-channel RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid color format: {text:?} (expected hex triplet like \"#RRGGBB\")")]
pub struct InvalidColorFormat {
    pub text: String,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex triplet like `#FF8800` or `ff8800`.
    pub fn parse(text: &str) -> Result<Self, InvalidColorFormat> {
        let hex = text.strip_prefix('#').unwrap_or(text);

        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidColorFormat {
                text: text.to_string(),
            });
        }

        // Length and digit checks above make these infallible.
        let channel = |range| u8::from_str_radix(&hex[range], 16).unwrap_or(0);

        Ok(Self {
            r: channel(0..2),
            g: channel(2..4),
            b: channel(4..6),
        })
    }

    /// Scale each channel by `brightness`, rounding to the nearest integer.
    ///
    /// Channels are clamped back into range, so any finite brightness
    /// produces a valid color.
    pub fn scale(self, brightness: f32) -> Self {
        let scale = |c: u8| (f32::from(c) * brightness).round().clamp(0.0, 255.0) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}
