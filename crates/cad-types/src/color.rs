use std::fmt;

use serde::{Deserialize, Serialize};

/// An RGBA colour with components in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Errors from colour parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColorError {
    #[error("unknown colour name: {name}")]
    UnknownName { name: String },

    #[error("malformed hex colour: {text}")]
    MalformedHex { text: String },

    #[error("colour needs 3 or 4 components, got {count}")]
    ComponentCount { count: usize },

    #[error("colour component {value} is outside 0..=1")]
    OutOfRange { value: f64 },
}

const NAMED: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("lawngreen", [124, 252, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("orange", [255, 165, 0]),
    ("cyan", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("purple", [128, 0, 128]),
    ("brown", [165, 42, 42]),
    ("pink", [255, 192, 203]),
];

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Default face colour of published objects (`#f4a824`).
    pub fn default_face() -> Self {
        Self::from_bytes(0xf4, 0xa8, 0x24, 0xff)
    }

    pub fn from_bytes(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Parse a colour name, `#rrggbb` or `#rrggbbaa`.
    pub fn parse(text: &str) -> Result<Self, ColorError> {
        let trimmed = text.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| ColorError::MalformedHex {
                text: text.to_string(),
            });
        }
        let lower = trimmed.to_ascii_lowercase();
        match NAMED.iter().find(|(name, _)| *name == lower.as_str()) {
            Some((_, [r, g, b])) => Ok(Self::from_bytes(*r, *g, *b, 0xff)),
            None => Err(ColorError::UnknownName { name: lower }),
        }
    }

    /// Build from 3 or 4 float components in 0..=1.
    pub fn from_components(components: &[f64]) -> Result<Self, ColorError> {
        if components.len() != 3 && components.len() != 4 {
            return Err(ColorError::ComponentCount {
                count: components.len(),
            });
        }
        if let Some(bad) = components.iter().find(|c| !(0.0..=1.0).contains(*c)) {
            return Err(ColorError::OutOfRange { value: *bad });
        }
        let a = components.get(3).copied().unwrap_or(1.0);
        Ok(Self::new(
            components[0] as f32,
            components[1] as f32,
            components[2] as f32,
            a as f32,
        ))
    }

    pub fn to_hex(&self) -> String {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}{:02x}",
            byte(self.r),
            byte(self.g),
            byte(self.b),
            byte(self.a)
        )
    }

    pub fn opaque(self) -> Self {
        Self { a: 1.0, ..self }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let a = if hex.len() == 8 { byte(6)? } else { 0xff };
    Some(Rgba::from_bytes(byte(0)?, byte(2)?, byte(4)?, a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn named_colours_are_case_insensitive() {
        assert_eq!(Rgba::parse("Red").unwrap(), Rgba::parse("red").unwrap());
        assert_eq!(Rgba::parse("red").unwrap(), Rgba::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn default_face_colour_matches_hex() {
        assert_eq!(Rgba::default_face().to_hex(), "#f4a824ff");
    }

    #[test]
    fn hex_with_alpha() {
        let c = Rgba::parse("#00ff0080").unwrap();
        assert_relative_eq!(c.g, 1.0);
        assert_relative_eq!(c.a, 128.0 / 255.0);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        assert!(matches!(
            Rgba::parse("#12345"),
            Err(ColorError::MalformedHex { .. })
        ));
        assert!(matches!(
            Rgba::parse("chartreuse-ish"),
            Err(ColorError::UnknownName { .. })
        ));
        assert!(matches!(
            Rgba::from_components(&[0.1, 0.2]),
            Err(ColorError::ComponentCount { count: 2 })
        ));
        assert!(matches!(
            Rgba::from_components(&[0.1, 0.2, 1.5]),
            Err(ColorError::OutOfRange { .. })
        ));
    }

    proptest! {
        #[test]
        fn hex_survives_formatting(r: u8, g: u8, b: u8, a: u8) {
            let c = Rgba::from_bytes(r, g, b, a);
            prop_assert_eq!(Rgba::parse(&c.to_hex()).unwrap().to_hex(), c.to_hex());
        }
    }
}
