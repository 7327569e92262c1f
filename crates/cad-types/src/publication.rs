use serde::{Deserialize, Serialize};

use crate::color::{ColorError, Rgba};
use crate::shape::Shape;

/// A raw option value as written by a script, before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Number(f64),
    Text(String),
    Numbers(Vec<f64>),
}

impl OptionValue {
    fn describe(&self) -> &'static str {
        match self {
            OptionValue::Number(_) => "number",
            OptionValue::Text(_) => "string",
            OptionValue::Numbers(_) => "list",
        }
    }
}

/// Errors from interpreting display options.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    #[error("option '{key}' has the wrong type: expected {expected}, got {found}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("option '{key}': {source}")]
    BadColor { key: String, source: ColorError },

    #[error("option '{key}' must be within 0..=1, got {value}")]
    OutOfRange { key: String, value: f64 },

    #[error("option 'size' must be positive, got {value}")]
    BadSize { value: f64 },
}

/// Display options attached to a publication.
///
/// `alpha` is transparency: 0 is opaque, 1 is invisible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub color: Option<Rgba>,
    pub alpha: Option<f64>,
    pub size: Option<f64>,
}

impl DisplayOptions {
    /// Options used by `debug(...)`: red, mostly opaque.
    pub fn flagged() -> Self {
        Self {
            color: Some(Rgba::new(1.0, 0.0, 0.0, 1.0)),
            alpha: Some(0.2),
            size: None,
        }
    }

    /// Interpret script-supplied option pairs.
    ///
    /// Returns the options plus the keys that were not recognised.
    /// An explicit `alpha` wins over the transparency implied by `rgba`.
    pub fn parse<I>(pairs: I) -> Result<(Self, Vec<String>), OptionsError>
    where
        I: IntoIterator<Item = (String, OptionValue)>,
    {
        let mut options = DisplayOptions::default();
        let mut ignored = Vec::new();
        let mut explicit_alpha = None;

        for (key, value) in pairs {
            match key.as_str() {
                "color" => {
                    options.color = Some(color_from(&key, &value)?.opaque());
                }
                "rgba" => {
                    let c = color_from(&key, &value)?;
                    options.color = Some(c.opaque());
                    options.alpha = Some(1.0 - c.a as f64);
                }
                "alpha" => {
                    let a = number_from(&key, &value)?;
                    if !(0.0..=1.0).contains(&a) {
                        return Err(OptionsError::OutOfRange { key, value: a });
                    }
                    explicit_alpha = Some(a);
                }
                "size" => {
                    let s = number_from(&key, &value)?;
                    if s <= 0.0 {
                        return Err(OptionsError::BadSize { value: s });
                    }
                    options.size = Some(s);
                }
                _ => ignored.push(key),
            }
        }

        if explicit_alpha.is_some() {
            options.alpha = explicit_alpha;
        }
        Ok((options, ignored))
    }
}

fn color_from(key: &str, value: &OptionValue) -> Result<Rgba, OptionsError> {
    let parsed = match value {
        OptionValue::Text(text) => Rgba::parse(text),
        OptionValue::Numbers(components) => Rgba::from_components(components),
        other => {
            return Err(OptionsError::WrongType {
                key: key.to_string(),
                expected: "colour string or list",
                found: other.describe(),
            })
        }
    };
    parsed.map_err(|source| OptionsError::BadColor {
        key: key.to_string(),
        source,
    })
}

fn number_from(key: &str, value: &OptionValue) -> Result<f64, OptionsError> {
    match value {
        OptionValue::Number(n) => Ok(*n),
        other => Err(OptionsError::WrongType {
            key: key.to_string(),
            expected: "number",
            found: other.describe(),
        }),
    }
}

/// A named result surfaced by one script run, pending reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationEntry {
    pub name: String,
    pub shape: Shape,
    pub options: DisplayOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn text(s: &str) -> OptionValue {
        OptionValue::Text(s.to_string())
    }

    #[test]
    fn recognised_keys_are_applied() {
        let (opts, ignored) = DisplayOptions::parse([
            ("color".to_string(), text("blue")),
            ("alpha".to_string(), OptionValue::Number(0.5)),
            ("size".to_string(), OptionValue::Number(3.0)),
            ("shininess".to_string(), OptionValue::Number(1.0)),
        ])
        .unwrap();

        assert_eq!(opts.color, Some(Rgba::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(opts.alpha, Some(0.5));
        assert_eq!(opts.size, Some(3.0));
        assert_eq!(ignored, vec!["shininess".to_string()]);
    }

    #[test]
    fn rgba_sets_transparency_unless_alpha_given() {
        let (opts, _) = DisplayOptions::parse([(
            "rgba".to_string(),
            OptionValue::Numbers(vec![1.0, 0.0, 0.0, 0.25]),
        )])
        .unwrap();
        assert_relative_eq!(opts.alpha.unwrap(), 0.75);

        let (opts, _) = DisplayOptions::parse([
            ("alpha".to_string(), OptionValue::Number(0.1)),
            ("rgba".to_string(), text("#ff000040")),
        ])
        .unwrap();
        assert_eq!(opts.alpha, Some(0.1));
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = DisplayOptions::parse([("alpha".to_string(), OptionValue::Number(2.0))]);
        assert!(matches!(err, Err(OptionsError::OutOfRange { .. })));

        let err = DisplayOptions::parse([("color".to_string(), OptionValue::Number(2.0))]);
        assert!(matches!(err, Err(OptionsError::WrongType { .. })));

        let err = DisplayOptions::parse([("color".to_string(), text("nope"))]);
        assert!(matches!(err, Err(OptionsError::BadColor { .. })));
    }
}
