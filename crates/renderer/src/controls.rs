//! Live controls: the typed, user-adjustable uniforms declared alongside a
//! fragment source.
//!
//! A [`ControlSpec`] is immutable for the lifetime of one loaded program. The
//! current values live in [`ControlValues`], owned outside the render loop and
//! sampled once per frame.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::types::UniformValue;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("unknown control '{0}'")]
    UnknownControl(String),
    #[error("control '{name}' expects {expected}, got '{value}'")]
    InvalidValue {
        name: String,
        value: String,
        expected: ControlKindName,
    },
    #[error("'{0}' is not a 3- or 6-digit hex colour")]
    InvalidColor(String),
    #[error("control '{name}' has an empty or inverted range")]
    InvalidBounds { name: String },
}

/// Shape of a control's value, with bounds for the numeric kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlKind {
    Bool,
    I32 { min: i32, max: i32 },
    F32 { min: f32, max: f32 },
    Color,
}

impl ControlKind {
    pub fn name(&self) -> ControlKindName {
        match self {
            ControlKind::Bool => ControlKindName::Bool,
            ControlKind::I32 { .. } => ControlKindName::I32,
            ControlKind::F32 { .. } => ControlKindName::F32,
            ControlKind::Color => ControlKindName::Color,
        }
    }
}

/// Unparameterised control kind, used in messages and manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKindName {
    Bool,
    I32,
    F32,
    Color,
}

impl fmt::Display for ControlKindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKindName::Bool => f.write_str("bool"),
            ControlKindName::I32 => f.write_str("i32"),
            ControlKindName::F32 => f.write_str("f32"),
            ControlKindName::Color => f.write_str("color"),
        }
    }
}

/// Current value of a live control.
///
/// Colours are held as the hex text the user supplied and decoded when
/// uploaded.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Bool(bool),
    I32(i32),
    F32(f32),
    Color(String),
}

/// Descriptor of one live control.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    name: String,
    kind: ControlKind,
    default: ControlValue,
}

impl ControlSpec {
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            kind: ControlKind::Bool,
            default: ControlValue::Bool(default),
        }
    }

    pub fn int(
        name: impl Into<String>,
        min: i32,
        max: i32,
        default: i32,
    ) -> Result<Self, ControlError> {
        let name = name.into();
        if min > max {
            return Err(ControlError::InvalidBounds { name });
        }
        Ok(Self {
            name,
            kind: ControlKind::I32 { min, max },
            default: ControlValue::I32(default.clamp(min, max)),
        })
    }

    pub fn float(
        name: impl Into<String>,
        min: f32,
        max: f32,
        default: f32,
    ) -> Result<Self, ControlError> {
        let name = name.into();
        if !(min <= max) {
            return Err(ControlError::InvalidBounds { name });
        }
        Ok(Self {
            name,
            kind: ControlKind::F32 { min, max },
            default: ControlValue::F32(default.clamp(min, max)),
        })
    }

    pub fn color(
        name: impl Into<String>,
        default: impl Into<String>,
    ) -> Result<Self, ControlError> {
        let default = default.into();
        parse_color(&default)?;
        Ok(Self {
            name: name.into(),
            kind: ControlKind::Color,
            default: ControlValue::Color(default),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn default_value(&self) -> &ControlValue {
        &self.default
    }

    /// Coerces `value` into this control's kind, clamping numeric values to
    /// the declared bounds.
    fn accept(&self, value: ControlValue) -> Result<ControlValue, ControlError> {
        let reject = |value: &ControlValue| ControlError::InvalidValue {
            name: self.name.clone(),
            value: format!("{value:?}"),
            expected: self.kind.name(),
        };
        match (self.kind, value) {
            (ControlKind::Bool, ControlValue::Bool(v)) => Ok(ControlValue::Bool(v)),
            (ControlKind::I32 { min, max }, ControlValue::I32(v)) => {
                Ok(ControlValue::I32(v.clamp(min, max)))
            }
            (ControlKind::I32 { min, max }, ControlValue::F32(v)) if v.is_finite() => {
                Ok(ControlValue::I32((v.round() as i32).clamp(min, max)))
            }
            (ControlKind::F32 { min, max }, ControlValue::F32(v)) if v.is_finite() => {
                Ok(ControlValue::F32(v.clamp(min, max)))
            }
            (ControlKind::F32 { min, max }, ControlValue::I32(v)) => {
                Ok(ControlValue::F32((v as f32).clamp(min, max)))
            }
            (ControlKind::Color, ControlValue::Color(hex)) => {
                parse_color(&hex)?;
                Ok(ControlValue::Color(hex))
            }
            (_, other) => Err(reject(&other)),
        }
    }

    /// Parses user text the way the matching widget would.
    fn parse(&self, raw: &str) -> Result<ControlValue, ControlError> {
        let trimmed = raw.trim();
        let invalid = || ControlError::InvalidValue {
            name: self.name.clone(),
            value: raw.to_string(),
            expected: self.kind.name(),
        };
        let value = match self.kind {
            ControlKind::Bool => match trimmed {
                "1" | "true" | "on" | "yes" => ControlValue::Bool(true),
                "0" | "false" | "off" | "no" => ControlValue::Bool(false),
                _ => return Err(invalid()),
            },
            ControlKind::I32 { .. } => ControlValue::I32(trimmed.parse().map_err(|_| invalid())?),
            ControlKind::F32 { .. } => ControlValue::F32(trimmed.parse().map_err(|_| invalid())?),
            ControlKind::Color => ControlValue::Color(trimmed.to_string()),
        };
        self.accept(value)
    }
}

/// Decodes `#rgb`, `#rrggbb`, `rgb` or `rrggbb` into unit-interval RGB.
pub fn parse_color(hex: &str) -> Result<[f32; 3], ControlError> {
    let invalid = || ControlError::InvalidColor(hex.to_string());
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return Err(invalid()),
    };
    let mut rgb = [0.0; 3];
    for (index, channel) in rgb.iter_mut().enumerate() {
        let digits = &expanded[index * 2..index * 2 + 2];
        let byte = u8::from_str_radix(digits, 16).map_err(|_| invalid())?;
        *channel = byte as f32 / 255.0;
    }
    Ok(rgb)
}

/// Externally owned values for the controls of the loaded program.
#[derive(Debug, Clone, Default)]
pub struct ControlValues {
    specs: Vec<ControlSpec>,
    values: HashMap<String, ControlValue>,
}

impl ControlValues {
    pub fn new(specs: Vec<ControlSpec>) -> Self {
        let mut values = Self::default();
        values.replace_specs(specs);
        values
    }

    /// Installs the controls of a newly loaded program, resetting every value
    /// to its declared default.
    pub fn replace_specs(&mut self, specs: Vec<ControlSpec>) {
        self.values = specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect();
        self.specs = specs;
    }

    pub fn specs(&self) -> &[ControlSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ControlValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: ControlValue) -> Result<(), ControlError> {
        let spec = self.spec(name)?;
        let accepted = spec.accept(value)?;
        self.values.insert(name.to_string(), accepted);
        Ok(())
    }

    pub fn set_from_str(&mut self, name: &str, raw: &str) -> Result<(), ControlError> {
        let spec = self.spec(name)?;
        let accepted = spec.parse(raw)?;
        self.values.insert(name.to_string(), accepted);
        Ok(())
    }

    /// Samples the current value of `name` in its upload representation.
    pub fn uniform_value(&self, name: &str) -> Option<UniformValue> {
        match self.values.get(name)? {
            ControlValue::Bool(v) => Some(UniformValue::Int(i32::from(*v))),
            ControlValue::I32(v) => Some(UniformValue::Int(*v)),
            ControlValue::F32(v) => Some(UniformValue::Float(*v)),
            ControlValue::Color(hex) => parse_color(hex).ok().map(UniformValue::Vec3),
        }
    }

    fn spec(&self, name: &str) -> Result<&ControlSpec, ControlError> {
        self.specs
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| ControlError::UnknownControl(name.to_string()))
    }
}
