//! Sidecar control manifests. `plasma.frag` may sit next to `plasma.toml`
//! declaring the live controls the fragment reads:
//!
//! ```toml
//! [[controls]]
//! name = "speed"
//! type = "f32"
//! min = 0.0
//! max = 4.0
//! val = 1.0
//!
//! [[controls]]
//! name = "tint"
//! type = "color"
//! val = "#ff8800"
//! ```
//!
//! Types:
//!
//! - `ControlManifest` is the parsed file; a missing file yields an empty one.
//! - `ControlDecl` is one `[[controls]]` entry, serialized unchanged into the
//!   `print --json` payload.
//!
//! Functions:
//!
//! - `ControlManifest::validate` returns human-readable issues instead of
//!   failing on the first one.
//! - `load` reads, parses and validates the manifest for a fragment path.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid controls in {}: {}", path.display(), issues.join("; "))]
    Validation { path: PathBuf, issues: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ControlManifest {
    #[serde(default)]
    pub controls: Vec<ControlDecl>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ControlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<ControlDefault>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Bool,
    I32,
    F32,
    Color,
}

/// Default value as written in the manifest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ControlDefault {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ControlDefault {
    fn as_number(&self) -> Option<f64> {
        match self {
            ControlDefault::Int(value) => Some(*value as f64),
            ControlDefault::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl ControlDecl {
    /// Numeric range, present only when both bounds are declared.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.min?, self.max?))
    }

    pub fn default_bool(&self) -> bool {
        matches!(self.val, Some(ControlDefault::Bool(true)))
    }

    /// Numeric default; the lower bound when `val` is omitted.
    pub fn default_number(&self) -> Option<f64> {
        match &self.val {
            Some(value) => value.as_number(),
            None => self.min,
        }
    }

    /// Colour default; black when `val` is omitted.
    pub fn default_color(&self) -> &str {
        match &self.val {
            Some(ControlDefault::Text(hex)) => hex,
            _ => "#000000",
        }
    }

    fn issues(&self, out: &mut Vec<String>) {
        let name = &self.name;
        match self.kind {
            ControlType::Bool => {
                if !matches!(self.val, None | Some(ControlDefault::Bool(_))) {
                    out.push(format!("control '{name}' needs a boolean default"));
                }
            }
            ControlType::I32 | ControlType::F32 => {
                let Some((min, max)) = self.bounds() else {
                    out.push(format!("control '{name}' needs both min and max"));
                    return;
                };
                if !(min <= max) {
                    out.push(format!("control '{name}' has min {min} above max {max}"));
                    return;
                }
                let integral = |bound: f64| {
                    bound.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(&bound)
                };
                if self.kind == ControlType::I32 && !(integral(min) && integral(max)) {
                    out.push(format!("control '{name}' needs 32-bit integer bounds"));
                }
                match self.default_number() {
                    Some(value) if value < min || value > max => out.push(format!(
                        "control '{name}' default {value} is outside [{min}, {max}]"
                    )),
                    Some(value) if self.kind == ControlType::I32 && value.fract() != 0.0 => {
                        out.push(format!("control '{name}' needs an integer default"))
                    }
                    Some(_) => {}
                    None => out.push(format!("control '{name}' needs a numeric default")),
                }
            }
            ControlType::Color => {
                if !matches!(self.val, None | Some(ControlDefault::Text(_))) {
                    out.push(format!("control '{name}' needs a hex colour default"));
                } else if !is_hex_color(self.default_color()) {
                    out.push(format!(
                        "control '{name}' default '{}' is not a hex colour",
                        self.default_color()
                    ));
                }
            }
        }
    }
}

impl ControlManifest {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        for control in &self.controls {
            if control.name.trim().is_empty() {
                issues.push("control names must not be empty".to_string());
                continue;
            }
            if !seen.insert(control.name.as_str()) {
                issues.push(format!("control '{}' is declared twice", control.name));
            }
            control.issues(&mut issues);
        }
        issues
    }
}

/// Manifest path belonging to a fragment: same stem, `.toml` extension.
pub fn manifest_path(fragment: &Path) -> PathBuf {
    fragment.with_extension("toml")
}

/// Loads the manifest for `fragment`. No manifest means no controls.
pub fn load(fragment: &Path) -> Result<ControlManifest, ManifestError> {
    let path = manifest_path(fragment);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ControlManifest::default()),
        Err(source) => return Err(ManifestError::Read { path, source }),
    };
    let manifest: ControlManifest = toml::from_str(&raw).map_err(|source| ManifestError::Parse {
        path: path.clone(),
        source,
    })?;
    let issues = manifest.validate();
    if !issues.is_empty() {
        return Err(ManifestError::Validation { path, issues });
    }
    Ok(manifest)
}

fn is_hex_color(value: &str) -> bool {
    let digits = value.strip_prefix('#').unwrap_or(value);
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}
