//! Maps manifest control declarations onto the renderer's control specs.

use anyhow::{anyhow, Context, Result};
use fragments::{ControlDecl, ControlType};
use renderer::ControlSpec;

pub fn control_specs(decls: &[ControlDecl]) -> Result<Vec<ControlSpec>> {
    decls
        .iter()
        .map(|decl| {
            control_spec(decl).with_context(|| format!("invalid control '{}'", decl.name))
        })
        .collect()
}

fn control_spec(decl: &ControlDecl) -> Result<ControlSpec> {
    let name = decl.name.as_str();
    let spec = match decl.kind {
        ControlType::Bool => ControlSpec::boolean(name, decl.default_bool()),
        ControlType::I32 => {
            let (min, max) = bounds(decl)?;
            let default = decl.default_number().unwrap_or(min);
            ControlSpec::int(name, min as i32, max as i32, default as i32)?
        }
        ControlType::F32 => {
            let (min, max) = bounds(decl)?;
            let default = decl.default_number().unwrap_or(min);
            ControlSpec::float(name, min as f32, max as f32, default as f32)?
        }
        ControlType::Color => ControlSpec::color(name, decl.default_color())?,
    };
    Ok(spec)
}

fn bounds(decl: &ControlDecl) -> Result<(f64, f64)> {
    decl.bounds()
        .ok_or_else(|| anyhow!("numeric controls need both min and max"))
}

#[cfg(test)]
mod tests {
    use fragments::ControlDefault;
    use renderer::{ControlKind, ControlValue};

    use super::*;

    fn decl(
        name: &str,
        kind: ControlType,
        min: Option<f64>,
        max: Option<f64>,
        val: Option<ControlDefault>,
    ) -> ControlDecl {
        ControlDecl {
            name: name.into(),
            kind,
            min,
            max,
            val,
        }
    }

    #[test]
    fn converts_every_kind() {
        let specs = control_specs(&[
            decl("on", ControlType::Bool, None, None, Some(ControlDefault::Bool(true))),
            decl("steps", ControlType::I32, Some(1.0), Some(8.0), Some(ControlDefault::Int(3))),
            decl("speed", ControlType::F32, Some(0.0), Some(2.0), Some(ControlDefault::Float(0.5))),
            decl("tint", ControlType::Color, None, None, Some(ControlDefault::Text("#0f0".into()))),
        ])
        .unwrap();

        assert_eq!(specs[0].default_value(), &ControlValue::Bool(true));
        assert_eq!(specs[1].kind(), ControlKind::I32 { min: 1, max: 8 });
        assert_eq!(specs[1].default_value(), &ControlValue::I32(3));
        assert_eq!(specs[2].default_value(), &ControlValue::F32(0.5));
        assert_eq!(specs[3].default_value(), &ControlValue::Color("#0f0".into()));
    }

    #[test]
    fn missing_default_uses_lower_bound() {
        let zoom = decl("zoom", ControlType::F32, Some(0.25), Some(4.0), None);
        let specs = control_specs(&[zoom]).unwrap();
        assert_eq!(specs[0].default_value(), &ControlValue::F32(0.25));
    }

    #[test]
    fn errors_name_the_control() {
        let gain = decl("gain", ControlType::F32, None, Some(1.0), None);
        let err = control_specs(&[gain]).unwrap_err();
        assert!(format!("{err:#}").contains("gain"));
    }
}
