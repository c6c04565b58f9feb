//! Uniform binding table: the builtin and live-control uniforms of one
//! program, resolved to device slots once per build.
//!
//! A table is only ever produced by [`BindingTable::resolve`] against the
//! program it will be used with and lives inside the same session, so slots
//! from a torn-down program cannot reach a different one.

use crate::controls::{ControlKind, ControlSpec, ControlValues};
use crate::device::GraphicsDevice;
use crate::types::{BuiltinNames, UniformKind, UniformValue};

/// One named uniform and where (if anywhere) the program stores it.
#[derive(Debug, Clone)]
pub struct UniformSlot<S> {
    name: String,
    kind: UniformKind,
    slot: Option<S>,
}

impl<S: Copy> UniformSlot<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UniformKind {
        self.kind
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.is_some()
    }
}

/// Builtin values for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub mouse: [f32; 2],
}

#[derive(Debug, Clone)]
pub struct BindingTable<S> {
    resolution: UniformSlot<S>,
    time: UniformSlot<S>,
    mouse: UniformSlot<S>,
    controls: Vec<UniformSlot<S>>,
}

impl<S: Copy> BindingTable<S> {
    /// Resolves the builtins and every declared control against `program`.
    /// Names the program never references resolve to no slot; writes to them
    /// are skipped.
    pub fn resolve<D>(
        device: &D,
        program: &D::Program,
        builtins: &BuiltinNames,
        controls: &[ControlSpec],
    ) -> Self
    where
        D: GraphicsDevice<Slot = S>,
    {
        let lookup = |name: &str, kind: UniformKind| UniformSlot {
            name: name.to_string(),
            kind,
            slot: device.uniform_slot(program, name),
        };

        let table = Self {
            resolution: lookup(&builtins.resolution, UniformKind::Vec2),
            time: lookup(&builtins.time, UniformKind::Float),
            mouse: lookup(&builtins.mouse, UniformKind::Vec2),
            controls: controls
                .iter()
                .map(|spec| lookup(spec.name(), control_uniform_kind(spec.kind())))
                .collect(),
        };

        tracing::debug!(
            resolved = table.iter().filter(|slot| slot.is_resolved()).count(),
            declared = table.iter().count(),
            unresolved = ?table
                .iter()
                .filter(|slot| !slot.is_resolved())
                .map(|slot| slot.name())
                .collect::<Vec<_>>(),
            "resolved uniform slots"
        );
        table
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformSlot<S>> {
        [&self.resolution, &self.time, &self.mouse]
            .into_iter()
            .chain(self.controls.iter())
    }

    /// Writes the builtins and samples every live control into the bound
    /// program.
    pub fn upload<D>(&self, device: &mut D, frame: &FrameUniforms, values: &ControlValues)
    where
        D: GraphicsDevice<Slot = S>,
    {
        write(device, &self.resolution, UniformValue::Vec2(frame.resolution));
        write(device, &self.time, UniformValue::Float(frame.time));
        write(device, &self.mouse, UniformValue::Vec2(frame.mouse));

        for control in &self.controls {
            if control.slot.is_none() {
                continue;
            }
            if let Some(value) = values.uniform_value(&control.name) {
                write(device, control, value);
            }
        }
    }
}

fn write<D: GraphicsDevice>(device: &mut D, uniform: &UniformSlot<D::Slot>, value: UniformValue) {
    if let Some(slot) = uniform.slot {
        device.set_uniform(slot, value);
    }
}

fn control_uniform_kind(kind: ControlKind) -> UniformKind {
    match kind {
        ControlKind::Bool => UniformKind::Bool,
        ControlKind::I32 { .. } => UniformKind::Int,
        ControlKind::F32 { .. } => UniformKind::Float,
        ControlKind::Color => UniformKind::Vec3,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use image::RgbaImage;

    use super::*;
    use crate::device::FrameError;
    use crate::types::ShaderStage;

    /// Device whose single program references a fixed set of names.
    struct NamedSlots {
        names: HashMap<&'static str, u32>,
        writes: Vec<(u32, UniformValue)>,
    }

    impl NamedSlots {
        fn new(names: &[&'static str]) -> Self {
            Self {
                names: names
                    .iter()
                    .enumerate()
                    .map(|(index, name)| (*name, index as u32))
                    .collect(),
                writes: Vec::new(),
            }
        }
    }

    impl GraphicsDevice for NamedSlots {
        type Stage = ();
        type Program = ();
        type Slot = u32;

        fn compile(&mut self, _stage: ShaderStage, _source: &str) -> Result<(), String> {
            Ok(())
        }
        fn release_stage(&mut self, _stage: ()) {}
        fn link(&mut self, _vertex: &(), _fragment: &()) -> Result<(), String> {
            Ok(())
        }
        fn release_program(&mut self, _program: ()) {}
        fn uniform_slot(&self, _program: &(), name: &str) -> Option<u32> {
            self.names.get(name).copied()
        }
        fn viewport(&self) -> (u32, u32) {
            (640, 480)
        }
        fn begin_frame(&mut self) -> Result<(), FrameError> {
            Ok(())
        }
        fn bind_program(&mut self, _program: &()) {}
        fn set_uniform(&mut self, slot: u32, value: UniformValue) {
            self.writes.push((slot, value));
        }
        fn draw_fullscreen(&mut self) {}
        fn capture(&mut self) -> Result<RgbaImage, FrameError> {
            Ok(RgbaImage::new(1, 1))
        }
        fn end_frame(&mut self) {}
    }

    fn frame() -> FrameUniforms {
        FrameUniforms {
            resolution: [640.0, 480.0],
            time: 1.5,
            mouse: [10.0, 20.0],
        }
    }

    #[test]
    fn missing_builtins_are_silent_no_ops() {
        let mut device = NamedSlots::new(&["time"]);
        let table = BindingTable::resolve(&device, &(), &BuiltinNames::default(), &[]);
        table.upload(&mut device, &frame(), &ControlValues::default());
        assert_eq!(device.writes, vec![(0, UniformValue::Float(1.5))]);
    }

    #[test]
    fn unreferenced_controls_are_skipped() {
        let specs = vec![
            ControlSpec::color("tint", "#ff0000").unwrap(),
            ControlSpec::boolean("unused", true),
        ];
        let values = ControlValues::new(specs.clone());
        let mut device = NamedSlots::new(&["tint"]);
        let table = BindingTable::resolve(&device, &(), &BuiltinNames::default(), &specs);

        assert!(table.iter().any(|slot| slot.name() == "unused" && !slot.is_resolved()));
        table.upload(&mut device, &frame(), &values);
        assert_eq!(device.writes, vec![(0, UniformValue::Vec3([1.0, 0.0, 0.0]))]);
    }

    #[test]
    fn builtins_upload_before_controls() {
        let specs = vec![ControlSpec::boolean("enabled", false)];
        let values = ControlValues::new(specs.clone());
        let mut device = NamedSlots::new(&["resolution", "time", "mouse", "enabled"]);
        let table = BindingTable::resolve(&device, &(), &BuiltinNames::default(), &specs);
        table.upload(&mut device, &frame(), &values);
        assert_eq!(
            device.writes,
            vec![
                (0, UniformValue::Vec2([640.0, 480.0])),
                (1, UniformValue::Float(1.5)),
                (2, UniformValue::Vec2([10.0, 20.0])),
                (3, UniformValue::Int(0)),
            ]
        );
    }
}
