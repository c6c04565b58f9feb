use std::borrow::Cow;
use std::fmt;

use image::RgbaImage;
use wgpu::naga;
use winit::dpi::PhysicalSize;

use crate::device::{FrameError, GraphicsDevice};
use crate::types::{ShaderStage, UniformValue};

use super::capture::capture_frame;
use super::context::GpuContext;
use super::pipeline::{self, GpuProgram, SharedLayouts};
use super::translate::{translate_fragment, translate_vertex, LineMap, Translated};
use super::uniforms::{GpuSlot, UniformBlock, UniformLayout};

/// A compiled stage. Fragment stages carry the uniform block they declare.
pub struct GpuStage {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    layout: UniformLayout,
}

struct ActiveFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

/// [`GraphicsDevice`] backed by a `wgpu` surface.
pub(crate) struct WgpuDevice {
    context: GpuContext,
    layouts: SharedLayouts,
    frame: Option<ActiveFrame>,
    bound: Option<GpuProgram>,
    block: UniformBlock,
}

impl WgpuDevice {
    pub fn new(context: GpuContext) -> Self {
        let layouts = SharedLayouts::new(&context.device);
        Self {
            context,
            layouts,
            frame: None,
            bound: None,
            block: UniformBlock::default(),
        }
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.context.resize(size);
    }

    fn create_module(
        &self,
        stage: ShaderStage,
        source: String,
    ) -> Result<wgpu::ShaderModule, String> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(match stage {
                ShaderStage::Vertex => "workshop vertex",
                ShaderStage::Fragment => "workshop fragment",
            }),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source),
                stage: naga_stage(stage),
                defines: &[],
            },
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(module),
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    type Stage = GpuStage;
    type Program = GpuProgram;
    type Slot = GpuSlot;

    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<GpuStage, String> {
        let Translated { source, layout, .. } = translate(stage, source)?;
        let module = self.create_module(stage, source)?;
        Ok(GpuStage {
            stage,
            module,
            layout,
        })
    }

    fn release_stage(&mut self, stage: GpuStage) {
        drop(stage);
    }

    fn link(&mut self, vertex: &GpuStage, fragment: &GpuStage) -> Result<GpuProgram, String> {
        let layout = match (vertex.stage, fragment.stage) {
            (ShaderStage::Vertex, ShaderStage::Fragment) => &fragment.layout,
            _ => return Err("link expects a vertex stage followed by a fragment stage".into()),
        };
        let program = pipeline::link(
            &self.context.device,
            &self.layouts,
            self.context.format(),
            &vertex.module,
            &fragment.module,
            layout,
        )?;
        tracing::debug!(
            uniforms = layout.len(),
            block_size = layout.size(),
            "linked render pipeline"
        );
        Ok(program)
    }

    fn release_program(&mut self, program: GpuProgram) {
        program.buffer.destroy();
    }

    fn uniform_slot(&self, program: &GpuProgram, name: &str) -> Option<GpuSlot> {
        program.layout.slot(name)
    }

    fn viewport(&self) -> (u32, u32) {
        self.context.size()
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        self.frame = None;
        self.bound = None;
        let texture = match self.context.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(FrameError::Lost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(FrameError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(FrameError::OutOfMemory),
            Err(other) => {
                tracing::warn!(error = %other, "unexpected surface error");
                self.context.reconfigure();
                return Err(FrameError::Lost);
            }
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("workshop frame encoder"),
            });
        pipeline::encode_clear(&mut encoder, &view);
        self.frame = Some(ActiveFrame {
            texture,
            view,
            encoder,
        });
        Ok(())
    }

    fn bind_program(&mut self, program: &GpuProgram) {
        let (width, height) = self.context.size();
        self.block.reset(program.layout.size());
        self.block.set_viewport(width, height);
        self.bound = Some(program.clone());
    }

    fn set_uniform(&mut self, slot: GpuSlot, value: UniformValue) {
        self.block.write(slot, value);
    }

    fn draw_fullscreen(&mut self) {
        let (Some(frame), Some(program)) = (self.frame.as_mut(), self.bound.as_ref()) else {
            return;
        };
        self.context
            .queue
            .write_buffer(&program.buffer, 0, self.block.bytes());
        pipeline::encode_draw(
            &mut frame.encoder,
            &frame.view,
            program,
            wgpu::LoadOp::Load,
        );
    }

    fn capture(&mut self) -> Result<RgbaImage, FrameError> {
        let program = self
            .bound
            .as_ref()
            .ok_or_else(|| FrameError::Capture("no program bound".into()))?;
        capture_frame(
            &self.context.device,
            &self.context.queue,
            program,
            self.context.format(),
            self.context.size(),
        )
    }

    fn end_frame(&mut self) {
        self.bound = None;
        let Some(frame) = self.frame.take() else {
            return;
        };
        self.context
            .queue
            .submit(std::iter::once(frame.encoder.finish()));
        frame.texture.present();
    }
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Rewrites `source` for naga, then parses and validates it so failures come
/// back as readable diagnostics rather than a device error.
fn translate(stage: ShaderStage, source: &str) -> Result<Translated, String> {
    let translated = match stage {
        ShaderStage::Vertex => translate_vertex(source),
        ShaderStage::Fragment => translate_fragment(source)?,
    };
    validate(&translated, naga_stage(stage))?;
    Ok(translated)
}

fn validate(translated: &Translated, stage: naga::ShaderStage) -> Result<(), String> {
    let source = translated.source.as_str();
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(stage), source)
        .map_err(|err| {
            err.errors
                .iter()
                .map(|error| {
                    let location = error
                        .meta
                        .is_defined()
                        .then(|| error.meta.location(source));
                    diagnostic(&translated.lines, location, &error.kind)
                })
                .collect::<Vec<_>>()
                .join("\n")
        })?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|err| {
        let mut message = err.as_inner().to_string();
        let mut cause = std::error::Error::source(err.as_inner());
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = std::error::Error::source(inner);
        }
        diagnostic(&translated.lines, err.location(source), &message)
    })?;
    Ok(())
}

/// Formats one compiler message as `<file id>:<line>: <message>` when its
/// position lies in user text.
fn diagnostic(
    lines: &LineMap,
    location: Option<naga::SourceLocation>,
    message: &dyn fmt::Display,
) -> String {
    match location.and_then(|at| lines.origin(at.line_number)) {
        Some(origin) => format!("{}:{}: {message}", origin.file, origin.line),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use fragments::FRAGMENT_HEADER;

    use super::*;
    use crate::compile::VERTEX_SHADER_SOURCE;

    fn header_lines() -> usize {
        FRAGMENT_HEADER.lines().count()
    }

    #[test]
    fn vertex_stage_validates() {
        let translated = translate(ShaderStage::Vertex, VERTEX_SHADER_SOURCE).unwrap();
        assert_eq!(translated.layout.len(), 0);
    }

    #[test]
    fn fragment_with_builtins_and_controls_validates() {
        let body = "\
uniform vec2 mouse;
uniform bool invert;
uniform int bands;
uniform float speed;
uniform vec3 tint;
void main() {
    vec2 uv = gl_FragCoord.xy / resolution;
    float wave = sin(uv.x * float(bands) + time * speed);
    vec3 color = tint * wave + vec3(distance(uv, mouse / resolution));
    if (invert) {
        color = vec3(1.0) - color;
    }
    out_color = vec4(color, 1.0);
}
";
        let source = format!("{FRAGMENT_HEADER}{body}");
        let translated = translate(ShaderStage::Fragment, &source).unwrap();
        for name in ["time", "resolution", "mouse", "invert", "bands", "speed", "tint"] {
            assert!(translated.layout.slot(name).is_some(), "{name} not in block");
        }
    }

    #[test]
    fn errors_report_user_line_numbers() {
        let body = "void main() {\n    float s = undefined_thing;\n    out_color = vec4(s);\n}\n";
        let source = format!("{FRAGMENT_HEADER}{body}");
        let err = translate(ShaderStage::Fragment, &source).unwrap_err();
        let expected = format!("0:{}: ", header_lines() + 2);
        assert!(err.starts_with(&expected), "{err}");
    }

    #[test]
    fn errors_in_included_files_report_their_file_id() {
        let source = format!(
            "{FRAGMENT_HEADER}#line 1 0\n\
             #line 1 1\n\
             float noise() {{ return missing_value; }}\n\
             #line 2 0\n\
             void main() {{ out_color = vec4(noise()); }}\n"
        );
        let err = translate(ShaderStage::Fragment, &source).unwrap_err();
        assert!(err.starts_with("1:1: "), "{err}");
    }
}
