//! The graphics-device seam the playback core is written against.
//!
//! Program building, uniform resolution and the per-frame draw only ever talk
//! to a [`GraphicsDevice`]. The `wgpu` implementation lives in `gpu`; tests
//! drive the same core through counting fakes.

use std::fmt;

use image::RgbaImage;
use thiserror::Error;

use crate::types::{ShaderStage, UniformValue};

/// Why a frame could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The render target went away or no longer matches the window; the host
    /// reconfigures it and the next frame retries.
    #[error("render target lost or outdated")]
    Lost,
    #[error("timed out acquiring the next frame")]
    Timeout,
    #[error("out of memory while acquiring a frame")]
    OutOfMemory,
    #[error("frame capture failed: {0}")]
    Capture(String),
}

pub trait GraphicsDevice {
    /// A compiled, not yet linked, pipeline stage.
    type Stage;
    /// A linked program ready to be bound and drawn with.
    type Program;
    /// Device location of one uniform inside one program.
    type Slot: Copy + fmt::Debug;

    /// Compiles one stage, returning the stage diagnostic log on failure.
    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Stage, String>;

    fn release_stage(&mut self, stage: Self::Stage);

    /// Links a vertex and a fragment stage, returning the linker log on failure.
    fn link(
        &mut self,
        vertex: &Self::Stage,
        fragment: &Self::Stage,
    ) -> Result<Self::Program, String>;

    fn release_program(&mut self, program: Self::Program);

    /// Looks up a uniform by name. `None` means the program never references
    /// it, which callers treat as a silent no-op.
    fn uniform_slot(&self, program: &Self::Program, name: &str) -> Option<Self::Slot>;

    /// Current render target size in device pixels.
    fn viewport(&self) -> (u32, u32);

    /// Acquires the frame target and clears it.
    fn begin_frame(&mut self) -> Result<(), FrameError>;

    fn bind_program(&mut self, program: &Self::Program);

    /// Writes one uniform of the bound program for the current frame.
    fn set_uniform(&mut self, slot: Self::Slot, value: UniformValue);

    /// Issues the single full-screen draw: three vertices, no vertex or index
    /// buffers.
    fn draw_fullscreen(&mut self);

    /// Reads back the frame drawn since `begin_frame`.
    fn capture(&mut self) -> Result<RgbaImage, FrameError>;

    /// Presents the frame.
    fn end_frame(&mut self);
}
