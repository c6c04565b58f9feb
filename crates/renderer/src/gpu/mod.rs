//! `wgpu` implementation of the graphics device.
//!
//! - `context` owns instance/surface/device wiring and reconfigures the
//!   surface on resize or loss.
//! - `translate` rewrites GLSL ES program text into GLSL 4.50 and gathers the
//!   loose uniforms into one block.
//! - `uniforms` lays that block out (std140) and encodes per-frame values.
//! - `pipeline` links stage modules into render pipelines and records draws.
//! - `capture` reads a rendered frame back into an image.
//! - `device` ties them together behind [`GraphicsDevice`](crate::GraphicsDevice).

mod capture;
mod context;
mod device;
mod pipeline;
mod translate;
mod uniforms;

pub(crate) use context::GpuContext;
pub(crate) use device::WgpuDevice;
