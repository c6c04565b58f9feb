//! Renderer crate for the shader workshop.
//!
//! Runs one fragment program at a time over the whole window and replaces it
//! whenever the caller hands over new source. The flow is:
//!
//! ```text
//!   workshop CLI
//!        │ WindowCommand::Load { source, controls }
//!        ▼
//!   WindowRuntime ──▶ ReloadOrchestrator::reload ──▶ compile::build ──▶ RenderSession
//!        │                                                                 │
//!        └─ RedrawRequested ─▶ ReloadOrchestrator::run_frame ─▶ RenderSession::frame
//!                                                                          │
//!                                Timeline::advance ◀──────────────────────┤
//!                                BindingTable::upload ─▶ GraphicsDevice ◀──┘
//! ```
//!
//! Everything above `GraphicsDevice` is plain state and is exercised in tests
//! with mock devices. The `wgpu` backend lives in the private `gpu` module and
//! is only reachable through [`WindowRuntime`].

mod bindings;
mod compile;
mod controls;
mod device;
mod gpu;
mod reload;
mod runtime;
mod session;
mod timeline;
mod types;
mod window;

use thiserror::Error;

pub use bindings::{BindingTable, FrameUniforms, UniformSlot};
pub use compile::{annotate_source, build, BuildError, VERTEX_SHADER_SOURCE};
pub use controls::{
    parse_color, ControlError, ControlKind, ControlKindName, ControlSpec, ControlValue,
    ControlValues,
};
pub use device::{FrameError, GraphicsDevice};
pub use reload::ReloadOrchestrator;
pub use runtime::{CancelToken, FrameScheduler, FrameTicket, PlaybackInputs, SessionId};
pub use session::{FrameOutcome, FrameReport};
pub use timeline::{
    Action, PendingActions, Readout, Timeline, TimelineSample, REFRESH_THRESHOLD,
};
pub use types::{
    BuiltinNames, RendererConfig, ShaderStage, UniformKind, UniformValue, MOUSE_UNIFORM,
    RESOLUTION_UNIFORM, TIME_UNIFORM,
};
pub use window::{WindowCommand, WindowRuntime, WindowSignal};

/// Failures that stop the renderer from starting at all.
#[derive(Debug, Error)]
pub enum RendererError {
    /// No usable GPU adapter, device or surface format.
    #[error("graphics device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("window setup failed: {0}")]
    Window(String),
}
