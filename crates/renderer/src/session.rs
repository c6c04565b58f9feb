//! One live program with its resolved uniforms and timeline, and the body
//! of the per-frame callback that draws it.

use std::time::Instant;

use image::RgbaImage;

use crate::bindings::{BindingTable, FrameUniforms};
use crate::device::{FrameError, GraphicsDevice};
use crate::runtime::{CancelToken, FrameTicket, PlaybackInputs, SessionId};
use crate::timeline::{Action, Readout, Timeline};

/// What one frame callback did.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The ticket belonged to a cancelled or superseded session; nothing was
    /// touched and the loop is not rescheduled.
    Cancelled,
    Rendered(FrameReport),
    /// The frame target could not be acquired; the draw was skipped but the
    /// loop continues.
    Skipped(FrameError),
}

#[derive(Debug)]
pub struct FrameReport {
    pub elapsed: f32,
    pub readout: Option<Readout>,
    /// Present when a capture was pending on this frame.
    pub capture: Option<Result<RgbaImage, FrameError>>,
}

pub(crate) struct RenderSession<D: GraphicsDevice> {
    id: SessionId,
    program: D::Program,
    bindings: BindingTable<D::Slot>,
    timeline: Timeline,
    token: CancelToken,
}

impl<D: GraphicsDevice> RenderSession<D> {
    pub fn new(id: SessionId, program: D::Program, bindings: BindingTable<D::Slot>) -> Self {
        Self {
            id,
            program,
            bindings,
            timeline: Timeline::new(),
            token: CancelToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn ticket(&self) -> FrameTicket {
        FrameTicket::new(self.id, self.token.clone())
    }

    /// Whether `ticket` was issued by this session and the session is still
    /// current.
    pub fn accepts(&self, ticket: &FrameTicket) -> bool {
        !self.token.is_cancelled() && ticket.session() == self.id
    }

    /// Runs one frame: advance the clock, clear, bind, upload, draw, capture
    /// if requested, present.
    pub fn frame(
        &mut self,
        device: &mut D,
        inputs: &mut PlaybackInputs,
        now: Instant,
    ) -> FrameOutcome {
        let paused = inputs.is_paused();
        let sample = self.timeline.advance(now, paused, inputs.actions_mut());

        if let Err(err) = device.begin_frame() {
            return FrameOutcome::Skipped(err);
        }

        let (width, height) = device.viewport();
        let frame = FrameUniforms {
            resolution: [width as f32, height as f32],
            time: sample.elapsed,
            mouse: inputs.pointer_uniform(),
        };

        device.bind_program(&self.program);
        self.bindings.upload(device, &frame, inputs.controls());
        device.draw_fullscreen();

        let capture = inputs
            .actions_mut()
            .take(Action::Capture)
            .then(|| device.capture());
        device.end_frame();

        FrameOutcome::Rendered(FrameReport {
            elapsed: sample.elapsed,
            readout: sample.readout,
            capture,
        })
    }

    /// Fires the cancellation token, then hands the program back to the
    /// device.
    pub fn teardown(self, device: &mut D) {
        self.token.cancel();
        device.release_program(self.program);
    }
}
