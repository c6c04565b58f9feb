//! Session-scoped playback inputs and the frame scheduling primitives.
//!
//! Everything the host may change between frames (pause flag, latched
//! actions, pointer, viewport, live control values) lives in
//! [`PlaybackInputs`]. The render loop only reads it, apart from consuming
//! latched actions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::controls::{ControlError, ControlSpec, ControlValue, ControlValues};
use crate::timeline::{Action, PendingActions};

/// Liveness flag shared between a session and every frame ticket it issued.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Monotonic identifier of one render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

/// One scheduled frame of a session.
///
/// A ticket is the only thing that outlives a reload: it carries the session's
/// token, so a frame scheduled by a superseded loop sees the cancellation and
/// never reaches the device.
#[derive(Debug, Clone)]
pub struct FrameTicket {
    session: SessionId,
    token: CancelToken,
}

impl FrameTicket {
    pub(crate) fn new(session: SessionId, token: CancelToken) -> Self {
        Self { session, token }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// Host primitive for "run this frame before the next display refresh".
pub trait FrameScheduler {
    fn schedule(&mut self, ticket: FrameTicket);
}

/// Collects tickets for hosts (and tests) that pump frames themselves.
impl FrameScheduler for Vec<FrameTicket> {
    fn schedule(&mut self, ticket: FrameTicket) {
        self.push(ticket);
    }
}

/// Externally mutable inputs sampled by the render loop.
#[derive(Debug, Clone, Default)]
pub struct PlaybackInputs {
    paused: bool,
    actions: PendingActions,
    pointer: [f32; 2],
    viewport: (u32, u32),
    controls: ControlValues,
}

impl PlaybackInputs {
    pub fn new(viewport: (u32, u32), start_paused: bool) -> Self {
        let mut inputs = Self {
            paused: start_paused,
            ..Self::default()
        };
        inputs.set_viewport(viewport);
        inputs
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.set_paused(true);
    }

    pub fn resume(&mut self) {
        self.set_paused(false);
    }

    /// Sets the pause flag, latching the matching action only when the flag
    /// actually changes.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        self.actions
            .post(if paused { Action::Pause } else { Action::Resume });
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.set_paused(!self.paused);
        self.paused
    }

    pub fn reset_time(&mut self) {
        self.actions.post(Action::ResetTime);
    }

    pub fn capture(&mut self) {
        self.actions.post(Action::Capture);
    }

    pub fn actions(&self) -> &PendingActions {
        &self.actions
    }

    pub(crate) fn actions_mut(&mut self) -> &mut PendingActions {
        &mut self.actions
    }

    pub fn controls(&self) -> &ControlValues {
        &self.controls
    }

    pub fn set_control(&mut self, name: &str, value: ControlValue) -> Result<(), ControlError> {
        self.controls.set(name, value)
    }

    pub fn set_control_str(&mut self, name: &str, raw: &str) -> Result<(), ControlError> {
        self.controls.set_from_str(name, raw)
    }

    pub(crate) fn replace_controls(&mut self, specs: Vec<ControlSpec>) {
        self.controls.replace_specs(specs);
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Records a new viewport size and re-centres the pointer.
    pub fn set_viewport(&mut self, (width, height): (u32, u32)) {
        self.viewport = (width, height);
        self.pointer = [width as f32 / 2.0, height as f32 / 2.0];
    }

    /// Records a raw pointer position (top-left origin, surface pixels).
    /// The stored value has a bottom-left origin and is clamped to the
    /// viewport.
    pub fn set_pointer(&mut self, x: f64, y: f64) {
        let (width, height) = self.viewport_f32();
        self.pointer = [
            (x as f32).clamp(0.0, width),
            (height - y as f32).clamp(0.0, height),
        ];
    }

    /// Pointer position as uploaded; clamped again in case the viewport
    /// shrank since the last pointer event.
    pub fn pointer_uniform(&self) -> [f32; 2] {
        let (width, height) = self.viewport_f32();
        [
            self.pointer[0].clamp(0.0, width),
            self.pointer[1].clamp(0.0, height),
        ]
    }

    fn viewport_f32(&self) -> (f32, f32) {
        (self.viewport.0 as f32, self.viewport.1 as f32)
    }
}
