//! Reload orchestration: owns the single live [`RenderSession`] and swaps it
//! out whenever new source text arrives.

use std::time::Instant;

use crate::bindings::BindingTable;
use crate::compile::{self, BuildError};
use crate::controls::ControlSpec;
use crate::device::GraphicsDevice;
use crate::runtime::{FrameScheduler, FrameTicket, PlaybackInputs, SessionId};
use crate::session::{FrameOutcome, RenderSession};
use crate::types::BuiltinNames;

pub struct ReloadOrchestrator<D: GraphicsDevice> {
    session: Option<RenderSession<D>>,
    inputs: PlaybackInputs,
    builtins: BuiltinNames,
    next_session: u64,
    last_error: Option<BuildError>,
}

impl<D: GraphicsDevice> ReloadOrchestrator<D> {
    pub fn new(inputs: PlaybackInputs) -> Self {
        Self::with_builtins(inputs, BuiltinNames::default())
    }

    pub fn with_builtins(inputs: PlaybackInputs, builtins: BuiltinNames) -> Self {
        Self {
            session: None,
            inputs,
            builtins,
            next_session: 1,
            last_error: None,
        }
    }

    /// Tears down the live session (if any) and installs a program built
    /// from `source`.
    ///
    /// On failure nothing is rendered until a later reload succeeds; the
    /// error is kept as [`last_error`](Self::last_error) and also returned.
    /// Control values are reset to the new declaration's defaults on success
    /// and cleared on failure. The pause flag is untouched either way.
    pub fn reload<S: FrameScheduler + ?Sized>(
        &mut self,
        device: &mut D,
        scheduler: &mut S,
        source: &str,
        controls: Vec<ControlSpec>,
    ) -> Result<(), BuildError> {
        self.teardown(device);

        let program = match compile::build(device, source) {
            Ok(program) => program,
            Err(err) => {
                tracing::warn!(error = %err, "shader build failed; nothing will render");
                self.inputs.replace_controls(Vec::new());
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };

        let bindings = BindingTable::resolve(device, &program, &self.builtins, &controls);
        self.inputs.replace_controls(controls);

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let session = RenderSession::new(id, program, bindings);
        scheduler.schedule(session.ticket());
        tracing::info!(
            session = id.0,
            paused = self.inputs.is_paused(),
            "render session started"
        );

        self.session = Some(session);
        self.last_error = None;
        Ok(())
    }

    /// Body of the frame callback for `ticket`.
    ///
    /// Liveness is checked before anything else, so a ticket from a
    /// superseded session consumes no actions and never touches the device.
    pub fn run_frame<S: FrameScheduler + ?Sized>(
        &mut self,
        device: &mut D,
        ticket: &FrameTicket,
        scheduler: &mut S,
        now: Instant,
    ) -> FrameOutcome {
        let session = match self.session.as_mut() {
            Some(session) if ticket.is_live() && session.accepts(ticket) => session,
            _ => {
                tracing::trace!(session = ticket.session().0, "dropping cancelled frame");
                return FrameOutcome::Cancelled;
            }
        };

        let outcome = session.frame(device, &mut self.inputs, now);
        if let FrameOutcome::Skipped(err) = &outcome {
            tracing::warn!(error = %err, "frame skipped");
        }
        scheduler.schedule(session.ticket());
        outcome
    }

    /// Ends the live session, if any, releasing its program.
    pub fn shutdown(&mut self, device: &mut D) {
        self.teardown(device);
    }

    pub fn inputs(&self) -> &PlaybackInputs {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut PlaybackInputs {
        &mut self.inputs
    }

    /// Most recent build error; cleared by the next successful reload.
    pub fn last_error(&self) -> Option<&BuildError> {
        self.last_error.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn teardown(&mut self, device: &mut D) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session = session.id().0, "tearing down render session");
            session.teardown(device);
        }
    }
}
