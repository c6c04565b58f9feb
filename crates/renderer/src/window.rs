use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use image::RgbaImage;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::controls::ControlSpec;
use crate::device::{FrameError, GraphicsDevice};
use crate::gpu::{GpuContext, WgpuDevice};
use crate::reload::ReloadOrchestrator;
use crate::runtime::{FrameScheduler, FrameTicket, PlaybackInputs};
use crate::session::{FrameOutcome, FrameReport};
use crate::timeline::Readout;
use crate::types::RendererConfig;

/// Requests accepted by the window thread.
#[derive(Debug, Clone)]
pub enum WindowCommand {
    /// Replace the running program.
    Load {
        source: String,
        controls: Vec<ControlSpec>,
    },
    Pause,
    Resume,
    TogglePause,
    ResetTime,
    Capture,
    /// Set a live control from user text, parsed by the control's kind.
    SetControl { name: String, value: String },
    Shutdown,
}

/// Notifications emitted by the window thread.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowSignal {
    Loaded,
    /// Full diagnostics of a failed build.
    BuildFailed(String),
    Captured(PathBuf),
    CaptureFailed(String),
    ControlRejected(String),
    Closed,
}

/// Handle to the window thread that hosts the render loop.
pub struct WindowRuntime {
    proxy: EventLoopProxy<WindowCommand>,
    signals: Receiver<WindowSignal>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl WindowRuntime {
    /// Opens the window and its graphics device on a dedicated thread. Fails
    /// if either cannot be created.
    pub fn spawn(config: RendererConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let (signal_tx, signal_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("workshop-window".into())
            .spawn(move || run_window_thread(config, ready_tx, signal_tx))
            .context("failed to spawn window thread")?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread exited before initialising: {err}"))??;

        Ok(Self {
            proxy,
            signals: signal_rx,
            join_handle: Some(handle),
        })
    }

    pub fn send(&self, command: WindowCommand) -> Result<()> {
        self.proxy
            .send_event(command)
            .map_err(|_| anyhow!("window thread is no longer running"))
    }

    /// Signal stream, for callers that multiplex it with other channels.
    pub fn signals(&self) -> &Receiver<WindowSignal> {
        &self.signals
    }

    pub fn take_signals(&self) -> Vec<WindowSignal> {
        self.signals.try_iter().collect()
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

/// Frame callback primitive of the window: queue the ticket and ask winit
/// for a redraw.
struct RedrawScheduler {
    window: Arc<Window>,
    pending: Vec<FrameTicket>,
}

impl FrameScheduler for RedrawScheduler {
    fn schedule(&mut self, ticket: FrameTicket) {
        self.pending.push(ticket);
        self.window.request_redraw();
    }
}

/// Everything the event loop closure owns. Field order matters: the device
/// must drop before the window its surface was created from.
struct WindowHost {
    orchestrator: ReloadOrchestrator<WgpuDevice>,
    device: WgpuDevice,
    scheduler: RedrawScheduler,
    window: Arc<Window>,
    signal_tx: Sender<WindowSignal>,
    base_title: String,
    capture_dir: PathBuf,
    readout: Option<Readout>,
}

impl WindowHost {
    fn handle_command(
        &mut self,
        command: WindowCommand,
        elwt: &EventLoopWindowTarget<WindowCommand>,
    ) {
        match command {
            WindowCommand::Load { source, controls } => self.load(&source, controls),
            WindowCommand::Pause => self.orchestrator.inputs_mut().pause(),
            WindowCommand::Resume => self.orchestrator.inputs_mut().resume(),
            WindowCommand::TogglePause => {
                self.orchestrator.inputs_mut().toggle_pause();
            }
            WindowCommand::ResetTime => self.orchestrator.inputs_mut().reset_time(),
            WindowCommand::Capture => self.orchestrator.inputs_mut().capture(),
            WindowCommand::SetControl { name, value } => {
                if let Err(err) = self.orchestrator.inputs_mut().set_control_str(&name, &value) {
                    tracing::warn!(error = %err, "rejected control value");
                    self.signal(WindowSignal::ControlRejected(err.to_string()));
                }
            }
            WindowCommand::Shutdown => elwt.exit(),
        }
    }

    fn load(&mut self, source: &str, controls: Vec<ControlSpec>) {
        match self
            .orchestrator
            .reload(&mut self.device, &mut self.scheduler, source, controls)
        {
            Ok(()) => self.signal(WindowSignal::Loaded),
            Err(err) => {
                self.present_blank();
                self.signal(WindowSignal::BuildFailed(err.diagnostics()));
            }
        }
        self.readout = None;
        self.refresh_title();
    }

    fn handle_key(&mut self, event: &KeyEvent, elwt: &EventLoopWindowTarget<WindowCommand>) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let inputs = self.orchestrator.inputs_mut();
        match &event.logical_key {
            Key::Named(NamedKey::Space) => {
                let paused = inputs.toggle_pause();
                tracing::debug!(paused, "toggled pause");
            }
            Key::Named(NamedKey::F12) => inputs.capture(),
            Key::Named(NamedKey::Escape) => elwt.exit(),
            Key::Character(value) => match value.as_str() {
                "r" | "R" => inputs.reset_time(),
                "s" | "S" => inputs.capture(),
                " " => {
                    inputs.toggle_pause();
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.device.resize(size);
        self.orchestrator
            .inputs_mut()
            .set_viewport((size.width, size.height));
    }

    fn redraw(&mut self, elwt: &EventLoopWindowTarget<WindowCommand>) {
        let tickets = std::mem::take(&mut self.scheduler.pending);
        for ticket in tickets {
            let outcome = self.orchestrator.run_frame(
                &mut self.device,
                &ticket,
                &mut self.scheduler,
                Instant::now(),
            );
            match outcome {
                FrameOutcome::Rendered(report) => self.finish_frame(report),
                FrameOutcome::Skipped(FrameError::OutOfMemory) => {
                    tracing::error!("surface out of memory; closing window");
                    elwt.exit();
                }
                FrameOutcome::Skipped(_) | FrameOutcome::Cancelled => {}
            }
        }
    }

    fn finish_frame(&mut self, report: FrameReport) {
        if let Some(readout) = report.readout {
            self.readout = Some(readout);
            self.refresh_title();
        }
        match report.capture {
            Some(Ok(image)) => match save_capture(&self.capture_dir, &image) {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "captured frame");
                    self.signal(WindowSignal::Captured(path));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to save capture");
                    self.signal(WindowSignal::CaptureFailed(format!("{err:#}")));
                }
            },
            Some(Err(err)) => {
                tracing::warn!(error = %err, "frame capture failed");
                self.signal(WindowSignal::CaptureFailed(err.to_string()));
            }
            None => {}
        }
    }

    /// Clears the surface once so a failed build leaves nothing on screen.
    fn present_blank(&mut self) {
        match self.device.begin_frame() {
            Ok(()) => self.device.end_frame(),
            Err(err) => tracing::debug!(error = %err, "could not clear surface"),
        }
    }

    fn refresh_title(&self) {
        let error = self
            .orchestrator
            .last_error()
            .map(|err| err.to_string());
        self.window.set_title(&format_title(
            &self.base_title,
            self.readout.as_ref(),
            error.as_deref(),
        ));
    }

    fn shutdown(&mut self) {
        self.orchestrator.shutdown(&mut self.device);
        self.signal(WindowSignal::Closed);
    }

    fn signal(&self, signal: WindowSignal) {
        let _ = self.signal_tx.send(signal);
    }
}

fn run_window_thread(
    config: RendererConfig,
    ready_tx: Sender<Result<EventLoopProxy<WindowCommand>>>,
    signal_tx: Sender<WindowSignal>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let mut host = match open_window(&event_loop, &config, signal_tx) {
        Ok(host) => host,
        Err(err) => {
            let message = format!("{err:#}");
            let _ = ready_tx.send(Err(anyhow!(message)));
            return Err(err);
        }
    };
    let _ = ready_tx.send(Ok(event_loop.create_proxy()));
    tracing::info!(
        width = config.surface_size.0,
        height = config.surface_size.1,
        "window ready"
    );

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);
            match event {
                Event::UserEvent(command) => host.handle_command(command, elwt),
                Event::WindowEvent { window_id, event } if window_id == host.window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                        WindowEvent::KeyboardInput { event, .. } => host.handle_key(&event, elwt),
                        WindowEvent::CursorMoved { position, .. } => {
                            host.orchestrator
                                .inputs_mut()
                                .set_pointer(position.x, position.y);
                        }
                        WindowEvent::Resized(size) => host.resize(size),
                        WindowEvent::RedrawRequested => host.redraw(elwt),
                        _ => {}
                    }
                }
                Event::LoopExiting => host.shutdown(),
                _ => {}
            }
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

fn open_window(
    event_loop: &winit::event_loop::EventLoop<WindowCommand>,
    config: &RendererConfig,
    signal_tx: Sender<WindowSignal>,
) -> Result<WindowHost> {
    let (width, height) = config.surface_size;
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
        .build(event_loop)
        .context("failed to create window")?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let context = GpuContext::new(window.as_ref(), size)
        .context("failed to initialise graphics device")?;
    let device = WgpuDevice::new(context);
    let inputs = PlaybackInputs::new(device.viewport(), config.start_paused);

    Ok(WindowHost {
        orchestrator: ReloadOrchestrator::new(inputs),
        device,
        scheduler: RedrawScheduler {
            window: window.clone(),
            pending: Vec::new(),
        },
        window,
        signal_tx,
        base_title: config.title.clone(),
        capture_dir: config.capture_dir.clone(),
        readout: None,
    })
}

/// Writes `image` as a PNG into `dir`, creating the directory when missing.
fn save_capture(dir: &Path, image: &RgbaImage) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create capture directory {}", dir.display()))?;
    let path = dir.join(capture_file_name(Local::now().naive_local()));
    image
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn capture_file_name(stamp: NaiveDateTime) -> String {
    format!("shader-{}.png", stamp.format("%Y%m%d-%H%M%S-%3f"))
}

fn format_title(base: &str, readout: Option<&Readout>, error: Option<&str>) -> String {
    let mut title = base.to_string();
    if let Some(error) = error {
        title.push_str(" | ");
        title.push_str(error);
        return title;
    }
    if let Some(readout) = readout {
        title.push_str(&format!(" | t={:.2}", readout.elapsed));
        match readout.fps {
            Some(fps) => title.push_str(&format!(" FPS:{fps:.1}")),
            None => title.push_str(" (paused)"),
        }
    }
    title
}
