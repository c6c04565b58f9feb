use std::collections::BTreeSet;

use anyhow::{Context, Result};
use crossbeam_channel::{never, select};
use fragments::{FragmentLibrary, LibraryEvent, LibraryWatcher, LoadedFragment, PreprocessOptions};
use renderer::{RendererConfig, WindowCommand, WindowRuntime, WindowSignal};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::commands::{parse_command, spawn_stdin_reader, ConsoleCommand, HELP};
use crate::config::{FileConfig, Settings};
use crate::controls::control_specs;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let file = FileConfig::discover(args.config.as_deref())?;
    let settings = Settings::resolve(&args, &file);
    let library = FragmentLibrary::open(&settings.shader_dir).with_context(|| {
        format!(
            "failed to open shader directory {}",
            settings.shader_dir.display()
        )
    })?;
    tracing::info!(
        dir = %library.root().display(),
        width = settings.surface_size.0,
        height = settings.surface_size.1,
        paused = settings.start_paused,
        "starting shader workshop"
    );

    let runtime = WindowRuntime::spawn(RendererConfig {
        surface_size: settings.surface_size,
        start_paused: settings.start_paused,
        capture_dir: settings.capture_dir.clone(),
        ..RendererConfig::default()
    })
    .context("failed to start the preview window")?;
    let watcher = LibraryWatcher::spawn(library.root())?;

    let mut bench = Workbench::new(library, runtime);
    bench.refresh_list();
    let initial = settings
        .fragment
        .clone()
        .or_else(|| bench.fragments.first().cloned());
    match initial {
        Some(name) => bench.select(&name)?,
        None => tracing::warn!("no .frag files found; waiting for one to appear"),
    }

    let signals = bench.runtime.signals().clone();
    let mut commands = spawn_stdin_reader()?;
    let mut library_events = watcher.events().clone();
    loop {
        let mut stdin_closed = false;
        let mut watcher_gone = false;
        let keep_running = select! {
            recv(signals) -> signal => match signal {
                Ok(signal) => bench.on_signal(signal),
                Err(_) => false,
            },
            recv(library_events) -> event => match event {
                Ok(event) => {
                    bench.on_library_event(event)?;
                    true
                }
                Err(_) => {
                    watcher_gone = true;
                    true
                }
            },
            recv(commands) -> line => match line {
                Ok(line) => bench.on_line(&line)?,
                Err(_) => {
                    stdin_closed = true;
                    true
                }
            },
        };
        if !keep_running {
            break;
        }
        if stdin_closed {
            tracing::debug!("stdin closed; console commands disabled");
            commands = never();
        }
        if watcher_gone {
            tracing::warn!("file watcher stopped; automatic reload disabled");
            library_events = never();
        }
    }

    drop(watcher);
    for signal in bench.runtime.take_signals() {
        bench.on_signal(signal);
    }
    bench.runtime.shutdown()
}

/// Host-side state: which fragment is showing and which files it depends on.
struct Workbench {
    library: FragmentLibrary,
    runtime: WindowRuntime,
    fragments: Vec<String>,
    selected: Option<String>,
    reference_tree: BTreeSet<String>,
    current: Option<LoadedFragment>,
}

impl Workbench {
    fn new(library: FragmentLibrary, runtime: WindowRuntime) -> Self {
        Self {
            library,
            runtime,
            fragments: Vec::new(),
            selected: None,
            reference_tree: BTreeSet::new(),
            current: None,
        }
    }

    fn refresh_list(&mut self) {
        match self.library.list() {
            Ok(fragments) => self.fragments = fragments,
            Err(err) => tracing::warn!(error = %err, "failed to list fragments"),
        }
        let still_present = self
            .selected
            .as_ref()
            .is_some_and(|name| self.fragments.contains(name));
        if self.selected.is_some() && !still_present {
            tracing::info!("selected fragment disappeared");
            self.selected = None;
            self.reference_tree.clear();
        }
    }

    fn select(&mut self, name: &str) -> Result<()> {
        let path = match self.library.resolve(name) {
            Ok(path) => path,
            Err(err) => {
                eprintln!("{err}");
                return Ok(());
            }
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        self.selected = Some(file_name);
        self.reload()
    }

    /// Re-reads the selected fragment and hands it to the window. Intake
    /// failures (missing include, bad manifest) leave the running program
    /// untouched.
    fn reload(&mut self) -> Result<()> {
        let Some(name) = self.selected.clone() else {
            return Ok(());
        };
        match self.library.reference_tree(&name) {
            Ok(tree) => self.reference_tree = tree,
            Err(err) => tracing::warn!(error = %err, "failed to track fragment references"),
        }
        tracing::debug!(fragment = %name, tree = ?self.reference_tree, "reference tree");

        let fragment = match self.library.load(&name, PreprocessOptions::default()) {
            Ok(fragment) => fragment,
            Err(err) => {
                eprintln!("{name}: {err}");
                return Ok(());
            }
        };
        let controls = match control_specs(&fragment.controls) {
            Ok(controls) => controls,
            Err(err) => {
                eprintln!("{name}: {err:#}");
                return Ok(());
            }
        };

        tracing::info!(fragment = %name, controls = controls.len(), "loading fragment");
        self.runtime.send(WindowCommand::Load {
            source: fragment.content.clone(),
            controls,
        })?;
        self.current = Some(fragment);
        Ok(())
    }

    fn on_signal(&mut self, signal: WindowSignal) -> bool {
        match signal {
            WindowSignal::Loaded => {
                if let Some(name) = &self.selected {
                    tracing::info!(fragment = %name, "fragment running");
                }
            }
            WindowSignal::BuildFailed(diagnostics) => {
                eprintln!("{diagnostics}");
                if let Some(current) = self.current.as_ref().filter(|f| f.refs.len() > 1) {
                    eprintln!("{}", current.refs_table());
                }
            }
            WindowSignal::Captured(path) => println!("saved {}", path.display()),
            WindowSignal::CaptureFailed(message) => eprintln!("capture failed: {message}"),
            WindowSignal::ControlRejected(message) => eprintln!("{message}"),
            WindowSignal::Closed => {
                tracing::info!("window closed");
                return false;
            }
        }
        true
    }

    fn on_library_event(&mut self, event: LibraryEvent) -> Result<()> {
        match event {
            LibraryEvent::ListChanged => {
                tracing::debug!("fragment list changed");
                self.refresh_list();
                if self.selected.is_none() {
                    if let Some(first) = self.fragments.first().cloned() {
                        self.select(&first)?;
                    }
                }
            }
            LibraryEvent::Changed(file) => {
                if self.reference_tree.contains(&file) {
                    tracing::info!(file = %file, "change detected");
                    self.reload()?;
                }
            }
        }
        Ok(())
    }

    fn on_line(&mut self, line: &str) -> Result<bool> {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(true),
            Err(message) => {
                eprintln!("{message}");
                return Ok(true);
            }
        };
        let window_command = match command {
            ConsoleCommand::Pause => WindowCommand::Pause,
            ConsoleCommand::Resume => WindowCommand::Resume,
            ConsoleCommand::Toggle => WindowCommand::TogglePause,
            ConsoleCommand::Reset => WindowCommand::ResetTime,
            ConsoleCommand::Capture => WindowCommand::Capture,
            ConsoleCommand::Set { name, value } => WindowCommand::SetControl { name, value },
            ConsoleCommand::Load(name) => {
                self.select(&name)?;
                return Ok(true);
            }
            ConsoleCommand::List => {
                self.print_list();
                return Ok(true);
            }
            ConsoleCommand::Help => {
                println!("{HELP}");
                return Ok(true);
            }
            ConsoleCommand::Quit => return Ok(false),
        };
        self.runtime.send(window_command)?;
        Ok(true)
    }

    fn print_list(&self) {
        if self.fragments.is_empty() {
            println!("no fragments in {}", self.library.root().display());
            return;
        }
        for name in &self.fragments {
            let marker = if self.selected.as_deref() == Some(name.as_str()) {
                '*'
            } else {
                ' '
            };
            println!("{marker} {name}");
        }
    }
}

/// Prints every fragment of `library`, one per line.
pub fn list(library: &FragmentLibrary) -> Result<()> {
    for name in library.list()? {
        println!("{name}");
    }
    Ok(())
}
