//! Filesystem watching for a fragment library.
//!
//! Raw `notify` events are reduced to the two things a host cares about:
//! the set of fragments may have changed, or a named file was written.

use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Receiver};
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

use crate::library::FRAGMENT_EXTENSION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    /// A fragment appeared, disappeared or was renamed.
    ListChanged,
    /// The file with this name (no directory) was created or written.
    Changed(String),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Keeps a non-recursive watch on the library root alive; events arrive on
/// [`events`](Self::events) until the watcher is dropped.
pub struct LibraryWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<LibraryEvent>,
}

impl LibraryWatcher {
    pub fn spawn(root: &Path) -> Result<Self, WatchError> {
        let (tx, rx) = unbounded();
        let as_watch_error = |source| WatchError::Watch {
            path: root.to_path_buf(),
            source,
        };
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for library_event in classify(&event) {
                    if tx.send(library_event).is_err() {
                        return;
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "file watcher error"),
        })
        .map_err(as_watch_error)?;
        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .map_err(as_watch_error)?;
        tracing::debug!(root = %root.display(), "watching fragment library");

        Ok(Self {
            _watcher: watcher,
            events: rx,
        })
    }

    pub fn events(&self) -> &Receiver<LibraryEvent> {
        &self.events
    }
}

/// Maps one filesystem event to library events. Metadata-only and access
/// events are dropped.
pub fn classify(event: &Event) -> Vec<LibraryEvent> {
    let structural = match event.kind {
        EventKind::Create(_)
        | EventKind::Remove(_)
        | EventKind::Modify(ModifyKind::Name(_)) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => false,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    let mut out = Vec::new();
    let touches_fragment = event.paths.iter().any(|path| {
        path.extension()
            .is_some_and(|ext| ext == FRAGMENT_EXTENSION)
    });
    if structural && touches_fragment {
        out.push(LibraryEvent::ListChanged);
    }
    if !matches!(event.kind, EventKind::Remove(_)) {
        for path in &event.paths {
            if let Some(name) = path.file_name() {
                let changed = LibraryEvent::Changed(name.to_string_lossy().into_owned());
                if !out.contains(&changed) {
                    out.push(changed);
                }
            }
        }
    }
    out
}
