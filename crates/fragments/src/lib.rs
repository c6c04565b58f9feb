//! Source intake for the shader workshop: a directory of fragment sources,
//! their `#include` expansion and control manifests, and a watcher that
//! reports which of those files changed.

mod library;
mod manifest;
mod preprocess;
mod watch;

pub use library::{FragmentLibrary, LibraryError, LoadedFragment, FRAGMENT_EXTENSION};
pub use manifest::{
    load as load_manifest, manifest_path, ControlDecl, ControlDefault, ControlManifest,
    ControlType, ManifestError,
};
pub use preprocess::{
    extract_include, preprocess, Fragment, PreprocessError, PreprocessOptions, FRAGMENT_HEADER,
};
pub use watch::{classify, LibraryEvent, LibraryWatcher, WatchError};
