//! A directory of `*.frag` sources with their `.glsl` includes and `.toml`
//! control manifests.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::manifest::{self, ControlDecl, ManifestError};
use crate::preprocess::{extract_include, preprocess, PreprocessError, PreprocessOptions};

pub const FRAGMENT_EXTENSION: &str = "frag";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("no fragment named '{0}'")]
    UnknownFragment(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Everything needed to run one fragment: the combined source, the file
/// behind each `#line` file id, and its declared controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedFragment {
    #[serde(skip)]
    pub name: String,
    pub content: String,
    pub refs: Vec<String>,
    pub controls: Vec<ControlDecl>,
}

impl LoadedFragment {
    /// `File ID -> filename` table printed alongside build errors.
    pub fn refs_table(&self) -> String {
        let mut table = String::from("File ID -> filename\n");
        for (id, name) in self.refs.iter().enumerate() {
            table.push_str(&format!("{id:>7} -> {name}\n"));
        }
        table
    }
}

#[derive(Debug, Clone)]
pub struct FragmentLibrary {
    root: PathBuf,
}

impl FragmentLibrary {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(LibraryError::NotADirectory(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File names of every fragment in the root, sorted.
    pub fn list(&self) -> Result<Vec<String>, LibraryError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let is_fragment = path
                .extension()
                .is_some_and(|ext| ext == FRAGMENT_EXTENSION);
            if is_fragment && entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolves `name` (with or without the `.frag` extension) to a fragment
    /// file inside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LibraryError> {
        let file = fragment_file_name(name)
            .ok_or_else(|| LibraryError::UnknownFragment(name.to_string()))?;
        let path = self.root.join(&file);
        if !path.is_file() {
            return Err(LibraryError::UnknownFragment(name.to_string()));
        }
        Ok(path)
    }

    pub fn load(
        &self,
        name: &str,
        options: PreprocessOptions,
    ) -> Result<LoadedFragment, LibraryError> {
        let path = self.resolve(name)?;
        let fragment = preprocess(&path, options)?;
        let manifest = manifest::load(&path)?;
        tracing::debug!(
            fragment = name,
            files = fragment.refs.len(),
            controls = manifest.controls.len(),
            "loaded fragment"
        );
        Ok(LoadedFragment {
            name: file_name(&path),
            content: fragment.content,
            refs: fragment.refs,
            controls: manifest.controls,
        })
    }

    /// File names whose change should reload `name`: the fragment, every file
    /// it includes transitively, and its manifest. Includes that do not exist
    /// yet are listed so that creating them triggers a reload.
    pub fn reference_tree(&self, name: &str) -> Result<BTreeSet<String>, LibraryError> {
        let path = self.resolve(name)?;
        let mut tree = BTreeSet::new();
        tree.insert(file_name(&manifest::manifest_path(&path)));
        self.collect_refs(&path, &mut tree)?;
        Ok(tree)
    }

    fn collect_refs(&self, path: &Path, tree: &mut BTreeSet<String>) -> Result<(), LibraryError> {
        if !tree.insert(file_name(path)) {
            return Ok(());
        }
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for include in text.lines().filter_map(extract_include) {
            self.collect_refs(&self.root.join(include), tree)?;
        }
        Ok(())
    }
}

fn fragment_file_name(name: &str) -> Option<String> {
    if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') || name.starts_with('.') {
        return None;
    }
    let suffix = format!(".{FRAGMENT_EXTENSION}");
    if name.ends_with(&suffix) {
        Some(name.to_string())
    } else {
        Some(format!("{name}{suffix}"))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
