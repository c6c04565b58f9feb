use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories_next::ProjectDirs;
use serde::Deserialize;

use crate::cli::RunArgs;

pub const ENV_CONFIG_FILE: &str = "WORKSHOP_CONFIG";
pub const ENV_CONFIG_DIR: &str = "WORKSHOP_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "workshop.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "ShaderWorkshop";
const APPLICATION: &str = "workshop";

const DEFAULT_SURFACE_SIZE: (u32, u32) = (1280, 720);

/// Contents of `workshop.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub shader_dir: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub start_paused: Option<bool>,
    pub capture_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Reads `path`; relative directories in the file are taken relative to
    /// the file itself.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: FileConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        if config.width == Some(0) || config.height == Some(0) {
            bail!("{}: width and height must be greater than zero", path.display());
        }
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.shader_dir = config.shader_dir.map(|dir| base.join(dir));
        config.capture_dir = config.capture_dir.map(|dir| base.join(dir));
        Ok(config)
    }

    /// Loads the explicit `--config` file, or the default one when present.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Ok(path) if path.is_file() => Self::load(&path),
            Ok(path) => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Ok(Self::default())
            }
            Err(err) => {
                tracing::debug!(error = %err, "no config directory; using defaults");
                Ok(Self::default())
            }
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(ENV_CONFIG_DIR) {
        return Ok(PathBuf::from(dir).join(CONFIG_FILE_NAME));
    }
    let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(project_dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Effective settings: command line over config file over built-in
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub shader_dir: PathBuf,
    pub fragment: Option<String>,
    pub surface_size: (u32, u32),
    pub start_paused: bool,
    pub capture_dir: PathBuf,
}

impl Settings {
    pub fn resolve(args: &RunArgs, file: &FileConfig) -> Self {
        let (default_width, default_height) = DEFAULT_SURFACE_SIZE;
        let surface_size = args.size.unwrap_or((
            file.width.unwrap_or(default_width),
            file.height.unwrap_or(default_height),
        ));
        Self {
            shader_dir: args
                .dir
                .clone()
                .or_else(|| file.shader_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            fragment: args.frag.clone(),
            surface_size,
            start_paused: args
                .start_paused()
                .or(file.start_paused)
                .unwrap_or(false),
            capture_dir: args
                .capture_dir
                .clone()
                .or_else(|| file.capture_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow!("expected WxH format, e.g. 1280x720"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}
