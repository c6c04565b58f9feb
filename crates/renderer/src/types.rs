use std::fmt;
use std::path::PathBuf;

/// Name of the builtin viewport resolution uniform (`vec2`, device pixels).
pub const RESOLUTION_UNIFORM: &str = "resolution";
/// Name of the builtin elapsed time uniform (`float`, seconds).
pub const TIME_UNIFORM: &str = "time";
/// Name of the builtin pointer position uniform (`vec2`, bottom-left origin).
pub const MOUSE_UNIFORM: &str = "mouse";

/// Pipeline stage a piece of source text is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Declared semantic type of a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
}

/// Value written into a uniform slot for one frame.
///
/// Booleans travel as `Int(0 | 1)`, matching how the fragment stage reads them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
}

/// Builtin uniform names resolved for every program build.
///
/// The defaults are part of the source contract (`resolution`, `time`,
/// `mouse`); hosts embedding the renderer under a different naming scheme can
/// override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinNames {
    pub resolution: String,
    pub time: String,
    pub mouse: String,
}

impl Default for BuiltinNames {
    fn default() -> Self {
        Self {
            resolution: RESOLUTION_UNIFORM.to_string(),
            time: TIME_UNIFORM.to_string(),
            mouse: MOUSE_UNIFORM.to_string(),
        }
    }
}

/// Immutable configuration passed to the window runtime at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Whether the timeline starts frozen.
    pub start_paused: bool,
    /// Directory captured frames are written to.
    pub capture_dir: PathBuf,
    /// Window title prefix; the readout and last error are appended.
    pub title: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            start_paused: false,
            capture_dir: PathBuf::from("."),
            title: "Shader Workshop".to_string(),
        }
    }
}
