//! Program building: pairs a fragment source with the fixed full-screen
//! triangle vertex stage, compiles both and links them.

use thiserror::Error;

use crate::device::GraphicsDevice;
use crate::types::ShaderStage;

/// Vertex stage shared by every program.
///
/// One oversized triangle whose corners sit at (-1,-1), (-1,3) and (3,-1);
/// rasterizer clipping trims it to exactly the viewport. Positions are picked
/// by vertex index so no vertex or index buffer is needed.
pub const VERTEX_SHADER_SOURCE: &str = r"#version 300 es
const vec2 positions[3] = vec2[3](
    vec2(-1.0, -1.0),
    vec2(-1.0, 3.0),
    vec2(3.0, -1.0)
);

void main() {
    gl_Position = vec4(positions[gl_VertexID], 0.0, 1.0);
}
";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{stage} shader failed to compile")]
    CompileFailed {
        stage: ShaderStage,
        log: String,
        annotated_source: String,
    },
    #[error("program failed to link")]
    LinkFailed { log: String },
}

impl BuildError {
    /// Full human-readable report: the headline, the stage or linker log and,
    /// for compile failures, the offending source with line numbers.
    pub fn diagnostics(&self) -> String {
        match self {
            BuildError::CompileFailed {
                log,
                annotated_source,
                ..
            } => format!("{self}:\n{}\n\n{annotated_source}", log.trim_end()),
            BuildError::LinkFailed { log } => format!("{self}:\n{}", log.trim_end()),
        }
    }
}

/// File id and line number of one source line, as `#line` directives define
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineOrigin {
    pub file: u32,
    pub line: u32,
}

/// Origin of every line of `source`. Lines start at file 0, line 1; a
/// `#line N [file]` directive sets the origin of the line after it. The
/// directive lines themselves map to `None`.
pub(crate) fn line_origins(source: &str) -> Vec<Option<LineOrigin>> {
    let mut current = LineOrigin { file: 0, line: 1 };
    source
        .lines()
        .map(|line| match parse_line_directive(line, current.file) {
            Some(next) => {
                current = next;
                None
            }
            None => {
                let origin = current;
                current.line += 1;
                Some(origin)
            }
        })
        .collect()
}

fn parse_line_directive(line: &str, file: u32) -> Option<LineOrigin> {
    let mut words = line.trim_start().strip_prefix("#line")?.split_whitespace();
    let line = words.next()?.parse().ok()?;
    let file = match words.next() {
        Some(word) => word.parse().ok()?,
        None => file,
    };
    Some(LineOrigin { file, line })
}

/// Prefixes every line of `source` with its line number. Once `#line`
/// directives bring in a second file the prefix becomes `file:line`, the
/// same form compile logs use.
pub fn annotate_source(source: &str) -> String {
    let origins = line_origins(source);
    let multi_file = origins.iter().flatten().any(|origin| origin.file != 0);
    let labels: Vec<String> = origins
        .iter()
        .map(|origin| match origin {
            Some(origin) if multi_file => format!("{}:{}", origin.file, origin.line),
            Some(origin) => origin.line.to_string(),
            None => String::new(),
        })
        .collect();
    let width = labels.iter().map(String::len).max().unwrap_or(1);

    let mut annotated = String::with_capacity(source.len() + labels.len() * (width + 3));
    for (label, line) in labels.iter().zip(source.lines()) {
        annotated.push_str(&format!("{label:>width$} | {line}\n"));
    }
    annotated
}

/// Compiles `fragment_source` against the fixed vertex stage and links the
/// pair. Stage objects are released on every exit path; on error no program
/// resource remains allocated.
pub fn build<D: GraphicsDevice>(
    device: &mut D,
    fragment_source: &str,
) -> Result<D::Program, BuildError> {
    let mut scope = StageScope::new(device);
    let vertex = scope.compile(ShaderStage::Vertex, VERTEX_SHADER_SOURCE)?;
    let fragment = scope.compile(ShaderStage::Fragment, fragment_source)?;
    scope.link(vertex, fragment)
}

/// Owns intermediate stage objects and hands them back to the device when
/// dropped.
struct StageScope<'d, D: GraphicsDevice> {
    device: &'d mut D,
    stages: Vec<D::Stage>,
}

impl<'d, D: GraphicsDevice> StageScope<'d, D> {
    fn new(device: &'d mut D) -> Self {
        Self {
            device,
            stages: Vec::with_capacity(2),
        }
    }

    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<usize, BuildError> {
        match self.device.compile(stage, source) {
            Ok(compiled) => {
                self.stages.push(compiled);
                Ok(self.stages.len() - 1)
            }
            Err(log) => {
                tracing::debug!(%stage, "shader stage failed to compile");
                Err(BuildError::CompileFailed {
                    stage,
                    log,
                    annotated_source: annotate_source(source),
                })
            }
        }
    }

    fn link(&mut self, vertex: usize, fragment: usize) -> Result<D::Program, BuildError> {
        self.device
            .link(&self.stages[vertex], &self.stages[fragment])
            .map_err(|log| BuildError::LinkFailed { log })
    }
}

impl<D: GraphicsDevice> Drop for StageScope<'_, D> {
    fn drop(&mut self) {
        for stage in self.stages.drain(..) {
            self.device.release_stage(stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;
    use crate::device::FrameError;
    use crate::types::UniformValue;

    #[derive(Default)]
    struct StageCounter {
        fail_stage: Option<ShaderStage>,
        fail_link: bool,
        stages_live: i32,
        programs_live: i32,
    }

    impl GraphicsDevice for StageCounter {
        type Stage = ShaderStage;
        type Program = ();
        type Slot = ();

        fn compile(&mut self, stage: ShaderStage, _source: &str) -> Result<ShaderStage, String> {
            if self.fail_stage == Some(stage) {
                return Err("0:3: 'foo' : undeclared identifier".into());
            }
            self.stages_live += 1;
            Ok(stage)
        }

        fn release_stage(&mut self, _stage: ShaderStage) {
            self.stages_live -= 1;
        }

        fn link(&mut self, vertex: &ShaderStage, fragment: &ShaderStage) -> Result<(), String> {
            assert_eq!(*vertex, ShaderStage::Vertex);
            assert_eq!(*fragment, ShaderStage::Fragment);
            if self.fail_link {
                return Err("varying mismatch".into());
            }
            self.programs_live += 1;
            Ok(())
        }

        fn release_program(&mut self, _program: ()) {
            self.programs_live -= 1;
        }

        fn uniform_slot(&self, _program: &(), _name: &str) -> Option<()> {
            None
        }

        fn viewport(&self) -> (u32, u32) {
            (1, 1)
        }

        fn begin_frame(&mut self) -> Result<(), FrameError> {
            Ok(())
        }

        fn bind_program(&mut self, _program: &()) {}

        fn set_uniform(&mut self, _slot: (), _value: UniformValue) {}

        fn draw_fullscreen(&mut self) {}

        fn capture(&mut self) -> Result<RgbaImage, FrameError> {
            Ok(RgbaImage::new(1, 1))
        }

        fn end_frame(&mut self) {}
    }

    #[test]
    fn successful_build_releases_both_stages() {
        let mut device = StageCounter::default();
        build(&mut device, "void main() {}").expect("build");
        assert_eq!(device.stages_live, 0);
        assert_eq!(device.programs_live, 1);
    }

    #[test]
    fn fragment_failure_releases_vertex_stage() {
        let mut device = StageCounter {
            fail_stage: Some(ShaderStage::Fragment),
            ..Default::default()
        };
        let err = build(&mut device, "void main() {\n  foo;\n}").unwrap_err();
        assert_eq!(device.stages_live, 0);
        assert_eq!(device.programs_live, 0);
        match err {
            BuildError::CompileFailed {
                stage,
                log,
                annotated_source,
            } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("undeclared identifier"));
                assert!(annotated_source.contains("2 |   foo;"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn vertex_failure_is_reported_like_any_compile_error() {
        let mut device = StageCounter {
            fail_stage: Some(ShaderStage::Vertex),
            ..Default::default()
        };
        let err = build(&mut device, "void main() {}").unwrap_err();
        assert!(matches!(
            err,
            BuildError::CompileFailed {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
        assert_eq!(device.stages_live, 0);
    }

    #[test]
    fn link_failure_releases_stages_and_keeps_log() {
        let mut device = StageCounter {
            fail_link: true,
            ..Default::default()
        };
        let err = build(&mut device, "void main() {}").unwrap_err();
        assert_eq!(
            err,
            BuildError::LinkFailed {
                log: "varying mismatch".into()
            }
        );
        assert_eq!(device.stages_live, 0);
        assert_eq!(device.programs_live, 0);
        assert!(err.diagnostics().contains("varying mismatch"));
    }

    #[test]
    fn line_directives_set_the_next_line() {
        let source = "a\n#line 1 1\nb\nc\n#line 3 0\nd\n#line 10\ne\n";
        let origin = |file, line| Some(LineOrigin { file, line });
        assert_eq!(
            line_origins(source),
            vec![
                origin(0, 1),
                None,
                origin(1, 1),
                origin(1, 2),
                None,
                origin(0, 3),
                None,
                origin(0, 10),
            ]
        );
    }

    #[test]
    fn malformed_directives_are_ordinary_lines() {
        let origins = line_origins("#line\n#line x 1\nend\n");
        assert_eq!(origins[2], Some(LineOrigin { file: 0, line: 3 }));
    }

    #[test]
    fn annotation_labels_included_files() {
        let source = "void a();\n#line 1 1\nfloat n;\n#line 2 0\nvoid main() {}\n";
        assert_eq!(
            annotate_source(source),
            "0:1 | void a();\n    | #line 1 1\n1:1 | float n;\n    \
             | #line 2 0\n0:2 | void main() {}\n"
        );
    }

    #[test]
    fn annotation_pads_line_numbers() {
        let source = (1..=10).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        let annotated = annotate_source(&source);
        assert!(annotated.starts_with(" 1 | l1\n"));
        assert!(annotated.ends_with("10 | l10\n"));
    }
}
