//! Rewrites GLSL ES 3.00 program text into the Vulkan-flavoured GLSL 4.50
//! accepted by the naga front-end.
//!
//! Every rewrite keeps the user's line count intact (removed statements become
//! blank lines) and the user text follows a fixed preamble. naga reports
//! positions in the translated text and ignores `#line`, so each translation
//! carries a [`LineMap`] back to the `file:line` the user wrote.

use crate::compile::{line_origins, LineOrigin};

use super::uniforms::{GlslType, UniformLayout, BLOCK_INSTANCE, VIEWPORT_MEMBER};

const PRECISIONS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Stage text ready for compilation, the uniform block it declares (empty for
/// the vertex stage) and the way back to the user's lines.
#[derive(Debug, Clone)]
pub(crate) struct Translated {
    pub source: String,
    pub layout: UniformLayout,
    pub lines: LineMap,
}

/// Maps 1-based line numbers of translated text onto the user's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineMap {
    preamble: u32,
    origins: Vec<Option<LineOrigin>>,
}

impl LineMap {
    fn new(preamble: &str, user_source: &str) -> Self {
        Self {
            preamble: preamble.lines().count() as u32,
            origins: line_origins(user_source),
        }
    }

    /// Origin of translated line `line_number`; `None` for generated lines and
    /// `#line` directives.
    pub fn origin(&self, line_number: u32) -> Option<LineOrigin> {
        let index = line_number.checked_sub(self.preamble + 1)?;
        self.origins.get(index as usize).copied().flatten()
    }
}

pub(crate) fn translate_vertex(source: &str) -> Translated {
    let mut comments = CommentState::default();
    let body = rewrite_lines(source, |line| {
        let started_in_comment = comments.open;
        let code = comments.strip(line);
        if is_version(&code) || is_precision(&code) {
            Rewrite::Blank(comment_edges(started_in_comment, comments.open))
        } else {
            Rewrite::Keep
        }
    });
    let preamble = "#version 450\n#define gl_VertexID gl_VertexIndex\n";
    Translated {
        lines: LineMap::new(preamble, source),
        source: format!("{preamble}{body}"),
        layout: UniformLayout::default(),
    }
}

pub(crate) fn translate_fragment(source: &str) -> Result<Translated, String> {
    let mut layout = UniformLayout::default();
    let mut failure = None;
    let mut depth = 0i32;
    let mut comments = CommentState::default();

    let body = rewrite_lines(source, |line| {
        let started_in_comment = comments.open;
        let code = comments.strip(line);
        let code = code.trim();
        let top_level = depth == 0;
        depth += brace_delta(code);
        let blank = || Rewrite::Blank(comment_edges(started_in_comment, comments.open));

        if is_version(code) || is_precision(code) {
            return blank();
        }
        if !top_level {
            return Rewrite::Keep;
        }
        if let Some((ty, names)) = parse_uniform(code) {
            for name in names {
                if let Err(err) = layout.push(name, ty) {
                    failure.get_or_insert(err);
                }
            }
            return blank();
        }
        if code.starts_with("out ") && code.ends_with(';') {
            return Rewrite::Prefix("layout(location = 0) ");
        }
        Rewrite::Keep
    });

    if let Some(err) = failure {
        return Err(err);
    }

    let preamble = format!(
        "#version 450\n\
         #define GL_FRAGMENT_PRECISION_HIGH 1\n\
         {block}\
         vec4 workshop_frag_coord;\n\
         #define gl_FragCoord workshop_frag_coord\n\
         #define main workshop_main\n",
        block = layout.declaration(),
    );
    let flipped_y = format!("{BLOCK_INSTANCE}.{VIEWPORT_MEMBER}.y - gl_FragCoord.y");
    let entry_point = format!(
        "#undef main\n\
         #undef gl_FragCoord\n\
         void main() {{\n\
         \x20   workshop_frag_coord =\n\
         \x20       vec4(gl_FragCoord.x, {flipped_y}, gl_FragCoord.z, gl_FragCoord.w);\n\
         \x20   workshop_main();\n\
         }}\n"
    );
    Ok(Translated {
        lines: LineMap::new(&preamble, source),
        source: format!("{preamble}{body}{entry_point}"),
        layout,
    })
}

enum Rewrite {
    Keep,
    /// Drop the statement but keep whatever comment delimiters the line
    /// carried, so a comment spanning it stays balanced.
    Blank(&'static str),
    Prefix(&'static str),
}

fn rewrite_lines(source: &str, mut rewrite: impl FnMut(&str) -> Rewrite) -> String {
    let mut out = String::with_capacity(source.len() + 64);
    for line in source.lines() {
        match rewrite(line) {
            Rewrite::Keep => out.push_str(line),
            Rewrite::Blank(edges) => out.push_str(edges),
            Rewrite::Prefix(prefix) => {
                out.push_str(prefix);
                out.push_str(line.trim_start());
            }
        }
        out.push('\n');
    }
    out
}

fn comment_edges(started_in_comment: bool, ends_in_comment: bool) -> &'static str {
    match (started_in_comment, ends_in_comment) {
        (false, false) => "",
        (true, false) => "*/",
        (false, true) => "/*",
        (true, true) => "*/ /*",
    }
}

/// Block comment state carried from one line to the next.
#[derive(Debug, Default)]
struct CommentState {
    open: bool,
}

impl CommentState {
    /// Returns the code of `line` with `//` and `/* */` comments removed.
    fn strip(&mut self, line: &str) -> String {
        let mut code = String::with_capacity(line.len());
        let mut rest = line;
        loop {
            if self.open {
                let Some(end) = rest.find("*/") else {
                    return code;
                };
                self.open = false;
                code.push(' ');
                rest = &rest[end + 2..];
                continue;
            }
            match (rest.find("//"), rest.find("/*")) {
                (Some(line_comment), Some(block)) if line_comment < block => {
                    code.push_str(&rest[..line_comment]);
                    return code;
                }
                (Some(line_comment), None) => {
                    code.push_str(&rest[..line_comment]);
                    return code;
                }
                (_, Some(block)) => {
                    code.push_str(&rest[..block]);
                    self.open = true;
                    rest = &rest[block + 2..];
                }
                (None, None) => {
                    code.push_str(rest);
                    return code;
                }
            }
        }
    }
}

fn is_version(code: &str) -> bool {
    code.trim_start().starts_with("#version")
}

fn is_precision(code: &str) -> bool {
    code.trim_start().starts_with("precision ")
}

fn brace_delta(code: &str) -> i32 {
    code.chars().fold(0, |delta, c| match c {
        '{' => delta + 1,
        '}' => delta - 1,
        _ => delta,
    })
}

/// Parses `uniform [precision] <type> a[, b...];`. Opaque types, arrays and
/// anything else that cannot live in the generated block return `None` and
/// are left for the compiler to judge.
fn parse_uniform(code: &str) -> Option<(GlslType, Vec<&str>)> {
    let rest = code.strip_prefix("uniform ")?.strip_suffix(';')?.trim();
    let rest = match rest.split_once(char::is_whitespace) {
        Some((precision, tail)) if PRECISIONS.contains(&precision) => tail.trim_start(),
        _ => rest,
    };
    let (ty, names) = rest.split_once(char::is_whitespace)?;
    let ty = GlslType::parse(ty)?;
    let names: Vec<&str> = names.split(',').map(str::trim).collect();
    if !names.iter().all(|name| is_identifier(name)) {
        return None;
    }
    Some((ty, names))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_AND_BODY: &str = "#version 300 es
#if GL_FRAGMENT_PRECISION_HIGH
precision highp float;
#endif
out vec4 out_color;
uniform float time;
uniform highp vec2 resolution, mouse; // builtins
uniform sampler2D image;
void main() {
    uniform_like = 1.0;
    out_color = vec4(time);
}
";

    fn user_lines(translated: &Translated) -> Vec<&str> {
        let preamble = translated.lines.preamble as usize;
        translated.source.lines().skip(preamble).collect()
    }

    #[test]
    fn gathers_loose_uniforms_into_the_block() {
        let translated = translate_fragment(HEADER_AND_BODY).unwrap();
        assert!(translated.layout.slot("time").is_some());
        assert!(translated.layout.slot("resolution").is_some());
        assert!(translated.layout.slot("mouse").is_some());
        assert!(translated.layout.slot("image").is_none());
        assert!(translated.source.contains("#define time workshop.u_time\n"));
        assert!(translated.source.contains("uniform sampler2D image;"));
    }

    #[test]
    fn keeps_user_line_numbers() {
        let translated = translate_fragment(HEADER_AND_BODY).unwrap();
        let lines = user_lines(&translated);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "#if GL_FRAGMENT_PRECISION_HIGH");
        assert_eq!(lines[2], "");
        assert_eq!(lines[4], "layout(location = 0) out vec4 out_color;");
        assert_eq!(lines[5], "");
        assert_eq!(lines[10], "    out_color = vec4(time);");
    }

    #[test]
    fn line_map_skips_the_preamble() {
        let translated = translate_fragment(HEADER_AND_BODY).unwrap();
        let preamble = translated.lines.preamble;
        assert_eq!(translated.lines.origin(1), None);
        assert_eq!(translated.lines.origin(preamble), None);
        assert_eq!(
            translated.lines.origin(preamble + 11),
            Some(LineOrigin { file: 0, line: 11 })
        );
        let line_count = translated.source.lines().count() as u32;
        assert_eq!(translated.lines.origin(line_count), None);
    }

    #[test]
    fn line_map_follows_line_directives() {
        let source = "#line 1 1\nfloat noise() { return 0.5; }\n#line 4 0\nvoid main() {}\n";
        let translated = translate_fragment(source).unwrap();
        let preamble = translated.lines.preamble;
        assert_eq!(
            translated.lines.origin(preamble + 2),
            Some(LineOrigin { file: 1, line: 1 })
        );
        assert_eq!(translated.lines.origin(preamble + 3), None);
        assert_eq!(
            translated.lines.origin(preamble + 4),
            Some(LineOrigin { file: 0, line: 4 })
        );
    }

    #[test]
    fn remaps_frag_coord_and_entry_point() {
        let translated = translate_fragment("void main() {}\n").unwrap();
        let source = &translated.source;
        assert!(source.starts_with("#version 450\n"));
        assert!(source.contains("#define main workshop_main\n"));
        assert!(source.contains("workshop.workshop_viewport.y - gl_FragCoord.y"));
        assert!(source.trim_end().ends_with("workshop_main();\n}"));
    }

    #[test]
    fn conflicting_redeclaration_is_an_error() {
        let err = translate_fragment("uniform float t;\nuniform int t;\n").unwrap_err();
        assert!(err.contains("'t'"));
    }

    #[test]
    fn nested_out_parameters_are_untouched() {
        let source = "void shade(\n    out vec4 color) {\n    out vec4 nope;\n}\n";
        let translated = translate_fragment(source).unwrap();
        assert!(translated.source.contains("\n    out vec4 nope;\n"));
        assert!(!translated.source.contains("layout(location = 0) out vec4 color"));
    }

    #[test]
    fn commented_out_uniforms_stay_comments() {
        let source = "/*\nuniform float hidden;\n*/\n\
                      uniform float shown; /* { */\nvoid main() {}\n";
        let translated = translate_fragment(source).unwrap();
        assert!(translated.layout.slot("hidden").is_none());
        assert!(translated.layout.slot("shown").is_some());
        assert_eq!(
            user_lines(&translated)[..5],
            ["/*", "uniform float hidden;", "*/", "", "void main() {}"]
        );
    }

    #[test]
    fn braces_inside_block_comments_do_not_nest() {
        let source = "/* { */\nuniform float a;\n\
                      out vec4 color; /* ends\n } */\nuniform float b;\n";
        let translated = translate_fragment(source).unwrap();
        assert!(translated.layout.slot("a").is_some());
        assert!(translated.layout.slot("b").is_some());
        let lines = user_lines(&translated);
        assert_eq!(lines[2], "layout(location = 0) out vec4 color; /* ends");
    }

    #[test]
    fn blanked_lines_keep_comment_delimiters() {
        let source = "/* note\n */ uniform float a; /* more\n */\n";
        let translated = translate_fragment(source).unwrap();
        assert!(translated.layout.slot("a").is_some());
        assert_eq!(user_lines(&translated)[..3], ["/* note", "*/ /*", " */"]);
    }

    #[test]
    fn strips_both_comment_forms() {
        let mut comments = CommentState::default();
        assert_eq!(comments.strip("a // b /* c"), "a ");
        assert!(!comments.open);
        assert_eq!(comments.strip("a /* b */ c // d"), "a   c ");
        assert_eq!(comments.strip("x /* open"), "x ");
        assert!(comments.open);
        assert_eq!(comments.strip("still inside"), "");
        assert_eq!(comments.strip("done */ y"), "  y");
        assert!(!comments.open);
    }

    #[test]
    fn vertex_translation_maps_vertex_id() {
        let source = "#version 300 es\nvoid main() { gl_Position = vec4(0.0); }\n";
        let translated = translate_vertex(source);
        assert!(translated
            .source
            .starts_with("#version 450\n#define gl_VertexID gl_VertexIndex\n\n"));
        assert_eq!(translated.lines.origin(4), Some(LineOrigin { file: 0, line: 2 }));
    }

    #[test]
    fn arrays_and_opaque_uniforms_are_left_alone() {
        assert!(parse_uniform("uniform float weights[4];").is_none());
        assert!(parse_uniform("uniform sampler2D tex;").is_none());
        let (ty, names) = parse_uniform("uniform mediump vec3 a ,b;").unwrap();
        assert_eq!(ty, GlslType::Vec3);
        assert_eq!(names, vec!["a", "b"]);
    }
}
