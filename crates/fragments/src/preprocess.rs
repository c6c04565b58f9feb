//! `#include` expansion for fragment sources.
//!
//! Includes are resolved next to the including file, each file is inlined at
//! most once and receives the next file id. With line directives enabled the
//! output brackets the header and every inlined file with `#line` statements
//! so compiler diagnostics of the form `<fid>:<line>` point back at the
//! original file; `Fragment::refs` maps those ids to file names.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// GLSL ES 3.00 preamble prepended to fragment sources when requested.
pub const FRAGMENT_HEADER: &str = "\
#version 300 es
#if GL_FRAGMENT_PRECISION_HIGH
precision highp float;
precision highp int;
#else
precision mediump float;
precision mediump int;
#endif
out vec4 out_color;
uniform float time;
uniform vec2 resolution;
";

const INCLUDE_EXTENSION: &str = ".glsl";

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub header: bool,
    pub line_directives: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            header: true,
            line_directives: true,
        }
    }
}

/// Combined source text plus the file name behind each file id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub content: String,
    pub refs: Vec<String>,
}

/// Returns the file an `#include` line refers to, or `None` for any other
/// line. Names containing a path separator are left to the compiler.
pub fn extract_include(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix("#include")?;
    let name = rest.split_whitespace().next()?;
    if name.contains('/') {
        return None;
    }
    Some(format!("{name}{INCLUDE_EXTENSION}"))
}

pub fn preprocess(path: &Path, options: PreprocessOptions) -> Result<Fragment, PreprocessError> {
    let mut expander = Expander {
        line_directives: options.line_directives,
        ids: HashMap::new(),
        refs: Vec::new(),
    };
    let body = expander.expand(path)?;

    let mut content = String::with_capacity(FRAGMENT_HEADER.len() + body.len());
    if options.header {
        content.push_str(FRAGMENT_HEADER);
        if options.line_directives {
            content.push_str("#line 1 0\n");
        }
    }
    content.push_str(&body);

    tracing::debug!(
        path = %path.display(),
        files = expander.refs.len(),
        "preprocessed fragment"
    );
    Ok(Fragment {
        content,
        refs: expander.refs,
    })
}

struct Expander {
    line_directives: bool,
    ids: HashMap<String, usize>,
    refs: Vec<String>,
}

impl Expander {
    fn register(&mut self, name: String) -> usize {
        let id = self.refs.len();
        self.ids.insert(name.clone(), id);
        self.refs.push(name);
        id
    }

    fn expand(&mut self, path: &Path) -> Result<String, PreprocessError> {
        let name = file_name(path);
        let id = self.register(name);
        let text = fs::read_to_string(path).map_err(|source| PreprocessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        let mut out = String::with_capacity(text.len());
        for (index, line) in text.split_inclusive('\n').enumerate() {
            let Some(include) = extract_include(line) else {
                out.push_str(line);
                continue;
            };
            if self.ids.contains_key(&include) {
                continue;
            }

            let child_id = self.refs.len();
            let inlined = self.expand(&dir.join(&include))?;
            if self.line_directives {
                out.push_str(&format!("#line 1 {child_id}\n"));
            }
            out.push_str(&inlined);
            if !inlined.is_empty() && !inlined.ends_with('\n') {
                out.push('\n');
            }
            if self.line_directives {
                out.push_str(&format!("#line {} {id}\n", index + 2));
            }
        }
        Ok(out)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn bare() -> PreprocessOptions {
        PreprocessOptions {
            header: false,
            line_directives: false,
        }
    }

    #[test]
    fn extracts_bare_include_names() {
        assert_eq!(extract_include("#include noise"), Some("noise.glsl".into()));
        assert_eq!(extract_include("   #include   sdf  // shapes"), Some("sdf.glsl".into()));
        assert_eq!(extract_include("#include lib/noise"), None);
        assert_eq!(extract_include("#include"), None);
        assert_eq!(extract_include("float x; // #include noise"), None);
    }

    #[test]
    fn inlines_includes_with_line_directives() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "noise.glsl", "float noise() { return 0.5; }\n");
        let main = write(
            dir.path(),
            "main.frag",
            "void a() {}\n#include noise\nvoid main() {}\n",
        );

        let fragment = preprocess(
            &main,
            PreprocessOptions {
                header: false,
                line_directives: true,
            },
        )
        .unwrap();
        assert_eq!(
            fragment.content,
            "void a() {}\n#line 1 1\nfloat noise() { return 0.5; }\n#line 3 0\nvoid main() {}\n"
        );
        assert_eq!(fragment.refs, vec!["main.frag", "noise.glsl"]);
    }

    #[test]
    fn each_file_is_included_once() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "common.glsl", "// common\n");
        write(dir.path(), "a.glsl", "#include common\n// a\n");
        write(dir.path(), "b.glsl", "#include common\n#include a\n// b\n");
        let main = write(dir.path(), "main.frag", "#include a\n#include b\n");

        let fragment = preprocess(&main, bare()).unwrap();
        assert_eq!(fragment.content, "// common\n// a\n// b\n");
        assert_eq!(fragment.refs, vec!["main.frag", "a.glsl", "common.glsl", "b.glsl"]);
    }

    #[test]
    fn nested_includes_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "inner.glsl", "// inner\n");
        write(dir.path(), "outer.glsl", "#include inner\n");
        write(dir.path(), "other.glsl", "// other\n");
        let main = write(dir.path(), "main.frag", "#include outer\n#include other\n");

        let fragment = preprocess(
            &main,
            PreprocessOptions {
                header: false,
                line_directives: true,
            },
        )
        .unwrap();
        assert!(fragment.content.contains("#line 1 2\n// inner\n"));
        assert!(fragment.content.contains("#line 1 3\n// other\n"));
        assert_eq!(fragment.refs[3], "other.glsl");
    }

    #[test]
    fn include_cycles_terminate() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ping.glsl", "#include pong\n// ping\n");
        write(dir.path(), "pong.glsl", "#include ping\n// pong\n");
        let main = write(dir.path(), "main.frag", "#include ping\n");

        let fragment = preprocess(&main, bare()).unwrap();
        assert_eq!(fragment.content, "// pong\n// ping\n");
    }

    #[test]
    fn header_is_prepended() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.frag", "void main() {}\n");
        let fragment = preprocess(&main, PreprocessOptions::default()).unwrap();
        assert!(fragment.content.starts_with("#version 300 es\n"));
        assert!(fragment
            .content
            .ends_with("uniform vec2 resolution;\n#line 1 0\nvoid main() {}\n"));

        let plain = PreprocessOptions {
            header: true,
            line_directives: false,
        };
        let fragment = preprocess(&main, plain).unwrap();
        assert!(fragment.content.ends_with("uniform vec2 resolution;\nvoid main() {}\n"));
    }

    #[test]
    fn missing_include_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.frag", "#include absent\n");
        let err = preprocess(&main, bare()).unwrap_err();
        assert!(err.to_string().contains("absent.glsl"));
    }

    #[test]
    fn unterminated_include_still_separates_lines() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tail.glsl", "// no newline");
        let main = write(dir.path(), "main.frag", "#include tail\nvoid main() {}\n");
        let fragment = preprocess(
            &main,
            PreprocessOptions {
                header: false,
                line_directives: true,
            },
        )
        .unwrap();
        assert!(fragment.content.contains("// no newline\n#line 2 0\n"));
    }
}
