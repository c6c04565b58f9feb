use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{parse_surface_size, ENV_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(
    name = "workshop",
    author,
    version,
    about = "Live GLSL fragment workshop",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Directory holding the `.frag` sources (defaults to the configured
    /// `shader_dir`, then the current directory).
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Fragment to open first, with or without the `.frag` extension.
    #[arg(long, value_name = "NAME")]
    pub frag: Option<String>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Start with the timeline paused.
    #[arg(long, overrides_with = "no_paused")]
    pub paused: bool,

    /// Start playing even when the configuration file sets `start_paused`.
    #[arg(long, overrides_with = "paused")]
    pub no_paused: bool,

    /// Directory captured frames are written to.
    #[arg(long, value_name = "PATH")]
    pub capture_dir: Option<PathBuf>,

    /// Configuration file; defaults to `workshop.toml` in the user config
    /// directory.
    #[arg(long, value_name = "FILE", env = ENV_CONFIG_FILE)]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Pause state requested on the command line, if any. The later of
    /// `--paused` and `--no-paused` wins.
    pub fn start_paused(&self) -> Option<bool> {
        match (self.paused, self.no_paused) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the fragments of a directory.
    List {
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Print the combined source of a fragment with its includes inlined.
    Print(PrintArgs),
}

#[derive(Parser, Debug)]
pub struct PrintArgs {
    /// Path to the fragment source.
    #[arg(value_name = "FRAG", value_parser = parse_frag_path)]
    pub frag: PathBuf,

    /// Prepend the GLSL ES header.
    #[arg(long)]
    pub header: bool,

    /// Emit the `{content, refs, controls}` payload the window loads
    /// (header and `#line` directives included).
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_frag_path(raw: &str) -> Result<PathBuf, String> {
    if raw.ends_with(".frag") {
        Ok(PathBuf::from(raw))
    } else {
        Err("fragment must have a .frag extension".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "workshop",
            "shaders",
            "--frag",
            "plasma",
            "--size",
            "640x480",
            "--paused",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.dir, Some(PathBuf::from("shaders")));
        assert_eq!(cli.run.frag.as_deref(), Some("plasma"));
        assert_eq!(cli.run.size, Some((640, 480)));
        assert!(cli.run.paused);
    }

    #[test]
    fn last_pause_flag_wins() {
        let cli = Cli::try_parse_from(["workshop", "--paused", "--no-paused"]).unwrap();
        assert_eq!(cli.run.start_paused(), Some(false));
        let cli = Cli::try_parse_from(["workshop", "--no-paused", "--paused"]).unwrap();
        assert_eq!(cli.run.start_paused(), Some(true));
        let cli = Cli::try_parse_from(["workshop"]).unwrap();
        assert_eq!(cli.run.start_paused(), None);
    }

    #[test]
    fn parses_print_subcommand() {
        let cli = Cli::try_parse_from(["workshop", "print", "waves.frag", "--json"]).unwrap();
        match cli.command {
            Some(Command::Print(args)) => {
                assert_eq!(args.frag, PathBuf::from("waves.frag"));
                assert!(args.json);
                assert!(!args.header);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn print_requires_frag_extension() {
        assert!(Cli::try_parse_from(["workshop", "print", "noise.glsl"]).is_err());
    }

    #[test]
    fn rejects_bad_sizes() {
        assert!(Cli::try_parse_from(["workshop", "--size", "0x100"]).is_err());
        assert!(Cli::try_parse_from(["workshop", "--size", "wide"]).is_err());
    }
}
