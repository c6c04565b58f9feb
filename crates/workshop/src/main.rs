mod cli;
mod commands;
mod config;
mod controls;
mod run;

use std::path::Path;

use anyhow::{Context, Result};
use cli::{Command, PrintArgs};
use config::{FileConfig, Settings};
use fragments::{preprocess, FragmentLibrary, PreprocessOptions};

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::List { dir }) => {
            let dir = match dir {
                Some(dir) => dir,
                None => {
                    let file = FileConfig::discover(cli.run.config.as_deref())?;
                    Settings::resolve(&cli.run, &file).shader_dir
                }
            };
            let library = FragmentLibrary::open(&dir)
                .with_context(|| format!("failed to open shader directory {}", dir.display()))?;
            run::list(&library)
        }
        Some(Command::Print(args)) => print_fragment(&args),
        None => run::run(cli.run),
    }
}

fn print_fragment(args: &PrintArgs) -> Result<()> {
    if args.json {
        let dir = args
            .frag
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = args
            .frag
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("fragment path has no file name")?;
        let library = FragmentLibrary::open(dir)?;
        let fragment = library.load(&name, PreprocessOptions::default())?;
        println!("{}", serde_json::to_string_pretty(&fragment)?);
        return Ok(());
    }

    let fragment = preprocess(
        &args.frag,
        PreprocessOptions {
            header: args.header,
            line_directives: false,
        },
    )?;
    println!("{}", fragment.content.trim_end());
    Ok(())
}
