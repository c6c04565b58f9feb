//! Line-oriented console commands read from stdin while the window runs.

use std::io::{self, BufRead};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};

pub const HELP: &str = "\
commands:
  pause | resume | toggle     control the timeline
  reset                       restart time at zero
  capture                     save the next frame as PNG
  set NAME VALUE              change a live control
  load NAME                   switch to another fragment
  list                        show the fragments in the directory
  help                        show this text
  quit                        close the window and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Toggle,
    Reset,
    Capture,
    Set { name: String, value: String },
    Load(String),
    List,
    Help,
    Quit,
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("pause", []) => ConsoleCommand::Pause,
        ("resume" | "play", []) => ConsoleCommand::Resume,
        ("toggle", []) => ConsoleCommand::Toggle,
        ("reset", []) => ConsoleCommand::Reset,
        ("capture" | "shot", []) => ConsoleCommand::Capture,
        ("set", [name, value @ ..]) if !value.is_empty() => ConsoleCommand::Set {
            name: (*name).to_string(),
            value: value.join(" "),
        },
        ("set", _) => return Err("usage: set NAME VALUE".to_string()),
        ("load", [name]) => ConsoleCommand::Load((*name).to_string()),
        ("load", _) => return Err("usage: load NAME".to_string()),
        ("list" | "ls", []) => ConsoleCommand::List,
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit" | "q", []) => ConsoleCommand::Quit,
        (other, _) => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(command))
}

/// Forwards stdin lines until EOF; the channel disconnects afterwards.
pub fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("workshop-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to read stdin");
                        break;
                    }
                }
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(rx)
}
