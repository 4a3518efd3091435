//! Shell commands run around each scenario.
//!
//! Scenario `before`/`after` statements run through `bash -c` in the spec
//! directory with `SCENARIO_TAG` exported. Output is streamed line by line,
//! either as plain tracing events or folded into GitHub Actions log groups.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

/// Environment variable holding the current scenario tag.
pub const SCENARIO_TAG_ENV: &str = "SCENARIO_TAG";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {}", exit_description(*.exit_code))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `command` to completion, capturing its output.
///
/// `label` names the command in errors. A non-zero exit is an error.
pub fn run_captured(label: &str, command: &mut Command) -> Result<CommandOutput, CommandError> {
    let start = Instant::now();
    let output = command.output().map_err(|source| CommandError::Spawn {
        command: label.to_string(),
        source,
    })?;

    let result = CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: start.elapsed(),
    };

    debug!(
        command = label,
        exit_code = ?result.exit_code,
        duration_ms = result.duration.as_millis() as u64,
        "Command finished"
    );

    if result.success() {
        Ok(result)
    } else {
        Err(CommandError::Failed {
            command: label.to_string(),
            exit_code: result.exit_code,
            stderr: result.stderr,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run `command`, handing every output line to `on_line` as it is produced.
///
/// Both pipes are drained concurrently, so lines keep their arrival order
/// across stdout and stderr. Output is delivered whether or not the command
/// succeeds. A non-zero exit is an error.
pub fn run_streaming(
    label: &str,
    command: &mut Command,
    mut on_line: impl FnMut(&str),
) -> Result<CommandOutput, CommandError> {
    let start = Instant::now();
    let spawn_error = |source: std::io::Error| CommandError::Spawn {
        command: label.to_string(),
        source,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let (tx, rx) = mpsc::channel();
    let pipes = [
        child.stdout.take().map(|pipe| (Stream::Stdout, Box::new(pipe) as Box<dyn Read + Send>)),
        child.stderr.take().map(|pipe| (Stream::Stderr, Box::new(pipe) as Box<dyn Read + Send>)),
    ];

    let mut stdout = String::new();
    let mut stderr = String::new();
    thread::scope(|scope| {
        for (stream, pipe) in pipes.into_iter().flatten() {
            let tx = tx.clone();
            scope.spawn(move || forward_lines(pipe, stream, &tx));
        }
        drop(tx);

        for (stream, line) in rx {
            on_line(&line);
            let text = match stream {
                Stream::Stdout => &mut stdout,
                Stream::Stderr => &mut stderr,
            };
            text.push_str(&line);
            text.push('\n');
        }
    });

    let status = child.wait().map_err(spawn_error)?;
    let result = CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        duration: start.elapsed(),
    };

    debug!(
        command = label,
        exit_code = ?result.exit_code,
        duration_ms = result.duration.as_millis() as u64,
        "Command finished"
    );

    if result.success() {
        Ok(result)
    } else {
        Err(CommandError::Failed {
            command: label.to_string(),
            exit_code: result.exit_code,
            stderr: result.stderr,
        })
    }
}

fn forward_lines(pipe: Box<dyn Read + Send>, stream: Stream, tx: &mpsc::Sender<(Stream, String)>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        if tx.send((stream, line)).is_err() {
            break;
        }
    }
}

/// How command output is presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandLogStyle {
    /// Each output line is a tracing event with a `command` field.
    Plain,
    /// Output is wrapped in `::group::` / `::endgroup::` on stderr.
    #[default]
    Grouped,
}

impl CommandLogStyle {
    pub fn from_plain_logs(plain_logs: bool) -> Self {
        if plain_logs { Self::Plain } else { Self::Grouped }
    }
}

/// Runs scenario shell statements.
pub trait CommandRunner {
    fn run(&self, statement: &str, cwd: &Path, scenario_tag: &str) -> Result<(), CommandError>;
}

/// [`CommandRunner`] backed by `bash -c`.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner {
    style: CommandLogStyle,
}

impl ShellCommandRunner {
    pub fn new(style: CommandLogStyle) -> Self {
        Self { style }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, statement: &str, cwd: &Path, scenario_tag: &str) -> Result<(), CommandError> {
        info!(command = statement, cwd = %cwd.display(), "Running command");

        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(statement)
            .current_dir(cwd)
            .env(SCENARIO_TAG_ENV, scenario_tag);

        let result = match self.style {
            CommandLogStyle::Plain => run_streaming(statement, &mut command, |line| {
                info!(command = statement, "{line}");
            }),
            CommandLogStyle::Grouped => {
                let mut out = std::io::stderr();
                // Logging must never fail a scenario.
                let _ = writeln!(out, "::group::{statement}");
                let result = run_streaming(statement, &mut command, |line| {
                    let _ = writeln!(out, "{line}");
                });
                let _ = writeln!(out, "::endgroup::");
                result
            }
        };
        result.map(|_| ())
    }
}
