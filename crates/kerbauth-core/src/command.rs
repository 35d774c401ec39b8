//! Narrow seam over external process execution.
//!
//! Every Kerberos tool invocation goes through [`CommandRunner`], so the ticket logic can be
//! exercised against a recording runner instead of the host's `kinit`/`klist`.

use std::fmt::{self, Debug, Display};
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use portable_pty::{CommandBuilder, PtyPair, PtySize, native_pty_system};
use tracing::{debug, instrument};

/// A single process invocation: program, positional arguments and optional secret stdin.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Types `secret` followed by a newline at the tool's terminal prompt.
    ///
    /// The value never becomes part of the argument vector, so it does not show up in process
    /// listings, and it is scrubbed from the captured terminal output.
    pub fn stdin_secret(mut self, secret: impl Into<String>) -> Self {
        self.stdin = Some(secret.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Program and arguments joined by spaces, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Exit code of a finished tool; `None` when the process was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit(pub Option<i32>);

impl ToolExit {
    pub fn success(self) -> bool {
        self.0 == Some(0)
    }
}

impl Display for ToolExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exited with status {code}"),
            None => write!(f, "was terminated by a signal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit: ToolExit,
    /// Trimmed standard error output of the tool, or its terminal transcript when it was given a
    /// secret.
    pub stderr: String,
}

impl CommandOutcome {
    pub fn from_code(code: i32) -> Self {
        Self {
            exit: ToolExit(Some(code)),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit.success()
    }
}

pub trait CommandRunner {
    /// Runs the command to completion, blocking the calling thread.
    ///
    /// An `Err` means the process could not be started or waited on; a non-zero exit is a
    /// successful `Ok` carrying that exit code.
    fn run(&self, command: &Invocation) -> io::Result<CommandOutcome>;
}

/// How long to wait for the tool's prompt before typing the secret anyway.
const PROMPT_TIMEOUT: Duration = Duration::from_secs(5);
/// Grace period for terminal output still in flight after the tool exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Spawns real processes through [`std::process::Command`].
///
/// Invocations carrying a secret run under a pseudo-terminal instead, since `kinit` reads
/// passwords from its controlling terminal (Heimdal opens `/dev/tty` directly).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    #[instrument(name = "command.run", level = "debug", skip_all, fields(program = %command.program()))]
    fn run(&self, command: &Invocation) -> io::Result<CommandOutcome> {
        if let Some(secret) = command.stdin() {
            return run_in_terminal(command, secret);
        }

        let output = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .output()?;

        let outcome = CommandOutcome {
            exit: ToolExit(output.status.code()),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        };

        debug!(
            exit = %outcome.exit,
            stdout_len = output.stdout.len(),
            stderr = %outcome.stderr,
            "process finished"
        );

        Ok(outcome)
    }
}

fn run_in_terminal(command: &Invocation, secret: &str) -> io::Result<CommandOutcome> {
    let PtyPair { master, slave } = native_pty_system()
        .openpty(PtySize::default())
        .map_err(pty_error("failed to allocate a pty"))?;

    let mut builder = CommandBuilder::new(command.program());
    builder.args(command.args());
    // portable-pty starts in $HOME otherwise
    if let Ok(dir) = std::env::current_dir() {
        builder.cwd(dir);
    }

    let mut child = slave
        .spawn_command(builder)
        .map_err(pty_error("failed to spawn under a pty"))?;
    drop(slave);

    let reader = master
        .try_clone_reader()
        .map_err(pty_error("failed to open the pty reader"))?;
    let mut writer = master
        .take_writer()
        .map_err(pty_error("failed to open the pty writer"))?;
    let output = spawn_terminal_reader(reader)?;

    let mut transcript = Vec::new();
    wait_for_prompt(&output, &mut transcript);

    // the tool may already be gone; its exit status is reported below
    if let Err(e) = type_line(&mut writer, secret) {
        debug!(error = %e, "could not type the secret");
    }

    let status = child.wait()?;
    while let Ok(chunk) = output.recv_timeout(DRAIN_TIMEOUT) {
        transcript.extend_from_slice(&chunk);
    }
    drop(writer);
    drop(master);

    let code = if status.success() {
        0
    } else {
        i32::try_from(status.exit_code()).unwrap_or(i32::MAX)
    };
    let outcome = CommandOutcome {
        exit: ToolExit(Some(code)),
        stderr: scrub_transcript(&transcript, secret),
    };

    debug!(
        exit = %outcome.exit,
        transcript = %outcome.stderr,
        "process finished"
    );

    Ok(outcome)
}

fn type_line(writer: &mut impl Write, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Collects terminal output until the first prompt (anything ending in `:`) or the timeout.
fn wait_for_prompt(output: &Receiver<Vec<u8>>, transcript: &mut Vec<u8>) {
    let deadline = Instant::now() + PROMPT_TIMEOUT;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Ok(chunk) = output.recv_timeout(remaining) else {
            return;
        };
        transcript.extend_from_slice(&chunk);
        if transcript.contains(&b':') {
            return;
        }
    }
    debug!("no prompt seen, typing the secret anyway");
}

fn spawn_terminal_reader(mut reader: Box<dyn Read + Send>) -> io::Result<Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("kerbauth-pty-reader".to_owned())
        .spawn(move || {
            let mut buf = [0_u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    // EIO once the child side of the terminal is gone
                    Err(_) => break,
                }
            }
        })?;
    Ok(rx)
}

/// Terminal output with line endings normalized and every copy of the secret removed.
fn scrub_transcript(transcript: &[u8], secret: &str) -> String {
    let text = String::from_utf8_lossy(transcript).replace("\r\n", "\n");
    let text = if secret.is_empty() {
        text
    } else {
        text.replace(secret, "<redacted>")
    };
    text.trim().to_owned()
}

fn pty_error(context: &'static str) -> impl FnOnce(anyhow::Error) -> io::Error {
    move |e| match e.downcast::<io::Error>() {
        Ok(e) => e,
        Err(e) => io::Error::other(format!("{context}: {e:#}")),
    }
}
