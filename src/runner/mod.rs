// ============================================================================
// File: vmbridge/src/runner/mod.rs
// ----------------------------------------------------------------------------
// Local privileged command execution: spawn, capture, timeout, and the
// folding of OS-level failure into the uniform result record.
// ============================================================================

mod errors;

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub use errors::{CmdError, CmdResult};

use crate::context::RequestContext;
use crate::messages;
use crate::results::ResultRecord;

/// Word substituted for sensitive argument positions in audit lines.
const MASK: &str = "<hidden>";

/// Poll interval while supervising a command with a deadline.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// One command to run, described independently of the runner executing it.
///
/// Built either from an argv vector or from a shell line (for tool chains
/// that need redirection or here-documents). Sensitive word positions are
/// masked in audit lines only, never in the executed command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: Program,
    timeout: Option<Duration>,
    hide_in_log: Vec<usize>,
}

#[derive(Debug, Clone)]
enum Program {
    Argv(Vec<String>),
    Shell(String),
}

impl CommandSpec {
    /// Command from an argv vector; the first element is the program.
    pub fn argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: Program::Argv(argv.into_iter().map(Into::into).collect()),
            timeout: None,
            hide_in_log: Vec::new(),
        }
    }

    /// Command run through `sh -c`.
    pub fn shell<S: Into<String>>(line: S) -> Self {
        Self {
            program: Program::Shell(line.into()),
            timeout: None,
            hide_in_log: Vec::new(),
        }
    }

    /// Bound the run time; the command is killed when the limit passes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark whitespace-separated word positions of the display line as
    /// sensitive. They are masked before logging, never before execution.
    pub fn with_hidden<I: IntoIterator<Item = usize>>(mut self, indices: I) -> Self {
        self.hide_in_log = indices.into_iter().collect();
        self
    }

    /// The command as a single line, for diagnostics.
    pub fn display_line(&self) -> String {
        match &self.program {
            Program::Argv(argv) => argv.join(" "),
            Program::Shell(line) => line.clone(),
        }
    }

    /// The display line with sensitive positions masked, for audit lines.
    pub fn masked_line(&self) -> String {
        let line = self.display_line();
        if self.hide_in_log.is_empty() {
            return line;
        }
        line.split_whitespace()
            .enumerate()
            .map(|(i, w)| {
                if self.hide_in_log.contains(&i) {
                    MASK
                } else {
                    w
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The seam other components run commands through; the production
/// implementation is [`CommandRunner`], tests substitute scripted doubles.
pub trait CommandExec {
    /// Run the command and return its combined output on clean exit.
    fn execute(&self, ctx: &dyn RequestContext, spec: &CommandSpec) -> CmdResult<String>;
}

/// Runs local privileged commands as fresh subprocesses with an inherited
/// environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command and fold any failure into a `ResultRecord`.
    ///
    /// Clean exit: success record carrying the captured output. Non-zero
    /// exit: command-failed record with `rc` set to the exit status and the
    /// combined output as the response. Timeout: the fixed timed-out record.
    /// Spawn failure: generic internal-error record. Hard failures are also
    /// announced through the context.
    pub fn run(&self, ctx: &dyn RequestContext, spec: &CommandSpec) -> ResultRecord {
        match self.execute(ctx, spec) {
            Ok(output) => ResultRecord::ok_with(output),
            Err(err) => {
                let record = fold_failure(spec, &err);
                announce_failure(ctx, &spec.masked_line(), &record);
                record
            }
        }
    }
}

impl CommandExec for CommandRunner {
    fn execute(&self, ctx: &dyn RequestContext, spec: &CommandSpec) -> CmdResult<String> {
        ctx.sys_log(&format!("Invoking: {}", spec.masked_line()));

        let mut cmd = match &spec.program {
            Program::Argv(argv) => {
                let program = argv.first().ok_or_else(|| {
                    CmdError::Spawn(io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))
                })?;
                let mut cmd = Command::new(program);
                cmd.args(&argv[1..]);
                cmd
            }
            Program::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                cmd
            }
        };
        cmd.stdin(Stdio::null());

        let (status, output) = match spec.timeout {
            None => {
                let out = cmd.output()?;
                (out.status.code(), combine(out.stdout, out.stderr))
            }
            Some(limit) => supervise(cmd, limit)?,
        };

        match status {
            Some(0) => Ok(output),
            code => Err(CmdError::NonZero {
                status: code.unwrap_or(-1),
                output,
            }),
        }
    }
}

/// Map a command failure to its result record, without logging.
///
/// Exposed so workflows that retry quietly can fold each attempt and only
/// announce once the schedule is exhausted.
pub fn fold_failure(spec: &CommandSpec, err: &CmdError) -> ResultRecord {
    let line = spec.masked_line();
    match err {
        CmdError::NonZero { status, output } => messages::COMMAND_FAILED
            .seed()
            .with_rc(*status)
            .with_response(output.clone()),
        CmdError::TimedOut { limit, .. } => messages::OPERATION_TIMED_OUT.record(
            messages::operation_timed_out_text(&line, &format!("limit {limit:?}")),
        ),
        CmdError::Spawn(e) => {
            messages::INTERNAL_ERROR.record(messages::internal_error_text(&line, &e.to_string()))
        }
    }
}

/// Emit the operator-facing line for a folded command failure.
pub fn announce_failure(ctx: &dyn RequestContext, line: &str, record: &ResultRecord) {
    if record.rs == messages::COMMAND_FAILED.rs && record.overall_rc == 4 {
        ctx.announce(&messages::command_failed_text(line, record.rc, &record.response));
    } else {
        ctx.announce(&record.response);
    }
}

/// Supervise a spawned command against a deadline, killing it on expiry.
///
/// Both pipes are drained on dedicated threads so a chatty child cannot
/// deadlock against a full pipe while we wait.
fn supervise(mut cmd: Command, limit: Duration) -> CmdResult<(Option<i32>, String)> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = stdout.map(|s| thread::spawn(move || drain(s)));
    let err_reader = stderr.map(|s| thread::spawn(move || drain(s)));

    let deadline = Instant::now() + limit;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            break None;
        }
        thread::sleep(WAIT_POLL);
    };

    let timed_out = status.is_none();
    if timed_out {
        let _ = child.kill();
        let _ = child.wait();
    }

    let stdout = out_reader.map(join_reader).unwrap_or_default();
    let stderr = err_reader.map(join_reader).unwrap_or_default();
    let output = combine(stdout, stderr);

    match status {
        Some(status) => Ok((status.code(), output)),
        None => Err(CmdError::TimedOut { limit, output }),
    }
}

fn drain<R: Read>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf);
    buf
}

fn join_reader(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

fn combine(stdout: Vec<u8>, stderr: Vec<u8>) -> String {
    let mut text = String::from_utf8_lossy(&stdout).into_owned();
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(&stderr));
    }
    text
}
