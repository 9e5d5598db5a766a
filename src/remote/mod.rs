// ============================================================================
// File: vmbridge/src/remote/mod.rs
// ----------------------------------------------------------------------------
// Remote command execution inside a target virtual machine through the
// transport client, and classification of its return/reason codes.
// ============================================================================

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::context::RequestContext;
use crate::messages;
use crate::results::ResultRecord;
use crate::runner::{CmdError, CommandExec, CommandSpec};

/// Path of the remote-command transport client on the management node.
pub const TRANSPORT_CLIENT: &str = "/opt/zthin/bin/IUCV/iucvclnt";

// The transport client reports its codes in parenthesized tokens inside
// free text, e.g. `Return code (8), Reason code (2).`.
static RETURN_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Return code \((.+?)\),").unwrap());
static REASON_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Reason code \((.+?)\)\.").unwrap());

/// Number of argv words before the remote command line in the display line,
/// used to shift caller-supplied sensitive word indices.
const COMMAND_WORD_OFFSET: usize = 3;

/// Executes commands on a target virtual machine through the transport
/// client and classifies its failures.
pub struct RemoteExecutor<'r> {
    runner: &'r dyn CommandExec,
}

impl<'r> RemoteExecutor<'r> {
    pub fn new(runner: &'r dyn CommandExec) -> Self {
        Self { runner }
    }

    /// Run `command` inside the virtual machine `userid`.
    ///
    /// `hide_in_log` holds word indices of `command` to mask in audit lines.
    /// Failures are classified into the transport taxonomy; no operator line
    /// is announced here because callers may expect and suppress failures.
    pub fn exec(
        &self,
        ctx: &dyn RequestContext,
        userid: &str,
        command: &str,
        hide_in_log: &[usize],
        timeout: Option<Duration>,
    ) -> ResultRecord {
        let mut spec = CommandSpec::argv(["sudo", TRANSPORT_CLIENT, userid, command])
            .with_hidden(hide_in_log.iter().map(|i| i + COMMAND_WORD_OFFSET));
        if let Some(limit) = timeout {
            spec = spec.with_timeout(limit);
        }
        ctx.sys_log(&format!(
            "Enter remote exec, userid: {userid} cmd: {} timeout: {timeout:?}",
            spec.masked_line()
        ));

        let record = match self.runner.execute(ctx, &spec) {
            Ok(output) => ResultRecord::ok_with(output),
            Err(CmdError::NonZero { status, output }) => {
                classify_failure(userid, command, status, &output)
            }
            Err(ref err @ CmdError::TimedOut { .. }) => timed_out(ctx, userid, command, err),
            Err(ref err @ CmdError::Spawn(_)) if err.is_permission_denied() => {
                timed_out(ctx, userid, command, err)
            }
            Err(CmdError::Spawn(e)) => messages::INTERNAL_ERROR
                .record(messages::internal_error_text(command, &e.to_string())),
        };

        ctx.sys_log(&format!("Exit remote exec, rc: {}", record.rc));
        record
    }
}

fn timed_out(
    ctx: &dyn RequestContext,
    userid: &str,
    command: &str,
    err: &CmdError,
) -> ResultRecord {
    ctx.sys_log("Timeout or permission failure in remote exec");
    messages::TRANSPORT_TIMED_OUT.record(messages::transport_timed_out_text(
        userid,
        command,
        &err.to_string(),
    ))
}

/// Decode a non-zero transport client exit into the transport taxonomy.
///
/// The return and reason codes are scraped from the combined output; a code
/// that does not parse as an integer is a malformed transport response,
/// reported distinctly from the transport's own failure classes.
pub(crate) fn classify_failure(
    userid: &str,
    command: &str,
    status: i32,
    output: &str,
) -> ResultRecord {
    let mut rc = status;
    let mut rs = 0;

    if let Some(caps) = RETURN_CODE_RE.captures(output) {
        let token = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        match token.trim().parse::<i32>() {
            Ok(v) => rc = v,
            Err(_) => {
                let msg = messages::TRANSPORT_BAD_RETURN_CODE;
                return msg.seed().with_rc(rc).with_response(
                    messages::transport_bad_token_text(
                        &msg, "return", userid, command, rc, token, output,
                    ),
                );
            }
        }
    }

    if let Some(caps) = REASON_CODE_RE.captures(output) {
        let token = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        match token.trim().parse::<i32>() {
            Ok(v) => rs = v,
            Err(_) => {
                let msg = messages::TRANSPORT_BAD_REASON_CODE;
                return msg.seed().with_rc(rc).with_response(
                    messages::transport_bad_token_text(
                        &msg, "reason", userid, command, rc, token, output,
                    ),
                );
            }
        }
    }

    let (msg, phrase) = messages::transport_class(rc);
    msg.seed().with_rc(rc).with_rs(rs).with_response(
        messages::transport_class_text(&msg, phrase, userid, command, rc, rs, output),
    )
}
