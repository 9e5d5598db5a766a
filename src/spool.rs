// ============================================================================
// File: vmbridge/src/spool.rs
// ----------------------------------------------------------------------------
// Spool workflow: punch a file into the local reader, reclass it, and
// transfer it to a target userid's reader, purging on any mid-flight failure.
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

use crate::context::RequestContext;
use crate::messages;
use crate::poll::VMCP;
use crate::results::ResultRecord;
use crate::retry::{self, RetrySchedule, with_retries};
use crate::runner::{CmdError, CommandExec, CommandSpec, fold_failure};

/// Path of the spooling client on the management node.
pub const VMUR: &str = "/usr/sbin/vmur";

/// Only one spooling client may hold the punch device at a time; this output
/// fragment marks the transient collision worth waiting out.
const BUSY_MARKER: &str = "A concurrent instance of vmur is already active";

// First number in the punch output is the assigned spool id.
static SPOOL_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Punch `file` to the reader of `userid` under `spool_class`.
///
/// The file is punched into the local reader first, reclassed, and then
/// transferred to the target reader. Once a spool file exists, any later
/// failure purges it so no orphan is left behind; a purge failure is
/// announced but never changes the reported outcome.
pub fn punch_to_reader(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
    file: &str,
    spool_class: &str,
) -> ResultRecord {
    punch_with(runner, ctx, userid, file, spool_class, &retry::SPOOL_BUSY)
}

pub(crate) fn punch_with(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
    file: &str,
    spool_class: &str,
    schedule: &RetrySchedule,
) -> ResultRecord {
    ctx.sys_log(&format!(
        "Enter reader punch, userid: {userid} file: {file} class: {spool_class}"
    ));
    let record = run_punch(runner, ctx, userid, file, spool_class, schedule);
    ctx.sys_log(&format!("Exit reader punch, rc: {}", record.overall_rc));
    record
}

fn run_punch(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
    file: &str,
    spool_class: &str,
    schedule: &RetrySchedule,
) -> ResultRecord {
    let punch = CommandSpec::argv(["sudo", VMUR, "punch", "-r", file]);
    let punched = with_retries(
        ctx,
        "reader punch",
        schedule,
        |_| match runner.execute(ctx, &punch) {
            Ok(output) => ResultRecord::ok_with(output),
            Err(err) => fold_failure(&punch, &err),
        },
        |r| !r.is_ok() && r.response.contains(BUSY_MARKER),
    );
    if !punched.is_ok() {
        let (msg, rendered) = if punched.response.contains(BUSY_MARKER) {
            (messages::PUNCH_TIMED_OUT, messages::punch_timed_out_text(file))
        } else {
            (
                messages::PUNCH_FAILED,
                messages::punch_failed_text(file, userid, &punched.response),
            )
        };
        ctx.announce(&rendered);
        return msg.record(rendered);
    }

    let spool_id = match SPOOL_ID_RE.find(&punched.response) {
        Some(m) => m.as_str().to_string(),
        None => {
            let rendered = messages::internal_error_text(
                &punch.masked_line(),
                &format!("no spool id in punch output '{}'", punched.response),
            );
            ctx.announce(&rendered);
            return messages::INTERNAL_ERROR.record(rendered);
        }
    };
    ctx.sys_log(&format!("Punched {file} as spool file {spool_id}"));

    let change = CommandSpec::argv([
        "sudo",
        VMCP,
        "change",
        "rdr",
        spool_id.as_str(),
        "class",
        spool_class,
    ]);
    if let Err(err) = runner.execute(ctx, &change) {
        let rendered = messages::class_change_failed_text(spool_class, &failure_output(&err));
        ctx.announce(&rendered);
        purge(runner, ctx, &spool_id);
        return messages::CLASS_CHANGE_FAILED.record(rendered);
    }

    let transfer = CommandSpec::argv([
        "sudo",
        VMCP,
        "transfer",
        "*",
        "rdr",
        spool_id.as_str(),
        "to",
        userid,
        "rdr",
    ]);
    if let Err(err) = runner.execute(ctx, &transfer) {
        let rendered = messages::transfer_failed_text(file, userid, &failure_output(&err));
        ctx.announce(&rendered);
        purge(runner, ctx, &spool_id);
        return messages::TRANSFER_FAILED.record(rendered);
    }

    ResultRecord::ok()
}

/// Remove a spool file that could not be delivered.
fn purge(runner: &dyn CommandExec, ctx: &dyn RequestContext, spool_id: &str) {
    let purge = CommandSpec::argv(["sudo", VMCP, "purge", "rdr", spool_id]);
    if let Err(err) = runner.execute(ctx, &purge) {
        ctx.announce(&messages::purge_failed_text(spool_id, &failure_output(&err)));
    }
}

fn failure_output(err: &CmdError) -> String {
    match err {
        CmdError::NonZero { output, .. } => output.clone(),
        CmdError::TimedOut { output, .. } => output.clone(),
        CmdError::Spawn(e) => e.to_string(),
    }
}
