// ============================================================================
// File: vmbridge/src/poll.rs
// ----------------------------------------------------------------------------
// Bounded polling for virtual machine power/login state and in-guest OS
// reachability.
// ============================================================================

use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;

use crate::context::RequestContext;
use crate::messages;
use crate::remote::RemoteExecutor;
use crate::results::ResultRecord;
use crate::runner::{CmdError, CommandExec, CommandSpec};

/// Path of the hypervisor console client on the management node.
pub const VMCP: &str = "/sbin/vmcp";

pub const DEFAULT_STATE_QUERIES: usize = 90;
pub const DEFAULT_STATE_INTERVAL_SECS: u64 = 5;

// Hypervisor messages for a userid that is not logged on; anchored to the
// start of the output.
static NOT_LOGGED_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HCP\w{3}045E|^HCP\w{3}361E").unwrap());

/// Desired power/login state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    On,
    Off,
}

impl VmState {
    fn as_str(self) -> &'static str {
        match self {
            VmState::On => "on",
            VmState::Off => "off",
        }
    }
}

/// Desired reachability state of the guest operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsState {
    Up,
    Down,
}

impl OsState {
    fn as_str(self) -> &'static str {
        match self {
            OsState::Up => "up",
            OsState::Down => "down",
        }
    }
}

/// One probe's verdict inside a polling loop.
pub enum PollStatus {
    /// The desired state was observed; stop immediately.
    Matched,
    /// Not there yet; keep polling.
    Pending,
    /// The probe itself failed in a way that makes further polling pointless.
    Fault(ResultRecord),
}

enum PollEnd {
    Matched,
    Exhausted,
    Fault(ResultRecord),
}

/// Probe up to `max_queries` times, sleeping `interval` between attempts but
/// never after the last one.
fn poll_until<P, S>(mut probe: P, max_queries: usize, interval: Duration, mut sleep: S) -> PollEnd
where
    P: FnMut(usize) -> PollStatus,
    S: FnMut(Duration),
{
    for attempt in 1..=max_queries {
        match probe(attempt) {
            PollStatus::Matched => return PollEnd::Matched,
            PollStatus::Fault(record) => return PollEnd::Fault(record),
            PollStatus::Pending => {}
        }
        if attempt < max_queries {
            sleep(interval);
        }
    }
    PollEnd::Exhausted
}

/// Wait for a virtual machine to reach the desired power/login state.
///
/// Each probe issues a status query; the two hypervisor not-logged-on
/// message prefixes classify a failing query as "logged off". Exhausting the
/// query budget yields the fixed timeout outcome embedding the userid, the
/// desired state, and the total budget.
pub fn wait_for_vm_state(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
    desired: VmState,
    max_queries: usize,
    interval_secs: u64,
) -> ResultRecord {
    ctx.sys_log(&format!(
        "Enter VM state wait, userid: {userid} state: {} maxQueries: {max_queries} interval: {interval_secs}s",
        desired.as_str()
    ));

    let spec = CommandSpec::argv(["sudo", VMCP, "query", "user", userid]);
    let end = poll_until(
        |_| match runner.execute(ctx, &spec) {
            Ok(out) => {
                ctx.sys_log(&format!("Status query output: {out}"));
                if desired == VmState::On {
                    PollStatus::Matched
                } else {
                    PollStatus::Pending
                }
            }
            Err(CmdError::NonZero { status, output }) => {
                ctx.sys_log(&format!("Status query output: {output}"));
                if NOT_LOGGED_ON_RE.is_match(&output) {
                    if desired == VmState::Off {
                        PollStatus::Matched
                    } else {
                        PollStatus::Pending
                    }
                } else {
                    let line = spec.masked_line();
                    let record = messages::COMMAND_FAILED
                        .seed()
                        .with_rc(status)
                        .with_response(output);
                    crate::runner::announce_failure(ctx, &line, &record);
                    PollStatus::Fault(record)
                }
            }
            Err(err) => {
                let record = messages::INTERNAL_ERROR.record(messages::internal_error_text(
                    &spec.masked_line(),
                    &err.to_string(),
                ));
                ctx.announce(&record.response);
                PollStatus::Fault(record)
            }
        },
        max_queries,
        Duration::from_secs(interval_secs),
        thread::sleep,
    );

    let record = finish(
        ctx,
        end,
        &messages::VM_STATE_TIMED_OUT,
        userid,
        desired.as_str(),
        max_queries as u64 * interval_secs,
    );
    ctx.sys_log(&format!("Exit VM state wait, rc: {}", record.overall_rc));
    record
}

/// Wait for the guest operating system to become reachable or unreachable.
///
/// Each probe runs a trivial remote command; transport success means the OS
/// is up, any transport failure means it is down.
pub fn wait_for_os_state(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
    desired: OsState,
    max_queries: usize,
    interval_secs: u64,
) -> ResultRecord {
    ctx.sys_log(&format!(
        "Enter OS state wait, userid: {userid} state: {} maxQueries: {max_queries} interval: {interval_secs}s",
        desired.as_str()
    ));

    let remote = RemoteExecutor::new(runner);
    let end = poll_until(
        |_| {
            let probe = remote.exec(ctx, userid, "echo 'ping'", &[], None);
            let reachable = probe.is_ok();
            if (reachable && desired == OsState::Up) || (!reachable && desired == OsState::Down) {
                PollStatus::Matched
            } else {
                PollStatus::Pending
            }
        },
        max_queries,
        Duration::from_secs(interval_secs),
        thread::sleep,
    );

    let record = finish(
        ctx,
        end,
        &messages::OS_STATE_TIMED_OUT,
        userid,
        desired.as_str(),
        max_queries as u64 * interval_secs,
    );
    ctx.sys_log(&format!("Exit OS state wait, rc: {}", record.overall_rc));
    record
}

/// One-shot login state query.
///
/// On success the record's `rs` is 0 when the userid is logged on and 1 when
/// it is logged off.
pub fn is_logged_on(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
) -> ResultRecord {
    ctx.sys_log(&format!("Enter login query, userid: {userid}"));

    let spec = CommandSpec::argv(["sudo", VMCP, "query", "user", userid]);
    let record = match runner.execute(ctx, &spec) {
        Ok(_) => ResultRecord::ok(),
        Err(CmdError::NonZero { status, output }) => {
            if NOT_LOGGED_ON_RE.is_match(&output) {
                ResultRecord::ok().with_rs(1)
            } else {
                let line = spec.masked_line();
                let record = messages::COMMAND_FAILED
                    .seed()
                    .with_rc(status)
                    .with_response(output);
                crate::runner::announce_failure(ctx, &line, &record);
                record
            }
        }
        Err(err) => {
            let record = messages::INTERNAL_ERROR.record(messages::internal_error_text(
                &spec.masked_line(),
                &err.to_string(),
            ));
            ctx.announce(&record.response);
            record
        }
    };

    ctx.sys_log(&format!(
        "Exit login query, overallRC: {} rc: {} rs: {}",
        record.overall_rc, record.rc, record.rs
    ));
    record
}

fn finish(
    ctx: &dyn RequestContext,
    end: PollEnd,
    timeout_msg: &messages::Message,
    userid: &str,
    desired: &str,
    max_wait_secs: u64,
) -> ResultRecord {
    match end {
        PollEnd::Matched => ResultRecord::ok(),
        PollEnd::Fault(record) => record,
        PollEnd::Exhausted => {
            let rendered =
                messages::state_timeout_text(timeout_msg, userid, desired, max_wait_secs);
            ctx.announce(&rendered);
            timeout_msg.record(rendered)
        }
    }
}
