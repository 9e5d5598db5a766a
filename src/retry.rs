// ============================================================================
// File: vmbridge/src/retry.rs
// ----------------------------------------------------------------------------
// Bounded retry with per-schedule backoff delays.
// ============================================================================

use std::thread;
use std::time::Duration;

use crate::context::RequestContext;
use crate::results::ResultRecord;

/// An ordered sequence of backoff delays in seconds.
///
/// The schedule length bounds the number of attempts. A negative entry is a
/// sentinel: the attempt it follows is the last one, and its failure is
/// returned without a further retry. Fractional delays are allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrySchedule {
    delays: &'static [f32],
}

/// Disk links, partition creation, and filesystem creation: the device or
/// partition table is often not visible to the kernel yet.
pub const QUICK_DEVICE: RetrySchedule =
    RetrySchedule::new(&[0.1, 0.2, 0.3, 0.5, 1.0, 2.0, -1.0]);

/// Disk enable/disable in the guest: the online/offline transition can take
/// minutes, so back off up to roughly six minutes total.
pub const DISK_STATE: RetrySchedule = RetrySchedule::new(&[
    0.1, 0.4, 1.0, 1.5, 3.0, 7.0, 15.0, 32.0, 30.0, 30.0, 60.0, 60.0, 60.0, 60.0, 60.0,
]);

/// Spool punch while a concurrent spooling client holds the device.
pub const SPOOL_BUSY: RetrySchedule = RetrySchedule::new(&[1.0, 2.0, 3.0, 5.0, 10.0]);

impl RetrySchedule {
    pub const fn new(delays: &'static [f32]) -> Self {
        Self { delays }
    }

    pub fn delays(&self) -> &[f32] {
        self.delays
    }

    /// Upper bound on attempts this schedule allows.
    pub fn max_attempts(&self) -> usize {
        self.delays.len().max(1)
    }
}

/// Run `attempt` until `should_retry` rejects its outcome or the schedule is
/// exhausted, sleeping the scheduled delay between attempts. The final
/// attempt's outcome is returned as observed; nothing is retried past the
/// schedule.
pub fn with_retries<A, P>(
    ctx: &dyn RequestContext,
    what: &str,
    schedule: &RetrySchedule,
    attempt: A,
    should_retry: P,
) -> ResultRecord
where
    A: FnMut(usize) -> ResultRecord,
    P: Fn(&ResultRecord) -> bool,
{
    run_with_retries(ctx, what, schedule, attempt, should_retry, |d| {
        thread::sleep(d)
    })
}

/// Retry loop with an injectable sleeper, so tests can observe the delays.
pub(crate) fn run_with_retries<A, P, S>(
    ctx: &dyn RequestContext,
    what: &str,
    schedule: &RetrySchedule,
    mut attempt: A,
    should_retry: P,
    mut sleep: S,
) -> ResultRecord
where
    A: FnMut(usize) -> ResultRecord,
    P: Fn(&ResultRecord) -> bool,
    S: FnMut(Duration),
{
    let delays = schedule.delays();
    let budget = schedule.max_attempts();
    let mut try_num = 0;
    loop {
        try_num += 1;
        let outcome = attempt(try_num);
        if !should_retry(&outcome) {
            return outcome;
        }
        if try_num >= budget {
            return outcome;
        }
        let delay = delays[try_num - 1];
        if delay < 0.0 {
            // Sentinel: the attempt just made was the last one.
            return outcome;
        }
        ctx.sys_log(&format!(
            "try {try_num} of {what} failed (retry after {delay}s): \
             overallRC={} rc={} out: {}",
            outcome.overall_rc, outcome.rc, outcome.response
        ));
        sleep(Duration::from_secs_f32(delay));
    }
}
