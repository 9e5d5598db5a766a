// ============================================================================
// File: vmbridge/src/disk/mod.rs
// ----------------------------------------------------------------------------
// Disk provisioning workflow: link a minidisk to the management node, format
// and partition it for its geometry, create a file system, and always release
// the link afterwards.
// ============================================================================

#[cfg(test)]
mod tests;

use crate::context::RequestContext;
use crate::messages;
use crate::remote::RemoteExecutor;
use crate::results::ResultRecord;
use crate::retry::{self, RetrySchedule, with_retries};
use crate::runner::{CommandExec, CommandSpec, announce_failure, fold_failure};

/// Links a disk of a target userid to the management node and brings it
/// online there, printing the assigned device name.
pub const LINK_TOOL: &str = "/opt/zthin/bin/linkdiskandbringonline";

/// Takes the linked disk offline on the management node and detaches it.
pub const DETACH_TOOL: &str = "/opt/zthin/bin/offlinediskanddetach";

/// Marker line of the link tool's output carrying the device name.
const DEVICE_MARKER: &str = "Success:";

/// Word position of the device name in the text after the marker, e.g.
/// `Success: Userid maint vdev 193 linked at ad35 device name dasdh`.
const DEVICE_WORD: usize = 9;

/// Settle the device layer so freshly created nodes are visible; the older
/// tool name is the fallback on systems without udevadm.
const SETTLE_LINE: &str = "which udevadm > /dev/null 2>&1 && sudo udevadm settle || sudo udevsettle";

/// Disk layout family, which selects the formatting and partitioning tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskGeometry {
    /// ECKD 3390: low-level format with dasdfmt, partition with fdasd.
    Eckd3390,
    /// FBA 9336: wipe and partition with fdisk.
    Fba9336,
}

/// File system to create on the disk's first partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsKind {
    Swap,
    Xfs,
    /// Any other type handed to mkfs by name, e.g. `ext4`.
    Named(String),
}

impl FsKind {
    fn label(&self) -> &str {
        match self {
            FsKind::Swap => "swap",
            FsKind::Xfs => "xfs",
            FsKind::Named(name) => name,
        }
    }
}

/// One disk to provision: which minidisk, how to link it, and what to put
/// on it.
#[derive(Debug, Clone)]
pub struct DiskSpec {
    pub vaddr: String,
    pub mode: String,
    pub geometry: DiskGeometry,
    pub fs: FsKind,
}

impl DiskSpec {
    pub fn new<V, M>(vaddr: V, mode: M, geometry: DiskGeometry, fs: FsKind) -> Self
    where
        V: Into<String>,
        M: Into<String>,
    {
        Self {
            vaddr: vaddr.into(),
            mode: mode.into(),
            geometry,
            fs,
        }
    }
}

/// Desired state of a disk device inside the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskState {
    Enable,
    Disable,
}

impl DiskState {
    fn flag(self) -> &'static str {
        match self {
            DiskState::Enable => "-e",
            DiskState::Disable => "-d",
        }
    }
}

/// Runs the provisioning workflow for one disk at a time.
///
/// Every device-level step runs under the retry schedule because a freshly
/// linked disk, a new partition table, or a new partition node is often not
/// visible to the kernel yet on the first try.
pub struct DiskProvisioner<'r> {
    runner: &'r dyn CommandExec,
    schedule: RetrySchedule,
}

impl<'r> DiskProvisioner<'r> {
    pub fn new(runner: &'r dyn CommandExec) -> Self {
        Self {
            runner,
            schedule: retry::QUICK_DEVICE,
        }
    }

    /// Replace the device retry schedule.
    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Link the disk, format and partition it for its geometry, create the
    /// file system, and release the link.
    ///
    /// The release runs whenever the link tool was invoked, even after a
    /// failed step, so the workflow never leaks a link. A release failure
    /// overrides an otherwise successful run; after an earlier failure it is
    /// appended to that failure's diagnostics without changing its codes.
    pub fn provision(&self, ctx: &dyn RequestContext, spec: &DiskSpec) -> ResultRecord {
        ctx.sys_log(&format!(
            "Enter disk provision, userid: {} vaddr: {} fs: {}",
            ctx.userid(),
            spec.vaddr,
            spec.fs.label()
        ));

        let mut device = None;
        let built = self.build(ctx, spec, &mut device);
        let released = self.release(ctx, spec, device.as_deref());

        let outcome = if released.is_ok() {
            built
        } else if built.is_ok() {
            released
        } else {
            built.with_appended(&released.response)
        };

        ctx.sys_log(&format!("Exit disk provision, rc: {}", outcome.overall_rc));
        outcome
    }

    fn build(
        &self,
        ctx: &dyn RequestContext,
        spec: &DiskSpec,
        device: &mut Option<String>,
    ) -> ResultRecord {
        let userid = ctx.userid().to_string();
        let link = CommandSpec::argv([
            "sudo",
            LINK_TOOL,
            userid.as_str(),
            spec.vaddr.as_str(),
            spec.mode.as_str(),
        ]);
        let linked = self.step(ctx, "disk link", &link);
        if !linked.is_ok() {
            return linked;
        }

        let name = match scrape_device(&link.masked_line(), &linked.response) {
            Ok(name) => name,
            Err(record) => {
                ctx.announce(&record.response);
                return record;
            }
        };
        let node = format!("/dev/{name}");
        *device = Some(node.clone());
        ctx.sys_log(&format!("Disk {} is online as {node}", spec.vaddr));

        let partitioned = match spec.geometry {
            DiskGeometry::Eckd3390 => self.partition_eckd(ctx, &node),
            DiskGeometry::Fba9336 => self.partition_fba(ctx, &node),
        };
        if !partitioned.is_ok() {
            return partitioned;
        }
        self.settle(ctx);

        let made = self.make_fs(ctx, spec, &node);
        if made.is_ok() {
            ctx.note(&format!("File system: {} is installed.", spec.fs.label()));
        }
        made
    }

    // Format and table-initialization failures are not transient: these
    // steps halt on first failure and never retry.
    fn partition_eckd(&self, ctx: &dyn RequestContext, node: &str) -> ResultRecord {
        let format = CommandSpec::argv([
            "sudo", "/sbin/dasdfmt", "-y", "-b", "4096", "-d", "cdl", "-v", "-f", node,
        ]);
        let formatted = self.step_once(ctx, &format);
        if !formatted.is_ok() {
            return formatted;
        }
        self.settle(ctx);

        let partition = CommandSpec::argv(["sudo", "/sbin/fdasd", "-a", node]);
        self.step_once(ctx, &partition)
    }

    fn partition_fba(&self, ctx: &dyn RequestContext, node: &str) -> ResultRecord {
        let wipe = CommandSpec::shell(format!("printf 'g\\nw\\n' | sudo /sbin/fdisk {node}"));
        let wiped = self.step_once(ctx, &wipe);
        if !wiped.is_ok() {
            return wiped;
        }
        self.settle(ctx);

        let create = CommandSpec::shell(format!(
            "printf 'n\\np\\n1\\n\\n\\nw\\n' | sudo /sbin/fdisk {node}"
        ));
        self.step(ctx, "partition creation", &create)
    }

    fn make_fs(&self, ctx: &dyn RequestContext, spec: &DiskSpec, node: &str) -> ResultRecord {
        let partition = format!("{node}1");
        let partition = partition.as_str();
        let cmd = match &spec.fs {
            FsKind::Swap => CommandSpec::argv(["sudo", "/sbin/mkswap", partition]),
            FsKind::Xfs => CommandSpec::argv(["sudo", "/sbin/mkfs.xfs", "-f", partition]),
            FsKind::Named(name) => {
                CommandSpec::argv(["sudo", "/sbin/mkfs", "-F", "-t", name.as_str(), partition])
            }
        };
        self.step(ctx, "file system creation", &cmd)
    }

    fn release(
        &self,
        ctx: &dyn RequestContext,
        spec: &DiskSpec,
        device: Option<&str>,
    ) -> ResultRecord {
        // Flushing needs the device node; the detach works from the virtual
        // address alone and must run even when the link output was unusable.
        if let Some(node) = device {
            let flush = CommandSpec::argv(["sudo", "/sbin/blockdev", "--flushbufs", node]);
            if let Err(err) = self.runner.execute(ctx, &flush) {
                ctx.warn(&format!(
                    "Buffer flush of {node} failed and is ignored: {err}"
                ));
            }
        }

        let userid = ctx.userid().to_string();
        let detach =
            CommandSpec::argv(["sudo", DETACH_TOOL, userid.as_str(), spec.vaddr.as_str()]);
        match self.runner.execute(ctx, &detach) {
            Ok(_) => ResultRecord::ok(),
            Err(err) => {
                let record = fold_failure(&detach, &err);
                announce_failure(ctx, &detach.masked_line(), &record);
                record
            }
        }
    }

    /// Run one step exactly once, announcing any failure.
    fn step_once(&self, ctx: &dyn RequestContext, cmd: &CommandSpec) -> ResultRecord {
        match self.runner.execute(ctx, cmd) {
            Ok(output) => ResultRecord::ok_with(output),
            Err(err) => {
                let record = fold_failure(cmd, &err);
                announce_failure(ctx, &cmd.masked_line(), &record);
                record
            }
        }
    }

    /// Run one device-level step under the retry schedule. Attempts fold
    /// quietly; only the exhausted outcome is announced.
    fn step(&self, ctx: &dyn RequestContext, what: &str, cmd: &CommandSpec) -> ResultRecord {
        let record = with_retries(
            ctx,
            what,
            &self.schedule,
            |_| match self.runner.execute(ctx, cmd) {
                Ok(output) => ResultRecord::ok_with(output),
                Err(err) => fold_failure(cmd, &err),
            },
            |r| !r.is_ok(),
        );
        if !record.is_ok() {
            announce_failure(ctx, &cmd.masked_line(), &record);
        }
        record
    }

    fn settle(&self, ctx: &dyn RequestContext) {
        let settle = CommandSpec::shell(SETTLE_LINE);
        if let Err(err) = self.runner.execute(ctx, &settle) {
            ctx.warn(&format!("Device settle failed and is ignored: {err}"));
        }
    }
}

/// Pull the assigned device name out of the link tool's output.
pub(crate) fn scrape_device(cmd_line: &str, output: &str) -> Result<String, ResultRecord> {
    let line = output
        .lines()
        .find(|l| l.contains(DEVICE_MARKER))
        .ok_or_else(|| {
            messages::DEVICE_MARKER_MISSING.record(messages::device_marker_missing_text(
                DEVICE_MARKER,
                cmd_line,
                output,
            ))
        })?;

    // Count words from the text after the marker, not the whole line.
    let after = line
        .split_once(DEVICE_MARKER)
        .map(|(_, rest)| rest)
        .unwrap_or("");
    after.split_whitespace().nth(DEVICE_WORD).map(str::to_string).ok_or_else(|| {
        messages::DEVICE_TOKEN_SHORTAGE.record(messages::device_token_shortage_text(
            DEVICE_MARKER,
            DEVICE_WORD + 1,
            cmd_line,
            output,
        ))
    })
}

/// Bring a disk device online or offline inside the guest.
///
/// The guest-side device driver can take minutes to finish an online/offline
/// transition, so transport-reported failures retry on the long disk-state
/// schedule. Taking a device offline that is already offline reports rc 8
/// rs 1 through the transport and counts as success.
pub fn disable_enable_disk(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
    vaddr: &str,
    state: DiskState,
) -> ResultRecord {
    disk_state_with(runner, ctx, userid, vaddr, state, &retry::DISK_STATE)
}

pub(crate) fn disk_state_with(
    runner: &dyn CommandExec,
    ctx: &dyn RequestContext,
    userid: &str,
    vaddr: &str,
    state: DiskState,
    schedule: &RetrySchedule,
) -> ResultRecord {
    ctx.sys_log(&format!(
        "Enter disk state change, userid: {userid} vaddr: {vaddr} state: {state:?}"
    ));

    let remote = RemoteExecutor::new(runner);
    let command = format!("sudo /sbin/chccwdev {} {vaddr}", state.flag());
    let record = with_retries(
        ctx,
        "disk state change",
        schedule,
        |_| remote.exec(ctx, userid, &command, &[], None),
        |r| !r.is_ok() && !already_offline(r, state),
    );

    let record = if already_offline(&record, state) {
        ResultRecord::ok_with(record.response)
    } else {
        if !record.is_ok() {
            ctx.announce(&record.response);
        }
        record
    };

    ctx.sys_log(&format!("Exit disk state change, rc: {}", record.overall_rc));
    record
}

fn already_offline(record: &ResultRecord, state: DiskState) -> bool {
    state == DiskState::Disable
        && record.overall_rc == 2
        && record.rc == 8
        && record.rs == 1
}
