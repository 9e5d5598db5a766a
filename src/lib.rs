// ============================================================================
// File: vmbridge/src/lib.rs
// ----------------------------------------------------------------------------
// Crate root: module organization and the public surface of the layer.
// ============================================================================

//! Command-execution and provisioning layer for driving a hypervisor's
//! control tooling from a management node.
//!
//! Every operation returns a [`ResultRecord`] instead of an error type:
//! callers inspect `overall_rc` to find out which failure domain they are in
//! (local command, remote transport, management API, timeout) and forward the
//! record to their own result consumers. Operations report through the
//! [`RequestContext`] trait; the bundled [`LogContext`] routes everything to
//! the `log` facade.
//!
//! The layer is synchronous by design. Commands run as fresh subprocesses via
//! [`CommandRunner`]; workflows that need more than one command compose it
//! behind the [`CommandExec`] seam.

pub mod config;
pub mod context;
pub mod disk;
pub mod messages;
pub mod poll;
pub mod remote;
pub mod results;
pub mod retry;
pub mod runner;
pub mod smapi;
pub mod spool;

#[cfg(test)]
mod testutil;

pub use config::SmapiTimeouts;
pub use context::{LogContext, RequestContext};
pub use disk::{
    DiskGeometry, DiskProvisioner, DiskSpec, DiskState, FsKind, disable_enable_disk,
};
pub use poll::{OsState, VmState, is_logged_on, wait_for_os_state, wait_for_vm_state};
pub use remote::RemoteExecutor;
pub use results::ResultRecord;
pub use retry::RetrySchedule;
pub use runner::{CmdError, CmdResult, CommandExec, CommandRunner, CommandSpec};
pub use smapi::queries::{get_perf_info, purge_reader};
pub use smapi::{SmapiHealth, SmapiInvoker, smapi_health};
pub use spool::punch_to_reader;
