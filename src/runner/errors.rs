// ============================================================================
// File: vmbridge/src/runner/errors.rs
// ----------------------------------------------------------------------------
// Command-execution error types
// ============================================================================

use std::io;
use std::time::Duration;

/// Errors from spawning and supervising a local privileged command.
///
/// These never escape a public operation: every caller folds them into a
/// `ResultRecord` according to its own classification rules.
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// The command ran and exited with a non-zero status.
    #[error("command exited with status {status}")]
    NonZero { status: i32, output: String },

    /// The command did not finish within the allowed time and was killed.
    #[error("command timed out after {limit:?}")]
    TimedOut { limit: Duration, output: String },

    /// The command could not be spawned at all (missing binary, permission
    /// denied, bad argv).
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] io::Error),
}

impl CmdError {
    /// Permission failures are reported with the same fixed outcome as
    /// timeouts by the remote executor.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CmdError::Spawn(e) if e.kind() == io::ErrorKind::PermissionDenied)
    }
}

/// Result type for command execution.
pub type CmdResult<T> = Result<T, CmdError>;
