//! Logging collaborator: the narrow interface every operation reports through.

use log::{debug, error, info, warn};

/// Per-request context injected by the host program.
///
/// Operations emit an enter line and an exit line through `sys_log`, and on
/// hard failure one operator-facing line through `announce`. The default
/// implementation routes everything to the `log` facade; hosts with their own
/// audit pipeline implement this trait instead.
pub trait RequestContext {
    /// Userid the current request operates on behalf of.
    fn userid(&self) -> &str;

    /// Audit/trace line, not intended for the operator.
    fn sys_log(&self, line: &str);

    /// Operator-facing line reporting a hard failure.
    fn announce(&self, line: &str);

    /// Operator-facing informational line.
    fn note(&self, line: &str);

    /// Operator-facing warning that does not change the outcome.
    fn warn(&self, line: &str);
}

/// Default context backed by the `log` facade.
#[derive(Debug, Clone)]
pub struct LogContext {
    userid: String,
}

impl LogContext {
    pub fn new<U: Into<String>>(userid: U) -> Self {
        Self {
            userid: userid.into(),
        }
    }
}

impl RequestContext for LogContext {
    fn userid(&self) -> &str {
        &self.userid
    }

    fn sys_log(&self, line: &str) {
        debug!("{line}");
    }

    fn announce(&self, line: &str) {
        error!("{line}");
    }

    fn note(&self, line: &str) {
        info!("{line}");
    }

    fn warn(&self, line: &str) {
        warn!("{line}");
    }
}
