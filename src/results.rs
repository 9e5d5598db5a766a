// ============================================================================
// File: vmbridge/src/results.rs
// ----------------------------------------------------------------------------
// The uniform outcome record returned by every operation in this layer.
// ============================================================================

use serde::{Deserialize, Serialize};

/// Outcome of one operation against the managed system.
///
/// `overall_rc == 0` means the operation achieved its goal; any other value
/// means `response` carries an actionable diagnostic. The `rc`/`rs`/`errno`
/// triple is the managed system's three-part error vocabulary and its meaning
/// depends on the domain `overall_rc` selects.
///
/// Records are values: each step of a workflow constructs its own record and
/// replaces or merges earlier ones explicitly, never mutates them in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "overallRC")]
    pub overall_rc: i32,
    pub rc: i32,
    pub rs: i32,
    pub errno: i32,
    pub response: String,
}

impl ResultRecord {
    /// Successful outcome with no payload.
    pub fn ok() -> Self {
        Self {
            overall_rc: 0,
            rc: 0,
            rs: 0,
            errno: 0,
            response: String::new(),
        }
    }

    /// Successful outcome carrying a query payload or captured output.
    pub fn ok_with<R: Into<String>>(response: R) -> Self {
        Self {
            response: response.into(),
            ..Self::ok()
        }
    }

    /// Replace the return code.
    pub fn with_rc(mut self, rc: i32) -> Self {
        self.rc = rc;
        self
    }

    /// Replace the reason code.
    pub fn with_rs(mut self, rs: i32) -> Self {
        self.rs = rs;
        self
    }

    /// Replace the internal error number.
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = errno;
        self
    }

    /// Replace the diagnostic text or payload.
    pub fn with_response<R: Into<String>>(mut self, response: R) -> Self {
        self.response = response.into();
        self
    }

    /// Append later diagnostics on their own line, keeping the codes of this
    /// record. Used when a cleanup step fails after an earlier failure that
    /// must stay the reported outcome.
    pub fn with_appended(mut self, extra: &str) -> Self {
        if extra.is_empty() {
            return self;
        }
        if !self.response.is_empty() && !self.response.ends_with('\n') {
            self.response.push('\n');
        }
        self.response.push_str(extra);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.overall_rc == 0
    }

    /// JSON rendering for result consumers that forward outcomes verbatim.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Default for ResultRecord {
    fn default() -> Self {
        Self::ok()
    }
}

impl std::fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "overallRC: {}, rc: {}, rs: {}, errno: {}",
            self.overall_rc, self.rc, self.rs, self.errno
        )
    }
}
