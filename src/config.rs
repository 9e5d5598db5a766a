//! Management-API socket timeout configuration.

use serde::{Deserialize, Serialize};

/// Default socket timeout for general management-API calls, in seconds.
pub const DEFAULT_SMAPI_TIMEOUT_SECS: u64 = 240;

/// Default socket timeout for long-running management-API calls (relocation,
/// resizing), in seconds.
pub const DEFAULT_SMAPI_LONG_CALL_TIMEOUT_SECS: u64 = 900;

const GENERAL_ENV: &str = "VMBRIDGE_SMAPI_TIMEOUT_SECS";
const LONG_CALL_ENV: &str = "VMBRIDGE_SMAPI_LONG_CALL_TIMEOUT_SECS";

/// Configured timeout values for the management-API channel.
///
/// Both values are optional; resolution falls back through the configured
/// general timeout and then the documented defaults, matching the managed
/// system's configuration semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmapiTimeouts {
    pub general_secs: Option<u64>,
    pub long_call_secs: Option<u64>,
}

impl SmapiTimeouts {
    /// Read overrides from the process environment. Unset or unparsable
    /// variables leave the corresponding value at its default chain.
    pub fn from_env() -> Self {
        Self {
            general_secs: read_env(GENERAL_ENV),
            long_call_secs: read_env(LONG_CALL_ENV),
        }
    }

    /// Timeout for general API calls.
    pub fn general(&self) -> u64 {
        self.general_secs.unwrap_or(DEFAULT_SMAPI_TIMEOUT_SECS)
    }

    /// Timeout for long-running API calls: the configured long-call value,
    /// else the configured general value, else the long-call default.
    pub fn long_call(&self) -> u64 {
        self.long_call_secs
            .or(self.general_secs)
            .unwrap_or(DEFAULT_SMAPI_LONG_CALL_TIMEOUT_SECS)
    }
}

fn read_env(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
