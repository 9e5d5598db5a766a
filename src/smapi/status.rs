// ============================================================================
// File: vmbridge/src/smapi/status.rs
// ----------------------------------------------------------------------------
// Rolling health tracker for the management-API channel.
// ============================================================================

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Consecutive failures after which the channel is considered unhealthy.
const UNHEALTHY_AFTER: u32 = 3;

/// Rolling health of the management-API channel.
///
/// Updated after every invocation attempt: a success resets the consecutive
/// failure count, a failure increments it. Counters are atomic so overlapping
/// callers can record and read without coordination; higher layers consult
/// [`SmapiHealth::is_healthy`] for circuit-breaking decisions.
#[derive(Debug, Default)]
pub struct SmapiHealth {
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl SmapiHealth {
    pub const fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures() < UNHEALTHY_AFTER
    }
}

static HEALTH: OnceLock<SmapiHealth> = OnceLock::new();

/// Process-wide health tracker, initialized on first use.
pub fn smapi_health() -> &'static SmapiHealth {
    HEALTH.get_or_init(SmapiHealth::new)
}
