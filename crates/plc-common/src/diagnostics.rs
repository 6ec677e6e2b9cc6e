//! Shared runtime counters for the fieldbus plane.
//!
//! Kept here, rather than in `plc-fieldbus` or `plc-daemon` alone, so both
//! the dispatcher/protocol-engine layer (which knows when a connection is
//! accepted or a request answered) and the daemon (which logs a snapshot
//! on shutdown) can hold the same counters without a dependency cycle.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated by the fieldbus plane as connections and
/// requests are served.
#[derive(Debug, Default)]
pub struct Counters {
    connections_served: AtomicU64,
    requests_served: AtomicU64,
    exceptions_raised: AtomicU64,
}

impl Counters {
    /// Construct a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted connection.
    pub fn record_connection(&self) {
        self.connections_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one request answered without a protocol exception.
    pub fn record_request(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one exception response sent back to a client.
    pub fn record_exception(&self) {
        self.exceptions_raised.fetch_add(1, Ordering::Relaxed);
    }

    /// Connections accepted since construction.
    pub fn connections_served(&self) -> u64 {
        self.connections_served.load(Ordering::Relaxed)
    }

    /// Requests answered without a protocol exception since construction.
    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    /// Exception responses sent since construction.
    pub fn exceptions_raised(&self) -> u64 {
        self.exceptions_raised.load(Ordering::Relaxed)
    }
}
