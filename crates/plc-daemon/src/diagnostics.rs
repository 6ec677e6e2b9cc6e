//! Lightweight runtime diagnostics for the daemon.
//!
//! Wraps the fieldbus plane's shared [`Counters`] with the one piece of
//! state only the daemon can observe — how many simulation tasks have
//! stopped after a failed tick — and a start-of-process clock. There is no
//! HTTP export surface; a snapshot is logged at shutdown.

use plc_common::diagnostics::Counters;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time view of [`DiagnosticsState`].
#[derive(Debug, Clone)]
pub struct DiagnosticsSnapshot {
    /// Wall-clock time since the daemon started.
    pub uptime: Duration,
    /// Fieldbus connections accepted since start.
    pub connections_served: u64,
    /// Protocol requests successfully served.
    pub requests_served: u64,
    /// Protocol exception responses sent to clients.
    pub exceptions_raised: u64,
    /// Simulation tasks currently marked inactive after a failed tick.
    pub failed_simulations: u64,
}

/// Diagnostics state for the running daemon: the fieldbus plane's shared
/// counters plus simulation-task liveness.
#[derive(Debug)]
pub struct DiagnosticsState {
    counters: Arc<Counters>,
    failed_simulations: AtomicU64,
    start_time: Instant,
}

impl Default for DiagnosticsState {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsState {
    /// Create a new diagnostics state with a fresh counter set and the
    /// clock starting now.
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::new()),
            failed_simulations: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// The shared counter set to hand to [`plc_fieldbus::FieldbusDispatcher::start`].
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Update the count of simulation tasks that have stopped after a
    /// failed tick.
    pub fn set_failed_simulations(&self, count: u64) {
        self.failed_simulations.store(count, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            uptime: self.start_time.elapsed(),
            connections_served: self.counters.connections_served(),
            requests_served: self.counters.requests_served(),
            exceptions_raised: self.counters.exceptions_raised(),
            failed_simulations: self.failed_simulations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_zeroed() {
        let state = DiagnosticsState::new();
        let snap = state.snapshot();
        assert_eq!(snap.connections_served, 0);
        assert_eq!(snap.requests_served, 0);
        assert_eq!(snap.exceptions_raised, 0);
        assert_eq!(snap.failed_simulations, 0);
    }

    #[test]
    fn counters_accumulate() {
        let state = DiagnosticsState::new();
        state.counters().record_connection();
        state.counters().record_request();
        state.counters().record_exception();
        state.set_failed_simulations(2);

        let snap = state.snapshot();
        assert_eq!(snap.connections_served, 1);
        assert_eq!(snap.requests_served, 1);
        assert_eq!(snap.exceptions_raised, 1);
        assert_eq!(snap.failed_simulations, 2);
    }
}
