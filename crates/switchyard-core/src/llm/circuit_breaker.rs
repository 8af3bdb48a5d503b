//! Per-provider circuit breaker.
//!
//! Three explicit states:
//! - `Closed`: calls flow, consecutive invocation failures are counted.
//! - `Open`: calls are rejected until `recovery_timeout` has elapsed since
//!   the last failure.
//! - `Probing`: exactly one probe call has been let through; its outcome
//!   closes or re-opens the breaker. Any other caller is rejected meanwhile.
//!
//! The breaker itself is a plain state machine (`&mut self`); callers keep
//! breakers behind a lock so the Open -> Probing hand-off is single-flight.

use std::time::Duration;

use tokio::time::Instant;

use switchyard_types::config::CircuitBreakerConfig;
use switchyard_types::metrics::CircuitStateKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    Probing,
}

/// Permission handed out by [`CircuitBreaker::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Ordinary call through a closed breaker.
    Call,
    /// The single probe of an open breaker. Its outcome must be recorded,
    /// or the slot given back with `release_probe`.
    Probe,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.recovery_timeout())
    }

    fn recovery_elapsed(&self) -> bool {
        self.last_failure
            .is_none_or(|at| at.elapsed() >= self.recovery_timeout)
    }

    /// Ask permission for one call.
    ///
    /// Transitions Open -> Probing once the recovery timeout has elapsed;
    /// the caller that makes this transition gets `Permit::Probe`.
    pub fn try_acquire(&mut self) -> Option<Permit> {
        match self.state {
            BreakerState::Closed => Some(Permit::Call),
            BreakerState::Open if self.recovery_elapsed() => {
                self.state = BreakerState::Probing;
                Some(Permit::Probe)
            }
            BreakerState::Open | BreakerState::Probing => None,
        }
    }

    /// Whether a call would be rejected right now. Does not change state.
    pub fn would_reject(&self) -> bool {
        match self.state {
            BreakerState::Closed => false,
            BreakerState::Open => !self.recovery_elapsed(),
            BreakerState::Probing => true,
        }
    }

    /// Whether the breaker has tripped (open or probing).
    pub fn is_open(&self) -> bool {
        self.state != BreakerState::Closed
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(Instant::now());
        match self.state {
            BreakerState::Closed if self.failure_count >= self.failure_threshold => {
                self.state = BreakerState::Open;
            }
            BreakerState::Probing => self.state = BreakerState::Open,
            _ => {}
        }
    }

    /// Give back a probe slot that ended without an outcome (e.g. the
    /// request deadline cancelled it).
    pub fn release_probe(&mut self) {
        if self.state == BreakerState::Probing {
            self.state = BreakerState::Open;
        }
    }

    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.last_failure = None;
    }

    /// Externally visible state. An open breaker whose recovery timeout has
    /// elapsed reports `Probing`: its probe window is open.
    pub fn state(&self) -> CircuitStateKind {
        match self.state {
            BreakerState::Closed => CircuitStateKind::Closed,
            BreakerState::Open if self.recovery_elapsed() => CircuitStateKind::Probing,
            BreakerState::Open => CircuitStateKind::Open,
            BreakerState::Probing => CircuitStateKind::Probing,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}
