//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: downstream assumed down, requests fail fast
//! - Half-Open: testing if downstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold within sampling window
//! Open → Half-Open: after break duration
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-route circuit breaker (not per host, not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open (prevents hammering recovering downstream)
//! - A permit dropped without an outcome (cancelled call) frees the trial slot
//!   without counting as success or failure

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge value: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub break_duration: Duration,
    pub sampling_window: Duration,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    window_started: Option<Instant>,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    route: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Open and the break duration has not elapsed.
    Open,
    /// Half-open and the single trial call is already running.
    TrialInFlight,
}

impl CircuitBreaker {
    pub fn new(route: impl Into<String>, settings: BreakerSettings) -> Self {
        let route = route.into();
        metrics::record_circuit_state(&route, CircuitState::Closed);
        Self {
            route,
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                window_started: None,
                open_until: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask to make a call at `now`.
    pub fn try_acquire(&self, now: Instant) -> Result<Permit<'_>, Rejected> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let elapsed = inner.open_until.map(|until| now >= until).unwrap_or(true);
                if !elapsed {
                    return Err(Rejected::Open);
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                drop(inner);
                tracing::info!(route = %self.route, "Circuit half-open, allowing trial call");
                metrics::record_circuit_state(&self.route, CircuitState::HalfOpen);
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(Rejected::TrialInFlight);
                }
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                inner.window_started = None;
                inner.open_until = None;
                inner.trial_in_flight = false;
                drop(inner);
                tracing::info!(route = %self.route, "Circuit closed after successful trial");
                metrics::record_circuit_state(&self.route, CircuitState::Closed);
            }
            CircuitState::Closed => {
                inner.failures = 0;
                inner.window_started = None;
            }
            // Late results from calls admitted before the circuit opened.
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool, now: Instant) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Open;
                inner.open_until = Some(deadline(now, self.settings.break_duration));
                inner.trial_in_flight = false;
                drop(inner);
                tracing::error!(
                    route = %self.route,
                    break_ms = self.settings.break_duration.as_millis() as u64,
                    "Trial call failed, circuit re-opened"
                );
                metrics::record_circuit_state(&self.route, CircuitState::Open);
            }
            CircuitState::Closed => {
                let window_expired = inner
                    .window_started
                    .map(|start| now.saturating_duration_since(start) > self.settings.sampling_window)
                    .unwrap_or(true);
                if window_expired {
                    inner.window_started = Some(now);
                    inner.failures = 0;
                }
                inner.failures += 1;

                if inner.failures >= self.settings.failure_threshold {
                    let failures = inner.failures;
                    inner.state = CircuitState::Open;
                    inner.open_until = Some(deadline(now, self.settings.break_duration));
                    drop(inner);
                    tracing::error!(
                        route = %self.route,
                        failures,
                        break_ms = self.settings.break_duration.as_millis() as u64,
                        "Circuit opened"
                    );
                    metrics::record_circuit_state(&self.route, CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    fn on_abandoned(&self, trial: bool) {
        if trial {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.trial_in_flight = false;
            }
        }
    }
}

/// Admission to make one call. Report the outcome, or drop it to abandon the call.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn record_failure(mut self, now: Instant) {
        self.settled = true;
        self.breaker.on_failure(self.trial, now);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.trial);
        }
    }
}
