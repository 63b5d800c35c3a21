use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerThresholds {
    /// Failure ratio over the sliding window that trips the breaker.
    pub failure_rate_threshold: f64,
    /// Number of most recent calls kept in the window.
    pub sliding_window_size: usize,
    /// Calls required in the window before the failure rate is evaluated.
    pub minimum_calls: usize,
    /// How long the breaker stays open before probing.
    pub cooldown: chrono::Duration,
    /// Probe budget in half-open; all must succeed to close.
    pub half_open_probes: u32,
}

impl Default for BreakerThresholds {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 10,
            minimum_calls: 5,
            cooldown: chrono::Duration::seconds(10),
            half_open_probes: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    /// Recent call outcomes, `true` = failure, newest at the back.
    pub window: VecDeque<bool>,
    pub opened_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub probes_issued: u32,
    pub probe_successes: u32,
    pub updated_at: DateTime<Utc>,
}

impl BreakerSnapshot {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: BreakerState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            cooldown_until: None,
            probes_issued: 0,
            probe_successes: 0,
            updated_at: now,
        }
    }

    fn open(&mut self, thresholds: &BreakerThresholds, now: DateTime<Utc>) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.cooldown_until = Some(now + thresholds.cooldown);
        self.window.clear();
        self.probes_issued = 0;
        self.probe_successes = 0;
    }

    fn close(&mut self) {
        self.state = BreakerState::Closed;
        self.opened_at = None;
        self.cooldown_until = None;
        self.window.clear();
        self.probes_issued = 0;
        self.probe_successes = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDecision {
    Allow,
    Probe,
    Reject,
}

pub fn pre_call_decision(
    snapshot: &mut BreakerSnapshot,
    thresholds: &BreakerThresholds,
    now: DateTime<Utc>,
) -> CallDecision {
    let decision = match snapshot.state {
        BreakerState::Closed => CallDecision::Allow,
        BreakerState::Open => {
            if snapshot.cooldown_until.is_some_and(|t| now >= t) {
                snapshot.state = BreakerState::HalfOpen;
                snapshot.probes_issued = 1;
                snapshot.probe_successes = 0;
                CallDecision::Probe
            } else {
                CallDecision::Reject
            }
        }
        BreakerState::HalfOpen => {
            if snapshot.probes_issued < thresholds.half_open_probes {
                snapshot.probes_issued += 1;
                CallDecision::Probe
            } else {
                CallDecision::Reject
            }
        }
    };
    snapshot.updated_at = now;
    decision
}

pub fn record_result(
    snapshot: &mut BreakerSnapshot,
    thresholds: &BreakerThresholds,
    failure: bool,
    was_probe: bool,
    now: DateTime<Utc>,
) {
    if was_probe {
        if failure {
            snapshot.open(thresholds, now);
        } else {
            snapshot.probe_successes += 1;
            if snapshot.probe_successes >= thresholds.half_open_probes {
                snapshot.close();
            }
        }
    } else if snapshot.state == BreakerState::Closed {
        snapshot.window.push_back(failure);
        while snapshot.window.len() > thresholds.sliding_window_size {
            snapshot.window.pop_front();
        }
        if snapshot.window.len() >= thresholds.minimum_calls {
            let failures = snapshot.window.iter().filter(|f| **f).count();
            let rate = failures as f64 / snapshot.window.len() as f64;
            if rate >= thresholds.failure_rate_threshold {
                snapshot.open(thresholds, now);
            }
        }
    }
    snapshot.updated_at = now;
}

/// Process-wide breaker shared by every caller of the provider; webhook
/// and poller failures feed the same window.
pub struct CircuitBreaker {
    thresholds: BreakerThresholds,
    inner: Mutex<BreakerSnapshot>,
}

impl CircuitBreaker {
    pub fn new(thresholds: BreakerThresholds) -> Self {
        Self {
            inner: Mutex::new(BreakerSnapshot::new(Utc::now())),
            thresholds,
        }
    }

    pub fn pre_call(&self) -> CallDecision {
        let mut snapshot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        pre_call_decision(&mut snapshot, &self.thresholds, Utc::now())
    }

    pub fn record(&self, failure: bool, was_probe: bool) {
        let mut snapshot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        record_result(&mut snapshot, &self.thresholds, failure, was_probe, Utc::now());
    }

    pub fn state(&self) -> BreakerState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }
}
