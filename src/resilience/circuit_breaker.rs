//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: testing if upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures, window failure rate, or
//!                window slow-call rate over threshold
//! Open → Half-Open: after reset timeout, on the next admission check
//! Half-Open → Closed: success_threshold consecutive probe successes
//! Half-Open → Open: any qualifying failure
//! ```
//!
//! # Design Decisions
//! - Per-dependency breaker (not global); no two breakers share state
//! - Fail fast in Open state with a concrete retry-after
//! - Bounded concurrent probes in Half-Open (prevents hammering a
//!   recovering upstream)
//! - Admission is a tagged value, settled through a [`CallPermit`];
//!   outcome recording and transition decisions share one critical section

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::error::{
    default_failure_predicate, CallError, FailurePredicate, UpstreamError,
};
use crate::resilience::window::SlidingWindow;

/// Breaker state tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// One recorded transition, kept in a bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at_epoch_ms: u64,
    pub reason: String,
}

/// Hook invoked on every transition; the breaker's only side-effecting hook.
pub type StateChangeHook = Arc<dyn Fn(&str, &StateChange) + Send + Sync>;

/// Admission decision for one call attempt.
pub enum Admission {
    /// The call may proceed; settle the permit exactly once.
    Admitted(CallPermit),
    /// The call must not proceed; no upstream I/O happened.
    Rejected { retry_after: Duration },
}

const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Default)]
struct Stats {
    total_calls: u64,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_epoch_ms: Option<u64>,
    last_success_epoch_ms: Option<u64>,
}

struct Inner {
    state: CircuitState,
    window: SlidingWindow,
    stats: Stats,
    opened_at: Option<Instant>,
    /// Incremented on every entry into Half-Open so that probes from a
    /// previous half-open episode cannot corrupt the current counters.
    probe_generation: u64,
    probes_in_flight: u32,
    probe_successes: u32,
    history: VecDeque<StateChange>,
}

/// Per-dependency admission policy. Long-lived, shared via `Arc`.
pub struct CircuitBreaker {
    name: String,
    config: Resolved,
    inner: Mutex<Inner>,
    failure_predicate: FailurePredicate,
    on_state_change: Option<StateChangeHook>,
}

/// `BreakerConfig` with durations resolved once at construction.
#[derive(Debug, Clone)]
struct Resolved {
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    reset_timeout: Duration,
    window_size: Duration,
    window_buckets: u32,
    slow_call_duration: Duration,
    slow_call_rate_threshold: f64,
    window_failure_rate: f64,
    min_window_samples: u64,
}

impl From<&BreakerConfig> for Resolved {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            timeout: Duration::from_millis(config.timeout_ms),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            window_size: Duration::from_secs(config.window_size_secs),
            window_buckets: config.window_buckets.max(1),
            slow_call_duration: Duration::from_millis(config.slow_call_duration_ms),
            slow_call_rate_threshold: config.slow_call_rate_threshold,
            window_failure_rate: config.window_failure_rate,
            min_window_samples: config.min_window_samples,
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        let resolved = Resolved::from(config);
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: SlidingWindow::new(resolved.window_buckets),
                stats: Stats::default(),
                opened_at: None,
                probe_generation: 0,
                probes_in_flight: 0,
                probe_successes: 0,
                history: VecDeque::with_capacity(HISTORY_LIMIT),
            }),
            config: resolved,
            failure_predicate: default_failure_predicate(),
            on_state_change: None,
        }
    }

    /// Replace the failure classification predicate.
    pub fn with_failure_predicate(mut self, predicate: FailurePredicate) -> Self {
        self.failure_predicate = predicate;
        self
    }

    /// Install the transition hook.
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-call deadline raced against admitted calls.
    pub fn call_timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    /// Decide whether one call attempt may proceed.
    ///
    /// An Open breaker past its reset timeout transitions to Half-Open here
    /// and admits the caller as the first probe.
    pub fn try_acquire(self: &Arc<Self>) -> Admission {
        let (admission, change) = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            match inner.state {
                CircuitState::Closed => (self.permit(None), None),
                CircuitState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| at.elapsed())
                        .unwrap_or(Duration::ZERO);
                    if elapsed >= self.config.reset_timeout {
                        let change = transition(
                            &mut inner,
                            CircuitState::HalfOpen,
                            "reset timeout elapsed".to_string(),
                        );
                        inner.probes_in_flight = 1;
                        let generation = inner.probe_generation;
                        (self.permit(Some(generation)), Some(change))
                    } else {
                        let retry_after = self.config.reset_timeout - elapsed;
                        (Admission::Rejected { retry_after }, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.probes_in_flight < self.config.success_threshold {
                        inner.probes_in_flight += 1;
                        let generation = inner.probe_generation;
                        (self.permit(Some(generation)), None)
                    } else {
                        // In-flight probes settle within the call timeout.
                        (
                            Admission::Rejected {
                                retry_after: self.config.timeout,
                            },
                            None,
                        )
                    }
                }
            }
        };
        if let Some(change) = change {
            self.notify(&change);
        }
        admission
    }

    fn permit(self: &Arc<Self>, probe: Option<u64>) -> Admission {
        Admission::Admitted(CallPermit {
            breaker: self.clone(),
            started: Instant::now(),
            probe,
            settled: false,
        })
    }

    /// Execute `op` through the breaker, racing the per-call deadline.
    pub async fn call<T, F, Fut>(self: &Arc<Self>, op: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let permit = match self.try_acquire() {
            Admission::Rejected { retry_after } => {
                return Err(CallError::Rejected { retry_after });
            }
            Admission::Admitted(permit) => permit,
        };

        match time::timeout(self.config.timeout, op()).await {
            Ok(Ok(value)) => {
                permit.succeed();
                Ok(value)
            }
            Ok(Err(error)) => {
                permit.fail(&error);
                Err(CallError::Failed(error))
            }
            Err(_) => {
                let error = UpstreamError::Timeout {
                    after: self.config.timeout,
                };
                permit.fail(&error);
                Err(CallError::Failed(error))
            }
        }
    }

    /// Like [`call`](Self::call), but invokes `fallback` in place of the
    /// operation when the breaker rejects admission.
    pub async fn call_with_fallback<T, F, Fut, B>(
        self: &Arc<Self>,
        op: F,
        fallback: B,
    ) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
        B: FnOnce() -> T,
    {
        match self.call(op).await {
            Err(CallError::Rejected { .. }) => Ok(fallback()),
            other => other,
        }
    }

    /// Advance the sliding window by one bucket.
    ///
    /// Public so tests (and the rotation task) drive rotation explicitly;
    /// the breaker never owns a wall-clock timer itself.
    pub fn rotate_window(&self) {
        self.inner
            .lock()
            .expect("breaker mutex poisoned")
            .window
            .rotate();
    }

    /// Spawn the interval task that rotates the window, one bucket per
    /// `window_size / window_buckets`.
    pub fn spawn_rotation(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let breaker = self.clone();
        let period = breaker.config.window_size / breaker.config.window_buckets;
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => breaker.rotate_window(),
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    /// Restore Closed and zero all counters, window and history.
    pub fn reset(&self) {
        let change = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            inner.window.reset();
            inner.stats = Stats::default();
            inner.history.clear();
            inner.opened_at = None;
            inner.probes_in_flight = 0;
            inner.probe_successes = 0;
            if inner.state != CircuitState::Closed {
                Some(transition(
                    &mut inner,
                    CircuitState::Closed,
                    "manual reset".to_string(),
                ))
            } else {
                None
            }
        };
        if let Some(change) = change {
            self.notify(&change);
        }
    }

    /// Serializable view for operational endpoints.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            total_calls: inner.stats.total_calls,
            consecutive_failures: inner.stats.consecutive_failures,
            consecutive_successes: inner.stats.consecutive_successes,
            last_failure_epoch_ms: inner.stats.last_failure_epoch_ms,
            last_success_epoch_ms: inner.stats.last_success_epoch_ms,
            window_samples: inner.window.sample_count(),
            window_failure_rate: inner.window.failure_rate(),
            window_slow_call_rate: inner.window.slow_call_rate(),
            last_state_changes: inner.history.iter().cloned().collect(),
        }
    }

    fn settle(&self, probe: Option<u64>, outcome: Settlement) {
        let change = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            self.apply(&mut inner, probe, outcome)
        };
        if let Some(change) = change {
            self.notify(&change);
        }
    }

    fn apply(&self, inner: &mut Inner, probe: Option<u64>, outcome: Settlement) -> Option<StateChange> {
        let probe_active = probe == Some(inner.probe_generation)
            && inner.state == CircuitState::HalfOpen;
        if probe_active {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        match outcome {
            Settlement::Cancelled => None,
            Settlement::Success { duration } => {
                let slow = duration > self.config.slow_call_duration;
                inner.window.record(false, slow);
                inner.stats.total_calls += 1;
                inner.stats.consecutive_successes += 1;
                inner.stats.consecutive_failures = 0;
                inner.stats.last_success_epoch_ms = Some(epoch_ms());

                match inner.state {
                    CircuitState::HalfOpen if probe_active => {
                        inner.probe_successes += 1;
                        if inner.probe_successes >= self.config.success_threshold {
                            let reason = format!("{} probe successes", inner.probe_successes);
                            let change = transition(inner, CircuitState::Closed, reason);
                            inner.stats.consecutive_failures = 0;
                            Some(change)
                        } else {
                            None
                        }
                    }
                    CircuitState::Closed => self.trip_on_window(inner),
                    _ => None,
                }
            }
            Settlement::Failure { duration, qualifies } => {
                let slow = duration > self.config.slow_call_duration;
                inner.stats.total_calls += 1;
                if !qualifies {
                    // Counts as a call (and possibly slow), but does not
                    // erode failure accounting.
                    inner.window.record(false, slow);
                    return if inner.state == CircuitState::Closed {
                        self.trip_on_window(inner)
                    } else {
                        None
                    };
                }

                inner.window.record(true, slow);
                inner.stats.consecutive_failures += 1;
                inner.stats.consecutive_successes = 0;
                inner.stats.last_failure_epoch_ms = Some(epoch_ms());

                match inner.state {
                    CircuitState::HalfOpen => {
                        // One failure discards partial probe successes.
                        Some(transition(
                            inner,
                            CircuitState::Open,
                            "probe failure".to_string(),
                        ))
                    }
                    CircuitState::Closed => {
                        if inner.stats.consecutive_failures >= self.config.failure_threshold {
                            let reason = format!(
                                "{} consecutive failures",
                                inner.stats.consecutive_failures
                            );
                            Some(transition(inner, CircuitState::Open, reason))
                        } else {
                            self.trip_on_window(inner)
                        }
                    }
                    // A late failure from a call admitted before the
                    // circuit opened; counters only.
                    CircuitState::Open => None,
                }
            }
        }
    }

    /// Window-based safety nets, evaluated in Closed on every settlement.
    fn trip_on_window(&self, inner: &mut Inner) -> Option<StateChange> {
        if inner.window.sample_count() < self.config.min_window_samples {
            return None;
        }
        let failure_rate = inner.window.failure_rate();
        if failure_rate > self.config.window_failure_rate {
            return Some(transition(
                inner,
                CircuitState::Open,
                format!("window failure rate {:.2}", failure_rate),
            ));
        }
        let slow_rate = inner.window.slow_call_rate();
        if slow_rate > self.config.slow_call_rate_threshold {
            return Some(transition(
                inner,
                CircuitState::Open,
                format!("window slow-call rate {:.2}", slow_rate),
            ));
        }
        None
    }

    fn notify(&self, change: &StateChange) {
        tracing::warn!(
            breaker = %self.name,
            from = change.from.as_str(),
            to = change.to.as_str(),
            reason = %change.reason,
            "Circuit state change"
        );
        metrics::record_breaker_transition(&self.name, change.to.as_str());
        if let Some(hook) = &self.on_state_change {
            hook(&self.name, change);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Serializable breaker view.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub total_calls: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_epoch_ms: Option<u64>,
    pub last_success_epoch_ms: Option<u64>,
    pub window_samples: u64,
    pub window_failure_rate: f64,
    pub window_slow_call_rate: f64,
    pub last_state_changes: Vec<StateChange>,
}

enum Settlement {
    Success { duration: Duration },
    Failure { duration: Duration, qualifies: bool },
    Cancelled,
}

/// Proof of admission for one call attempt. Settles exactly once; dropping
/// an unsettled permit counts as a cancellation (releases any probe slot,
/// touches no counters).
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    started: Instant,
    probe: Option<u64>,
    settled: bool,
}

impl CallPermit {
    /// Wall-clock time since admission.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn succeed(mut self) {
        self.settled = true;
        let duration = self.started.elapsed();
        self.breaker
            .settle(self.probe, Settlement::Success { duration });
    }

    pub fn fail(mut self, error: &UpstreamError) {
        self.settled = true;
        let duration = self.started.elapsed();
        let qualifies = (self.breaker.failure_predicate)(error);
        self.breaker
            .settle(self.probe, Settlement::Failure { duration, qualifies });
    }

    pub fn cancel(mut self) {
        self.settled = true;
        self.breaker.settle(self.probe, Settlement::Cancelled);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.probe, Settlement::Cancelled);
        }
    }
}

fn transition(inner: &mut Inner, to: CircuitState, reason: String) -> StateChange {
    let from = inner.state;
    inner.state = to;
    match to {
        CircuitState::Open => {
            inner.opened_at = Some(Instant::now());
            inner.probes_in_flight = 0;
            inner.probe_successes = 0;
        }
        CircuitState::HalfOpen => {
            inner.probe_generation += 1;
            inner.probes_in_flight = 0;
            inner.probe_successes = 0;
        }
        CircuitState::Closed => {
            inner.opened_at = None;
            inner.probes_in_flight = 0;
            inner.probe_successes = 0;
        }
    }
    let change = StateChange {
        from,
        to,
        at_epoch_ms: epoch_ms(),
        reason,
    };
    if inner.history.len() == HISTORY_LIMIT {
        inner.history.pop_front();
    }
    inner.history.push_back(change.clone());
    change
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    fn breaker(config: BreakerConfig) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("test", &config))
    }

    fn fail_once(cb: &Arc<CircuitBreaker>, error: &UpstreamError) {
        match cb.try_acquire() {
            Admission::Admitted(permit) => permit.fail(error),
            Admission::Rejected { .. } => panic!("expected admission"),
        }
    }

    fn succeed_once(cb: &Arc<CircuitBreaker>) {
        match cb.try_acquire() {
            Admission::Admitted(permit) => permit.succeed(),
            Admission::Rejected { .. } => panic!("expected admission"),
        }
    }

    fn transport() -> UpstreamError {
        UpstreamError::Transport("connection reset".into())
    }

    #[test]
    fn opens_after_consecutive_failures_and_rejects_without_calling() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        fail_once(&cb, &transport());
        fail_once(&cb, &transport());
        assert_eq!(cb.state(), CircuitState::Closed);
        fail_once(&cb, &transport());
        assert_eq!(cb.state(), CircuitState::Open);

        match cb.try_acquire() {
            Admission::Rejected { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_millis(30_000));
            }
            Admission::Admitted(_) => panic!("open circuit must reject"),
        }
    }

    #[tokio::test]
    async fn open_circuit_never_invokes_the_operation() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        fail_once(&cb, &transport());

        let invoked = Arc::new(AtomicU32::new(0));
        let counter = invoked.clone();
        let result: Result<(), CallError> = cb
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CallError::Rejected { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn window_failure_rate_trips_as_independent_safety_net() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 100,
            min_window_samples: 10,
            window_failure_rate: 0.5,
            ..Default::default()
        });

        for _ in 0..5 {
            succeed_once(&cb);
        }
        for i in 0..6 {
            fail_once(&cb, &transport());
            if i < 5 {
                assert_eq!(cb.state(), CircuitState::Closed, "not yet over 50%");
            }
        }
        // 6 failures over 11 samples: rate 0.545 > 0.5.
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn slow_successes_trip_the_slow_call_safety_net() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 100,
            min_window_samples: 4,
            slow_call_duration_ms: 1,
            slow_call_rate_threshold: 0.5,
            ..Default::default()
        });

        for _ in 0..4 {
            match cb.try_acquire() {
                Admission::Admitted(permit) => {
                    thread::sleep(Duration::from_millis(5));
                    permit.succeed();
                }
                Admission::Rejected { .. } => panic!("expected admission"),
            }
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_after_reset_timeout_then_closes_on_probe_successes() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            reset_timeout_ms: 50,
            ..Default::default()
        });

        fail_once(&cb, &transport());
        assert_eq!(cb.state(), CircuitState::Open);

        // Too early: still rejected.
        assert!(matches!(cb.try_acquire(), Admission::Rejected { .. }));

        thread::sleep(Duration::from_millis(70));
        succeed_once(&cb);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed_once(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn half_open_failure_reverts_to_open_discarding_partial_successes() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            success_threshold: 3,
            reset_timeout_ms: 20,
            ..Default::default()
        });

        fail_once(&cb, &transport());
        thread::sleep(Duration::from_millis(30));

        succeed_once(&cb);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        fail_once(&cb, &transport());
        assert_eq!(cb.state(), CircuitState::Open);

        // New reset clock: immediately rejected again.
        assert!(matches!(cb.try_acquire(), Admission::Rejected { .. }));
    }

    #[test]
    fn half_open_bounds_concurrent_probes() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            reset_timeout_ms: 10,
            ..Default::default()
        });

        fail_once(&cb, &transport());
        thread::sleep(Duration::from_millis(20));

        let first = match cb.try_acquire() {
            Admission::Admitted(p) => p,
            Admission::Rejected { .. } => panic!("expected probe admission"),
        };
        let second = match cb.try_acquire() {
            Admission::Admitted(p) => p,
            Admission::Rejected { .. } => panic!("expected probe admission"),
        };
        assert!(matches!(cb.try_acquire(), Admission::Rejected { .. }));

        first.succeed();
        second.succeed();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn client_errors_do_not_erode_the_breaker() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        for _ in 0..5 {
            fail_once(&cb, &UpstreamError::Status { code: 404 });
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.window_failure_rate, 0.0);
        // Still counted as traffic.
        assert_eq!(snapshot.window_samples, 5);
    }

    #[test]
    fn cancellation_leaves_counters_untouched() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        match cb.try_acquire() {
            Admission::Admitted(permit) => permit.cancel(),
            Admission::Rejected { .. } => panic!("expected admission"),
        }
        // Dropping an unsettled permit behaves the same.
        match cb.try_acquire() {
            Admission::Admitted(permit) => drop(permit),
            Admission::Rejected { .. } => panic!("expected admission"),
        }

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.window_samples, 0);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn transition_history_is_bounded() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout_ms: 0,
            ..Default::default()
        });

        // Open → Half-Open → Open, repeatedly: 3 transitions per lap.
        for _ in 0..6 {
            fail_once(&cb, &transport());
            succeed_once(&cb);
        }
        let history = cb.snapshot().last_state_changes;
        assert_eq!(history.len(), HISTORY_LIMIT);
    }

    #[test]
    fn state_change_hook_sees_every_transition() {
        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();
        let cb = Arc::new(
            CircuitBreaker::new(
                "hooked",
                &BreakerConfig {
                    failure_threshold: 1,
                    ..Default::default()
                },
            )
            .with_state_change_hook(Arc::new(move |name, change| {
                assert_eq!(name, "hooked");
                assert_eq!(change.to, CircuitState::Open);
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        fail_once(&cb, &transport());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recovery_scenario_runs_open_rejected_then_probe_closes() {
        // failure_threshold 3, reset 100ms: rejected at half the reset
        // timeout, admitted just past it, closed after one probe success.
        let cb = breaker(BreakerConfig {
            failure_threshold: 3,
            success_threshold: 1,
            reset_timeout_ms: 100,
            ..Default::default()
        });

        for _ in 0..3 {
            fail_once(&cb, &transport());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(50));
        assert!(matches!(cb.try_acquire(), Admission::Rejected { .. }));

        thread::sleep(Duration::from_millis(60));
        succeed_once(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn manual_reset_restores_closed_and_zeroes_stats() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        fail_once(&cb, &transport());
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.window_samples, 0);
    }

    #[tokio::test]
    async fn call_timeout_counts_as_failure() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            timeout_ms: 30,
            ..Default::default()
        });

        let result: Result<(), CallError> = cb
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(CallError::Failed(UpstreamError::Timeout { .. }))
        ));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn fallback_is_used_only_on_rejection() {
        let cb = breaker(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });

        let value = cb
            .call_with_fallback(|| async { Ok::<_, UpstreamError>("live") }, || "fallback")
            .await
            .unwrap();
        assert_eq!(value, "live");

        fail_once(&cb, &transport());
        let value = cb
            .call_with_fallback(|| async { Ok::<_, UpstreamError>("live") }, || "fallback")
            .await
            .unwrap();
        assert_eq!(value, "fallback");
    }
}
