//! Circuit breaker guarding calls to the generation service.
//!
//! # States
//! - Closed: calls pass through, consecutive qualifying failures are counted
//! - Open: calls are rejected without touching the service
//! - Half-Open: one probe call is let through after the recovery interval
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive qualifying failures reach the threshold
//! Open → Half-Open: recovery interval elapsed (checked on the next call)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! Only failures for which [`TripsBreaker::trips_breaker`] is true count.
//! A call that returned something the caller later rejects is a success here.
//! The breaker is shared by every worker in the process; its state sits
//! behind a mutex that is never held across the guarded call.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Source of monotonic time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Classifies an error as an availability failure of the guarded dependency.
pub trait TripsBreaker {
    fn trips_breaker(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive qualifying failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed.
    pub recovery_interval: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit open; upstream unavailable")]
    Open,

    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state, advancing Open to Half-Open if the interval elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.refresh(&mut inner);
        inner.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock poisoned")
            .consecutive_failures
    }

    /// Run `operation` if the circuit admits it, recording the outcome.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        E: TripsBreaker,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let probing = self.admit()?;
        let mut guard = HalfOpenGuard {
            breaker: self,
            armed: probing,
        };

        let result = operation().await;
        guard.armed = false;

        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if probing {
            inner.probe_in_flight = false;
        }
        match &result {
            Err(e) if e.trips_breaker() => self.on_failure(&mut inner, probing),
            _ => self.on_success(&mut inner),
        }
        drop(inner);

        result.map_err(BreakerError::Inner)
    }

    /// Decide whether a call may proceed. Returns whether it is the probe.
    fn admit<E>(&self) -> Result<bool, BreakerError<E>> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.refresh(&mut inner);
        match inner.state {
            BreakerState::Closed => Ok(false),
            BreakerState::Open => Err(BreakerError::Open),
            BreakerState::HalfOpen if inner.probe_in_flight => Err(BreakerError::Open),
            BreakerState::HalfOpen => {
                inner.probe_in_flight = true;
                tracing::info!("Circuit half-open, allowing probe call");
                Ok(true)
            }
        }
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state != BreakerState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|at| self.clock.now().saturating_duration_since(at))
            .unwrap_or_default();
        if elapsed >= self.config.recovery_interval {
            inner.state = BreakerState::HalfOpen;
            inner.probe_in_flight = false;
        }
    }

    fn on_success(&self, inner: &mut Inner) {
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn on_failure(&self, inner: &mut Inner, probing: bool) {
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let trip = probing
            || inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trip && inner.state != BreakerState::Open {
            tracing::warn!(
                failures = inner.consecutive_failures,
                "Circuit opened; rejecting calls for {:?}",
                self.config.recovery_interval
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(self.clock.now());
        }
    }
}

/// Frees the half-open slot if the admitted call never reports back,
/// because it panicked or its future was dropped. That counts as a failed
/// half-open call, so the circuit reopens until the next interval.
struct HalfOpenGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for HalfOpenGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut inner) = self.breaker.inner.lock() {
            tracing::warn!("Half-open call abandoned before completing");
            inner.probe_in_flight = false;
            self.breaker.on_failure(&mut inner, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Timeout,
        BadShape,
    }

    impl TripsBreaker for TestError {
        fn trips_breaker(&self) -> bool {
            matches!(self, TestError::Timeout)
        }
    }

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    fn breaker(clock: Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::with_clock(
            BreakerConfig {
                failure_threshold: 3,
                recovery_interval: Duration::from_secs(30),
            },
            clock,
        )
    }

    fn fail(b: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<TestError>> {
        tokio_test::block_on(b.call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError::Timeout)
        }))
    }

    fn succeed(b: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<TestError>> {
        tokio_test::block_on(b.call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<(), TestError>(())
        }))
    }

    #[test]
    fn opens_after_threshold_and_rejects_without_calling() {
        let clock = ManualClock::new();
        let b = breaker(clock);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            assert!(matches!(fail(&b, &calls), Err(BreakerError::Inner(_))));
        }
        assert_eq!(b.state(), BreakerState::Open);

        assert!(matches!(succeed(&b, &calls), Err(BreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn success_resets_the_failure_count() {
        let b = breaker(ManualClock::new());
        let calls = AtomicU32::new(0);

        let _ = fail(&b, &calls);
        let _ = fail(&b, &calls);
        succeed(&b, &calls).unwrap();
        assert_eq!(b.consecutive_failures(), 0);

        let _ = fail(&b, &calls);
        let _ = fail(&b, &calls);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn non_qualifying_errors_do_not_count() {
        let b = breaker(ManualClock::new());
        for _ in 0..5 {
            let result = tokio_test::block_on(b.call(|| async { Err::<(), _>(TestError::BadShape) }));
            assert!(matches!(result, Err(BreakerError::Inner(TestError::BadShape))));
        }
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_probe_success_closes() {
        let clock = ManualClock::new();
        let b = breaker(clock.clone());
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = fail(&b, &calls);
        }

        clock.advance(Duration::from_secs(29));
        assert_eq!(b.state(), BreakerState::Open);
        clock.advance(Duration::from_secs(1));
        assert_eq!(b.state(), BreakerState::HalfOpen);

        succeed(&b, &calls).unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let clock = ManualClock::new();
        let b = breaker(clock.clone());
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = fail(&b, &calls);
        }
        clock.advance(Duration::from_secs(30));

        assert!(matches!(fail(&b, &calls), Err(BreakerError::Inner(_))));
        assert_eq!(b.state(), BreakerState::Open);
        assert!(matches!(succeed(&b, &calls), Err(BreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn only_one_probe_while_half_open() {
        let clock = ManualClock::new();
        let b = breaker(clock.clone());
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = fail(&b, &calls);
        }
        clock.advance(Duration::from_secs(30));

        assert!(matches!(b.admit::<TestError>(), Ok(true)));
        assert!(matches!(b.admit::<TestError>(), Err(BreakerError::Open)));
    }

    #[test]
    fn panicking_half_open_call_reopens_the_circuit() {
        let clock = ManualClock::new();
        let b = breaker(clock.clone());
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = fail(&b, &calls);
        }
        clock.advance(Duration::from_secs(30));

        let crash = true;
        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio_test::block_on(b.call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                if crash {
                    panic!("handler crashed mid-call");
                }
                Ok::<(), TestError>(())
            }))
        }));
        assert!(crashed.is_err());
        assert_eq!(b.state(), BreakerState::Open);

        clock.advance(Duration::from_secs(30));
        assert_eq!(b.state(), BreakerState::HalfOpen);
        succeed(&b, &calls).unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn dropped_half_open_call_frees_the_slot() {
        let clock = ManualClock::new();
        let b = breaker(clock.clone());
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = fail(&b, &calls);
        }
        clock.advance(Duration::from_secs(30));

        let mut pending = tokio_test::task::spawn(
            b.call(|| std::future::pending::<Result<(), TestError>>()),
        );
        tokio_test::assert_pending!(pending.poll());
        drop(pending);
        assert_eq!(b.state(), BreakerState::Open);

        clock.advance(Duration::from_secs(30));
        succeed(&b, &calls).unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
