use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation - calls pass through
    Open,     // Failure threshold breached - short-circuit all calls
    HalfOpen, // Cooldown elapsed - next call is a probe
}

/// Circuit breaker guarding calls into a flaky external dependency.
///
/// Used for the portfolio fetch (threshold 3, 60s cooldown) and reusable for
/// any other outbound integration.
pub struct CircuitBreaker {
    state: RwLock<BreakerState>,
    failure_threshold: usize,
    success_threshold: usize,
    open_duration: Duration,
    name: String,
}

struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// * `failure_threshold` - consecutive failures before the circuit opens
    /// * `success_threshold` - successes in HalfOpen needed to close again
    /// * `open_duration` - how long Open short-circuits before probing
    pub fn new(
        name: impl Into<String>,
        failure_threshold: usize,
        success_threshold: usize,
        open_duration: Duration,
    ) -> Self {
        Self {
            state: RwLock::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
            failure_threshold,
            success_threshold,
            open_duration,
            name: name.into(),
        }
    }

    /// Run `f` under breaker protection.
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.state.write().await;

            if state.state == CircuitState::Open {
                if let Some(opened_at) = state.opened_at {
                    if opened_at.elapsed() > self.open_duration {
                        info!(
                            breaker = %self.name,
                            "Circuit transitioning Open -> HalfOpen (cooldown elapsed)"
                        );
                        state.state = CircuitState::HalfOpen;
                        state.success_count = 0;
                    } else {
                        return Err(CircuitBreakerError::Open(format!(
                            "Circuit breaker [{}] is open. Retry in {:?}",
                            self.name,
                            self.open_duration - opened_at.elapsed()
                        )));
                    }
                }
            }
        }

        match f.await {
            Ok(result) => {
                self.on_success().await;
                Ok(result)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.success_threshold {
                    info!(
                        breaker = %self.name,
                        successes = state.success_count,
                        "Circuit transitioning HalfOpen -> Closed"
                    );
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                }
            }
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::Open => {
                warn!(breaker = %self.name, "Success recorded while Open (unexpected)");
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;

        state.failure_count += 1;

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.failure_threshold {
                    error!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        "Circuit transitioning Closed -> Open"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                // Probe failed: reopen with a refreshed cooldown
                warn!(breaker = %self.name, "Probe failed, circuit HalfOpen -> Open");
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                state.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == CircuitState::Open
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open: {0}")]
    Open(String),

    #[error(transparent)]
    Inner(E),
}
