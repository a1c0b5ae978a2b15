use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use vela_core::error::Classify;

use crate::envelope::{ApiPool, RateEnvelope};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Snapshot of one pool's counters.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
    pub average_response_time: Duration,
}

impl PoolStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }
}

/// Sliding request-timestamp windows, pruned on each acquisition.
struct RateWindows {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
}

impl RateWindows {
    fn new() -> Self {
        Self {
            minute: VecDeque::new(),
            hour: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while self.minute.front().is_some_and(|t| now - *t > MINUTE) {
            self.minute.pop_front();
        }
        while self.hour.front().is_some_and(|t| now - *t > HOUR) {
            self.hour.pop_front();
        }
    }

    /// How long until a slot frees up, or `None` when both windows have room.
    fn saturation_wait(&mut self, env: &RateEnvelope, now: Instant) -> Option<Duration> {
        self.prune(now);
        let mut wait = Duration::ZERO;
        if self.minute.len() >= env.requests_per_minute {
            if let Some(oldest) = self.minute.front() {
                wait = wait.max(MINUTE.saturating_sub(now - *oldest));
            }
        }
        if self.hour.len() >= env.requests_per_hour {
            if let Some(oldest) = self.hour.front() {
                wait = wait.max(HOUR.saturating_sub(now - *oldest));
            }
        }
        (wait > Duration::ZERO).then_some(wait)
    }

    fn stamp(&mut self, now: Instant) {
        self.minute.push_back(now);
        self.hour.push_back(now);
    }
}

struct PoolState {
    envelope: RateEnvelope,
    semaphore: Semaphore,
    windows: Mutex<RateWindows>,
    stats: Mutex<PoolStats>,
}

impl PoolState {
    fn new(envelope: RateEnvelope) -> Self {
        let permits = envelope.max_concurrent;
        Self {
            envelope,
            semaphore: Semaphore::new(permits),
            windows: Mutex::new(RateWindows::new()),
            stats: Mutex::new(PoolStats::default()),
        }
    }
}

/// Shared governor for all outbound API calls.
pub struct RateGovernor {
    llm: PoolState,
    integration: PoolState,
}

impl RateGovernor {
    pub fn new(llm: RateEnvelope, integration: RateEnvelope) -> Self {
        Self {
            llm: PoolState::new(llm),
            integration: PoolState::new(integration),
        }
    }

    fn pool(&self, pool: ApiPool) -> &PoolState {
        match pool {
            ApiPool::Llm => &self.llm,
            ApiPool::Integration => &self.integration,
        }
    }

    pub fn stats(&self, pool: ApiPool) -> PoolStats {
        self.pool(pool).stats.lock().unwrap().clone()
    }

    /// Run `op` under the pool's limits.
    ///
    /// Acquires the pool's semaphore permit (FIFO with respect to arrival),
    /// sleeps out any saturated rate window, then runs `op`, retrying
    /// transient failures with exponential backoff up to the envelope's
    /// retry budget. Non-transient failures surface immediately.
    pub async fn execute<T, E, F, Fut>(&self, pool: ApiPool, op_name: &str, op: F) -> Result<T, E>
    where
        E: Classify + Display,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let state = self.pool(pool);

        // Semaphore::acquire is fair: waiters are served in arrival order.
        let _permit = state
            .semaphore
            .acquire()
            .await
            .expect("governor semaphore never closed");

        loop {
            let wait = state
                .windows
                .lock()
                .unwrap()
                .saturation_wait(&state.envelope, Instant::now());
            match wait {
                Some(d) => {
                    warn!(pool = pool.name(), wait_secs = d.as_secs_f64(), "rate window saturated");
                    tokio::time::sleep(d).await;
                }
                None => break,
            }
        }

        let start = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    let elapsed = start.elapsed();
                    let mut stats = state.stats.lock().unwrap();
                    stats.total_requests += 1;
                    stats.successful_requests += 1;
                    // Running mean over successful requests.
                    let n = stats.successful_requests as u32;
                    stats.average_response_time =
                        (stats.average_response_time * (n - 1) + elapsed) / n;
                    drop(stats);
                    state.windows.lock().unwrap().stamp(Instant::now());
                    debug!(pool = pool.name(), op = op_name, ms = elapsed.as_millis() as u64, "call ok");
                    return Ok(value);
                }
                Err(e) if e.class().is_transient() && attempt + 1 < state.envelope.retry_attempts => {
                    let backoff = state.envelope.backoff(attempt);
                    warn!(
                        pool = pool.name(),
                        op = op_name,
                        attempt,
                        backoff_secs = backoff.as_secs_f64(),
                        error = %e,
                        "transient failure, backing off"
                    );
                    state.stats.lock().unwrap().retried_requests += 1;
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    let mut stats = state.stats.lock().unwrap();
                    stats.total_requests += 1;
                    stats.failed_requests += 1;
                    drop(stats);
                    warn!(pool = pool.name(), op = op_name, attempt, error = %e, "call failed");
                    return Err(e);
                }
            }
        }
    }
}
