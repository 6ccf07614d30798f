//! Connection management for the source-of-truth store: bounded checkout,
//! cached health probing, and a circuit breaker.
//!
//! The pool never blocks a request indefinitely. Checkout waits at most the
//! configured acquire timeout, and once consecutive failures cross the
//! breaker threshold the pool fails fast until the recovery window lapses,
//! after which a single probe request is let through.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Deserialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::cache::lock::mutex_lock;

use super::error::InfraError;

const DEFAULT_MAX_SIZE: usize = 16;
const DEFAULT_MIN_SIZE: usize = 2;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 500;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RECOVERY_SECS: u64 = 10;
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Hard ceiling on concurrent checkouts.
    pub max_size: usize,
    /// Connections kept warm when idle.
    pub min_size: usize,
    /// Maximum wait for a checkout before failing the request.
    pub acquire_timeout_ms: u64,
    /// Idle connection lifetime before release down to `min_size`.
    pub idle_timeout_secs: u64,
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Open-state duration before a half-open probe is allowed.
    pub recovery_secs: u64,
    /// How long one health probe result stays trusted.
    pub health_interval_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            min_size: DEFAULT_MIN_SIZE,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_secs: DEFAULT_RECOVERY_SECS,
            health_interval_secs: DEFAULT_HEALTH_INTERVAL_SECS,
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// An unbounded pool is never acceptable.
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.max_size == 0 {
            return Err(InfraError::configuration("pool.max_size must be positive"));
        }
        if self.min_size > self.max_size {
            return Err(InfraError::configuration(
                "pool.min_size must not exceed pool.max_size",
            ));
        }
        if self.failure_threshold == 0 {
            return Err(InfraError::configuration(
                "pool.failure_threshold must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// A checked-out slot. Dropping it returns the slot to the pool.
pub struct PoolGuard {
    _permit: OwnedSemaphorePermit,
}

struct Breaker {
    state: BreakerState,
    opened_at: Option<Instant>,
}

/// Bounded checkout gate with breaker semantics around the backing store.
pub struct ConnectionManager {
    settings: PoolSettings,
    permits: Arc<Semaphore>,
    breaker: Mutex<Breaker>,
    consecutive_failures: AtomicU32,
    last_health: Mutex<Option<(Instant, bool)>>,
}

impl ConnectionManager {
    pub fn new(settings: PoolSettings) -> Result<Self, InfraError> {
        settings.validate()?;
        let permits = Arc::new(Semaphore::new(settings.max_size));
        Ok(Self {
            settings,
            permits,
            breaker: Mutex::new(Breaker {
                state: BreakerState::Closed,
                opened_at: None,
            }),
            consecutive_failures: AtomicU32::new(0),
            last_health: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Check out a slot, failing fast when the breaker is open and timing
    /// out when the pool stays saturated past the acquire timeout.
    pub async fn acquire(&self) -> Result<PoolGuard, InfraError> {
        self.check_breaker()?;

        let permit = tokio::time::timeout(
            self.settings.acquire_timeout(),
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| InfraError::AcquireTimeout)?
        .map_err(|_| InfraError::PoolExhausted)?;

        Ok(PoolGuard { _permit: permit })
    }

    /// A successful store operation. Closes a half-open breaker and resets
    /// the failure streak.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut breaker = mutex_lock(&self.breaker, "record_success");
        if breaker.state != BreakerState::Closed {
            info!("circuit breaker closed after successful probe");
        }
        breaker.state = BreakerState::Closed;
        breaker.opened_at = None;
    }

    /// A failed store operation. Opens the breaker once the streak crosses
    /// the threshold; a failure during the half-open probe re-opens it.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut breaker = mutex_lock(&self.breaker, "record_failure");
        let reopen = breaker.state == BreakerState::HalfOpen;
        if reopen || failures >= self.settings.failure_threshold {
            if breaker.state != BreakerState::Open {
                counter!("agora_breaker_open_total").increment(1);
                warn!(
                    failures,
                    recovery_secs = self.settings.recovery_secs,
                    "circuit breaker opened"
                );
            }
            breaker.state = BreakerState::Open;
            breaker.opened_at = Some(Instant::now());
        }
    }

    /// Current health, re-probing only when the cached result is older than
    /// the configured interval.
    pub async fn health<F, Fut>(&self, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        {
            let cached = mutex_lock(&self.last_health, "health_read");
            if let Some((checked_at, healthy)) = *cached
                && checked_at.elapsed() < self.settings.health_interval()
            {
                return healthy;
            }
        }

        let healthy = probe().await;
        *mutex_lock(&self.last_health, "health_write") = Some((Instant::now(), healthy));
        healthy
    }

    fn check_breaker(&self) -> Result<(), InfraError> {
        let mut breaker = mutex_lock(&self.breaker, "check");
        match breaker.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let recovered = breaker
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.settings.recovery_window());
                if recovered {
                    info!("circuit breaker half-open, allowing probe traffic");
                    breaker.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(InfraError::CircuitOpen)
                }
            }
        }
    }
}
