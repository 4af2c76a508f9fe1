//! Bounded-concurrency, retrying executor for remote generation calls.
//!
//! Every call to a generation service goes through one shared
//! [`RequestDispatcher`]. The dispatcher holds a semaphore sized to the
//! configured concurrency; a call keeps its permit for all of its attempts,
//! including the backoff sleeps between them, so at most `concurrency`
//! remote operations are ever in flight across the whole run.
//!
//! Cloning a dispatcher shares the same pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::errors::ServiceError;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Maximum number of in-flight remote calls
    pub concurrency: usize,
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

impl DispatchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    limiter: Arc<Semaphore>,
    config: DispatchConfig,
}

impl RequestDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        // A zero-sized pool would never admit anything.
        let config = DispatchConfig {
            concurrency: config.concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            ..config
        };
        Self {
            limiter: Arc::new(Semaphore::new(config.concurrency)),
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Number of calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.config.concurrency - self.limiter.available_permits()
    }

    /// Run `operation` inside the pool, retrying failures with exponential
    /// backoff. The error of the last attempt is returned unchanged once the
    /// attempt budget is spent.
    pub async fn submit<T, F, Fut>(&self, endpoint: &str, mut operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ServiceError::Other("request pool closed".to_string()))?;

        let max_attempts = self.config.max_attempts;
        let mut delay = self.config.initial_backoff;
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    tracing::info!(endpoint, attempt, "Remote call succeeded");
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(endpoint, attempt, error = %e, "Remote call failed, retries exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let remaining = max_attempts - attempt;
                    tracing::warn!(endpoint, attempt, remaining, error = %e, "Remote call failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.max_backoff);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RequestDispatcher {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}
