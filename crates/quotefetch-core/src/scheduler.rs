//! Bounded batch execution with escalating batch-level retry.
//!
//! Contracts are cut into batches of at most `batch_size`. Each batch gets its
//! own connection pool, runs fully concurrently and must drain within the
//! current batch timeout. A timed-out batch is abandoned and re-issued from the
//! cursor after an escalating pause; batches that already drained are never
//! re-run.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::contract::{ContractRequest, ContractResult, Diagnostics};
use crate::executor::{FetchError, FetchExecutor, FetchOutcome};
use crate::http_client::{ClientFactory, HttpError};

/// Batch sizing and escalation knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Contracts per batch, also the in-flight limit and pool capacity.
    pub batch_size: usize,
    /// Budget for one batch to drain; grows by this amount on every timeout.
    pub timeout: Duration,
    /// Timed-out batches re-issued before the run gives up.
    pub max_batch_retry: u32,
    /// Pause before a retried batch; grows by this amount on every timeout.
    pub sleep_base: Duration,
    /// Per-request transport timeout, not escalated.
    pub request_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            timeout: Duration::from_secs(120),
            max_batch_retry: 3,
            sleep_base: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let invalid = |reason: &str| {
            Err(SchedulerError::InvalidConfig {
                reason: reason.to_owned(),
            })
        };
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if self.timeout.is_zero() {
            return invalid("batch timeout must be positive");
        }
        if self.request_timeout.is_zero() {
            return invalid("request timeout must be positive");
        }
        Ok(())
    }
}

/// Timeout and pause in effect for one batch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Escalation {
    /// Number of batch retries taken so far in this run.
    pub attempt: u32,
    pub timeout: Duration,
    /// Pause taken before this attempt.
    pub sleep: Duration,
}

impl Escalation {
    fn initial(config: &BatchConfig) -> Self {
        Self {
            attempt: 0,
            timeout: config.timeout,
            sleep: Duration::ZERO,
        }
    }

    /// Additive step: retry `k` runs with `timeout * (k + 1)` after sleeping `sleep_base * (k + 1)`.
    fn escalate(self, config: &BatchConfig) -> Self {
        let attempt = self.attempt + 1;
        Self {
            attempt,
            timeout: self.timeout.saturating_add(config.timeout),
            sleep: config.sleep_base.saturating_mul(attempt + 1),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid batch configuration: {reason}")]
    InvalidConfig { reason: String },
    #[error("failed to open connection pool: {0}")]
    Pool(#[from] HttpError),
    #[error(
        "batch retries exhausted after {retries} escalations; {resolved} of {total} contracts resolved"
    )]
    MaxRetriesExceeded {
        retries: u32,
        resolved: usize,
        total: usize,
        history: Vec<Escalation>,
    },
}

enum BatchRun {
    Completed(Vec<ContractResult>),
    TimedOut { pending: usize },
}

/// Fans contracts out through the executor one bounded batch at a time.
#[derive(Clone)]
pub struct BatchScheduler {
    config: BatchConfig,
    executor: FetchExecutor,
    clients: Arc<dyn ClientFactory>,
}

impl BatchScheduler {
    pub fn new(
        config: BatchConfig,
        executor: FetchExecutor,
        clients: Arc<dyn ClientFactory>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            clients,
        })
    }

    /// Execute every request. Results come back ordered by `sequence`, which is
    /// the request's index in `requests`.
    ///
    /// Escalation state and the retry budget span the whole run. Exhausting the
    /// budget discards everything collected so far.
    pub async fn run(
        &self,
        requests: &[ContractRequest],
    ) -> Result<Vec<ContractResult>, SchedulerError> {
        let total = requests.len();
        let mut results = Vec::with_capacity(total);
        let mut cursor = 0;
        let mut escalation = Escalation::initial(&self.config);
        let mut history = Vec::new();

        while cursor < total {
            let end = cursor.saturating_add(self.config.batch_size).min(total);
            info!(
                cursor,
                size = end - cursor,
                total,
                timeout_ms = escalation.timeout.as_millis() as u64,
                "dispatching batch"
            );

            match self
                .run_batch(cursor, &requests[cursor..end], escalation.timeout)
                .await?
            {
                BatchRun::Completed(batch) => {
                    results.extend(batch);
                    cursor = end;
                }
                BatchRun::TimedOut { pending } => {
                    history.push(escalation);
                    if escalation.attempt >= self.config.max_batch_retry {
                        error!(
                            cursor,
                            resolved = cursor,
                            total,
                            retries = escalation.attempt,
                            "batch retries exhausted"
                        );
                        return Err(SchedulerError::MaxRetriesExceeded {
                            retries: escalation.attempt,
                            resolved: cursor,
                            total,
                            history,
                        });
                    }
                    escalation = escalation.escalate(&self.config);
                    warn!(
                        cursor,
                        pending,
                        attempt = escalation.attempt,
                        timeout_ms = escalation.timeout.as_millis() as u64,
                        sleep_ms = escalation.sleep.as_millis() as u64,
                        "batch timed out, escalating"
                    );
                    tokio::time::sleep(escalation.sleep).await;
                }
            }
        }

        info!(total, retries = escalation.attempt, "all batches drained");
        Ok(results)
    }

    async fn run_batch(
        &self,
        offset: usize,
        batch: &[ContractRequest],
        timeout: Duration,
    ) -> Result<BatchRun, SchedulerError> {
        let client = self.clients.connect(batch.len())?;
        let permits = Arc::new(Semaphore::new(self.config.batch_size));
        let mut tasks = JoinSet::new();

        for (index, request) in batch.iter().enumerate() {
            let sequence = offset + index;
            let request = request.clone();
            let client = Arc::clone(&client);
            let executor = self.executor.clone();
            let permits = Arc::clone(&permits);
            let request_timeout = self.config.request_timeout;

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                executor
                    .execute(sequence, &request, client.as_ref(), request_timeout)
                    .await
            });
        }

        let drained = tokio::time::timeout(timeout, async {
            let mut collected = Vec::with_capacity(batch.len());
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => collected.push(result),
                    Err(join_error) => warn!(%join_error, "fetch task did not complete"),
                }
            }
            collected
        })
        .await;

        match drained {
            Ok(mut collected) => {
                fill_aborted(offset, batch.len(), &mut collected);
                collected.sort_by_key(|result| result.sequence);
                Ok(BatchRun::Completed(collected))
            }
            Err(_) => {
                let pending = tasks.len();
                tasks.abort_all();
                Ok(BatchRun::TimedOut { pending })
            }
        }
    }
}

/// Tasks that panicked or were cancelled still owe a result.
fn fill_aborted(offset: usize, len: usize, collected: &mut Vec<ContractResult>) {
    let seen: BTreeSet<usize> = collected.iter().map(|result| result.sequence).collect();
    for sequence in (offset..offset + len).filter(|sequence| !seen.contains(sequence)) {
        collected.push(ContractResult {
            sequence,
            task_id: Uuid::new_v4(),
            outcome: FetchOutcome::Failed(FetchError::aborted("fetch task did not complete")),
            diagnostics: Diagnostics::default(),
        });
    }
}
