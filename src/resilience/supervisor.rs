//! Streaming request supervisor.
//!
//! # Responsibilities
//! - Run one upstream call through its breaker, racing the per-call
//!   deadline against the live token stream
//! - Forward chunks to the caller as they arrive (no buffering)
//! - Retry qualifying transient failures with exponential backoff, each
//!   retry re-entering breaker admission
//!
//! # Design Decisions
//! - The operation is caller-supplied; the supervisor never parses wire
//!   formats (NDJSON/SSE translation happens upstream of it)
//! - Caller cancellation and deadline cancellation are distinct: only the
//!   deadline counts against the breaker
//! - A failure after the first forwarded chunk is terminal, never retried;
//!   retrying would duplicate content the caller already rendered

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::schema::{GuardConfig, RetryConfig};
use crate::observability::metrics;
use crate::resilience::backoff::retry_delay;
use crate::resilience::circuit_breaker::Admission;
use crate::resilience::error::UpstreamError;
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::retries::{is_transient, RetryBudget};

/// Identifies one supervised call.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Dependency name; selects the breaker.
    pub dependency: String,
    /// Operation label for logs and metrics ("generate", "caption").
    pub operation: String,
}

impl RequestSpec {
    pub fn new(dependency: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            operation: operation.into(),
        }
    }
}

/// Chunk stream produced by the caller-supplied operation.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Events delivered to the caller. Exactly one terminal event per call.
#[derive(Debug)]
pub enum StreamEvent {
    /// One upstream chunk, forwarded verbatim.
    Chunk(Bytes),
    /// The stream finished cleanly.
    Completed,
    /// The call failed; if chunks were already delivered this marks an
    /// aborted stream, not a completed one.
    Failed(UpstreamError),
    /// Admission was refused; no upstream I/O happened.
    Rejected { retry_after: Duration },
    /// The caller cancelled the call.
    Cancelled,
}

/// Caller's handle on one supervised call.
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Next event; `None` once the terminal event has been consumed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Token shared with the running call; cancelling it stops delivery.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

enum AttemptEnd {
    Completed,
    Failed(UpstreamError),
    TimedOut,
    Cancelled,
}

/// Executes calls through breakers with timeout, streaming and retry.
pub struct Supervisor {
    registry: Arc<BreakerRegistry>,
    budget: Arc<RetryBudget>,
    retry: RetryConfig,
    fallbacks: HashMap<String, String>,
}

impl Supervisor {
    pub fn new(registry: Arc<BreakerRegistry>, budget: Arc<RetryBudget>, config: &GuardConfig) -> Self {
        let fallbacks = config
            .dependencies
            .iter()
            .filter_map(|d| {
                d.fallback_message
                    .as_ref()
                    .map(|msg| (d.name.clone(), msg.clone()))
            })
            .collect();
        Self {
            registry,
            budget,
            retry: config.retries.clone(),
            fallbacks,
        }
    }

    /// Start one supervised call. Chunks and the terminal event arrive on
    /// the returned handle; the handle's token aborts the call.
    pub fn execute<Op, Fut>(&self, spec: RequestSpec, op: Op) -> StreamHandle
    where
        Op: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<ChunkStream, UpstreamError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let handle = StreamHandle {
            events: rx,
            cancel: cancel.clone(),
        };

        let Some(breaker) = self.registry.get(&spec.dependency) else {
            let _ = tx.try_send(StreamEvent::Failed(UpstreamError::Stream(format!(
                "unknown dependency {}",
                spec.dependency
            ))));
            return handle;
        };

        let budget = self.budget.clone();
        let retry = self.retry.clone();
        let fallback = self.fallbacks.get(&spec.dependency).cloned();

        tokio::spawn(async move {
            let call_id = Uuid::new_v4();
            let max_retries = if retry.enabled { retry.max_retries } else { 0 };
            let base_delay = Duration::from_millis(retry.base_delay_ms);
            let max_delay = Duration::from_millis(retry.max_delay_ms);
            let timeout = breaker.call_timeout();

            budget.record_request();

            let mut attempt: u32 = 0;
            let mut delivered = false;
            loop {
                attempt += 1;

                let permit = match breaker.try_acquire() {
                    Admission::Rejected { retry_after } => {
                        tracing::debug!(
                            call_id = %call_id,
                            dependency = %spec.dependency,
                            operation = %spec.operation,
                            retry_after_ms = retry_after.as_millis() as u64,
                            "Call rejected by open circuit"
                        );
                        metrics::record_admission(&spec.dependency, "rejected");
                        if !delivered {
                            if let Some(message) = &fallback {
                                let _ = tx
                                    .send(StreamEvent::Chunk(Bytes::from(message.clone())))
                                    .await;
                            }
                        }
                        let _ = tx.send(StreamEvent::Rejected { retry_after }).await;
                        return;
                    }
                    Admission::Admitted(permit) => permit,
                };
                metrics::record_admission(&spec.dependency, "admitted");

                let attempt_token = cancel.child_token();
                let end = run_attempt(
                    op(attempt_token.clone()),
                    &tx,
                    &cancel,
                    timeout,
                    &mut delivered,
                )
                .await;

                match end {
                    AttemptEnd::Completed => {
                        let duration = permit.elapsed();
                        permit.succeed();
                        metrics::record_call(&spec.dependency, "success", duration);
                        tracing::debug!(
                            call_id = %call_id,
                            dependency = %spec.dependency,
                            operation = %spec.operation,
                            attempt,
                            duration_ms = duration.as_millis() as u64,
                            "Call completed"
                        );
                        let _ = tx.send(StreamEvent::Completed).await;
                        return;
                    }
                    AttemptEnd::Cancelled => {
                        attempt_token.cancel();
                        let duration = permit.elapsed();
                        permit.cancel();
                        metrics::record_call(&spec.dependency, "cancelled", duration);
                        let _ = tx.send(StreamEvent::Cancelled).await;
                        return;
                    }
                    AttemptEnd::TimedOut => {
                        attempt_token.cancel();
                        let duration = permit.elapsed();
                        let error = UpstreamError::Timeout { after: timeout };
                        permit.fail(&error);
                        metrics::record_call(&spec.dependency, "timeout", duration);
                        if should_retry(&error, delivered, attempt, max_retries, &budget) {
                            let delay = retry_delay(attempt, base_delay, max_delay);
                            retry_log(&call_id, &spec, attempt, delay, &error);
                            metrics::record_retry(&spec.dependency);
                            time::sleep(delay).await;
                            continue;
                        }
                        let _ = tx.send(StreamEvent::Failed(error)).await;
                        return;
                    }
                    AttemptEnd::Failed(error) => {
                        let duration = permit.elapsed();
                        permit.fail(&error);
                        metrics::record_call(&spec.dependency, "failure", duration);
                        if should_retry(&error, delivered, attempt, max_retries, &budget) {
                            let delay = retry_delay(attempt, base_delay, max_delay);
                            retry_log(&call_id, &spec, attempt, delay, &error);
                            metrics::record_retry(&spec.dependency);
                            time::sleep(delay).await;
                            continue;
                        }
                        tracing::debug!(
                            call_id = %call_id,
                            dependency = %spec.dependency,
                            operation = %spec.operation,
                            attempt,
                            error = %error,
                            mid_stream = delivered,
                            "Call failed"
                        );
                        let _ = tx.send(StreamEvent::Failed(error)).await;
                        return;
                    }
                }
            }
        });

        handle
    }
}

fn should_retry(
    error: &UpstreamError,
    delivered: bool,
    attempt: u32,
    max_retries: u32,
    budget: &RetryBudget,
) -> bool {
    !delivered && attempt <= max_retries && is_transient(error) && budget.try_withdraw()
}

fn retry_log(
    call_id: &Uuid,
    spec: &RequestSpec,
    attempt: u32,
    delay: Duration,
    error: &UpstreamError,
) {
    tracing::info!(
        call_id = %call_id,
        dependency = %spec.dependency,
        operation = %spec.operation,
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "Retrying call"
    );
}

/// Drive one attempt: establish the stream, then pump chunks, racing the
/// deadline and caller cancellation throughout.
async fn run_attempt<Fut>(
    connect: Fut,
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    timeout: Duration,
    delivered: &mut bool,
) -> AttemptEnd
where
    Fut: Future<Output = Result<ChunkStream, UpstreamError>>,
{
    let deadline = time::sleep(timeout);
    tokio::pin!(deadline);
    tokio::pin!(connect);

    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return AttemptEnd::Cancelled,
        _ = &mut deadline => return AttemptEnd::TimedOut,
        result = &mut connect => match result {
            Ok(stream) => stream,
            Err(error) => return AttemptEnd::Failed(error),
        },
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return AttemptEnd::Cancelled,
            _ = &mut deadline => return AttemptEnd::TimedOut,
            item = stream.next() => match item {
                Some(Ok(chunk)) => {
                    *delivered = true;
                    // The deadline keeps running while a slow caller
                    // applies backpressure on the channel.
                    tokio::select! {
                        _ = cancel.cancelled() => return AttemptEnd::Cancelled,
                        _ = &mut deadline => return AttemptEnd::TimedOut,
                        sent = tx.send(StreamEvent::Chunk(chunk)) => {
                            if sent.is_err() {
                                // Receiver gone: the caller walked away.
                                return AttemptEnd::Cancelled;
                            }
                        }
                    }
                }
                Some(Err(error)) => return AttemptEnd::Failed(error),
                None => return AttemptEnd::Completed,
            },
        }
    }
}
