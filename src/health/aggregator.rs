//! Dependency health aggregation.
//!
//! # Responsibilities
//! - Periodically probe each dependency through its circuit breaker
//! - Cache results with a TTL; reporting never blocks on a probe
//! - Aggregate per-dependency status into one overall status

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::HealthConfig;
use crate::observability::metrics;
use crate::resilience::error::{CallError, UpstreamError};
use crate::resilience::registry::BreakerRegistry;

/// Aggregate status over all dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Per-dependency probe status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Cached result of the most recent probe of one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyHealthRecord {
    pub status: ProbeStatus,
    pub last_message: String,
    pub response_time_ms: u64,
    pub checked_at_epoch_secs: u64,
    #[serde(skip)]
    checked_at: Instant,
}

/// Non-blocking aggregate view handed to operational endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub dependencies: BTreeMap<String, DependencyHealthRecord>,
}

pub type ProbeFuture = Pin<Box<dyn Future<Output = Result<(), UpstreamError>> + Send>>;

/// Lightweight check of one dependency, cheaper than a real call.
pub type Probe = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

/// Timer-driven health prober with a cached report.
pub struct HealthAggregator {
    registry: Arc<BreakerRegistry>,
    probes: Vec<(String, Probe)>,
    records: Mutex<HashMap<String, DependencyHealthRecord>>,
    interval: Duration,
    record_ttl: Duration,
}

impl HealthAggregator {
    pub fn new(registry: Arc<BreakerRegistry>, config: &HealthConfig) -> Self {
        Self {
            registry,
            probes: Vec::new(),
            records: Mutex::new(HashMap::new()),
            interval: Duration::from_secs(config.interval_secs.max(1)),
            record_ttl: Duration::from_secs(config.record_ttl_secs.max(1)),
        }
    }

    /// Register the probe for one dependency. The name must match the
    /// dependency's breaker.
    pub fn register_probe(&mut self, dependency: impl Into<String>, probe: Probe) {
        self.probes.push((dependency.into(), probe));
    }

    /// Run the probe cycle until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            dependencies = self.probes.len(),
            "Health aggregator starting"
        );

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health aggregator received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered dependency once, through its breaker.
    ///
    /// An open circuit short-circuits the probe: the rejection becomes the
    /// record without any upstream I/O.
    pub async fn probe_all(&self) {
        for (name, probe) in &self.probes {
            let Some(breaker) = self.registry.get(name) else {
                tracing::error!(dependency = %name, "No breaker registered for probe");
                continue;
            };

            let started = Instant::now();
            let outcome = breaker.call(|| probe()).await;
            let response_time = started.elapsed();

            let (status, message) = match outcome {
                Ok(()) => (ProbeStatus::Healthy, "ok".to_string()),
                Err(CallError::Rejected { retry_after }) => (
                    ProbeStatus::Unhealthy,
                    format!("circuit open; retry after {}s", retry_after.as_secs()),
                ),
                Err(CallError::Failed(error)) => (ProbeStatus::Unhealthy, error.to_string()),
            };

            if status != ProbeStatus::Healthy {
                tracing::warn!(
                    dependency = %name,
                    message = %message,
                    response_time_ms = response_time.as_millis() as u64,
                    "Dependency probe failed"
                );
            }
            metrics::record_probe(name, status == ProbeStatus::Healthy);

            let record = DependencyHealthRecord {
                status,
                last_message: message,
                response_time_ms: response_time.as_millis() as u64,
                checked_at_epoch_secs: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0),
                checked_at: started,
            };
            self.records
                .lock()
                .expect("health records mutex poisoned")
                .insert(name.clone(), record);
        }
    }

    /// Last cached view; never triggers a probe.
    pub fn report(&self) -> HealthReport {
        let records = self.records.lock().expect("health records mutex poisoned");

        let mut dependencies = BTreeMap::new();
        for (name, _probe) in &self.probes {
            match records.get(name) {
                Some(record) if record.checked_at.elapsed() <= self.record_ttl => {
                    dependencies.insert(name.clone(), record.clone());
                }
                Some(stale) => {
                    let mut record = stale.clone();
                    record.status = ProbeStatus::Unknown;
                    record.last_message = "probe result expired".to_string();
                    dependencies.insert(name.clone(), record);
                }
                None => {
                    dependencies.insert(
                        name.clone(),
                        DependencyHealthRecord {
                            status: ProbeStatus::Unknown,
                            last_message: "not probed yet".to_string(),
                            response_time_ms: 0,
                            checked_at_epoch_secs: 0,
                            checked_at: Instant::now(),
                        },
                    );
                }
            }
        }

        HealthReport {
            status: aggregate(&dependencies),
            dependencies,
        }
    }
}

/// Probe that issues `GET url` and treats any 2xx as healthy.
pub fn http_probe(
    client: hyper_util::client::legacy::Client<
        hyper_util::client::legacy::connect::HttpConnector,
        axum::body::Body,
    >,
    url: String,
) -> Probe {
    Arc::new(move || {
        let client = client.clone();
        let url = url.clone();
        Box::pin(async move {
            let request = axum::http::Request::builder()
                .method("GET")
                .uri(&url)
                .header("user-agent", "upstream-guard-health-probe")
                .body(axum::body::Body::empty())
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            match client.request(request).await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(UpstreamError::Status {
                    code: response.status().as_u16(),
                }),
                Err(e) => Err(UpstreamError::Transport(e.to_string())),
            }
        })
    })
}

/// All healthy → healthy; strict majority healthy → degraded; otherwise
/// unhealthy. No dependencies at all → unknown.
fn aggregate(dependencies: &BTreeMap<String, DependencyHealthRecord>) -> OverallStatus {
    if dependencies.is_empty() {
        return OverallStatus::Unknown;
    }
    let total = dependencies.len();
    let healthy = dependencies
        .values()
        .filter(|r| r.status == ProbeStatus::Healthy)
        .count();
    if healthy == total {
        OverallStatus::Healthy
    } else if healthy * 2 > total {
        OverallStatus::Degraded
    } else {
        OverallStatus::Unhealthy
    }
}
