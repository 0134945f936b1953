use crate::config::ServiceConfig;
use crate::proto::{HttpHeader, HttpResponse};
use parking_lot::RwLock;
use qntx_projection::{ErrorKind, ProjectionError, ProjectionRequest, ProjectionResult, Projector};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Per-algorithm counters reported by health.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlgorithmStats {
    pub served: u64,
    pub failed: u64,
    pub total_ms: u64,
}

/// Service-wide counters. Only touched from the request path, never read by capabilities.
#[derive(Debug, Default)]
pub struct ServiceStats {
    in_flight: AtomicU64,
    served: AtomicU64,
    failed: AtomicU64,
    per_algorithm: RwLock<BTreeMap<String, AlgorithmStats>>,
}

impl ServiceStats {
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn per_algorithm(&self) -> BTreeMap<String, AlgorithmStats> {
        self.per_algorithm.read().clone()
    }

    fn record(&self, algorithm: &str, result: &Result<ProjectionResult, ProjectionError>) {
        match result {
            Ok(r) => {
                self.served.fetch_add(1, Ordering::Relaxed);
                let mut per_algorithm = self.per_algorithm.write();
                let entry = per_algorithm.entry(algorithm.to_string()).or_default();
                entry.served += 1;
                entry.total_ms += r.elapsed_ms;
            }
            Err(_) => self.record_failure(algorithm),
        }
    }

    fn record_failure(&self, algorithm: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.per_algorithm
            .write()
            .entry(algorithm.to_string())
            .or_default()
            .failed += 1;
    }
}

/// Counts one running projection. A guard dropped without `finish` (the capability
/// panicked) is recorded as a failure.
struct InFlight {
    stats: Arc<ServiceStats>,
    algorithm: String,
    finished: bool,
}

impl InFlight {
    fn start(stats: Arc<ServiceStats>, algorithm: &str) -> Self {
        stats.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            stats,
            algorithm: algorithm.to_string(),
            finished: false,
        }
    }

    fn finish(mut self, result: &Result<ProjectionResult, ProjectionError>) {
        self.stats.record(&self.algorithm, result);
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            self.stats.record_failure(&self.algorithm);
        }
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Shared request-handling state: the projector plus admission control.
#[derive(Clone)]
pub struct HandlerContext {
    projector: Arc<Projector>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    queue_timeout: Option<Duration>,
    timeout: Option<Duration>,
    stats: Arc<ServiceStats>,
}

impl HandlerContext {
    pub fn new(projector: Projector, config: &ServiceConfig) -> Self {
        let max_concurrent = config.concurrency();
        Self {
            projector: Arc::new(projector),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            queue_timeout: config.queue_timeout(),
            timeout: config.timeout(),
            stats: Arc::new(ServiceStats::default()),
        }
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one projection on the blocking pool, subject to admission and deadline.
    ///
    /// Validation and dispatch happen first, so a rejected request never waits for or
    /// holds a slot. A computation that outlives its deadline keeps its permit until it
    /// finishes.
    pub async fn project(
        &self,
        request: ProjectionRequest,
    ) -> Result<ProjectionResult, ProjectionError> {
        let prepared = self.projector.prepare(&request).map_err(|e| {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            e
        })?;
        drop(request);

        let acquire = self.permits.clone().acquire_owned();
        let permit = match self.queue_timeout {
            Some(wait) => tokio::time::timeout(wait, acquire).await.map_err(|_| {
                warn!(
                    max_concurrent = self.max_concurrent,
                    queue_timeout_ms = wait.as_millis() as u64,
                    "projection rejected, no capacity"
                );
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                ProjectionError::Overloaded(format!(
                    "no projection slot freed within {}ms",
                    wait.as_millis()
                ))
            })?,
            None => acquire.await,
        }
        .map_err(|_| ProjectionError::Internal("admission semaphore closed".to_string()))?;

        let algorithm = prepared.dispatch.config.algorithm().to_string();
        debug!(
            algorithm = %algorithm,
            n_points = prepared.request.n_points(),
            "projection admitted"
        );

        let projector = self.projector.clone();
        let in_flight = InFlight::start(self.stats.clone(), &algorithm);

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = projector.run(&prepared);
            in_flight.finish(&result);
            result
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    warn!(limit_ms, algorithm = %algorithm, "projection deadline exceeded");
                    return Err(ProjectionError::Timeout { limit_ms });
                }
            },
            None => task.await,
        };

        joined.map_err(|e| {
            error!(algorithm = %algorithm, "projection task failed: {}", e);
            ProjectionError::Internal(format!("projection task failed: {}", e))
        })?
    }

    /// POST /api/project
    pub async fn handle_project(&self, body: &[u8]) -> HttpResponse {
        let request: ProjectionRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                return error_response(
                    400,
                    ErrorKind::Validation.as_str(),
                    &format!("invalid request body: {}", e),
                )
            }
        };

        match self.project(request).await {
            Ok(result) => {
                info!(
                    n_points = result.coords.len(),
                    elapsed_ms = result.elapsed_ms,
                    "projection served"
                );
                json_response(200, &result)
            }
            Err(e) => projection_error_response(&e),
        }
    }

    /// GET /api/health
    pub fn handle_health(&self) -> HttpResponse {
        json_response(200, &serde_json::json!({ "ok": true }))
    }

    /// GET /api/algorithms
    pub fn handle_algorithms(&self) -> HttpResponse {
        json_response(
            200,
            &serde_json::json!({ "algorithms": self.projector.algorithms() }),
        )
    }
}

/// HTTP status for each error kind.
pub fn http_status(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => 400,
        ErrorKind::Computation | ErrorKind::Internal => 500,
        ErrorKind::Overloaded => 503,
        ErrorKind::Timeout => 504,
    }
}

pub fn projection_error_response(err: &ProjectionError) -> HttpResponse {
    let kind = err.kind();
    error_response(http_status(kind), kind.as_str(), &err.to_string())
}

/// `{"error": {"kind": ..., "message": ...}}`
pub fn error_response(status_code: i32, kind: &str, message: &str) -> HttpResponse {
    json_response(
        status_code,
        &serde_json::json!({ "error": { "kind": kind, "message": message } }),
    )
}

/// Create a JSON HTTP response.
pub fn json_response<T: Serialize>(status_code: i32, data: &T) -> HttpResponse {
    match serde_json::to_vec(data) {
        Ok(body) => HttpResponse {
            status_code,
            headers: vec![HttpHeader {
                name: "Content-Type".to_string(),
                values: vec!["application/json".to_string()],
            }],
            body,
        },
        Err(e) => HttpResponse {
            status_code: 500,
            headers: vec![HttpHeader {
                name: "Content-Type".to_string(),
                values: vec!["text/plain".to_string()],
            }],
            body: format!("failed to serialize response: {}", e).into_bytes(),
        },
    }
}
