use crate::config::PluginConfig;
use crate::handlers::{error_response, HandlerContext};
use crate::proto::{
    projection_service_server::ProjectionService, AlgorithmInfo, HealthRequest, HealthResponse,
    Hyperparameters, HttpRequest, HttpResponse, ListAlgorithmsRequest, ListAlgorithmsResponse,
    ProjectRequest, ProjectResponse, Vector,
};
use qntx_projection::request::{DEFAULT_ALGORITHM, DEFAULT_DIM, DEFAULT_SEED};
use qntx_projection::{
    ErrorKind, HyperparameterOverrides, Metric, ProjectionError, ProjectionRequest, Projector,
    Registry, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tonic::metadata::MetadataValue;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// gRPC metadata key carrying the stable error kind tag.
pub const ERROR_KIND_METADATA: &str = "x-error-kind";

/// Projection plugin gRPC service.
pub struct ProjectionPluginService {
    handlers: HandlerContext,
}

impl ProjectionPluginService {
    pub fn new(handlers: HandlerContext) -> Self {
        Self { handlers }
    }

    /// Build the service from startup configuration and a populated registry.
    pub fn from_config(config: &PluginConfig, registry: Registry) -> Self {
        let projector = Projector::new(
            registry,
            Arc::new(config.defaults.clone()),
            config.service.retry_policy(),
        );
        Self::new(HandlerContext::new(projector, &config.service))
    }

    pub fn handlers(&self) -> &HandlerContext {
        &self.handlers
    }
}

impl Default for ProjectionPluginService {
    fn default() -> Self {
        Self::from_config(&PluginConfig::default(), Registry::builtin())
    }
}

/// Map a pipeline error to a gRPC status tagged with its kind.
pub fn to_status(err: &ProjectionError) -> Status {
    let kind = err.kind();
    let code = match kind {
        ErrorKind::Validation => tonic::Code::InvalidArgument,
        ErrorKind::Computation => tonic::Code::Aborted,
        ErrorKind::Internal => tonic::Code::Internal,
        ErrorKind::Timeout => tonic::Code::DeadlineExceeded,
        ErrorKind::Overloaded => tonic::Code::ResourceExhausted,
    };
    let mut status = Status::new(code, err.to_string());
    status
        .metadata_mut()
        .insert(ERROR_KIND_METADATA, MetadataValue::from_static(kind.as_str()));
    status
}

fn overrides_from_proto(
    params: Option<Hyperparameters>,
) -> Result<HyperparameterOverrides, ValidationError> {
    let Some(p) = params else {
        return Ok(HyperparameterOverrides::default());
    };
    Ok(HyperparameterOverrides {
        n_neighbors: p.n_neighbors.map(|v| v as usize),
        min_dist: p.min_dist,
        spread: p.spread,
        n_epochs: p.n_epochs.map(|v| v as usize),
        metric: p.metric.as_deref().map(|m| m.parse::<Metric>()).transpose()?,
        perplexity: p.perplexity,
        iterations: p.iterations.map(|v| v as usize),
        learning_rate: p.learning_rate,
        early_exaggeration: p.early_exaggeration,
    })
}

fn request_from_proto(req: ProjectRequest) -> Result<ProjectionRequest, ValidationError> {
    Ok(ProjectionRequest {
        vectors: req.vectors.into_iter().map(|v| v.values).collect(),
        algo: req.algo.unwrap_or_else(|| DEFAULT_ALGORITHM.to_string()),
        dim: req.dim.unwrap_or(DEFAULT_DIM),
        seed: req.seed.unwrap_or(DEFAULT_SEED),
        params: overrides_from_proto(req.params)?,
    })
}

#[tonic::async_trait]
impl ProjectionService for ProjectionPluginService {
    async fn project(
        &self,
        request: Request<ProjectRequest>,
    ) -> Result<Response<ProjectResponse>, Status> {
        let request = request_from_proto(request.into_inner())
            .map_err(|e| to_status(&ProjectionError::from(e)))?;

        let result = self
            .handlers
            .project(request)
            .await
            .map_err(|e| to_status(&e))?;

        Ok(Response::new(ProjectResponse {
            coords: result
                .coords
                .into_iter()
                .map(|values| Vector { values })
                .collect(),
            elapsed_ms: result.elapsed_ms,
        }))
    }

    async fn health(
        &self,
        _request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        let stats = self.handlers.stats();
        let registry = self.handlers.projector().dispatcher().registry();

        let mut details = HashMap::new();
        details.insert("in_flight".to_string(), stats.in_flight().to_string());
        details.insert("served".to_string(), stats.served().to_string());
        details.insert("failed".to_string(), stats.failed().to_string());
        details.insert(
            "max_concurrent".to_string(),
            self.handlers.max_concurrent().to_string(),
        );
        details.insert("algorithms".to_string(), registry.names().join(","));

        Ok(Response::new(HealthResponse {
            healthy: true,
            message: "OK".to_string(),
            details,
        }))
    }

    async fn list_algorithms(
        &self,
        _request: Request<ListAlgorithmsRequest>,
    ) -> Result<Response<ListAlgorithmsResponse>, Status> {
        let algorithms = self
            .handlers
            .projector()
            .algorithms()
            .into_iter()
            .map(|info| {
                let defaults_json = serde_json::to_string(&info.defaults)
                    .map_err(|e| Status::internal(format!("failed to encode defaults: {}", e)))?;
                Ok(AlgorithmInfo {
                    name: info.name,
                    description: info.description,
                    defaults_json,
                })
            })
            .collect::<Result<Vec<_>, Status>>()?;

        Ok(Response::new(ListAlgorithmsResponse { algorithms }))
    }

    async fn handle_http(
        &self,
        request: Request<HttpRequest>,
    ) -> Result<Response<HttpResponse>, Status> {
        let req = request.into_inner();
        let method = req.method.to_uppercase();
        let path = req.path.split('?').next().unwrap_or_default().trim_end_matches('/');

        debug!("HTTP request: {} {}", method, path);

        let response = match (method.as_str(), path) {
            ("POST", "/api/project") => self.handlers.handle_project(&req.body).await,
            ("GET", "/api/health") => self.handlers.handle_health(),
            ("GET", "/api/algorithms") => self.handlers.handle_algorithms(),
            _ => {
                info!("Unknown endpoint: {} {}", method, path);
                error_response(
                    404,
                    "not_found",
                    &format!("Unknown endpoint: {} {}", method, req.path),
                )
            }
        };

        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use pretty_assertions::assert_eq;

    fn service() -> ProjectionPluginService {
        ProjectionPluginService::default()
    }

    fn grid(n: usize, d: usize) -> Vec<Vector> {
        (0..n)
            .map(|i| Vector {
                values: (0..d).map(|j| ((i * d + j) % 7) as f64 + i as f64).collect(),
            })
            .collect()
    }

    fn http(method: &str, path: &str, body: &str) -> Request<HttpRequest> {
        Request::new(HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            headers: vec![],
            body: body.as_bytes().to_vec(),
        })
    }

    #[tokio::test]
    async fn test_project_with_defaults() {
        let response = service()
            .project(Request::new(ProjectRequest {
                vectors: grid(10, 5),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.coords.len(), 10);
        assert!(response.coords.iter().all(|c| c.values.len() == 2));
    }

    #[tokio::test]
    async fn test_project_validation_status() {
        let status = service()
            .project(Request::new(ProjectRequest {
                vectors: vec![],
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(
            status.metadata().get(ERROR_KIND_METADATA).unwrap(),
            "validation_error"
        );
    }

    #[tokio::test]
    async fn test_project_unknown_metric() {
        let status = service()
            .project(Request::new(ProjectRequest {
                vectors: grid(5, 3),
                params: Some(Hyperparameters {
                    metric: Some("manhattan".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("metric"));
    }

    #[test]
    fn test_request_defaults_from_proto() {
        let request = request_from_proto(ProjectRequest {
            vectors: grid(2, 2),
            params: Some(Hyperparameters {
                n_neighbors: Some(5),
                metric: Some("cosine".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(request.algo, "umap");
        assert_eq!(request.dim, 2);
        assert_eq!(request.seed, 42);
        assert_eq!(request.params.n_neighbors, Some(5));
        assert_eq!(request.params.metric, Some(Metric::Cosine));
    }

    #[tokio::test]
    async fn test_health_details() {
        let service = ProjectionPluginService::from_config(
            &PluginConfig {
                service: ServiceConfig {
                    max_concurrent: 3,
                    ..Default::default()
                },
                ..Default::default()
            },
            Registry::builtin(),
        );
        let health = service
            .health(Request::new(HealthRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(health.healthy);
        assert_eq!(health.details["algorithms"], "pca,tsne,umap");
        assert_eq!(health.details["in_flight"], "0");
        assert_eq!(health.details["max_concurrent"], "3");
    }

    #[tokio::test]
    async fn test_list_algorithms() {
        let response = service()
            .list_algorithms(Request::new(ListAlgorithmsRequest {}))
            .await
            .unwrap()
            .into_inner();
        let names: Vec<&str> = response.algorithms.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["pca", "tsne", "umap"]);

        let tsne: serde_json::Value =
            serde_json::from_str(&response.algorithms[1].defaults_json).unwrap();
        assert_eq!(tsne["learning_rate"], 100.0);
        assert_eq!(tsne["perplexity"], 40.0);
    }

    #[tokio::test]
    async fn test_http_routes() {
        let service = service();

        let health = service
            .handle_http(http("GET", "/api/health", ""))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(health.status_code, 200);
        assert_eq!(health.body, br#"{"ok":true}"#.to_vec());

        let project = service
            .handle_http(http(
                "POST",
                "/api/project",
                r#"{"vectors": [[1,2,3],[4,5,6],[7,8,9],[1,0,1]], "algo": "PCA", "dim": 1}"#,
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(project.status_code, 200);
        let body: serde_json::Value = serde_json::from_slice(&project.body).unwrap();
        assert_eq!(body["coords"].as_array().unwrap().len(), 4);

        let missing = service
            .handle_http(http("DELETE", "/api/project", ""))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(missing.status_code, 404);
    }

    #[test]
    fn test_status_codes_per_kind() {
        let cases = [
            (
                ProjectionError::Validation(ValidationError::EmptyDataset),
                tonic::Code::InvalidArgument,
            ),
            (
                ProjectionError::Internal("bug".to_string()),
                tonic::Code::Internal,
            ),
            (
                ProjectionError::Timeout { limit_ms: 10 },
                tonic::Code::DeadlineExceeded,
            ),
            (
                ProjectionError::Overloaded("busy".to_string()),
                tonic::Code::ResourceExhausted,
            ),
        ];
        for (err, code) in cases {
            let status = to_status(&err);
            assert_eq!(status.code(), code);
            assert_eq!(
                status.metadata().get(ERROR_KIND_METADATA).unwrap(),
                err.kind().as_str()
            );
        }
    }
}
