//! Serves the plugin on an ephemeral port and drives it through the generated client.

use qntx_reduce_plugin::proto::projection_service_client::ProjectionServiceClient;
use qntx_reduce_plugin::proto::projection_service_server::ProjectionServiceServer;
use qntx_reduce_plugin::proto::{HealthRequest, HttpRequest, ProjectRequest, Vector};
use qntx_reduce_plugin::service::ERROR_KIND_METADATA;
use qntx_reduce_plugin::ProjectionPluginService;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};

async fn start() -> ProjectionServiceClient<Channel> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(ProjectionServiceServer::new(
                ProjectionPluginService::default(),
            ))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    ProjectionServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap()
}

fn vectors(n: usize, d: usize) -> Vec<Vector> {
    (0..n)
        .map(|i| Vector {
            values: (0..d).map(|j| (i * d + j) as f64 * 0.5).collect(),
        })
        .collect()
}

#[tokio::test]
async fn test_project_is_deterministic_over_the_wire() {
    let mut client = start().await;
    let request = ProjectRequest {
        vectors: vectors(10, 5),
        ..Default::default()
    };

    let first = client.project(request.clone()).await.unwrap().into_inner();
    let second = client.project(request).await.unwrap().into_inner();

    assert_eq!(first.coords.len(), 10);
    assert!(first.coords.iter().all(|c| c.values.len() == 2));
    assert_eq!(first.coords, second.coords);
}

#[tokio::test]
async fn test_errors_carry_kind_metadata() {
    let mut client = start().await;
    let status = client
        .project(ProjectRequest {
            vectors: vectors(4, 3),
            algo: Some("nonexistent-algo".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert_eq!(
        status.metadata().get(ERROR_KIND_METADATA).unwrap(),
        "validation_error"
    );
}

#[tokio::test]
async fn test_health_and_http_bridge() {
    let mut client = start().await;

    let health = client.health(HealthRequest {}).await.unwrap().into_inner();
    assert!(health.healthy);
    assert_eq!(health.details["in_flight"], "0");

    let response = client
        .handle_http(HttpRequest {
            method: "POST".to_string(),
            path: "/api/project".to_string(),
            headers: vec![],
            body: br#"{"vectors": [[1,2],[2,1],[0,0]], "algo": "tsne", "seed": -3}"#.to_vec(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status_code, 200);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["coords"].as_array().unwrap().len(), 3);
}
