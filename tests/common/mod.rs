#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use rustmetrics::application::system::ServerApplication;
use rustmetrics::config::ServerConfig;
use rustmetrics::domain::errors::DeliveryError;
use rustmetrics::domain::metric::{Metric, WireMetric};
use rustmetrics::domain::ports::{MetricTransport, SampleSource};
use rustmetrics::infrastructure::transport::codec::compress;
use tower::ServiceExt;

/// Collector config with no persistence at all.
pub fn memory_config() -> ServerConfig {
    ServerConfig {
        store_file: None,
        restore: false,
        ..ServerConfig::default()
    }
}

pub async fn build_server(config: ServerConfig) -> ServerApplication {
    ServerApplication::build(config).await.unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub fn post_gzip_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-encoding", "gzip")
        .body(Body::from(compress(json.as_bytes()).unwrap()))
        .unwrap()
}

pub fn batch_json(metrics: &[WireMetric]) -> String {
    serde_json::to_string(metrics).unwrap()
}

pub fn wire(metric: &Metric) -> WireMetric {
    WireMetric::from(metric)
}

/// Delivers agent bodies straight into a collector router.
pub struct RouterTransport {
    pub app: Router,
}

#[async_trait]
impl MetricTransport for RouterTransport {
    async fn deliver(&self, body: Vec<u8>) -> Result<(), DeliveryError> {
        let request = Request::builder()
            .method("POST")
            .uri("/updates/")
            .header("content-type", "application/json")
            .header("content-encoding", "gzip")
            .body(Body::from(body))
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let response = send(&self.app, request).await;
        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(DeliveryError::Status(response.status().as_u16()))
        }
    }
}

/// Sample source returning the same readings every poll.
pub struct FixedSource(pub Vec<(String, f64)>);

impl SampleSource for FixedSource {
    fn sample(&mut self) -> Vec<(String, f64)> {
        self.0.clone()
    }
}
