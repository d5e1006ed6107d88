//! Shared harness for HTTP integration tests.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use skillseek_runtime::{EmbeddingProvider, ServiceConfig, ServiceContext};
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

/// Embedder that never touches a model; similarity is irrelevant here.
struct ZeroEmbedder;

#[async_trait]
impl EmbeddingProvider for ZeroEmbedder {
    async fn embed(&self, texts: Vec<String>) -> skillseek_runtime::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; 8]).collect())
    }

    fn model_id(&self) -> &str {
        "zero"
    }
}

pub struct TestApp {
    pub ctx: Arc<ServiceContext>,
    _cache: tempfile::TempDir,
}

impl TestApp {
    /// Context with no configured sources, so loading completes instantly.
    pub fn new() -> Self {
        let cache = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.skill_sources.clear();
        config.cache_dir = cache.path().to_path_buf();
        let ctx = ServiceContext::new(config, Arc::new(ZeroEmbedder));
        Self { ctx, _cache: cache }
    }

    pub async fn request(&self, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let app = skillseek_http::create_app(self.ctx.clone());
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    pub fn get_request(path: &str) -> Request<Body> {
        Request::builder().method("GET").uri(path).body(Body::empty()).unwrap()
    }

    pub fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).expect("failed to parse JSON response")
    }
}

pub const BOUNDARY: &str = "skillseek-test-boundary";

/// Hand-rolled multipart body for the upload endpoint.
pub fn multipart_request(
    file: Option<&[u8]>,
    tenant_id: Option<&str>,
    scope: Option<&str>,
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    if let Some(bytes) = file {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"skills.zip\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .unwrap();
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in [("tenant_id", tenant_id), ("scope", scope)] {
        if let Some(value) = value {
            write!(
                body,
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .unwrap();
        }
    }
    write!(body, "--{BOUNDARY}--\r\n").unwrap();

    Request::builder()
        .method("POST")
        .uri("/skills/upload")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

/// Zip archive holding a single skill bundle.
pub fn skill_zip(folder: &str, name: &str, description: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file(format!("{folder}/SKILL.md"), options).unwrap();
        writer
            .write_all(
                format!("---\nname: {name}\ndescription: {description}\n---\n\nUploaded body.\n")
                    .as_bytes(),
            )
            .unwrap();
        writer.finish().unwrap();
    }
    buf
}
