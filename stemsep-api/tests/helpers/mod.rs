//! Shared fixtures for stemsep-api integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stemsep_api::services::{
    EngineRequest, ExitResult, OutputResolver, SeparationEngine, SeparationService, SessionManager,
};
use stemsep_api::{build_router, AppState, JobError};
use tempfile::TempDir;

pub const SIX_STEMS: [&str; 6] = ["bass", "drums", "guitar", "other", "piano", "vocals"];
pub const BOUNDARY: &str = "stemsep-test-boundary";

/// How the fake engine names its result directory
#[derive(Debug, Clone)]
pub enum ResultDir {
    /// File stem of the input it was handed (`<session_id>_song`)
    InputStem,
    /// A fixed name, as an engine that rewrites names would
    Named(String),
}

/// Engine that writes placeholder stems without decoding anything
pub struct FakeEngine {
    pub stems: Vec<String>,
    pub result_dir: ResultDir,
    /// Sleep after writing, before reporting success
    pub delay: Option<Duration>,
    /// Whether the input file existed when each run started
    pub input_seen: Mutex<Vec<bool>>,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl FakeEngine {
    pub fn new(stems: &[&str], result_dir: ResultDir) -> Self {
        Self {
            stems: stems.iter().map(|s| s.to_string()).collect(),
            result_dir,
            delay: None,
            input_seen: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn six_stems() -> Self {
        Self::new(&SIX_STEMS, ResultDir::Named("song".to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SeparationEngine for FakeEngine {
    async fn separate(&self, request: &EngineRequest) -> Result<ExitResult, JobError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.input_seen
            .lock()
            .unwrap()
            .push(request.input_path.exists());

        let name = match &self.result_dir {
            ResultDir::InputStem => request
                .input_path
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .to_string(),
            ResultDir::Named(name) => name.clone(),
        };
        let dir = request.output_dir.join(&request.model).join(name);
        tokio::fs::create_dir_all(&dir).await?;
        for stem in &self.stems {
            tokio::fs::write(dir.join(format!("{}.wav", stem)), stem.as_bytes()).await?;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(ExitResult {
            code: Some(0),
            ..Default::default()
        })
    }
}

/// Engine that always exits nonzero with the given diagnostics
pub struct FailingEngine {
    pub stderr: String,
}

#[async_trait]
impl SeparationEngine for FailingEngine {
    async fn separate(&self, _request: &EngineRequest) -> Result<ExitResult, JobError> {
        Err(JobError::Engine {
            code: Some(1),
            stderr: self.stderr.clone(),
        })
    }
}

/// Session manager over fresh upload and output roots
pub fn test_sessions() -> (TempDir, SessionManager) {
    let dir = tempfile::tempdir().unwrap();
    let sessions = SessionManager::new(dir.path().join("uploads"), dir.path().join("separated"));
    std::fs::create_dir_all(sessions.upload_root()).unwrap();
    std::fs::create_dir_all(sessions.output_root()).unwrap();
    (dir, sessions)
}

pub fn test_service(engine: Arc<dyn SeparationEngine>) -> (TempDir, SeparationService) {
    let (dir, sessions) = test_sessions();
    (dir, SeparationService::new(sessions, engine, OutputResolver::new("wav")))
}

pub fn test_app(engine: Arc<dyn SeparationEngine>) -> (TempDir, Router) {
    let (dir, service) = test_service(engine);
    (dir, build_router(AppState::new(service, "htdemucs_6s")))
}

/// Router with a customized service and upload limit
pub fn test_app_with(
    engine: Arc<dyn SeparationEngine>,
    configure: impl FnOnce(SeparationService) -> SeparationService,
    max_upload_bytes: usize,
) -> (TempDir, Router) {
    let (dir, service) = test_service(engine);
    let state = AppState::new(configure(service), "htdemucs_6s")
        .with_max_upload_bytes(max_upload_bytes);
    (dir, build_router(state))
}

pub fn dir_entries(path: &Path) -> usize {
    std::fs::read_dir(path).unwrap().count()
}

/// multipart/form-data body with a `file` field and optional `model` field
pub fn multipart_body(filename: &str, data: &[u8], model: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: audio/mpeg\r\n\r\n",
            BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
    if let Some(model) = model {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"model\"\r\n\r\n{}\r\n",
                BOUNDARY, model
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn separate_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
