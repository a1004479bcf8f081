//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds an [`AppContext`] over temporary storage roots and
//! a [`ScriptedEncoder`] in place of ffmpeg, then serves the router on a
//! random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use rf_av::{EncodeOutcome, EncodeRequest, Encoder, EncoderEvent, EventSender, ToolRegistry};
use rf_core::config::Config;
use rf_jobs::{JobManager, ManagerConfig};
use rf_server::context::AppContext;
use rf_server::router::build_router;

/// Bytes every successful scripted encode writes.
pub const RENDERED: &[u8] = b"rendered-output";

/// Encoder double driven by the test.
pub struct ScriptedEncoder {
    /// Events sent before the encode settles.
    pub progress: Mutex<Vec<EncoderEvent>>,
    /// When set, the encode writes partial output and fails with this message.
    pub fail_with: Mutex<Option<String>>,
    /// When true, each encode waits for [`ScriptedEncoder::release`].
    pub hold: bool,
    gate: Semaphore,
    calls: AtomicUsize,
    pub requests: Mutex<Vec<EncodeRequest>>,
}

impl ScriptedEncoder {
    pub fn new(hold: bool) -> Self {
        Self {
            progress: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            hold,
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn encode(
        &self,
        request: EncodeRequest,
        events: EventSender,
        cancel: CancellationToken,
    ) -> EncodeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let script = self.progress.lock().clone();
        for event in script {
            let _ = events.send(event);
        }

        if self.hold {
            tokio::select! {
                permit = self.gate.acquire() => {
                    if let Ok(p) = permit {
                        p.forget();
                    }
                }
                _ = cancel.cancelled() => return EncodeOutcome::Abandoned,
            }
        }

        if let Err(e) = tokio::fs::write(&request.output, RENDERED).await {
            return EncodeOutcome::Failed(e.to_string());
        }

        let failure = self.fail_with.lock().clone();
        match failure {
            Some(message) => EncodeOutcome::Failed(message),
            None => EncodeOutcome::Completed(request.output.clone()),
        }
    }
}

pub struct TestHarness {
    pub ctx: AppContext,
    pub encoder: Arc<ScriptedEncoder>,
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    dir: TempDir,
}

impl TestHarness {
    /// Default configuration, encodes complete immediately.
    pub async fn with_server() -> Self {
        Self::build(|_| {}, ScriptedEncoder::new(false)).await
    }

    /// Adjust the configuration and pick the encoder behaviour.
    pub async fn build(configure: impl FnOnce(&mut Config), encoder: ScriptedEncoder) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let mut config = Config::default();
        config.storage.media_dir = dir.path().join("media");
        config.storage.output_dir = dir.path().join("exports");
        configure(&mut config);
        std::fs::create_dir_all(&config.storage.media_dir).expect("failed to create media dir");

        let encoder = Arc::new(encoder);
        let jobs = JobManager::new(ManagerConfig::from_config(&config), encoder.clone());
        let ctx = AppContext::new(config, jobs, ToolRegistry::default());
        let app = build_router(ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            ctx,
            encoder,
            addr,
            client: reqwest::Client::new(),
            dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn media_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("media")
    }

    pub fn output_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("exports")
    }

    /// POST a submission and return the job id.
    pub async fn submit(&self, body: serde_json::Value) -> String {
        let resp = self
            .client
            .post(self.url("/api/jobs"))
            .json(&body)
            .send()
            .await
            .expect("submit failed");
        assert_eq!(resp.status(), 202);
        let json: serde_json::Value = resp.json().await.unwrap();
        json["jobId"].as_str().expect("jobId missing").to_string()
    }

    pub async fn status(&self, id: &str) -> serde_json::Value {
        self.client
            .get(self.url(&format!("/api/jobs/{id}")))
            .send()
            .await
            .expect("status failed")
            .json()
            .await
            .unwrap()
    }

    /// Poll until the job reports `status`, returning the last response.
    pub async fn wait_for_status(&self, id: &str, status: &str) -> serde_json::Value {
        for _ in 0..300 {
            let json = self.status(id).await;
            if json["status"] == status {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached {status}: {}", self.status(id).await);
    }

    pub async fn wait_for_calls(&self, calls: usize) {
        for _ in 0..300 {
            if self.encoder.calls() >= calls {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("encoder never reached {calls} calls");
    }
}

/// Hex SHA-256 of `data`, as a client would compute it.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}
