//! Collection server
//!
//! Serves the prompt listing and accepts recording uploads. Handlers for
//! distinct buckets (and overlapping requests for the same bucket) run
//! concurrently; the per-bucket sequence counter inside
//! [`BucketAllocator`] is the only serialization point.

mod allocator;
mod handler;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::prompts::{Prompt, load_prompts};

pub use allocator::BucketAllocator;

/// Upper bound on an upload body; larger requests are refused before
/// buffering. Tunable per deployment, not part of the protocol.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

pub struct ServeOptions {
    pub listen: String,
    pub prompts: PathBuf,
    pub storage_root: PathBuf,
    pub max_upload_bytes: usize,
}

/// Shared request-handler state; immutable after startup apart from the
/// allocator's counters.
pub struct AppState {
    sentences: HashMap<String, String>,
    allocator: BucketAllocator,
}

impl AppState {
    pub fn new(prompts: &[Prompt], allocator: BucketAllocator) -> Self {
        Self {
            sentences: prompts
                .iter()
                .map(|p| (p.id.clone(), p.text.clone()))
                .collect(),
            allocator,
        }
    }
}

fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/sentences.json", get(handler::list_sentences))
        .route("/upload/:bucket", post(handler::handle_upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Load the prompts, reconcile storage, and serve until shutdown.
pub async fn run(opts: ServeOptions) -> Result<()> {
    let prompts = load_prompts(&opts.prompts)?;
    let allocator = BucketAllocator::scan(&opts.storage_root, &prompts)?;
    info!(
        prompts = prompts.len(),
        buckets = allocator.bucket_count(),
        "prompt set loaded"
    );

    let state = Arc::new(AppState::new(&prompts, allocator));
    let app = router(state, opts.max_upload_bytes);

    let listener = TcpListener::bind(&opts.listen)
        .await
        .with_context(|| format!("failed to bind {}", opts.listen))?;
    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app.into_make_service())
        .await
        .context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::Path;

    /// Boot the real router on an ephemeral port over a scratch storage
    /// tree, returning the base URL.
    async fn serve(prompt_lines: &str, root: &Path, max_upload_bytes: usize) -> String {
        let prompt_file = root.join("sentences.txt");
        std::fs::write(&prompt_file, prompt_lines).unwrap();

        let prompts = load_prompts(&prompt_file).unwrap();
        let allocator = BucketAllocator::scan(&root.join("uploads"), &prompts).unwrap();
        let state = Arc::new(AppState::new(&prompts, allocator));
        let app = router(state, max_upload_bytes);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_record_and_upload_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve(
            "greeting hello world\n",
            dir.path(),
            DEFAULT_MAX_UPLOAD_BYTES,
        )
        .await;
        let client = reqwest::Client::new();

        let sentences: HashMap<String, String> = client
            .get(format!("{}/sentences.json", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences.get("greeting").unwrap(), "hello world");

        let body = b"0123456789".to_vec();
        for expected in ["0000.wav", "0001.wav"] {
            let response = client
                .post(format!("{}/upload/greeting", base))
                .header("content-type", "audio/wav")
                .header("uid", "test-session")
                .body(body.clone())
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 200);
            assert_eq!(response.text().await.unwrap(), "Thanks for your contribution!");

            let stored =
                std::fs::read(dir.path().join("uploads/greeting").join(expected)).unwrap();
            assert_eq!(stored, body);
        }
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_a_404_with_no_write() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve("greeting hello world\n", dir.path(), DEFAULT_MAX_UPLOAD_BYTES).await;

        let response = reqwest::Client::new()
            .post(format!("{}/upload/stranger", base))
            .header("content-type", "audio/wav")
            .body(b"0123456789".to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.text().await.unwrap(), "Bad bucket");
        assert!(!dir.path().join("uploads/stranger").exists());
    }

    #[tokio::test]
    async fn test_oversized_bodies_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve("greeting hello world\n", dir.path(), 16).await;

        let response = reqwest::Client::new()
            .post(format!("{}/upload/greeting", base))
            .header("content-type", "audio/wav")
            .body(vec![0u8; 64])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 413);

        // The reservation never happened, so the next upload is 0000.
        let response = reqwest::Client::new()
            .post(format!("{}/upload/greeting", base))
            .header("content-type", "audio/wav")
            .body(vec![0u8; 10])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(dir.path().join("uploads/greeting/0000.wav").exists());
    }
}
