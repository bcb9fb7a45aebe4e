//! Upload and listing handlers
//!
//! The upload path is: resolve the container extension from the declared
//! content type, reserve a sequence number, write the payload with
//! create-exclusive semantics, fsync, and only then acknowledge. The
//! create-exclusive open is a second line of defense: even if the
//! allocator ever handed out a duplicate, the write would fail instead of
//! overwriting a contribution.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use super::AppState;
use super::allocator::sequence_filename;

const ACK_BODY: &str = "Thanks for your contribution!";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Bad bucket")]
    UnknownBucket,
    #[error("Failed to store recording")]
    Write(#[source] std::io::Error),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::UnknownBucket => StatusCode::NOT_FOUND,
            UploadError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// `GET /sentences.json`: the bucket-id to sentence map, stable for the
/// process lifetime.
pub(super) async fn list_sentences(
    State(state): State<Arc<AppState>>,
) -> Json<HashMap<String, String>> {
    Json(state.sentences.clone())
}

/// `POST /upload/:bucket`: store one contribution.
pub(super) async fn handle_upload(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, UploadError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let uid = headers
        .get("uid")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    let (seq, dir) = state
        .allocator
        .allocate(&bucket)
        .ok_or(UploadError::UnknownBucket)?;
    let path = dir.join(sequence_filename(seq, extension_for(content_type)));

    write_exclusive(&path, &body).await.map_err(|e| {
        error!(file = %path.display(), error = %e, "failed to store upload");
        UploadError::Write(e)
    })?;

    info!(
        bucket = %bucket,
        file = %path.display(),
        bytes = body.len(),
        uid = uid,
        "stored contribution"
    );
    Ok(ACK_BODY)
}

/// Container extension for a declared content type; first match wins.
pub(super) fn extension_for(content_type: &str) -> &'static str {
    if content_type.starts_with("audio/webm") {
        ".webm"
    } else if content_type.starts_with("audio/mp4a") {
        ".m4a"
    } else {
        ".wav"
    }
}

/// Write `body` to a file that must not already exist, durably.
async fn write_exclusive(path: &std::path::Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(body).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::Prompt;
    use crate::server::BucketAllocator;

    fn state(root: &std::path::Path) -> Arc<AppState> {
        let prompts = vec![Prompt {
            id: "greeting".to_string(),
            text: "hello world".to_string(),
        }];
        let allocator = BucketAllocator::scan(root, &prompts).unwrap();
        Arc::new(AppState::new(&prompts, allocator))
    }

    fn wav_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "audio/wav".parse().unwrap());
        headers
    }

    #[test]
    fn test_extension_mapping_first_match_wins() {
        assert_eq!(extension_for("audio/webm"), ".webm");
        assert_eq!(extension_for("audio/webm;codecs=opus"), ".webm");
        assert_eq!(extension_for("audio/mp4a-latm"), ".m4a");
        assert_eq!(extension_for("audio/wav"), ".wav");
        assert_eq!(extension_for("audio/ogg"), ".wav");
        assert_eq!(extension_for(""), ".wav");
    }

    #[tokio::test]
    async fn test_uploads_are_numbered_in_order() {
        let root = tempfile::tempdir().unwrap();
        let state = state(root.path());

        for expected in ["0000.wav", "0001.wav"] {
            let ack = handle_upload(
                State(Arc::clone(&state)),
                Path("greeting".to_string()),
                wav_headers(),
                Bytes::from_static(b"0123456789"),
            )
            .await
            .unwrap();
            assert_eq!(ack, ACK_BODY);

            let stored = std::fs::read(root.path().join("greeting").join(expected)).unwrap();
            assert_eq!(stored, b"0123456789");
        }
    }

    #[tokio::test]
    async fn test_content_type_picks_the_extension() {
        let root = tempfile::tempdir().unwrap();
        let state = state(root.path());

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "audio/webm;codecs=opus".parse().unwrap());
        handle_upload(
            State(Arc::clone(&state)),
            Path("greeting".to_string()),
            headers,
            Bytes::from_static(b"blob"),
        )
        .await
        .unwrap();

        assert!(root.path().join("greeting/0000.webm").exists());
    }

    #[tokio::test]
    async fn test_unknown_bucket_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let state = state(root.path());

        let result = handle_upload(
            State(Arc::clone(&state)),
            Path("stranger".to_string()),
            wav_headers(),
            Bytes::from_static(b"0123456789"),
        )
        .await;
        assert!(matches!(result, Err(UploadError::UnknownBucket)));

        // No directory appeared and the known bucket only holds its sidecar.
        assert!(!root.path().join("stranger").exists());
        let entries: Vec<_> = std::fs::read_dir(root.path().join("greeting"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["sentence.txt"]);
    }
}
