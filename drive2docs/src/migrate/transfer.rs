use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use drive2docs_core::UploadSession;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;

const SERVER_SIDE_ENCRYPTION_HEADER: &str = "x-amz-server-side-encryption";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
}

#[derive(Clone)]
pub struct TransferClient {
    http: Client,
    download_limit: Arc<Semaphore>,
    upload_limit: Arc<Semaphore>,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub download_concurrency: usize,
    pub upload_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 4,
            upload_concurrency: 2,
        }
    }
}

impl TransferConfig {
    pub fn for_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            download_concurrency: workers,
            upload_concurrency: workers,
        }
    }
}

impl TransferClient {
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    pub fn with_config(config: TransferConfig) -> Self {
        Self {
            http: Client::new(),
            download_limit: Arc::new(Semaphore::new(config.download_concurrency.max(1))),
            upload_limit: Arc::new(Semaphore::new(config.upload_concurrency.max(1))),
        }
    }

    /// Streams `response` into `target` through a `.partial` sibling and
    /// returns the number of bytes written. Nothing is left behind on failure.
    pub async fn download_to_path(
        &self,
        response: Response,
        target: &Path,
        modified: Option<SystemTime>,
    ) -> Result<u64, TransferError> {
        let _permit = self
            .download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        match write_partial(response, &partial, modified).await {
            Ok(written) => {
                tokio::fs::rename(&partial, target).await?;
                Ok(written)
            }
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(err)
            }
        }
    }

    pub async fn upload_from_path(
        &self,
        session: &UploadSession,
        source: &Path,
        content_type: &str,
        encryption: &str,
    ) -> Result<(), TransferError> {
        let _permit = self
            .upload_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;
        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let mut request = self
            .http
            .put(session.upload_url.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, length)
            .header(SERVER_SIDE_ENCRYPTION_HEADER, encryption);
        for (name, value) in &session.signed_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request.body(body).send().await?.error_for_status()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn with_http(http: Client) -> Self {
        let config = TransferConfig::default();
        Self {
            http,
            download_limit: Arc::new(Semaphore::new(config.download_concurrency)),
            upload_limit: Arc::new(Semaphore::new(config.upload_concurrency)),
        }
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_partial(
    response: Response,
    partial: &Path,
    modified: Option<SystemTime>,
) -> Result<u64, TransferError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    if let Some(modified) = modified {
        let file = file.into_std().await;
        tokio::task::spawn_blocking(move || file.set_modified(modified))
            .await
            .map_err(io::Error::other)??;
    }
    Ok(written)
}

/// Unix seconds to a file time; `None` for unknown or non-positive stamps.
pub fn system_time_from_unix(seconds: Option<i64>) -> Option<SystemTime> {
    let seconds = u64::try_from(seconds?).ok().filter(|s| *s > 0)?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(seconds))
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

pub fn is_partial(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "partial")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use url::Url;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch(server: &MockServer, route: &str) -> Response {
        reqwest::get(format!("{}{route}", server.uri())).await.unwrap()
    }

    #[tokio::test]
    async fn downloads_response_to_target_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/out.txt");
        let client = TransferClient::new();

        let written = client
            .download_to_path(fetch(&server, "/file").await, &target, None)
            .await
            .unwrap();

        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn download_sets_modified_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("stamped.bin");
        let stamp = system_time_from_unix(Some(1_700_000_000)).unwrap();

        TransferClient::new()
            .download_to_path(fetch(&server, "/file").await, &target, Some(stamp))
            .await
            .unwrap();

        let modified = std::fs::metadata(&target).unwrap().modified().unwrap();
        assert_eq!(modified, stamp);
    }

    #[tokio::test]
    async fn uploads_file_with_encryption_and_signed_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .and(header("content-type", "application/pdf"))
            .and(header("x-amz-server-side-encryption", "AES256"))
            .and(header("x-signed", "yes"))
            .and(body_bytes(b"payload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("in.pdf");
        std::fs::write(&source, b"payload").unwrap();
        let session = UploadSession {
            document_id: "doc".into(),
            version_id: "ver".into(),
            upload_url: Url::parse(&format!("{}/upload", server.uri())).unwrap(),
            signed_headers: HashMap::from([("x-signed".to_string(), "yes".to_string())]),
        };

        TransferClient::new()
            .upload_from_path(&session, &source, "application/pdf", "AES256")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_failure_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("in.bin");
        std::fs::write(&source, b"payload").unwrap();
        let session = UploadSession {
            document_id: "doc".into(),
            version_id: "ver".into(),
            upload_url: Url::parse(&format!("{}/upload", server.uri())).unwrap(),
            signed_headers: HashMap::new(),
        };

        let err = TransferClient::with_http(Client::new())
            .upload_from_path(&session, &source, "application/octet-stream", "AES256")
            .await
            .expect_err("expected 403");
        assert!(matches!(err, TransferError::Request(_)));
    }

    #[test]
    fn unix_stamps_must_be_positive() {
        assert_eq!(system_time_from_unix(None), None);
        assert_eq!(system_time_from_unix(Some(0)), None);
        assert_eq!(system_time_from_unix(Some(-5)), None);
        assert!(system_time_from_unix(Some(1)).is_some());
    }

    #[test]
    fn partial_path_keeps_original_extension() {
        let partial = partial_path(Path::new("/tmp/Q1.pdf"));
        assert_eq!(partial, PathBuf::from("/tmp/Q1.pdf.partial"));
        assert!(is_partial(&partial));
        assert!(!is_partial(Path::new("/tmp/Q1.pdf")));
    }
}
