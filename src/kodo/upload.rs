use reqwest::{Body, multipart};
use std::future::Future;
use std::path::Path;
use tokio::fs::File;
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{debug, info};

use super::error::{PublishError, Result};

/// Status and body returned by the upload host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub status_code: u16,
    pub body: String,
}

impl UploadResult {
    /// Only HTTP 200 counts as a stored object
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Turn a non-200 response into an error carrying the provider body
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PublishError::Rejected {
                status: self.status_code,
                body: self.body,
            })
        }
    }
}

/// Something that can store a local file under a remote key
pub trait ObjectStore {
    fn put_file(
        &self,
        token: &str,
        key: &str,
        local_path: &Path,
    ) -> impl Future<Output = Result<UploadResult>> + Send;
}

/// Kodo form-upload client
#[derive(Debug, Clone)]
pub struct KodoClient {
    client: reqwest::Client,
    upload_host: String,
}

impl KodoClient {
    pub fn new(upload_host: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().use_rustls_tls().build()?;

        Ok(Self {
            client,
            upload_host: upload_host.into(),
        })
    }
}

impl ObjectStore for KodoClient {
    /// Upload a file with a multipart form carrying `token`, `key` and `file`
    async fn put_file(&self, token: &str, key: &str, local_path: &Path) -> Result<UploadResult> {
        let file = File::open(local_path)
            .await
            .map_err(|e| PublishError::io(local_path, e))?;
        let file_size = file
            .metadata()
            .await
            .map_err(|e| PublishError::io(local_path, e))?
            .len();

        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| key.to_string());

        // Stream the file instead of buffering it
        let body = Body::wrap_stream(FramedRead::new(file, BytesCodec::new()));
        let part = multipart::Part::stream_with_length(body, file_size).file_name(file_name);

        let form = multipart::Form::new()
            .text("token", token.to_string())
            .text("key", key.to_string())
            .part("file", part);

        debug!("POST {} key={} ({} bytes)", self.upload_host, key, file_size);

        let response = self
            .client
            .post(&self.upload_host)
            .multipart(form)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let body = response.text().await?;

        info!("Upload of {} answered {}", key, status_code);

        Ok(UploadResult { status_code, body })
    }
}
