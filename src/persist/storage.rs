use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument};

use super::sigv4::{uri_encode, AwsCredentials, SigV4Signer};
use crate::error::PipelineError;

pub type SharedObjectStore = Arc<dyn ObjectStore>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `local_file` to `bucket/key`; returns the storage URI.
    async fn upload(&self, local_file: &Path, bucket: &str, key: &str)
        -> Result<String, PipelineError>;
}

/// S3 (or S3-compatible) object store using signed `PutObject` requests.
pub struct S3ObjectStore {
    http: reqwest::Client,
    signer: SigV4Signer,
    region: String,
    endpoint_url: Option<String>,
}

impl S3ObjectStore {
    pub fn new(credentials: AwsCredentials, region: &str, endpoint_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            signer: SigV4Signer::new(credentials, region, "s3"),
            region: region.to_string(),
            endpoint_url,
        }
    }

    /// Virtual-hosted addressing on AWS; path-style against a custom endpoint.
    fn target(&self, bucket: &str, key: &str) -> (String, String, String) {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        match &self.endpoint_url {
            Some(endpoint) => {
                let scheme = if endpoint.starts_with("http://") { "http" } else { "https" };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                let path = format!("/{}/{}", uri_encode(bucket), encoded_key);
                (format!("{scheme}://{host}{path}"), host, path)
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", bucket, self.region);
                let path = format!("/{}", encoded_key);
                (format!("https://{host}{path}"), host, path)
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, local_file), fields(file = %local_file.display()))]
    async fn upload(
        &self,
        local_file: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<String, PipelineError> {
        let body = tokio::fs::read(local_file).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                PipelineError::NotFound(local_file.to_path_buf())
            } else {
                PipelineError::io(local_file, err)
            }
        })?;

        let (url, host, path) = self.target(bucket, key);
        let headers = self.signer.sign("PUT", &host, &path, &body, Utc::now());

        let mut request = self
            .http
            .put(&url)
            .header("content-type", "text/markdown; charset=utf-8");
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|err| PipelineError::remote("S3 PutObject", err))?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::remote(
                "S3 PutObject",
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        let uri = format!("s3://{bucket}/{key}");
        info!(%uri, "Uploaded document");
        Ok(uri)
    }
}
