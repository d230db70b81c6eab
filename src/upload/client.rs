use std::pin::Pin;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures_util::stream;
use reqwest::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;
use super::errors::TransportError;
use super::progress_stream::ProgressStream;
use super::transport::{ProgressSink, Uploader};
use super::types::{FileDescriptor, FileSource, UploadPolicy, UploadResult};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

type FileStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// The node answers with the stored file records, usually a one-element list.
#[derive(Deserialize)]
#[serde(untagged)]
enum ServerReply {
    Many(Vec<UploadResult>),
    One(UploadResult),
}

impl ServerReply {
    fn into_result(self) -> Result<UploadResult, TransportError> {
        match self {
            Self::One(result) => Ok(result),
            Self::Many(results) => results
                .into_iter()
                .next()
                .ok_or_else(|| TransportError::InvalidResponse("empty file list".to_string())),
        }
    }
}

/// Uploads the raw file body (no multipart) to the policy endpoint.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    chunk_size: usize,
}

impl Default for HttpUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpUploader {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn open(&self, descriptor: &FileDescriptor) -> Result<FileStream, TransportError> {
        match &descriptor.source {
            FileSource::Path(path) => {
                let file = File::open(path).await?;
                Ok(Box::pin(ReaderStream::with_capacity(file, self.chunk_size)))
            }
            FileSource::Memory(data) => {
                let chunks: Vec<std::io::Result<Bytes>> = data
                    .chunks(self.chunk_size)
                    .map(|chunk| Ok(data.slice_ref(chunk)))
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
            FileSource::Detached => Err(TransportError::Io(format!(
                "no local content for {}",
                descriptor.name
            ))),
        }
    }

    pub fn content_disposition(file_name: &str) -> Result<HeaderValue, TransportError> {
        let escaped = file_name.replace('\\', "\\\\").replace('"', "\\\"");
        Ok(HeaderValue::from_bytes(format!("attachment; filename=\"{}\"", escaped).as_bytes())?)
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(
        &self,
        descriptor: &FileDescriptor,
        policy: &UploadPolicy,
        progress: ProgressSink,
    ) -> Result<UploadResult, TransportError> {
        let stream = self.open(descriptor).await?;
        let body = Body::wrap_stream(ProgressStream::new(stream, progress));

        let mut headers = policy.headers().clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(&descriptor.content_type)?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(descriptor.size));
        headers.insert(CONTENT_DISPOSITION, Self::content_disposition(&descriptor.name)?);

        debug!(file = %descriptor.name, endpoint = %policy.endpoint(), "posting file");
        let response = self.client
            .post(policy.endpoint().clone())
            .headers(headers)
            .body(body)
            .send()
            .await?;

        // 验证响应
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::server_error(status.as_u16(), message));
        }

        let payload = response.bytes().await?;
        let reply: ServerReply = serde_json::from_slice(&payload)?;
        reply.into_result()
    }
}
