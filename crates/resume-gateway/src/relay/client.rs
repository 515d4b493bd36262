//! Outbound half of the relay: one multipart request per upload

use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tokio::io::AsyncRead;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};

use super::error::RelayError;
use super::pipe::body_pipe;
use super::producer::{ProducerGuard, produce_file};
use super::stream::RelayStream;
use super::{FilePart, JD_TEXT_FIELD, RESUME_FILE_FIELD};

/// Content type of every buffered relay response
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Content type used for the file part when the upload did not declare one
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Downstream body stream carried by a streamed relay
pub type DownstreamStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Which scoring endpoint a relay targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// One-shot scoring, response buffered
    Buffered,
    /// Streamed scoring, response forwarded chunk by chunk
    Streamed,
}

impl RelayMode {
    fn path(self, config: &UpstreamConfig) -> &str {
        match self {
            RelayMode::Buffered => &config.score_path,
            RelayMode::Streamed => &config.stream_path,
        }
    }

    fn timeout(self, config: &UpstreamConfig) -> Duration {
        match self {
            RelayMode::Buffered => Duration::from_secs(config.timeout_secs),
            RelayMode::Streamed => Duration::from_secs(config.stream_timeout_secs),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelayMode::Buffered => "buffered",
            RelayMode::Streamed => "streamed",
        }
    }
}

/// A fully buffered downstream response
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub content_type: HeaderValue,
    pub body: Bytes,
}

/// Relays uploads to the scoring service.
///
/// Cheap to clone; the inner `reqwest::Client` shares its connection pool.
#[derive(Debug, Clone)]
pub struct ScoringRelay {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl ScoringRelay {
    /// Build a relay with its own HTTP client. Per-request deadlines are set
    /// on each call, so the client only carries the connect timeout.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: UpstreamConfig) -> Self {
        Self { client, config }
    }

    /// Resolve the endpoint URL for a mode
    pub fn endpoint(&self, mode: RelayMode) -> std::result::Result<Url, RelayError> {
        let base = self.config.ml_url.trim_end_matches('/');
        let path = mode.path(&self.config);
        let raw = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };

        let url = Url::parse(&raw)
            .map_err(|e| RelayError::RequestBuild(format!("invalid scoring URL '{raw}': {e}")))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(RelayError::RequestBuild(format!(
                "unsupported URL scheme '{scheme}' in '{raw}'"
            ))),
        }
    }

    /// Relay an upload to the one-shot endpoint and buffer the reply
    pub async fn relay_buffered<R>(
        &self,
        jd_text: String,
        file: FilePart<R>,
    ) -> std::result::Result<BufferedResponse, RelayError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (response, _producer) = self.dispatch(RelayMode::Buffered, jd_text, file).await?;
        let status = response.status();

        let body = response.bytes().await.map_err(|e| {
            RelayError::UpstreamUnreachable(format!("failed to read response body: {e}"))
        })?;

        tracing::debug!(status = %status, bytes = body.len(), "Buffered relay complete");

        Ok(BufferedResponse {
            status,
            content_type: HeaderValue::from_static(JSON_CONTENT_TYPE),
            body,
        })
    }

    /// Relay an upload to the streaming endpoint. The returned stream yields
    /// the downstream body as it arrives.
    pub async fn relay_streamed<R>(
        &self,
        jd_text: String,
        file: FilePart<R>,
    ) -> std::result::Result<RelayStream<DownstreamStream>, RelayError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (response, producer) = self.dispatch(RelayMode::Streamed, jd_text, file).await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Scoring stream returned non-success status");
        }

        Ok(
            RelayStream::new(response.bytes_stream().boxed(), self.config.stream_error_sentinel)
                .with_producer(producer),
        )
    }

    /// Validate, build the form, spawn the producer and send the request.
    ///
    /// `jd_text` goes out as the first part and the file as the second, its
    /// bytes pulled from the pipe as the producer reads them. The producer
    /// guard is returned so the caller decides how long the body may keep
    /// flowing.
    async fn dispatch<R>(
        &self,
        mode: RelayMode,
        jd_text: String,
        file: FilePart<R>,
    ) -> std::result::Result<(reqwest::Response, ProducerGuard), RelayError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        if jd_text.is_empty() {
            return Err(RelayError::MissingField(JD_TEXT_FIELD));
        }

        let url = self.endpoint(mode)?;
        tracing::debug!(mode = mode.as_str(), url = %url, filename = %file.filename, "Relaying upload");

        let (pipe, reader) = body_pipe(self.config.pipe_capacity);
        let file_part = Part::stream(reader.into_body())
            .file_name(escape_quotes(&file.filename))
            .mime_str(
                file.content_type
                    .as_deref()
                    .unwrap_or(DEFAULT_FILE_CONTENT_TYPE),
            )
            .map_err(|e| RelayError::RequestBuild(format!("invalid file content type: {e}")))?;

        // Filenames go out quoted as uploaded rather than in RFC 5987 form.
        let form = Form::new()
            .percent_encode_noop()
            .text(JD_TEXT_FIELD, jd_text)
            .part(RESUME_FILE_FIELD, file_part);

        let producer = ProducerGuard::spawn(produce_file(pipe, file.reader));

        let response = self
            .client
            .post(url)
            .timeout(mode.timeout(&self.config))
            .multipart(form)
            .send()
            .await
            .map_err(RelayError::from_transport)?;

        tracing::debug!(mode = mode.as_str(), status = %response.status(), "Scoring service responded");

        Ok((response, producer))
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
