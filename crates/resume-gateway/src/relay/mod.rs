//! Streaming multipart relay
//!
//! Re-encodes an inbound upload into a fresh multipart request, streaming
//! the file through a bounded pipe rather than buffering it. The request goes
//! to the scoring service and the reply comes back buffered or chunk by chunk.

mod client;
mod error;
mod pipe;
mod producer;
mod stream;
mod upload;

pub use client::{
    BufferedResponse, DEFAULT_FILE_CONTENT_TYPE, DownstreamStream, JSON_CONTENT_TYPE, RelayMode,
    ScoringRelay,
};
pub use error::RelayError;
pub use pipe::{PipeReader, PipeWriter, body_pipe};
pub use producer::{FILE_CHUNK_SIZE, ProducerGuard, produce_file};
pub use stream::{RelayStream, STREAM_ERROR_EVENT};
pub use upload::{ResumeFile, UploadRequest};

/// Form field carrying the job description
pub const JD_TEXT_FIELD: &str = "jd_text";
/// Form field carrying the resume file
pub const RESUME_FILE_FIELD: &str = "resume_file";

/// A readable file source plus the metadata forwarded with it
#[derive(Debug)]
pub struct FilePart<R> {
    pub filename: String,
    pub content_type: Option<String>,
    pub reader: R,
}

impl<R> FilePart<R> {
    pub fn new(filename: impl Into<String>, reader: R) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            reader,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}
