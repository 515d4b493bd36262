//! Inbound upload parsing
//!
//! The file part is spooled to an anonymous temporary file while the form is
//! read, so validation can see every field without holding the upload in
//! memory.

use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::http::StatusCode;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::error::RelayError;
use super::{FilePart, JD_TEXT_FIELD, RESUME_FILE_FIELD};

/// A parsed upload: job description plus the spooled resume
#[derive(Debug)]
pub struct UploadRequest {
    pub jd_text: String,
    pub resume: ResumeFile,
}

/// Resume file spooled to disk
#[derive(Debug)]
pub struct ResumeFile {
    pub filename: String,
    pub content_type: Option<String>,
    spool: File,
}

impl ResumeFile {
    /// Spool an in-memory buffer, mostly useful when calling the relay directly
    pub async fn from_bytes(
        filename: impl Into<String>,
        content_type: Option<String>,
        data: &[u8],
    ) -> Result<Self, RelayError> {
        let mut spool = new_spool()?;
        spool.write_all(data).await.map_err(upload_read)?;
        spool.flush().await.map_err(upload_read)?;

        Ok(Self {
            filename: filename.into(),
            content_type,
            spool,
        })
    }

    async fn from_field(mut field: Field<'_>) -> Result<Self, RelayError> {
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);

        let mut spool = new_spool()?;
        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            size += chunk.len() as u64;
            spool.write_all(&chunk).await.map_err(upload_read)?;
        }
        spool.flush().await.map_err(upload_read)?;

        tracing::debug!(filename = %filename, size, "Spooled resume upload");

        Ok(Self {
            filename,
            content_type,
            spool,
        })
    }

    /// Rewind the spool and hand it out as a relay source
    pub async fn into_file_part(self) -> Result<FilePart<File>, RelayError> {
        let mut spool = self.spool;
        spool.rewind().await.map_err(upload_read)?;

        Ok(FilePart {
            filename: self.filename,
            content_type: self.content_type,
            reader: spool,
        })
    }
}

impl UploadRequest {
    /// Parse the form, treating a non-multipart body as an empty form
    pub async fn from_extracted(
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Self, RelayError> {
        match multipart {
            Ok(multipart) => Self::from_multipart(multipart).await,
            Err(rejection) => {
                tracing::debug!("Request is not a multipart form: {rejection}");
                Err(RelayError::MissingField(JD_TEXT_FIELD))
            }
        }
    }

    /// Read every field of the form. The first occurrence of a field wins,
    /// a `resume_file` part only counts when it carries a filename, and
    /// unknown fields are skipped. A malformed body is treated as an empty
    /// form.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, RelayError> {
        let mut jd_text: Option<String> = None;
        let mut resume: Option<ResumeFile> = None;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_string);
            let has_filename = field.file_name().is_some();

            match name.as_deref() {
                Some(JD_TEXT_FIELD) if jd_text.is_none() => {
                    jd_text = Some(field.text().await.map_err(multipart_error)?);
                }
                Some(RESUME_FILE_FIELD) if resume.is_none() && has_filename => {
                    resume = Some(ResumeFile::from_field(field).await?);
                }
                other => {
                    tracing::trace!("Skipping form field {other:?}");
                }
            }
        }

        let jd_text = jd_text
            .filter(|text| !text.is_empty())
            .ok_or(RelayError::MissingField(JD_TEXT_FIELD))?;
        let resume = resume.ok_or(RelayError::MissingField(RESUME_FILE_FIELD))?;

        Ok(Self { jd_text, resume })
    }

    /// Split into the relay inputs
    pub async fn into_parts(self) -> Result<(String, FilePart<File>), RelayError> {
        let file = self.resume.into_file_part().await?;
        Ok((self.jd_text, file))
    }
}

fn new_spool() -> Result<File, RelayError> {
    let file = tempfile::tempfile().map_err(upload_read)?;
    Ok(File::from_std(file))
}

fn upload_read(err: std::io::Error) -> RelayError {
    RelayError::UploadRead(err.to_string())
}

/// A form that cannot be parsed yields no fields at all, so anything other
/// than a size overflow reads as a missing `jd_text`.
fn multipart_error(err: MultipartError) -> RelayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::PayloadTooLarge(err.body_text())
    } else {
        tracing::debug!("Malformed multipart body: {}", err.body_text());
        RelayError::MissingField(JD_TEXT_FIELD)
    }
}
