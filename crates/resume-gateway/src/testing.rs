//! Test utilities for the gateway - multipart builders and readers
//!
//! This module provides utilities shared by unit and integration tests:
//! - A builder for inbound `multipart/form-data` request bodies, including
//!   deliberately malformed ones
//! - A reader for the bodies the scoring service receives

use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{Request, header};
use bytes::Bytes;

/// Boundary used by [`MultipartBuilder`]
pub const TEST_BOUNDARY: &str = "gateway-test-boundary";

/// Builds `multipart/form-data` bodies for test requests.
#[derive(Debug, Clone, Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part(&format!(
            "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
        ));
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Append a file field
    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.open_part(&format!(
            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        ));
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// The `Content-Type` header value matching [`MultipartBuilder::build`]
    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={TEST_BOUNDARY}")
    }

    /// Finish the body with the closing boundary
    pub fn build(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{TEST_BOUNDARY}--\r\n").as_bytes());
        self.body
    }

    fn open_part(&mut self, headers: &str) {
        self.body
            .extend_from_slice(format!("--{TEST_BOUNDARY}\r\n{headers}").as_bytes());
    }
}

/// One decoded part of a multipart body
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FormPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Decode a complete multipart body into its parts, in order.
///
/// Returns `None` if the body is not a well formed form.
pub async fn read_form(content_type: &str, body: impl Into<Bytes>) -> Option<Vec<FormPart>> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body.into()))
        .ok()?;
    let mut multipart = Multipart::from_request(request, &()).await.ok()?;

    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.ok()? {
        let name = field.name()?.to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.ok()?.to_vec();

        parts.push(FormPart {
            name,
            filename,
            content_type,
            data,
        });
    }

    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_output_reads_back() {
        let body = MultipartBuilder::new()
            .text("jd_text", "Build streaming systems")
            .file("resume_file", "cv.pdf", "application/pdf", b"%PDF-1.4\x00\x01")
            .build();

        let parts = read_form(&MultipartBuilder::content_type(), body)
            .await
            .unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "jd_text");
        assert_eq!(parts[0].text(), "Build streaming systems");
        assert!(parts[0].filename.is_none());
        assert_eq!(parts[1].name, "resume_file");
        assert_eq!(parts[1].filename.as_deref(), Some("cv.pdf"));
        assert_eq!(parts[1].content_type.as_deref(), Some("application/pdf"));
        assert_eq!(parts[1].data, b"%PDF-1.4\x00\x01");
    }

    #[tokio::test]
    async fn test_truncated_body_rejected() {
        let mut body = MultipartBuilder::new().text("jd_text", "x").build();
        body.truncate(body.len() - 8);

        assert!(
            read_form(&MultipartBuilder::content_type(), body)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_wrong_content_type_rejected() {
        let body = MultipartBuilder::new().text("jd_text", "x").build();
        assert!(read_form("application/json", body).await.is_none());
    }
}
