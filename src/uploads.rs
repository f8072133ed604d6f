use std::collections::HashMap;

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use crate::error::AppError;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const PDF_MIME: &str = "application/pdf";

const TEMPLATE_MIMES: &[&str] = &[
    PDF_MIME,
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("{field} file is required")]
    Missing { field: &'static str },
    #[error("uploaded file is empty")]
    Empty,
    #[error("{0}")]
    UnsupportedType(&'static str),
    #[error("file exceeds the {limit_mb} MB limit")]
    TooLarge { limit_mb: usize },
    #[error("invalid multipart data: {0}")]
    Malformed(String),
}

impl From<UploadError> for AppError {
    fn from(value: UploadError) -> Self {
        match value {
            UploadError::TooLarge { .. } => AppError::payload_too_large(value.to_string()),
            other => AppError::bad_request(other.to_string()),
        }
    }
}

impl From<MultipartError> for UploadError {
    fn from(value: MultipartError) -> Self {
        if value.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge {
                limit_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
            }
        } else {
            UploadError::Malformed(value.body_text())
        }
    }
}

/// What a given upload slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    ContractTemplate,
}

impl UploadKind {
    fn rejection(self) -> &'static str {
        match self {
            UploadKind::Pdf => "Only PDF files are allowed",
            UploadKind::ContractTemplate => "Only PDF, DOC or DOCX templates are allowed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Content type to store: the declared one, else a guess from the name.
    pub fn effective_content_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|value| value != "application/octet-stream")
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            })
    }

    pub fn extension(&self) -> &'static str {
        match self.effective_content_type().as_str() {
            "application/msword" => "doc",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
            _ => "pdf",
        }
    }

    pub fn validate(&self, kind: UploadKind) -> Result<(), UploadError> {
        let accepted = match kind {
            UploadKind::Pdf => self.content_type.as_deref() == Some(PDF_MIME),
            UploadKind::ContractTemplate => {
                TEMPLATE_MIMES.contains(&self.effective_content_type().as_str())
            }
        };
        if !accepted {
            return Err(UploadError::UnsupportedType(kind.rejection()));
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge {
                limit_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
            });
        }
        if self.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        Ok(())
    }
}

/// A buffered multipart body: the file under `file_field` plus text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, UploadError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(|n| n.to_string());
            match name.as_deref() {
                Some(name) if name == file_field => {
                    let file_name = field
                        .file_name()
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| format!("{file_field}.pdf"));
                    let content_type = field.content_type().map(|mime| mime.to_string());
                    let bytes = field.bytes().await?;
                    form.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                Some(name) => {
                    let name = name.to_string();
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
                None => {}
            }
        }
        Ok(form)
    }

    pub fn take_file(
        &mut self,
        field: &'static str,
        kind: UploadKind,
    ) -> Result<UploadedFile, UploadError> {
        let file = self.file.take().ok_or(UploadError::Missing { field })?;
        if let Err(err) = file.validate(kind) {
            warn!(
                file_name = %file.file_name,
                content_type = ?file.content_type,
                size_bytes = file.bytes.len(),
                error = %err,
                "upload rejected"
            );
            return Err(err);
        }
        Ok(file)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.text(name)
            .is_some_and(|value| value.eq_ignore_ascii_case("true") || value == "1")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

pub fn content_disposition(disposition: Disposition, filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' | '\r' | '\n' => '_',
            _ => ch,
        })
        .collect();
    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    format!("{kind}; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

/// Streams a stored PDF back to the caller.
pub fn pdf_response(
    bytes: Vec<u8>,
    disposition: Disposition,
    filename: &str,
) -> Result<Response, AppError> {
    let header = HeaderValue::from_str(&content_disposition(disposition, filename))
        .map_err(AppError::internal)?;
    let length = bytes.len();
    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PDF_MIME));
    headers.insert(CONTENT_DISPOSITION, header);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(content_type: Option<&str>, name: &str, size: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: vec![b'%'; size],
        }
    }

    #[test]
    fn pdf_slot_requires_declared_pdf_type() {
        assert!(file(Some(PDF_MIME), "c.pdf", 10).validate(UploadKind::Pdf).is_ok());
        assert_eq!(
            file(Some("image/png"), "c.pdf", 10).validate(UploadKind::Pdf),
            Err(UploadError::UnsupportedType("Only PDF files are allowed"))
        );
        assert!(file(None, "c.pdf", 10).validate(UploadKind::Pdf).is_err());
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(file(Some(PDF_MIME), "c.pdf", MAX_UPLOAD_BYTES)
            .validate(UploadKind::Pdf)
            .is_ok());
        let err = file(Some(PDF_MIME), "c.pdf", MAX_UPLOAD_BYTES + 1)
            .validate(UploadKind::Pdf)
            .unwrap_err();
        assert_eq!(AppError::from(err).status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn empty_files_are_rejected() {
        assert_eq!(
            file(Some(PDF_MIME), "c.pdf", 0).validate(UploadKind::Pdf),
            Err(UploadError::Empty)
        );
    }

    #[test]
    fn templates_accept_word_documents_by_extension() {
        let docx = file(Some("application/octet-stream"), "template.docx", 5);
        assert!(docx.validate(UploadKind::ContractTemplate).is_ok());
        assert_eq!(docx.extension(), "docx");
        assert!(file(Some("text/plain"), "notes.txt", 5)
            .validate(UploadKind::ContractTemplate)
            .is_err());
    }

    #[test]
    fn disposition_headers_escape_names() {
        assert_eq!(
            content_disposition(Disposition::Attachment, "contract \"final\".pdf"),
            "attachment; filename=\"contract _final_.pdf\"; filename*=UTF-8''contract%20%5Ffinal%5F%2Epdf"
        );
        assert!(content_disposition(Disposition::Inline, "a.pdf").starts_with("inline;"));
    }

    #[test]
    fn form_flags_parse_truthy_values() {
        let mut form = UploadForm::default();
        form.fields.insert("sendToSales".into(), "true".into());
        form.fields.insert("adminNotes".into(), "   ".into());
        assert!(form.flag("sendToSales"));
        assert!(!form.flag("missing"));
        assert_eq!(form.text("adminNotes"), None);
    }
}
